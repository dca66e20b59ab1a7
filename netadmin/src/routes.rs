//! Route translation — `ip route show` listing ↔ structured routes

use serde::{Deserialize, Serialize};

use crate::tokens::{tokenize, Cursor};

/// One entry of the kernel routing table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: u32,
    pub network: String,
    pub gateway: String,
    pub interface: String,
    pub metric: String,
    /// Verbatim listing line; authoritative for deletion
    pub raw: String,
}

/// Body of an add-route request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouteRequest {
    pub network: String,
    pub gateway: String,
    pub interface: String,
    pub metric: String,
}

impl RouteRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.network.trim().is_empty() {
            return Err("network is required".into());
        }
        Ok(())
    }
}

/// Parse the full routing table listing, numbering routes from 1.
pub fn parse_listing(listing: &str) -> Vec<Route> {
    let mut routes = Vec::new();

    for line in listing.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let tokens = tokenize(line);
        if tokens.len() < 3 {
            continue;
        }

        let id = routes.len() as u32 + 1;
        routes.push(parse_route_line(id, line, &tokens));
    }

    routes
}

fn parse_route_line(id: u32, line: &str, tokens: &[&str]) -> Route {
    let mut route = Route {
        id,
        network: String::new(),
        gateway: String::new(),
        interface: String::new(),
        metric: String::new(),
        raw: line.to_string(),
    };

    let mut cursor = Cursor::new(tokens, 0);
    while let Some(token) = cursor.peek() {
        if let Some(v) = cursor.take_value(&["via"]) {
            route.gateway = v.to_string();
        } else if let Some(v) = cursor.take_value(&["dev"]) {
            route.interface = v.to_string();
        } else if let Some(v) = cursor.take_value(&["metric"]) {
            route.metric = v.to_string();
        } else {
            // Substring match, not equality: "device0" can never be the network.
            let keyword = matches!(token, "via" | "dev" | "metric");
            if !keyword
                && route.network.is_empty()
                && !token.contains("via")
                && !token.contains("dev")
            {
                route.network = token.to_string();
            }
            cursor.skip();
        }
    }

    route
}

/// Arguments for `ip` that add the requested route.
pub fn build_add_args(req: &RouteRequest) -> Vec<String> {
    let mut args: Vec<String> = vec!["route".into(), "add".into(), req.network.clone()];

    if !req.gateway.is_empty() {
        args.extend(["via".into(), req.gateway.clone()]);
    }
    if !req.interface.is_empty() {
        args.extend(["dev".into(), req.interface.clone()]);
    }
    if !req.metric.is_empty() {
        args.extend(["metric".into(), req.metric.clone()]);
    }

    args
}

/// Arguments for `ip` that delete a parsed route.
///
/// Only the first token of the raw line is used; gateway, interface and
/// metric are not passed, so with several routes to one prefix the kernel
/// picks which one goes.
pub fn build_delete_args(route: &Route) -> Vec<String> {
    let mut args: Vec<String> = vec!["route".into(), "del".into()];
    if let Some(network) = tokenize(&route.raw).first() {
        args.push((*network).to_string());
    }
    args
}
