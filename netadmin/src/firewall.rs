//! Firewall rule translation — iptables-save dump ↔ structured rules
//!
//! Three directions:
//! - parse: `iptables-save` output → `Vec<FirewallRule>`
//! - build: `RuleRequest` → `iptables` argument list for an append
//! - reverse-build: a parsed `FirewallRule` → `iptables` argument list for a delete
//!
//! Deletion replays the tokens of the rule's raw dump line rather than its
//! structured fields, because `iptables -D` needs the original rule spec.

use serde::{Deserialize, Serialize};

use crate::tokens::{tokenize, Cursor};

/// Prefix iptables-save uses for "append this rule to chain"
pub const APPEND_MARKER: &str = "-A";

/// Table used when none is given, and the only table deletions target
pub const DEFAULT_TABLE: &str = "filter";

const PROTOCOL_FLAGS: &[&str] = &["-p"];
const SOURCE_FLAGS: &[&str] = &["-s"];
const DESTINATION_FLAGS: &[&str] = &["-d"];
const DPORT_FLAGS: &[&str] = &["--dport"];
const JUMP_FLAGS: &[&str] = &["-j"];
// The match-module flag, the module name and the comment-text flag all feed
// the comment field. Lossy on purpose: "-m tcp" yields comment "tcp".
const COMMENT_FLAGS: &[&str] = &["-m", "comment", "--comment"];

/// One active rule as reported by the packet filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub id: u32,
    pub table: String,
    pub chain: String,
    pub protocol: String,
    pub source: String,
    pub destination: String,
    pub port: String,
    pub action: String,
    pub comment: String,
    /// Verbatim dump line; authoritative for deletion
    pub raw: String,
}

/// Body of an add-rule request
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleRequest {
    pub table: String,
    pub chain: String,
    pub protocol: String,
    pub source: String,
    pub destination: String,
    pub port: String,
    pub action: String,
    pub comment: String,
}

impl RuleRequest {
    /// Reject requests that iptables could never accept.
    pub fn validate(&self) -> Result<(), String> {
        if self.chain.trim().is_empty() {
            return Err("chain is required".into());
        }
        if self.action.trim().is_empty() {
            return Err("action is required".into());
        }
        if !self.port.is_empty() && self.protocol.is_empty() {
            return Err("port requires a protocol".into());
        }
        Ok(())
    }

    fn table_or_default(&self) -> &str {
        if self.table.is_empty() {
            DEFAULT_TABLE
        } else {
            &self.table
        }
    }
}

/// Parse a full iptables-save dump.
///
/// Only append lines produce records; ids run 1, 2, 3, … in dump order.
/// `*table` headers set the table of the rules that follow them.
pub fn parse_dump(dump: &str) -> Vec<FirewallRule> {
    let mut rules = Vec::new();
    let mut table = DEFAULT_TABLE.to_string();

    for line in dump.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix('*') {
            if !name.is_empty() {
                table = name.to_string();
            }
            continue;
        }
        if !line.starts_with("-A ") {
            continue;
        }

        let tokens = tokenize(line);
        if tokens.len() < 3 {
            continue;
        }

        let id = rules.len() as u32 + 1;
        rules.push(parse_rule_line(id, &table, line, &tokens));
    }

    rules
}

fn parse_rule_line(id: u32, table: &str, line: &str, tokens: &[&str]) -> FirewallRule {
    let mut rule = FirewallRule {
        id,
        table: table.to_string(),
        chain: tokens[1].to_string(),
        protocol: String::new(),
        source: String::new(),
        destination: String::new(),
        port: String::new(),
        action: String::new(),
        comment: String::new(),
        raw: line.to_string(),
    };

    let mut cursor = Cursor::new(tokens, 2);
    while !cursor.is_done() {
        let field = if let Some(v) = cursor.take_value(PROTOCOL_FLAGS) {
            Some((&mut rule.protocol, v))
        } else if let Some(v) = cursor.take_value(SOURCE_FLAGS) {
            Some((&mut rule.source, v))
        } else if let Some(v) = cursor.take_value(DESTINATION_FLAGS) {
            Some((&mut rule.destination, v))
        } else if let Some(v) = cursor.take_value(DPORT_FLAGS) {
            Some((&mut rule.port, v))
        } else if let Some(v) = cursor.take_value(JUMP_FLAGS) {
            Some((&mut rule.action, v))
        } else if let Some(v) = cursor.take_value(COMMENT_FLAGS) {
            Some((&mut rule.comment, v))
        } else {
            None
        };

        match field {
            Some((slot, value)) => *slot = value.to_string(),
            None => cursor.skip(),
        }
    }

    rule
}

/// Arguments for `iptables` that append the requested rule.
///
/// When a port is given the protocol flag is emitted a second time next to
/// `--dport`; iptables accepts the repetition.
pub fn build_add_args(req: &RuleRequest) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-t".into(),
        req.table_or_default().into(),
        APPEND_MARKER.into(),
        req.chain.clone(),
    ];

    if !req.protocol.is_empty() {
        args.extend(["-p".into(), req.protocol.clone()]);
    }
    if !req.source.is_empty() {
        args.extend(["-s".into(), req.source.clone()]);
    }
    if !req.destination.is_empty() {
        args.extend(["-d".into(), req.destination.clone()]);
    }
    if !req.port.is_empty() {
        args.extend([
            "-p".into(),
            req.protocol.clone(),
            "--dport".into(),
            req.port.clone(),
        ]);
    }
    if !req.comment.is_empty() {
        args.extend([
            "-m".into(),
            "comment".into(),
            "--comment".into(),
            req.comment.clone(),
        ]);
    }
    args.extend(["-j".into(), req.action.clone()]);

    args
}

/// Arguments for `iptables` that delete a previously parsed rule.
///
/// Always targets the default table, whatever `rule.table` says. The raw
/// tokens after the chain are replayed up to (not including) `-j`; a token
/// that does not start with `-` is paired with the flag before it.
pub fn build_delete_args(rule: &FirewallRule) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-t".into(),
        DEFAULT_TABLE.into(),
        "-D".into(),
        rule.chain.clone(),
    ];

    let parts = tokenize(&rule.raw);
    let mut i = 2;
    while i < parts.len() {
        if parts[i] == "-j" {
            break;
        }
        args.push(parts[i].to_string());
        if let Some(next) = parts.get(i + 1) {
            if *next != "-j" && !next.starts_with('-') {
                args.push((*next).to_string());
                i += 1;
            }
        }
        i += 1;
    }

    args
}
