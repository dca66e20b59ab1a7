//! In-memory snapshot of the host's firewall rules and routes
//!
//! Both collections are read-through caches of the live tool state: every
//! successful mutation is followed by a full reload, and a reload replaces
//! the whole collection. Identifiers are positional and change whenever the
//! underlying rule set changes shape.
//!
//! Each collection has its own lock, held for the whole
//! execute → persist → reload sequence, so two mutations of the same
//! collection never interleave their external invocations.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::SystemConfig;
use crate::exec::{CommandExecutor, ExecError};
use crate::firewall::{self, FirewallRule, RuleRequest};
use crate::persist::PersistenceBridge;
use crate::routes::{self, Route, RouteRequest};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Rule not found")]
    RuleNotFound(u32),

    #[error("Route not found")]
    RouteNotFound(u32),

    /// Request rejected before any command ran
    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Program names for the external tools
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub iptables: String,
    pub iptables_save: String,
    pub ip: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::from(&SystemConfig::default())
    }
}

impl From<&SystemConfig> for ToolPaths {
    fn from(system: &SystemConfig) -> Self {
        Self {
            iptables: system.iptables_path.clone(),
            iptables_save: system.iptables_save_path.clone(),
            ip: system.ip_path.clone(),
        }
    }
}

/// Owns the current rule and route collections
pub struct StateStore {
    executor: Arc<dyn CommandExecutor>,
    tools: ToolPaths,
    firewall_bridge: PersistenceBridge,
    route_bridge: PersistenceBridge,
    rules: Mutex<Vec<FirewallRule>>,
    routes: Mutex<Vec<Route>>,
}

impl StateStore {
    /// Create an empty store. Call `reload_rules`/`reload_routes` to populate it.
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        tools: ToolPaths,
        firewall_bridge: PersistenceBridge,
        route_bridge: PersistenceBridge,
    ) -> Self {
        Self {
            executor,
            tools,
            firewall_bridge,
            route_bridge,
            rules: Mutex::new(Vec::new()),
            routes: Mutex::new(Vec::new()),
        }
    }

    /// Run an external program off the async worker threads.
    pub async fn run(&self, program: &str, args: Vec<String>) -> Result<Vec<u8>, ExecError> {
        let executor = Arc::clone(&self.executor);
        let program = program.to_string();
        let name = program.clone();

        match tokio::task::spawn_blocking(move || executor.run(&program, &args)).await {
            Ok(result) => result,
            Err(join_err) => Err(ExecError::Launch {
                program: name,
                source: std::io::Error::other(join_err),
            }),
        }
    }

    // --- Firewall rules ---

    pub async fn rules(&self) -> Vec<FirewallRule> {
        self.rules.lock().await.clone()
    }

    pub async fn rule_count(&self) -> usize {
        self.rules.lock().await.len()
    }

    /// Replace the rule collection with a fresh parse of the dump.
    /// Returns the number of rules loaded.
    pub async fn reload_rules(&self) -> usize {
        let mut rules = self.rules.lock().await;
        self.refresh_rules(&mut rules).await;
        rules.len()
    }

    pub async fn add_rule(&self, req: &RuleRequest) -> Result<(), StoreError> {
        req.validate().map_err(StoreError::Invalid)?;
        let args = firewall::build_add_args(req);

        let mut rules = self.rules.lock().await;
        self.run(&self.tools.iptables, args).await?;
        info!("Added rule to chain {} ({})", req.chain, req.action);

        self.persist_rules().await;
        self.refresh_rules(&mut rules).await;
        Ok(())
    }

    pub async fn delete_rule(&self, id: u32) -> Result<(), StoreError> {
        let mut rules = self.rules.lock().await;
        let rule = rules
            .iter()
            .find(|r| r.id == id)
            .ok_or(StoreError::RuleNotFound(id))?;
        let args = firewall::build_delete_args(rule);

        self.run(&self.tools.iptables, args).await?;
        info!("Deleted rule {id}");

        self.refresh_rules(&mut rules).await;
        Ok(())
    }

    async fn dump_rules(&self) -> Result<Vec<u8>, ExecError> {
        self.run(&self.tools.iptables_save, Vec::new()).await
    }

    async fn refresh_rules(&self, rules: &mut Vec<FirewallRule>) {
        *rules = match self.dump_rules().await {
            Ok(out) => firewall::parse_dump(&String::from_utf8_lossy(&out)),
            Err(e) => {
                warn!("Error getting iptables rules: {e}");
                Vec::new()
            }
        };
    }

    async fn persist_rules(&self) {
        let dump = match self.dump_rules().await {
            Ok(out) => out,
            Err(e) => {
                warn!("Failed to save firewall rules: {e}");
                return;
            }
        };
        if let Err(e) = self.firewall_bridge.save(&dump) {
            warn!("Failed to save firewall rules: {e}");
        }
    }

    // --- Routes ---

    pub async fn routes(&self) -> Vec<Route> {
        self.routes.lock().await.clone()
    }

    pub async fn route_count(&self) -> usize {
        self.routes.lock().await.len()
    }

    pub async fn reload_routes(&self) -> usize {
        let mut routes = self.routes.lock().await;
        self.refresh_routes(&mut routes).await;
        routes.len()
    }

    pub async fn add_route(&self, req: &RouteRequest) -> Result<(), StoreError> {
        req.validate().map_err(StoreError::Invalid)?;
        let args = routes::build_add_args(req);

        let mut routes = self.routes.lock().await;
        self.run(&self.tools.ip, args).await?;
        info!("Added route to {}", req.network);

        self.persist_routes().await;
        self.refresh_routes(&mut routes).await;
        Ok(())
    }

    pub async fn delete_route(&self, id: u32) -> Result<(), StoreError> {
        let mut routes = self.routes.lock().await;
        let route = routes
            .iter()
            .find(|r| r.id == id)
            .ok_or(StoreError::RouteNotFound(id))?;
        let args = routes::build_delete_args(route);

        self.run(&self.tools.ip, args).await?;
        info!("Deleted route {id}");

        self.refresh_routes(&mut routes).await;
        Ok(())
    }

    async fn list_routes(&self) -> Result<Vec<u8>, ExecError> {
        self.run(&self.tools.ip, vec!["route".into(), "show".into()])
            .await
    }

    async fn refresh_routes(&self, routes: &mut Vec<Route>) {
        *routes = match self.list_routes().await {
            Ok(out) => routes::parse_listing(&String::from_utf8_lossy(&out)),
            Err(e) => {
                warn!("Error getting routes: {e}");
                Vec::new()
            }
        };
    }

    async fn persist_routes(&self) {
        let listing = match self.list_routes().await {
            Ok(out) => out,
            Err(e) => {
                warn!("Failed to save routes: {e}");
                return;
            }
        };
        if let Err(e) = self.route_bridge.save(&listing) {
            warn!("Failed to save routes: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedExecutor;

    const DUMP: &str = "*filter\n:INPUT ACCEPT [0:0]\n-A INPUT -p tcp -s 10.0.0.5 --dport 22 -j ACCEPT\n-A INPUT -j DROP\nCOMMIT\n";
    const NAT_DUMP: &str = "*nat\n-A POSTROUTING -s 10.8.0.0/24 -j MASQUERADE\nCOMMIT\n";
    const LISTING: &str = "default via 192.168.1.1 dev eth0 metric 100\n10.0.0.0/24 via 10.0.0.1 dev eth0\n";

    fn store_with(exec: Arc<ScriptedExecutor>, dir: &std::path::Path) -> StateStore {
        StateStore::new(
            exec,
            ToolPaths::default(),
            PersistenceBridge::from_paths(&[dir.join("rules.v4")]),
            PersistenceBridge::from_paths(&[dir.join("routes")]),
        )
    }

    #[tokio::test]
    async fn test_reload_rules_parses_dump() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        let store = store_with(exec, dir.path());

        assert_eq!(store.reload_rules().await, 2);
        let rules = store.rules().await;
        assert_eq!(rules[0].id, 1);
        assert_eq!(rules[1].id, 2);
        assert_eq!(rules[1].action, "DROP");
    }

    #[tokio::test]
    async fn test_reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        exec.respond("ip route show", LISTING);
        let store = store_with(exec, dir.path());

        store.reload_rules().await;
        store.reload_routes().await;
        let (rules, routes) = (store.rules().await, store.routes().await);
        store.reload_rules().await;
        store.reload_routes().await;
        assert_eq!(store.rules().await, rules);
        assert_eq!(store.routes().await, routes);
    }

    #[tokio::test]
    async fn test_failed_dump_empties_collection() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        let store = store_with(exec.clone(), dir.path());
        assert_eq!(store.reload_rules().await, 2);

        exec.fail("iptables-save", "permission denied");
        assert_eq!(store.reload_rules().await, 0);
        assert!(store.rules().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_listing_empties_routes() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("ip route show", LISTING);
        let store = store_with(exec.clone(), dir.path());
        assert_eq!(store.reload_routes().await, 2);

        exec.fail("ip route show", "boom");
        assert_eq!(store.reload_routes().await, 0);
    }

    #[tokio::test]
    async fn test_add_rule_runs_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        let store = store_with(exec.clone(), dir.path());

        let req = RuleRequest {
            table: "filter".into(),
            chain: "INPUT".into(),
            protocol: "tcp".into(),
            port: "80".into(),
            action: "ACCEPT".into(),
            ..Default::default()
        };
        store.add_rule(&req).await.unwrap();

        let calls = exec.calls();
        assert_eq!(
            calls[0],
            "iptables -t filter -A INPUT -p tcp -p tcp --dport 80 -j ACCEPT"
        );
        // save dump, then reload dump
        assert_eq!(&calls[1..], &["iptables-save", "iptables-save"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("rules.v4")).unwrap(),
            DUMP
        );
        assert_eq!(store.rule_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_adds_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        exec.delay("iptables", std::time::Duration::from_millis(50));
        let store = store_with(exec.clone(), dir.path());

        let ssh = RuleRequest {
            chain: "INPUT".into(),
            protocol: "tcp".into(),
            port: "22".into(),
            action: "ACCEPT".into(),
            ..Default::default()
        };
        let web = RuleRequest {
            port: "443".into(),
            ..ssh.clone()
        };
        let (a, b) = tokio::join!(store.add_rule(&ssh), store.add_rule(&web));
        a.unwrap();
        b.unwrap();

        // exec, save dump, reload dump for one request, then the other
        let calls = exec.calls();
        assert_eq!(calls.len(), 6);
        for (i, call) in calls.iter().enumerate() {
            if i % 3 == 0 {
                assert!(call.starts_with("iptables -t filter -A INPUT"), "{calls:?}");
            } else {
                assert_eq!(call, "iptables-save", "{calls:?}");
            }
        }
        assert_ne!(calls[0], calls[3]);
    }

    #[tokio::test]
    async fn test_add_rule_failure_skips_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.fail("iptables -t filter -A INPUT -j BOGUS", "no chain/target");
        let store = store_with(exec.clone(), dir.path());

        let req = RuleRequest {
            chain: "INPUT".into(),
            action: "BOGUS".into(),
            ..Default::default()
        };
        let err = store.add_rule(&req).await.unwrap_err();
        assert!(matches!(err, StoreError::Exec(_)));
        assert_eq!(exec.calls().len(), 1);
        assert!(!dir.path().join("rules.v4").exists());
    }

    #[tokio::test]
    async fn test_add_rule_invalid_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        let store = store_with(exec.clone(), dir.path());

        let err = store.add_rule(&RuleRequest::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_fail_add() {
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = StateStore::new(
            exec,
            ToolPaths::default(),
            PersistenceBridge::from_paths(&[blocker.join("rules.v4")]),
            PersistenceBridge::from_paths(&[blocker.join("routes")]),
        );

        let req = RuleRequest {
            chain: "INPUT".into(),
            action: "ACCEPT".into(),
            ..Default::default()
        };
        assert!(store.add_rule(&req).await.is_ok());
        assert_eq!(store.rule_count().await, 2);
    }

    #[tokio::test]
    async fn test_delete_rule_uses_default_table_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", NAT_DUMP);
        let store = store_with(exec.clone(), dir.path());
        store.reload_rules().await;
        assert_eq!(store.rules().await[0].table, "nat");

        store.delete_rule(1).await.unwrap();
        let calls = exec.calls();
        assert_eq!(calls[1], "iptables -t filter -D POSTROUTING -s 10.8.0.0/24");
        assert_eq!(calls[2], "iptables-save");
        assert_eq!(calls.len(), 3);
        // no persistence on delete
        assert!(!dir.path().join("rules.v4").exists());
    }

    #[tokio::test]
    async fn test_delete_unknown_rule() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("iptables-save", DUMP);
        let store = store_with(exec.clone(), dir.path());
        store.reload_rules().await;

        let err = store.delete_rule(99).await.unwrap_err();
        assert!(matches!(err, StoreError::RuleNotFound(99)));
        assert_eq!(exec.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_add_route_persists_listing() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("ip route show", LISTING);
        let store = store_with(exec.clone(), dir.path());

        let req = RouteRequest {
            network: "10.9.0.0/16".into(),
            gateway: "10.0.0.254".into(),
            ..Default::default()
        };
        store.add_route(&req).await.unwrap();

        assert_eq!(exec.calls()[0], "ip route add 10.9.0.0/16 via 10.0.0.254");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("routes")).unwrap(),
            LISTING
        );
        assert_eq!(store.route_count().await, 2);
    }

    #[tokio::test]
    async fn test_delete_route_sends_network_only() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("ip route show", LISTING);
        let store = store_with(exec.clone(), dir.path());
        store.reload_routes().await;

        store.delete_route(2).await.unwrap();
        assert_eq!(exec.calls()[1], "ip route del 10.0.0.0/24");
        assert!(matches!(
            store.delete_route(7).await,
            Err(StoreError::RouteNotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_delete_route_failure_keeps_collection() {
        let dir = tempfile::tempdir().unwrap();
        let exec = Arc::new(ScriptedExecutor::new());
        exec.respond("ip route show", LISTING);
        exec.fail("ip route del default", "RTNETLINK answers: Operation not permitted");
        let store = store_with(exec.clone(), dir.path());
        store.reload_routes().await;

        assert!(matches!(store.delete_route(1).await, Err(StoreError::Exec(_))));
        assert_eq!(store.route_count().await, 2);
    }
}
