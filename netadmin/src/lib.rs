//! netadmin — firewall rule and routing table management over HTTP
//!
//! The core translates between the text that `iptables-save` and `ip route`
//! print and structured, id-addressable records, and rebuilds the command
//! lines needed to add or remove them. The HTTP layer in `api` is thin
//! plumbing over the `StateStore`.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod exec;
pub mod firewall;
pub mod persist;
pub mod routes;
pub mod store;
pub mod tokens;
