//! Clientele Core - client registry for the clinic app
//!
//! Keeps a durable list of clients in SQLite, mirrors each registration into
//! an audit log and a last-used preference snapshot on a best-effort basis,
//! and serves a live, search-filtered view of the clients.
//!
//! The UI shell talks to `ClientRegistry` through the `ClientRegistryApi` trait.

pub mod audit;
pub mod clients;
pub mod config;
pub mod contact;
pub mod coordinator;
pub mod database;
pub mod feed;
pub mod interface;
pub mod logging;
pub mod models;
pub mod preferences;
mod registry;
mod runtime;
pub mod search;

pub use config::RegistryConfig;
pub use interface::*;
pub use registry::ClientRegistry;
