// Wiki Backup Orchestrator - API Core
//
// This crate starts crawler fleets that back up monitored wikis, tracks their
// progress from pushed status messages and archives, signs and reports each
// finished backup.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
