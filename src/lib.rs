pub mod backup;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod mount;
pub mod notify;
pub mod rotation;
pub mod signal_handler;
pub mod snapshot;
pub mod types;
pub mod util;
