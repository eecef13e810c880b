//! Data models for a measurement run

pub mod config;
pub mod results;
pub mod server;

// Re-export main model types
pub use config::Config;
pub use results::Results;
pub use server::{ClientLocation, Server};
