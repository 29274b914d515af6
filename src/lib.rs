pub mod client;
pub mod config;
pub mod dates;
pub mod error;
pub mod models;
pub mod parser;
pub mod resolver;
pub mod store;
pub mod transport;
pub mod urls;

pub use client::StreamClient;
pub use config::{Config, SiteConfig};
pub use error::{EngineError, Result};
