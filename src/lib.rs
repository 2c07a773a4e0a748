// Core modules
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use api::{EventSource, EventSubscription, ExchangeApi};
pub use error::{Error, Result};
pub use models::*;
pub use strategy::Strategy;
