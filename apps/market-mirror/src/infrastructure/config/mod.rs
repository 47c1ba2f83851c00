//! Configuration
//!
//! Environment-driven configuration for the market mirror.

mod settings;

pub use settings::{
    ConfigError, Credentials, Environment, Exchange, MirrorConfig, WebSocketSettings,
};
