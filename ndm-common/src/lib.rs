//! # NDM Common Library
//!
//! Shared code for the nzbdav migration services:
//! - Error types
//! - Configuration value object and its loader
//! - Migration event types and the in-process event bus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use config::{AppConfig, ManagerEndpoint};
pub use error::{Error, Result};
pub use events::{EventBus, MigrationEvent};
