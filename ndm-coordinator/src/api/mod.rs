//! HTTP API handlers for ndm-coordinator
//!
//! JSON REST for the dashboard plus an SSE stream of batch events.

pub mod batch;
pub mod config;
pub mod health;
pub mod items;
pub mod maintenance;
pub mod sse;

pub use batch::batch_routes;
pub use config::{config_routes, ConfigView};
pub use health::health_routes;
pub use items::item_routes;
pub use maintenance::maintenance_routes;
pub use sse::event_stream;
