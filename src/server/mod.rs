//! HTTP exposure of the mapping layer
//!
//! This module provides a `ServerBuilder` that registers generic JSON:API
//! routes for every resource type in the registry.

pub mod builder;
pub mod handlers;
pub mod router;

pub use builder::ServerBuilder;
pub use handlers::{ApiState, JsonApi, Payload};
pub use router::build_resource_routes;
