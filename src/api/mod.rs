//! Operator control surface over HTTP
//!
//! An HTML status page with POST actions, a JSON API documented with
//! Swagger, a health check and the Prometheus scrape endpoint.

pub mod dto;
pub mod handlers;
pub mod router;

pub use router::{create_api_router, ApiDoc, ApiState};
