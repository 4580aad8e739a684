//! API Handlers

pub mod charge_points;
pub mod commands;
pub mod health;
pub mod metrics;
pub mod status_page;
