//! Protocol-facing interfaces

pub mod ws;
