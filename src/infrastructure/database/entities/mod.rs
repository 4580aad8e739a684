//! SeaORM entities

pub mod state;
