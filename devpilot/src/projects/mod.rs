//! Durable project records

pub mod model;
pub mod store;
