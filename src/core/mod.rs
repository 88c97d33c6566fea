pub mod adapter;
pub mod executor;
pub mod graph;
pub mod health;
pub mod payload;
pub mod registry;
pub mod service;
pub mod telemetry;
pub mod transport;
pub mod validation;
