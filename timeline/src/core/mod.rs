//! Deterministic scheduling core.
//!
//! Core modules are free of I/O side effects. They build and traverse the
//! in-memory chunk tree and read recorded outcomes only through the
//! [`DataStore`](crate::data::DataStore) capability.

pub mod block;
pub mod chunk;
pub mod factory;
pub mod identity;
pub mod params;
pub mod progress;
pub mod types;
