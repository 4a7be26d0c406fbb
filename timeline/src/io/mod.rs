//! I/O helpers for timeline commands.

pub mod config;
pub mod definition_store;
