//! Nested trial scheduler for behavioral experiments.
//!
//! An experiment is declared as a tree: composite *chunks* (`linear` or
//! `while`) whose leaves are *blocks* of trials expanded from plugin
//! parameters. The scheduler delivers trials one at a time in depth-first
//! order, repeats `while` chunks as their predicates demand, and tags every
//! recorded outcome with the identity path of the chunk instance that ran it.
//!
//! - **[`core`]**: Pure tree construction and traversal. No I/O.
//! - **[`io`]**: Config and definition files.
//!
//! [`session`] drives a built timeline trial by trial; [`outline`] renders it.

pub mod core;
pub mod data;
pub mod definition;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod outline;
pub mod registry;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
