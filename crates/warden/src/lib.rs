//! Warden - Ring simulation driver for warden-core
//!
//! Runs rings of contending agents from the command line: to completion
//! under the deadlock-free ordered strategy, or against a liveness window
//! to demonstrate the unordered strategy livelocking.

pub mod cli;
pub mod logging;
pub mod render;
