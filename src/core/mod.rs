//! Core types and helpers shared by every subsystem.

pub mod config;
pub mod errors;
pub mod process;
pub mod signal;
