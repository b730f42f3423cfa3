//! Infrastructure layer
//!
//! This module handles everything outside the window logic:
//! - The message store contract and an in-memory implementation
//! - Failure reporting
//! - Configuration loading
//! - CLI argument processing

pub mod cli;
pub mod config;
pub mod memory_store;
pub mod reporter;
pub mod store;
