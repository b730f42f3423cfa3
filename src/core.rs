//! Core pagination logic
//!
//! This module contains the window state and the engine driving it:
//! - Cursor bookkeeping, loading flags and the visible range
//! - The page cache shared across conversations
//! - Fetch orchestration, cancellation and prefetching
//! - The error taxonomy surfaced to observers

pub mod cache;
pub mod engine;
pub mod error;
pub mod state;
