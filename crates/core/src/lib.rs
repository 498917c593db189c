//! # rg-core
//!
//! Shared building blocks for the RiskGate pre-trade risk server.
//!
//! This crate provides the foundational pieces used across the workspace:
//! the market event types and attribute message model, the moving-window
//! primitives every risk rule is built on, the layered configuration
//! loader, and the logging initialization.

pub mod config;
pub mod logging;
pub mod message;
pub mod sync;
pub mod types;
pub mod window;
