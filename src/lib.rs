//! PINCH: market-board undercut automation
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod ports;
pub mod humanize;
pub mod pricing;
pub mod scheduler;
pub mod engine;
pub mod items;
pub mod sales;
pub mod notify;
pub mod storage;
pub mod sim;
