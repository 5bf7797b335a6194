//! scan-relay library crate.
//!
//! Orchestrates a recognition engine: the [`scanner::Scanner`] facade owns
//! the engine handle and queues long-running work, the
//! [`controller::ScanController`] feeds it camera frames.

pub mod api;
pub mod camera;
pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod scanner;
