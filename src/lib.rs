//! # Buildwatch Library
//!
//! This library provides the core functionality for the Buildwatch service:
//! webhook ingestion, event normalization and storage, query endpoints,
//! and background expiry of retained events.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalization;
pub mod repositories;
pub mod server;
pub mod sweeper;
pub mod telemetry;
pub mod webhook_verification;
pub use migration;
