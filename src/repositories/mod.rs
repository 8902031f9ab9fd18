//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a clean API for data access.

pub mod build_event;

pub use build_event::{BuildEventRepository, EVENT_TTL_HOURS, EventFilter};
