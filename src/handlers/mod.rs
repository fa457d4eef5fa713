//! HTTP handlers for entities and per-user cloud storage configuration.

pub mod entity;
pub mod onedrive;
pub use entity::*;
pub use onedrive::*;
