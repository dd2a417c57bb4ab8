//! Core type aliases and re-exports

pub use glam::{DVec2, DVec3};

/// Standard Result type for the compiler
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
