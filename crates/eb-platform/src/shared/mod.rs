//! Shared infrastructure

pub mod error;
pub mod indexes;
