//! Exambase shared infrastructure.

pub mod logging;
