//! Core business logic for khidmat.

pub mod services;

pub use services::*;
