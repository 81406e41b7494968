//! Utilities

pub mod discovery;
