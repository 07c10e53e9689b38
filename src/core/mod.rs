//! Configuration and payload types shared across the crate

pub mod config;
pub mod models;
