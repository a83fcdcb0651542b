//! Core layer - configuration, errors and logging shared by every module

pub mod config;
pub mod error;
pub mod logging;
