// src/lib.rs

//! flatwatch: rental listing watcher library

pub mod commands;
pub mod error;
#[cfg(feature = "cli")]
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
