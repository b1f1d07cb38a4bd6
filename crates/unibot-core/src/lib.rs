//! Core dispatch logic for the university assistant bot.
//!
//! This crate is intentionally framework-agnostic. The messenger transport, the
//! session store engine and the Moodle backend live behind ports (traits)
//! implemented in adapter crates.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod handler;
pub mod handlers;
pub mod logging;
pub mod messaging;
pub mod routing;
pub mod scanner;
pub mod services;
pub mod state;
#[cfg(test)]
mod testing;
pub mod wizard;

pub use errors::{Error, Result};
