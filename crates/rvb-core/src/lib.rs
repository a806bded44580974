//! Core domain + application logic for revoltbot.
//!
//! This crate is intentionally framework-agnostic. The Revolt connection and the
//! Lua console live in adapter crates behind the ports defined here.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod security;

pub use errors::{Error, Result};
