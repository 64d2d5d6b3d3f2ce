//! # Core
//!
//! Process-level concerns that sit above the API client and the provider.
//!
//! ## Modules
//!
//! - [`config`]: TOML config file, env overrides and the resolved settings

pub mod config;
