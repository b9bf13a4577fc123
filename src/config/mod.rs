//! Configuration module for the Cassandra harness.
//!
//! This module handles parsing, validation, and access to the settings of a
//! supervised server. Configurations load from JSON or YAML files, or are
//! built in code from [`HarnessConfig::for_address`].
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use cassandra_harness::config::HarnessConfig;
//!
//! let config = HarnessConfig::from_file("harness.json").unwrap();
//! println!("Supervising {}", config.endpoint());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use cassandra_harness::config::{HarnessConfig, validate_config};
//!
//! let mut config = HarnessConfig::for_address("127.0.0.1");
//! config.reset_data = false;
//! config.startup_timeout_ms = 30_000;
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{DEFAULT_PORT, DEFAULT_READINESS_MARKER, HarnessConfig};
pub use validator::{validate_config, validate_paths};
