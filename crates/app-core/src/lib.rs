//! Core types, configuration, and utilities for the RoadWatch app core.

mod bootstrap;
mod config;
mod error;
mod logging;
mod paths;

pub use bootstrap::{bootstrap, bootstrap_with, AppCore};
pub use config::{Config, DEFAULT_LOG_LEVEL, DEFAULT_SUPABASE_PUBLISHABLE_KEY, DEFAULT_SUPABASE_URL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
