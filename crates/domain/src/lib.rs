//! `sc-domain`: shared types for the session continuity crates.
//!
//! - [`session::SessionState`]: the single shared credential holder
//! - [`config::Config`]: TOML configuration for both channels
//! - [`error::Error`]: the common error type

pub mod config;
pub mod error;
pub mod session;

pub use session::{SessionSnapshot, SessionState, UserIdentity};
