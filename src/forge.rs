//! Client for the hosting service that owns the pull requests.
//!
//! Provides token-based authentication and the three calls the bot needs:
//! listing open pull requests, reading issue metadata, and rewriting an
//! issue's labels and body.

/// Connection configuration and constants.
pub mod config;

/// GitHub REST implementation.
pub mod github;

/// Dry-run aware wrapper used by the rest of the crate.
pub mod manager;

/// Common trait for hosting service abstraction.
pub mod traits;

/// Wire types for pull requests and issues.
pub mod types;
