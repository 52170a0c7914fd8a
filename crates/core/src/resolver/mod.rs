//! Resolution orchestrator.
//!
//! Ties the pieces together for one playback request: cached answers first,
//! then a single provider round trip per distinct request under the
//! single-flight lock, file selection, and a direct link.

mod config;
mod orchestrator;
mod types;

pub use config::ResolverConfig;
pub use orchestrator::Resolver;
pub use types::{PlaybackRequest, Resolution, ResolveError};
