//! Error taxonomy for the observer core.

use thiserror::Error;

/// Errors produced by the S7 transport, session lifecycle, and analysis pipeline.
///
/// All variants are scoped to a session and clear at reset; none are fatal
/// to the process.
#[derive(Debug, Error, Clone)]
pub enum ObserverError {
    /// PLC read/write failed. Treated as transient by the sampler loop;
    /// repeated failures escalate to a dropped connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed session ingress parameter (address, slot, period).
    #[error("validation error: {0}")]
    Validation(String),

    /// All-zero image read from the PLC; dropped rather than stored.
    #[error("empty read anomaly")]
    EmptyRead,

    /// State lookup failed while resolving a transition endpoint.
    #[error("state not found: {0}")]
    NotFound(String),

    /// No session is currently connected.
    #[error("no active session")]
    NoSession,
}
