// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

/// Errors surfaced to callers of the simulation controller. Pool-full and
/// pool-empty are steady-state outcomes, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No simulation is currently running")]
    NoActiveRun,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("config store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config store json: {0}")]
    Json(#[from] serde_json::Error),
}
