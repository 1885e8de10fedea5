use super::status::MemberStatus;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("No database is available: {0}")]
    NoAvailableDatabase(String),

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: MemberStatus,
        to: MemberStatus,
    },

    #[error("Member '{0}' not found")]
    MemberNotFound(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Synchronisation failed: {0}")]
    SyncFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ClusterError>;

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}
