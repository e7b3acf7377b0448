use thiserror::Error;

use super::types::RouteKind;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metadata server '{server}' unreachable: {reason}")]
    MetadataUnreachable { server: String, reason: String },

    #[error("Invalid metadata from '{server}': {reason}")]
    InvalidMetadata { server: String, reason: String },

    #[error("Could not find target_cluster '{0}' in the metadata")]
    TargetClusterNotFound(String),

    #[error("ClusterSet id mismatch: expected '{expected}', metadata reports '{observed}'")]
    ClusterSetMismatch { expected: String, observed: String },

    #[error("No {route} destination available: {reason}")]
    RouteUnavailable { route: RouteKind, reason: String },

    #[error("No metadata servers known")]
    NoMetadataServers,

    #[error("Backend '{server}' connect failed: {reason}")]
    BackendUnreachable { server: String, reason: String },

    #[error("State file error: {0}")]
    StateFileError(String),

    #[error("Background task failed: {0}")]
    TaskError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, RouterError>;

impl<T> From<std::sync::PoisonError<T>> for RouterError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for RouterError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_not_found_message_is_verbatim() {
        let err =
            RouterError::TargetClusterNotFound("'00000000-0000-0000-0000-0000000000g1'".into());
        assert_eq!(
            err.to_string(),
            "Could not find target_cluster ''00000000-0000-0000-0000-0000000000g1'' in the metadata"
        );
    }

    #[test]
    fn test_route_unavailable_names_route() {
        let err = RouterError::RouteUnavailable {
            route: RouteKind::ReadWrite,
            reason: "target cluster is not PRIMARY".into(),
        };
        assert!(err.to_string().contains("RW"));
    }
}
