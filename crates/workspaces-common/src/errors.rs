use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Errors surfaced synchronously to the caller of a workspace operation.
///
/// Conditions that are tolerated by design (early ICE candidates, sends on
/// a channel that is not yet open) are buffered and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("invalid plugin: {0}")]
    InvalidPlugin(String),

    #[error("invalid callback for '{0}'")]
    InvalidCallback(String),

    #[error("invalid state key: {0:?}")]
    InvalidStateKey(String),

    #[error("unknown attendee: {0}")]
    UnknownAttendee(String),

    #[error("ICE servers list is not initialized")]
    IceServersNotInitialized,

    #[error("workspace owner cannot leave, only destroy is allowed")]
    OwnerCannotLeave,

    #[error("no negotiation handle for attendee {0}")]
    NegotiationHandleMissing(String),

    #[error("not joined to a workspace")]
    NotJoined,

    #[error("media error: {0}")]
    Media(String),

    #[error("negotiation error: {0}")]
    Negotiation(String),

    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("workspace client task has stopped")]
    ClientStopped,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::FileNotFound(PathBuf::from("/tmp/missing.toml"));
        assert_eq!(err.to_string(), "config file not found: /tmp/missing.toml");

        let err = ConfigError::ParseError("unexpected token".into());
        assert_eq!(err.to_string(), "config parse error: unexpected token");

        let err = ConfigError::ValidationError("signaling.url is not a ws:// url".into());
        assert_eq!(
            err.to_string(),
            "config validation error: signaling.url is not a ws:// url"
        );
    }

    #[test]
    fn workspace_error_display() {
        assert_eq!(
            WorkspaceError::OwnerCannotLeave.to_string(),
            "workspace owner cannot leave, only destroy is allowed"
        );
        assert_eq!(
            WorkspaceError::IceServersNotInitialized.to_string(),
            "ICE servers list is not initialized"
        );
        assert_eq!(
            WorkspaceError::NegotiationHandleMissing("a-1".into()).to_string(),
            "no negotiation handle for attendee a-1"
        );
        assert_eq!(
            WorkspaceError::InvalidStateKey(String::new()).to_string(),
            "invalid state key: \"\""
        );
        assert_eq!(
            WorkspaceError::InvalidCallback("ringing".into()).to_string(),
            "invalid callback for 'ringing'"
        );
    }

    #[test]
    fn workspace_error_from_config() {
        let config_err = ConfigError::ParseError("bad toml".into());
        let err: WorkspaceError = config_err.into();
        assert!(matches!(err, WorkspaceError::Config(_)));
        assert!(err.to_string().contains("bad toml"));
    }

    #[test]
    fn workspace_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: WorkspaceError = serde_err.into();
        assert!(matches!(err, WorkspaceError::Serialization(_)));
    }

    #[test]
    fn workspace_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: WorkspaceError = io_err.into();
        assert!(matches!(err, WorkspaceError::Io(_)));
        assert!(err.to_string().contains("file missing"));
    }
}
