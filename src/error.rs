use thiserror::Error;

/// The error taxonomy a single policy query can fail with.
///
/// Every request-path variant here is caught at the connection handler and
/// converted to a `DUNNO`/`REJECT` response; none of them should ever
/// propagate out of `decision::decide` as a panic.
#[derive(Debug, Error)]
pub enum PostwhiteError {
    /// The parser could not make sense of the inbound request: a malformed
    /// attribute line, or the stream closed before the terminating blank
    /// line arrived.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// A command message failed its authorization check.
    #[error("authorization failed")]
    UnauthorizedCommand,

    /// Reading or writing the allow-list store or the learning spool
    /// failed.
    #[error("store I/O error: {0}")]
    StoreIo(#[from] std::io::Error),

    /// Outbound SMTP submission of a reply-mail failed. This never changes
    /// an already-computed MTA response; it is only ever logged.
    #[error("mail delivery failed: {0}")]
    MailDelivery(String),
}

/// Errors that can occur while loading the daemon's startup configuration.
/// Distinct from `PostwhiteError` because these are fatal at process start,
/// never part of the per-request decision path.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
