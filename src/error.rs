//! Failure categories shared by the lifecycle and batch errors.

/// Broad classification of a failure, used for reporting and exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required setting is absent or malformed.
    ConfigurationInvalid,
    /// The operation conflicts with the current lifecycle state.
    LifecycleConflict,
    /// A remote service or external process failed.
    TransportFailure,
    /// A result file could not be produced.
    OutputUnavailable,
}

impl ErrorKind {
    /// Process exit code reported for this category.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::ConfigurationInvalid => 2,
            Self::LifecycleConflict => 3,
            Self::TransportFailure => 4,
            Self::OutputUnavailable => 5,
        }
    }
}
