use thiserror::Error;

/// Core error taxonomy.
///
/// Every variant is recoverable from the scheduler's point of view: the loop
/// surfaces the error through status and keeps ticking. Only an explicit stop
/// request ends the control thread.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No physical input device and emulation is off. Retried at a reduced
    /// poll rate.
    #[error("no input device detected")]
    InputUnavailable,

    /// Opening or binding an output sender failed. Activation aborts only if
    /// the primary (after falling back to default routing) cannot open.
    #[error("failed to open output: {message}")]
    TransportOpen {
        /// Bind address the failed attempt was configured for, if any.
        address: Option<String>,
        message: String,
    },

    /// Unexpected failure inside a control tick (mapping, frame build, or a
    /// push to an open sender). The loop logs it and continues after a short
    /// backoff.
    #[error("loop error: {0}")]
    FrameTick(String),

    /// Malformed settings or fixture data reaching the administrative
    /// boundary. Malformed channel fields inside a tick never raise this;
    /// they degrade to "unpatched".
    #[error("configuration error: {0}")]
    Config(String),
}
