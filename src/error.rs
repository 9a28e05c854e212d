pub type FramemixResult<T> = Result<T, FramemixError>;

#[derive(thiserror::Error, Debug)]
pub enum FramemixError {
    /// Assembler or lifecycle API called out of order (e.g. `add_subframe`
    /// with no open job, or `begin` while one is already open).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An output frame buffer could not be sized or reserved.
    #[error("allocation error: {0}")]
    Allocation(String),

    /// The compositing engine failed for a single job.
    #[error("compositing error: {0}")]
    Compositing(String),

    /// `stop` was called while jobs were still open or undelivered.
    #[error("shutdown requested with pending work")]
    ShutdownWithPendingWork,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FramemixError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    pub fn compositing(msg: impl Into<String>) -> Self {
        Self::Compositing(msg.into())
    }
}
