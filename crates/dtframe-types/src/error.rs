use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    /// Column type mismatch (push, extend, coercion).
    #[error("Type error: {0}")]
    Type(String),

    /// A per-group result has an unsupported or inconsistent shape.
    #[error("Shape error: {0}")]
    Shape(String),

    /// A result length that is neither 1 nor the group's row count.
    #[error("Recycle error: {0}")]
    Recycle(String),

    /// Internal metadata disagreement. Always a defect in the caller.
    #[error("Internal error: {0}")]
    Invariant(String),

    /// Invalid rolling-window parameters.
    #[error("Rolling error: {0}")]
    Roll(String),

    /// A rolling callback returned something other than a single number.
    #[error("Callback error: {0}")]
    Callback(String),

    /// Error raised by the host expression; passed through unchanged.
    #[error("Evaluation error: {0}")]
    Eval(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
