use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for Visor control-plane operations.
///
/// Every caller-facing operation is synchronous and surfaces exactly one of
/// these; nothing retries internally. Invalid-argument failures are checked
/// before any state or register mutation, so a rejected call never partially
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Out-of-range display index, enum value at or past its sentinel,
    /// empty map payload, or zero refresh rate.
    #[error("invalid argument")]
    InvalidArgument,

    /// A bounded vsync/commit wait expired without the event arriving.
    #[error("timed out waiting for display event")]
    Timeout,

    /// Device-visible buffer allocation failed; the previously published
    /// buffer (if any) is still live.
    #[error("device buffer allocation failed")]
    OutOfMemory,

    /// Clock/reset bring-up failed during `init`. Already-enabled clocks are
    /// rolled back in reverse order before this surfaces.
    #[error("hardware init failure: {0}")]
    HardwareInitFailure(&'static str),
}
