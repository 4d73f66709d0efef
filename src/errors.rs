/// Represent errors in the driver
///
/// Protocol-level negative responses (`Failed`, `NotSupported`, `Unknown`
/// status words) are *not* errors; they are returned as ordinary
/// [`Outcome`](crate::device::Outcome) values. This enum covers the
/// conditions that abort a command instead.
#[derive(Debug, PartialEq, Eq)]
pub enum DriverError {
    /// Caller broke a documented precondition (wrong key length,
    /// out-of-range slot, block index outside the card geometry).
    /// Never retried.
    ContractViolation(&'static str),

    /// No physical reader matched the configured filter when the
    /// command timeout elapsed.
    NoReaderConnected,

    /// A reader is tracked but no card was present when the command
    /// timeout elapsed.
    NoCardPresent,

    /// A card was present but the transmit never completed in time.
    CommandTimeout,

    /// The hardware violated one of its guarantees, e.g. more than one
    /// card add per notification or a response shorter than a status
    /// word.
    InvariantBreach(&'static str),

    /// Transport failure from the PC/SC layer.
    Pcsc(pcsc::Error),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::ContractViolation(msg) => write!(f, "contract violation: {msg}"),
            DriverError::NoReaderConnected => write!(f, "no reader is connected with USB"),
            DriverError::NoCardPresent => write!(f, "no tag is connected"),
            DriverError::CommandTimeout => write!(f, "command timed out with a card present"),
            DriverError::InvariantBreach(msg) => write!(f, "invariant breach: {msg}"),
            DriverError::Pcsc(err) => write!(f, "pcsc error: {err}"),
        }
    }
}

impl std::error::Error for DriverError {}

/// Helper for `DriverError` result
pub type DriverResult<T> = Result<T, DriverError>;

impl From<pcsc::Error> for DriverError {
    fn from(error: pcsc::Error) -> Self {
        DriverError::Pcsc(error)
    }
}
