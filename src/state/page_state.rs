/// Page Store entry state definitions
use std::fmt;

/// The two states a Page Store key can be in
///
/// A key moves from `Pending` to `Complete` at most once and never back,
/// short of a full store reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryState {
    /// URL reserved (enqueued) but no fetch result stored yet
    Pending,

    /// Full page record stored
    Complete,
}

impl EntryState {
    pub fn of(record: &crate::page::PageRecord) -> Self {
        if record.visited {
            Self::Complete
        } else {
            Self::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
