//! Scheduling-point classification.
//!
//! Instrumented user code reports one of these kinds at every callback
//! site where the scheduler may switch operations. The shared-state
//! reducer only depends on two classifications: whether a point is a
//! shared-state read or write, and whether it is an explicit request to
//! interleave.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SchedulingPoint — closed set of scheduling-point kinds
// ---------------------------------------------------------------------------

/// Kind of a scheduling point reported by instrumentation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SchedulingPoint {
    /// Unclassified scheduling point.
    #[default]
    Default,
    /// Explicit request to interleave with other operations.
    Interleave,
    /// Cooperative yield of the current operation.
    Yield,
    /// Read of a shared-state location.
    Read,
    /// Write to a shared-state location.
    Write,
    /// Creation of a new operation.
    Create,
    /// Forced context switch.
    ContextSwitch,
    /// Acquisition of a synchronization resource.
    Acquire,
    /// Release of a synchronization resource.
    Release,
    /// Send on a channel or mailbox.
    Send,
    /// Receive on a channel or mailbox.
    Receive,
}

impl SchedulingPoint {
    /// Whether this point is a shared-state read or write.
    pub fn is_read_or_write(self) -> bool {
        matches!(self, Self::Read | Self::Write)
    }

    /// Whether this point is an explicit interleave or yield request.
    pub fn is_interleave_or_yield(self) -> bool {
        matches!(self, Self::Interleave | Self::Yield)
    }
}

impl fmt::Display for SchedulingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Interleave => write!(f, "interleave"),
            Self::Yield => write!(f, "yield"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Create => write!(f, "create"),
            Self::ContextSwitch => write!(f, "context_switch"),
            Self::Acquire => write!(f, "acquire"),
            Self::Release => write!(f, "release"),
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
