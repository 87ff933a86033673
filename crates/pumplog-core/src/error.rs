//! Contract violations that abort a reconstruction.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Fatal errors raised while feeding a [`Timeline`](crate::Timeline).
///
/// Only true contract violations surface here. Inferable gaps — a missing
/// schedule, a rate the schedule does not know — stay on the data as
/// [`Annotation`](crate::Annotation)s and never stop processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// An event's time preceded the last one seen on this stream.
    #[error("events must be fed in time order: last saw {last}, got {got}")]
    TimeRegression {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },

    /// A chain layer completed before the active segment even started, which
    /// no sequence of device reports can legitimately produce.
    #[error("basal chain cannot be advanced to {target}: a layer completes at {completes}, before the active segment starts")]
    UnresolvableChain {
        target: DateTime<Utc>,
        completes: DateTime<Utc>,
    },
}
