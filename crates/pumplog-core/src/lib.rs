//! Core reconstruction logic for pump therapy timelines.
//!
//! Insulin pumps report delivery sparsely: a scheduled segment here, a temp
//! override there, suspend and resume notifications with nothing in between.
//! This crate turns that stream into an unambiguous sequence of
//! non-overlapping, contiguous delivery intervals:
//! - [`Timeline`]: the per-stream engine, fed one event at a time
//! - [`PumpSettings`]: named dosing schedules and the boundary lookup
//! - [`Ledger`]: the append-only reconstructed output
//!
//! Segments the engine synthesizes (schedule rollovers, resume restorations)
//! are tagged with [`Annotation`]s so consumers can tell measured from
//! inferred data.

pub mod annotation;
pub mod basal;
pub mod clock;
mod error;
pub mod event;
pub mod schedule;
pub mod timeline;

pub use annotation::Annotation;
pub use basal::{BasalSegment, DeliveryType};
pub use clock::DeviceClock;
pub use error::TimelineError;
pub use event::{
    Bolus, DualBolus, Event, GlucoseReading, GlucoseUnits, Ledger, NormalBolus, PumpStatus,
    ResumeCause, SquareBolus, StatusEvent, SuspendCause,
};
pub use schedule::{PumpSettings, ScheduleEntry, ScheduleSlot};
pub use timeline::{Timeline, TimelineConfig};
