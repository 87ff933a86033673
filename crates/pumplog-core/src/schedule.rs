//! Named dosing schedules and the lookup fabrication draws from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{DeviceClock, TWENTY_FOUR_HOURS_MS};
use crate::event::GlucoseUnits;

/// One step of a dosing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Milliseconds past local midnight at which this rate takes over.
    pub start: i64,
    /// Delivery rate in units/hour.
    pub rate: f64,
}

/// What a schedule prescribes at a given clock position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleSlot {
    /// Delivery rate in units/hour.
    pub rate: f64,
    /// Milliseconds until the next entry starts, wrapping to 24h after the
    /// last entry.
    pub until_next: i64,
}

/// A configuration snapshot: the pump's named schedules and which one runs.
///
/// A settings event replaces the active snapshot wholesale; snapshots are
/// never edited in place. Entries are sorted ascending by `start` with an
/// implicit first entry at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpSettings {
    #[serde(flatten)]
    pub clock: DeviceClock,
    pub active_schedule: String,
    pub basal_schedules: BTreeMap<String, Vec<ScheduleEntry>>,
    pub units: GlucoseUnits,
}

impl PumpSettings {
    /// Rate and time-to-next-boundary for schedule `name` at `ms_in_day`.
    ///
    /// Scans for the last entry whose `start` is at or before `ms_in_day`.
    /// `None` means no usable schedule: the name is unknown, the schedule is
    /// empty, or its first entry starts later than `ms_in_day`.
    pub fn slot_at(&self, name: &str, ms_in_day: i64) -> Option<ScheduleSlot> {
        let entries = self.basal_schedules.get(name)?;
        let index = entries.iter().rposition(|entry| entry.start <= ms_in_day)?;
        let next_start = entries
            .get(index + 1)
            .map_or(TWENTY_FOUR_HOURS_MS, |entry| entry.start);
        Some(ScheduleSlot {
            rate: entries[index].rate,
            until_next: next_start - ms_in_day,
        })
    }

    /// [`slot_at`](Self::slot_at) for whichever schedule is active.
    pub fn active_slot_at(&self, ms_in_day: i64) -> Option<ScheduleSlot> {
        self.slot_at(&self.active_schedule, ms_in_day)
    }
}
