//! Device clock context shared by every event in a stream.

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds in a full pump day.
pub const TWENTY_FOUR_HOURS_MS: i64 = 24 * 60 * 60 * 1000;

const FIFTEEN_MINUTES_MS: i64 = 15 * 60 * 1000;

/// When an event happened, as the device reported it.
///
/// Upstream decoding resolves every event to a UTC instant and keeps the
/// device's own local reading alongside it; the engine never re-derives one
/// from the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClock {
    /// Resolved UTC instant.
    pub time: DateTime<Utc>,

    /// The device's local display clock. Absent on segments the engine
    /// fabricates, which do not correspond to any reported instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_time: Option<NaiveDateTime>,

    /// Minutes east of UTC in force at this event.
    pub timezone_offset: i32,

    /// Milliseconds of clock-drift correction applied upstream, 0 when the
    /// device clock was trusted as-is.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub conversion_offset: i64,
}

#[expect(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if takes a reference")]
const fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl DeviceClock {
    /// Clock context for an event at `time`, `timezone_offset` minutes east
    /// of UTC, with the device-local reading derived from the offset.
    pub fn new(time: DateTime<Utc>, timezone_offset: i32) -> Self {
        let device_time = (time + Duration::minutes(i64::from(timezone_offset))).naive_utc();
        Self {
            time,
            device_time: Some(device_time),
            timezone_offset,
            conversion_offset: 0,
        }
    }

    /// Marks this clock as drift-corrected by `conversion_offset` ms.
    pub fn with_conversion_offset(mut self, conversion_offset: i64) -> Self {
        self.conversion_offset = conversion_offset;
        self
    }

    /// Milliseconds past local midnight.
    ///
    /// A drift-corrected clock rarely lands exactly on a schedule boundary,
    /// so it is snapped to the nearest quarter hour before any schedule
    /// lookup (wrapping a full day back to 0).
    pub fn ms_from_midnight(&self) -> i64 {
        let local = (self.time + Duration::minutes(i64::from(self.timezone_offset))).time();
        let ms = i64::from(local.num_seconds_from_midnight()) * 1000
            + i64::from(local.nanosecond() / 1_000_000);
        if self.conversion_offset == 0 {
            return ms;
        }
        let rounded = (ms + FIFTEEN_MINUTES_MS / 2) / FIFTEEN_MINUTES_MS * FIFTEEN_MINUTES_MS;
        if rounded == TWENTY_FOUR_HOURS_MS { 0 } else { rounded }
    }
}

/// Builds a UTC instant back from epoch milliseconds, saturating at the
/// representable bound instead of wrapping.
pub(crate) fn utc_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
