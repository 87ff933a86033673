//! The reconstructed event stream: readings, boluses, statuses, segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::basal::BasalSegment;
use crate::clock::DeviceClock;
use crate::schedule::PumpSettings;

/// Measurement units for glucose values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseUnits {
    #[serde(rename = "mg/dL")]
    MgPerDl,
    #[serde(rename = "mmol/L")]
    MmolPerL,
}

/// A continuous-monitor (cbg) or fingerstick (smbg) glucose reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    #[serde(flatten)]
    pub clock: DeviceClock,
    pub value: f64,
    pub units: GlucoseUnits,
}

/// A discrete dose delivered all at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalBolus {
    #[serde(flatten)]
    pub clock: DeviceClock,
    /// Units delivered immediately.
    pub normal: f64,
}

/// A discrete dose spread evenly over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquareBolus {
    #[serde(flatten)]
    pub clock: DeviceClock,
    /// Units delivered over the window.
    pub extended: f64,
    /// Window length in milliseconds.
    pub duration: i64,
}

/// A discrete dose with an immediate part and an extended part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualBolus {
    #[serde(flatten)]
    pub clock: DeviceClock,
    pub normal: f64,
    pub extended: f64,
    pub duration: i64,
}

/// Any bolus, tagged by delivery shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sub_type", rename_all = "snake_case")]
pub enum Bolus {
    Normal(NormalBolus),
    Square(SquareBolus),
    Dual(DualBolus),
}

impl Bolus {
    pub fn clock(&self) -> &DeviceClock {
        match self {
            Self::Normal(bolus) => &bolus.clock,
            Self::Square(bolus) => &bolus.clock,
            Self::Dual(bolus) => &bolus.clock,
        }
    }
}

/// Why delivery stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendCause {
    Manual,
    LowGlucose,
}

/// Why delivery restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeCause {
    Manual,
    /// The user restarted delivery out of a low-glucose suspend.
    UserRestartBasal,
    /// The pump restarted delivery itself at the end of a low-glucose
    /// suspend.
    Automatic,
}

/// The device's delivery state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PumpStatus {
    Suspended { cause: SuspendCause },
    Resumed { cause: ResumeCause },
}

/// A suspend or resume notification. A resume references the suspend it
/// closes via `previous`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(flatten)]
    pub clock: DeviceClock,
    #[serde(flatten)]
    pub status: PumpStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Box<StatusEvent>>,
}

impl StatusEvent {
    /// Value snapshot with the back-link dropped.
    pub(crate) fn detached(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.previous = None;
        snapshot
    }
}

/// One reconstructed domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Cbg(GlucoseReading),
    Smbg(GlucoseReading),
    Bolus(Bolus),
    Basal(BasalSegment),
    Status(StatusEvent),
    Settings(PumpSettings),
}

impl Event {
    /// The UTC instant the event describes.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Cbg(reading) | Self::Smbg(reading) => reading.clock.time,
            Self::Bolus(bolus) => bolus.clock().time,
            Self::Basal(segment) => segment.clock.time,
            Self::Status(status) => status.clock.time,
            Self::Settings(settings) => settings.clock.time,
        }
    }
}

/// Append-only output sequence of a reconstruction run.
///
/// Produced once, readable repeatedly; a finite restartable sequence, not a
/// consume-once stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger(Vec<Event>);

impl Ledger {
    pub fn record(&mut self, event: Event) {
        self.0.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.0
    }

    pub fn into_events(self) -> Vec<Event> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The most recently recorded basal segment, for closing it off when a
    /// successor starts.
    pub(crate) fn last_basal_mut(&mut self) -> Option<&mut BasalSegment> {
        self.0.iter_mut().rev().find_map(|event| match event {
            Event::Basal(segment) => Some(segment),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> DeviceClock {
        DeviceClock::new(
            Utc.with_ymd_and_hms(2014, 3, 10, 8, 0, 0)
                .single()
                .expect("valid test timestamp"),
            -300,
        )
    }

    #[test]
    fn event_serialization_is_tagged() {
        let event = Event::Smbg(GlucoseReading {
            clock: clock(),
            value: 112.0,
            units: GlucoseUnits::MgPerDl,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "smbg");
        assert_eq!(json["units"], "mg/dL");
        assert_eq!(json["timezone_offset"], -300);

        let parsed: Event = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn bolus_serialization_keeps_subtype() {
        let event = Event::Bolus(Bolus::Dual(DualBolus {
            clock: clock(),
            normal: 1.5,
            extended: 2.5,
            duration: 1_800_000,
        }));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "bolus");
        assert_eq!(json["sub_type"], "dual");

        let parsed: Event = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn status_serialization_inlines_cause() {
        let suspended = StatusEvent {
            clock: clock(),
            status: PumpStatus::Suspended {
                cause: SuspendCause::LowGlucose,
            },
            previous: None,
        };
        let resumed = StatusEvent {
            clock: clock(),
            status: PumpStatus::Resumed {
                cause: ResumeCause::UserRestartBasal,
            },
            previous: Some(Box::new(suspended.clone())),
        };

        let json = serde_json::to_value(&resumed).unwrap();
        assert_eq!(json["status"], "resumed");
        assert_eq!(json["cause"], "user_restart_basal");
        assert_eq!(json["previous"]["status"], "suspended");
        assert_eq!(json["previous"]["cause"], "low_glucose");

        let parsed: StatusEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, resumed);
    }

    #[test]
    fn ledger_records_in_call_order_and_rereads() {
        let mut ledger = Ledger::default();
        assert!(ledger.is_empty());

        ledger.record(Event::Smbg(GlucoseReading {
            clock: clock(),
            value: 99.0,
            units: GlucoseUnits::MgPerDl,
        }));
        ledger.record(Event::Bolus(Bolus::Normal(NormalBolus {
            clock: clock(),
            normal: 2.0,
        })));

        assert_eq!(ledger.len(), 2);
        // Reading is repeatable, not consuming.
        assert_eq!(ledger.events().len(), ledger.events().len());
        assert!(matches!(ledger.events()[0], Event::Smbg(_)));
        assert!(matches!(ledger.events()[1], Event::Bolus(_)));
    }
}
