//! Typed rows of the exported-log CSV format.

use std::collections::BTreeMap;

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use pumplog_core::{
    DeviceClock, DualBolus, GlucoseReading, GlucoseUnits, NormalBolus, PumpSettings,
    ScheduleEntry, SquareBolus, SuspendCause,
};

/// One row of an exported device log. Type-specific columns are optional at
/// the CSV level and validated when converting to a [`LogEvent`].
#[derive(Debug, Deserialize)]
pub struct LogRow {
    pub device_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub time: DateTime<Utc>,
    pub device_time: NaiveDateTime,
    pub timezone_offset: i32,
    #[serde(default)]
    pub conversion_offset: Option<i64>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub schedule_name: Option<String>,
    #[serde(default)]
    pub normal: Option<f64>,
    #[serde(default)]
    pub extended: Option<f64>,
    #[serde(default)]
    pub cause: Option<String>,
    /// JSON blob for structured columns (settings snapshots).
    #[serde(default)]
    pub payload: Option<String>,
}

/// A parsed therapy event, ready to feed the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    Cbg(GlucoseReading),
    Smbg(GlucoseReading),
    BolusNormal(NormalBolus),
    BolusSquare(SquareBolus),
    BolusDual(DualBolus),
    ScheduledBasal {
        clock: DeviceClock,
        schedule_name: String,
        rate: f64,
        duration: Option<i64>,
    },
    TempBasal {
        clock: DeviceClock,
        rate: Option<f64>,
        percent: Option<f64>,
        duration: i64,
    },
    Suspend {
        clock: DeviceClock,
        cause: SuspendCause,
    },
    Resume(DeviceClock),
    LgsResume(DeviceClock),
    LgsAutoResume(DeviceClock),
    Settings(PumpSettings),
}

impl LogEvent {
    /// The UTC instant the event describes.
    pub fn time(&self) -> DateTime<Utc> {
        match self {
            Self::Cbg(reading) | Self::Smbg(reading) => reading.clock.time,
            Self::BolusNormal(bolus) => bolus.clock.time,
            Self::BolusSquare(bolus) => bolus.clock.time,
            Self::BolusDual(bolus) => bolus.clock.time,
            Self::ScheduledBasal { clock, .. }
            | Self::TempBasal { clock, .. }
            | Self::Suspend { clock, .. }
            | Self::Resume(clock)
            | Self::LgsResume(clock)
            | Self::LgsAutoResume(clock) => clock.time,
            Self::Settings(settings) => settings.clock.time,
        }
    }

    /// The row `type` this event was parsed from.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cbg(_) => "cbg",
            Self::Smbg(_) => "smbg",
            Self::BolusNormal(_) => "bolus_normal",
            Self::BolusSquare(_) => "bolus_square",
            Self::BolusDual(_) => "bolus_dual",
            Self::ScheduledBasal { .. } => "scheduled_basal",
            Self::TempBasal { .. } => "temp_basal",
            Self::Suspend { .. } => "suspend",
            Self::Resume(_) => "resume",
            Self::LgsResume(_) => "lgs_resume",
            Self::LgsAutoResume(_) => "lgs_auto_resume",
            Self::Settings(_) => "settings",
        }
    }
}

/// The JSON shape of a settings row's `payload` column.
#[derive(Debug, Deserialize)]
struct SettingsPayload {
    active_schedule: String,
    basal_schedules: BTreeMap<String, Vec<ScheduleEntry>>,
    units: GlucoseUnits,
}

impl LogRow {
    /// The clock context shared by every row.
    pub fn clock(&self) -> DeviceClock {
        DeviceClock {
            time: self.time,
            device_time: Some(self.device_time),
            timezone_offset: self.timezone_offset,
            conversion_offset: self.conversion_offset.unwrap_or(0),
        }
    }

    /// Validates and converts this row into a typed event.
    pub fn into_event(self) -> Result<LogEvent> {
        let clock = self.clock();
        let event = match self.kind.as_str() {
            "cbg" => LogEvent::Cbg(self.reading(clock)?),
            "smbg" => LogEvent::Smbg(self.reading(clock)?),
            "bolus_normal" => LogEvent::BolusNormal(NormalBolus {
                clock,
                normal: require(self.normal, "normal", "bolus_normal")?,
            }),
            "bolus_square" => LogEvent::BolusSquare(SquareBolus {
                clock,
                extended: require(self.extended, "extended", "bolus_square")?,
                duration: require(self.duration, "duration", "bolus_square")?,
            }),
            "bolus_dual" => LogEvent::BolusDual(DualBolus {
                clock,
                normal: require(self.normal, "normal", "bolus_dual")?,
                extended: require(self.extended, "extended", "bolus_dual")?,
                duration: require(self.duration, "duration", "bolus_dual")?,
            }),
            "scheduled_basal" => LogEvent::ScheduledBasal {
                clock,
                schedule_name: require(self.schedule_name, "schedule_name", "scheduled_basal")?,
                rate: require(self.rate, "rate", "scheduled_basal")?,
                duration: self.duration,
            },
            "temp_basal" => LogEvent::TempBasal {
                clock,
                rate: self.rate,
                percent: self.percent,
                duration: require(self.duration, "duration", "temp_basal")?,
            },
            "suspend" => LogEvent::Suspend {
                cause: parse_cause(&require(self.cause, "cause", "suspend")?)?,
                clock,
            },
            "resume" => LogEvent::Resume(clock),
            "lgs_resume" => LogEvent::LgsResume(clock),
            "lgs_auto_resume" => LogEvent::LgsAutoResume(clock),
            "settings" => {
                let payload = require(self.payload, "payload", "settings")?;
                let parsed: SettingsPayload = serde_json::from_str(&payload)?;
                LogEvent::Settings(PumpSettings {
                    clock,
                    active_schedule: parsed.active_schedule,
                    basal_schedules: parsed.basal_schedules,
                    units: parsed.units,
                })
            }
            other => bail!("unknown event type `{other}`"),
        };
        Ok(event)
    }

    fn reading(&self, clock: DeviceClock) -> Result<GlucoseReading> {
        Ok(GlucoseReading {
            clock,
            value: require(self.value, "value", &self.kind)?,
            units: parse_units(&require(self.units.clone(), "units", &self.kind)?)?,
        })
    }
}

fn require<T>(value: Option<T>, field: &str, kind: &str) -> Result<T> {
    value.ok_or_else(|| anyhow::anyhow!("`{kind}` row is missing `{field}`"))
}

fn parse_units(units: &str) -> Result<GlucoseUnits> {
    match units {
        "mg/dL" => Ok(GlucoseUnits::MgPerDl),
        "mmol/L" => Ok(GlucoseUnits::MmolPerL),
        other => bail!("unknown glucose units `{other}`"),
    }
}

fn parse_cause(cause: &str) -> Result<SuspendCause> {
    match cause {
        "manual" => Ok(SuspendCause::Manual),
        "low_glucose" => Ok(SuspendCause::LowGlucose),
        other => bail!("unknown suspend cause `{other}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_row(kind: &str) -> LogRow {
        LogRow {
            device_id: "pump-1".to_string(),
            kind: kind.to_string(),
            time: "2014-03-10T00:30:00Z".parse().expect("valid timestamp"),
            device_time: "2014-03-10T00:30:00".parse().expect("valid device time"),
            timezone_offset: 0,
            conversion_offset: None,
            value: None,
            units: None,
            rate: None,
            percent: None,
            duration: None,
            schedule_name: None,
            normal: None,
            extended: None,
            cause: None,
            payload: None,
        }
    }

    #[test]
    fn scheduled_basal_row_converts() {
        let mut row = base_row("scheduled_basal");
        row.schedule_name = Some("standard".to_string());
        row.rate = Some(0.8);

        let event = row.into_event().unwrap();
        assert_eq!(event.kind(), "scheduled_basal");
        let LogEvent::ScheduledBasal { rate, duration, .. } = event else {
            panic!("expected a scheduled basal event");
        };
        assert!((rate - 0.8).abs() < f64::EPSILON);
        assert_eq!(duration, None);
    }

    #[test]
    fn suspend_row_requires_a_known_cause() {
        let mut row = base_row("suspend");
        row.cause = Some("low_glucose".to_string());
        assert!(matches!(
            row.into_event().unwrap(),
            LogEvent::Suspend {
                cause: SuspendCause::LowGlucose,
                ..
            }
        ));

        let mut row = base_row("suspend");
        row.cause = Some("gremlins".to_string());
        let err = row.into_event().unwrap_err();
        assert!(err.to_string().contains("unknown suspend cause"));
    }

    #[test]
    fn missing_required_column_names_the_field() {
        let row = base_row("bolus_normal");
        let err = row.into_event().unwrap_err();
        assert_eq!(err.to_string(), "`bolus_normal` row is missing `normal`");
    }

    #[test]
    fn settings_row_parses_its_json_payload() {
        let mut row = base_row("settings");
        row.payload = Some(
            r#"{"active_schedule":"standard","basal_schedules":{"standard":[{"start":0,"rate":0.8}]},"units":"mg/dL"}"#
                .to_string(),
        );

        let LogEvent::Settings(settings) = row.into_event().unwrap() else {
            panic!("expected a settings event");
        };
        assert_eq!(settings.active_schedule, "standard");
        assert_eq!(settings.basal_schedules["standard"].len(), 1);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = base_row("wizardry").into_event().unwrap_err();
        assert!(err.to_string().contains("unknown event type"));
    }

    #[test]
    fn rows_parse_from_csv_with_empty_optionals() {
        let data = "device_id,type,time,device_time,timezone_offset,conversion_offset,value,units,rate,percent,duration,schedule_name,normal,extended,cause,payload\n\
                    pump-1,cbg,2014-03-10T00:05:00Z,2014-03-10T00:05:00,0,,132.0,mg/dL,,,,,,,,\n";
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(data.as_bytes());

        let rows: Vec<LogRow> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("row should parse");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].conversion_offset, None);

        let event = rows.into_iter().next().unwrap().into_event().unwrap();
        assert_eq!(event.kind(), "cbg");
    }
}
