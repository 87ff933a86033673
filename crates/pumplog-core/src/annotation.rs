//! Annotation codes marking inferred or inconsistent delivery data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tag attached to basal segments the engine inferred or could not fully
/// reconcile, so downstream consumers can tell measured from inferred data.
///
/// Annotations are data, never control flow: an annotated segment is still a
/// perfectly valid part of the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Annotation {
    /// Synthesized from the active dosing schedule at a boundary crossing.
    FabricatedFromSchedule,
    /// Synthesized from the suppressed chain when delivery resumed.
    FabricatedFromSuppressed,
    /// No schedule was available to infer a duration from.
    UnknownDuration,
    /// The reported rate disagrees with the active schedule.
    OffScheduleRate,
}

impl Annotation {
    /// The stable wire code for this annotation.
    pub const fn code(self) -> &'static str {
        match self {
            Self::FabricatedFromSchedule => "basal/fabricated-from-schedule",
            Self::FabricatedFromSuppressed => "basal/fabricated-from-suppressed",
            Self::UnknownDuration => "basal/unknown-duration",
            Self::OffScheduleRate => "basal/off-schedule-rate",
        }
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Annotation {
    type Err = UnknownAnnotation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basal/fabricated-from-schedule" => Ok(Self::FabricatedFromSchedule),
            "basal/fabricated-from-suppressed" => Ok(Self::FabricatedFromSuppressed),
            "basal/unknown-duration" => Ok(Self::UnknownDuration),
            "basal/off-schedule-rate" => Ok(Self::OffScheduleRate),
            _ => Err(UnknownAnnotation(s.to_string())),
        }
    }
}

impl Serialize for Annotation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Annotation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown annotation codes.
#[derive(Debug, Clone)]
pub struct UnknownAnnotation(String);

impl fmt::Display for UnknownAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown annotation code: {}", self.0)
    }
}

impl std::error::Error for UnknownAnnotation {}
