//! Basal delivery segments and the suppressed-chain bookkeeping.

use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::clock::DeviceClock;

/// What kind of delivery a segment describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    /// Governed by a named time-of-day rate schedule.
    Scheduled,
    /// A time-bounded override of the scheduled rate.
    Temp,
    /// All delivery stopped.
    Suspend,
}

/// One interval of basal insulin delivery.
///
/// A segment may temporarily override another (`suppressed`, an owned value
/// snapshot, itself possibly nested) and remembers the top-level segment it
/// followed (`previous`, stored with its own back-links stripped so chains
/// stay depth-bounded and acyclic).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasalSegment {
    #[serde(flatten)]
    pub clock: DeviceClock,

    pub delivery_type: DeliveryType,

    /// Absolute delivery rate in units/hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    /// Fraction of the underlying rate, for relative temp overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_name: Option<String>,

    /// Length in milliseconds; open until the next event resolves it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,

    /// The delivery this segment temporarily overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed: Option<Box<BasalSegment>>,

    /// The top-level segment this one followed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Box<BasalSegment>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl BasalSegment {
    pub(crate) fn scheduled(
        clock: DeviceClock,
        schedule_name: String,
        rate: f64,
        duration: Option<i64>,
    ) -> Self {
        Self {
            clock,
            delivery_type: DeliveryType::Scheduled,
            rate: Some(rate),
            percent: None,
            schedule_name: Some(schedule_name),
            duration,
            suppressed: None,
            previous: None,
            annotations: Vec::new(),
        }
    }

    pub(crate) fn temp(
        clock: DeviceClock,
        rate: Option<f64>,
        percent: Option<f64>,
        duration: i64,
    ) -> Self {
        Self {
            clock,
            delivery_type: DeliveryType::Temp,
            rate,
            percent,
            schedule_name: None,
            duration: Some(duration),
            suppressed: None,
            previous: None,
            annotations: Vec::new(),
        }
    }

    pub(crate) fn suspended(clock: DeviceClock) -> Self {
        Self {
            clock,
            delivery_type: DeliveryType::Suspend,
            rate: None,
            percent: None,
            schedule_name: None,
            duration: None,
            suppressed: None,
            previous: None,
            annotations: Vec::new(),
        }
    }

    /// Adds `annotation` unless already present.
    pub fn annotate(&mut self, annotation: Annotation) {
        if !self.annotations.contains(&annotation) {
            self.annotations.push(annotation);
        }
    }

    /// Whether this segment carries `annotation`.
    pub fn is_annotated(&self, annotation: Annotation) -> bool {
        self.annotations.contains(&annotation)
    }

    /// Value snapshot for `suppressed` links: own `previous` dropped, nested
    /// `suppressed` kept (the resolver still needs the layers beneath).
    pub(crate) fn detached(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.previous = None;
        snapshot
    }

    /// Value snapshot for `previous` links: both back-links dropped so the
    /// chain depth stays bounded.
    pub(crate) fn as_previous(&self) -> Self {
        let mut snapshot = self.clone();
        snapshot.previous = None;
        snapshot.suppressed = None;
        snapshot
    }

    /// Epoch milliseconds at which this segment runs out, if its duration is
    /// known. `None` also covers (absurd) durations that would overflow.
    pub(crate) fn completes_at_ms(&self) -> Option<i64> {
        self.clock.time.timestamp_millis().checked_add(self.duration?)
    }
}

/// Unwraps a suppressed chain into its layers, outermost first, each layer's
/// own `suppressed` stripped.
pub(crate) fn chain_parts(segment: &BasalSegment) -> Vec<BasalSegment> {
    let mut parts = Vec::new();
    let mut layer = Some(segment);
    while let Some(current) = layer {
        let mut part = current.clone();
        part.suppressed = None;
        parts.push(part);
        layer = current.suppressed.as_deref();
    }
    parts
}

/// Re-nests `parts` (outermost first) into a single chain. `None` when
/// `parts` is empty.
pub(crate) fn rebuild_chain(mut parts: Vec<BasalSegment>) -> Option<BasalSegment> {
    let mut chain = parts.pop()?;
    while let Some(mut outer) = parts.pop() {
        outer.suppressed = Some(Box::new(chain));
        chain = outer;
    }
    Some(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn clock() -> DeviceClock {
        DeviceClock::new(
            Utc.with_ymd_and_hms(2014, 3, 10, 0, 0, 0)
                .single()
                .expect("valid test timestamp"),
            0,
        )
    }

    fn nested_chain() -> BasalSegment {
        let scheduled = BasalSegment::scheduled(clock(), "standard".into(), 0.8, Some(3_600_000));
        let mut temp = BasalSegment::temp(clock(), Some(0.4), Some(0.5), 1_800_000);
        temp.suppressed = Some(Box::new(scheduled));
        let mut suspend = BasalSegment::suspended(clock());
        suspend.suppressed = Some(Box::new(temp));
        suspend
    }

    #[test]
    fn chain_parts_unwraps_outermost_first() {
        let parts = chain_parts(&nested_chain());
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].delivery_type, DeliveryType::Suspend);
        assert_eq!(parts[1].delivery_type, DeliveryType::Temp);
        assert_eq!(parts[2].delivery_type, DeliveryType::Scheduled);
        assert!(parts.iter().all(|part| part.suppressed.is_none()));
    }

    #[test]
    fn rebuild_chain_inverts_chain_parts() {
        let chain = nested_chain();
        let rebuilt = rebuild_chain(chain_parts(&chain)).expect("chain is non-empty");
        assert_eq!(rebuilt, chain);
    }

    #[test]
    fn rebuild_chain_of_nothing_is_none() {
        assert!(rebuild_chain(Vec::new()).is_none());
    }

    #[test]
    fn detached_keeps_suppressed_but_drops_previous() {
        let mut segment = nested_chain();
        segment.previous = Some(Box::new(BasalSegment::suspended(clock())));

        let snapshot = segment.detached();
        assert!(snapshot.previous.is_none());
        assert!(snapshot.suppressed.is_some());
    }

    #[test]
    fn as_previous_drops_both_links() {
        let mut segment = nested_chain();
        segment.previous = Some(Box::new(BasalSegment::suspended(clock())));

        let snapshot = segment.as_previous();
        assert!(snapshot.previous.is_none());
        assert!(snapshot.suppressed.is_none());
    }

    #[test]
    fn annotate_deduplicates() {
        let mut segment = BasalSegment::suspended(clock());
        segment.annotate(Annotation::UnknownDuration);
        segment.annotate(Annotation::UnknownDuration);
        assert_eq!(segment.annotations.len(), 1);
        assert!(segment.is_annotated(Annotation::UnknownDuration));
    }

    #[test]
    fn completion_requires_a_duration() {
        let mut segment = BasalSegment::suspended(clock());
        assert_eq!(segment.completes_at_ms(), None);

        segment.duration = Some(60_000);
        assert_eq!(
            segment.completes_at_ms(),
            Some(clock().time.timestamp_millis() + 60_000)
        );
    }

    #[test]
    fn segment_serialization_roundtrip() {
        let chain = nested_chain();
        let json = serde_json::to_string(&chain).unwrap();
        let parsed: BasalSegment = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, chain);
    }
}
