//! The reconstruction engine: replays device-reported therapy events into a
//! gap-free sequence of delivery intervals.
//!
//! # Algorithm summary
//!
//! 1. Every handler checks time ordering, then pushes the basal clock forward
//!    to the event's instant, retiring chain layers that complete on the way
//!    and fabricating their replacements from the active schedule.
//! 2. The handler applies its own effect: a new top-level segment, a
//!    suspend/resume status pair, or a fresh settings snapshot.
//! 3. [`Timeline::into_events`] yields the accumulated ledger.

use chrono::{DateTime, Utc};

use crate::annotation::Annotation;
use crate::basal::{BasalSegment, DeliveryType, chain_parts, rebuild_chain};
use crate::clock::{DeviceClock, utc_from_ms};
use crate::error::TimelineError;
use crate::event::{
    Bolus, DualBolus, Event, GlucoseReading, Ledger, NormalBolus, PumpStatus, ResumeCause,
    SquareBolus, StatusEvent, SuspendCause,
};
use crate::schedule::PumpSettings;

/// Engine knobs that vary by pump family.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineConfig {
    /// Fabricate the first scheduled segment right after a settings snapshot
    /// when no basal is active. Some pumps never report that segment
    /// themselves.
    pub auto_schedule_after_settings: bool,
}

/// Reconstructs one device stream's delivery timeline.
///
/// Feed events in non-decreasing time order through the handler methods,
/// then read the result with [`events`](Self::events) or
/// [`into_events`](Self::into_events). One instance per stream; the engine
/// is synchronous, performs no I/O, and must not be driven by more than one
/// feeder at a time.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    config: TimelineConfig,
    ledger: Ledger,
    settings: Option<PumpSettings>,
    basal: Option<BasalSegment>,
    status: Option<StatusEvent>,
    /// A `user_restart_basal` resume already restored delivery; the trailing
    /// plain resume such pumps send next must be swallowed.
    lgs_resume_pending: bool,
    last_time: Option<DateTime<Utc>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TimelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The reconstructed events so far, in ledger order.
    pub fn events(&self) -> &[Event] {
        self.ledger.events()
    }

    /// Consumes the engine, yielding the reconstructed events.
    pub fn into_events(self) -> Vec<Event> {
        self.ledger.into_events()
    }

    /// The segment currently governing delivery, if any.
    pub fn current_basal(&self) -> Option<&BasalSegment> {
        self.basal.as_ref()
    }

    /// Records a continuous-monitor glucose reading.
    pub fn cbg(&mut self, reading: GlucoseReading) -> Result<(), TimelineError> {
        self.ensure_order(reading.clock.time)?;
        self.ledger.record(Event::Cbg(reading));
        Ok(())
    }

    /// Records a fingerstick glucose reading.
    pub fn smbg(&mut self, reading: GlucoseReading) -> Result<(), TimelineError> {
        self.ensure_order(reading.clock.time)?;
        self.ledger.record(Event::Smbg(reading));
        Ok(())
    }

    /// Records an immediate bolus.
    pub fn bolus_normal(&mut self, bolus: NormalBolus) -> Result<(), TimelineError> {
        self.ensure_order(bolus.clock.time)?;
        self.ledger.record(Event::Bolus(Bolus::Normal(bolus)));
        Ok(())
    }

    /// Records an extended bolus.
    pub fn bolus_square(&mut self, bolus: SquareBolus) -> Result<(), TimelineError> {
        self.ensure_order(bolus.clock.time)?;
        self.ledger.record(Event::Bolus(Bolus::Square(bolus)));
        Ok(())
    }

    /// Records a combination bolus.
    pub fn bolus_dual(&mut self, bolus: DualBolus) -> Result<(), TimelineError> {
        self.ensure_order(bolus.clock.time)?;
        self.ledger.record(Event::Bolus(Bolus::Dual(bolus)));
        Ok(())
    }

    /// Reports a basal segment governed by a named schedule.
    ///
    /// An explicitly reported `duration` is trusted verbatim. A missing one
    /// is inferred from the named schedule's next boundary; with no usable
    /// schedule it becomes 0 and the segment is annotated accordingly. A
    /// rate the schedule does not prescribe at this clock position is
    /// annotated `off-schedule-rate` but otherwise taken at its word.
    #[expect(
        clippy::float_cmp,
        reason = "rates are compared exactly as the device reports them"
    )]
    pub fn scheduled_basal(
        &mut self,
        clock: &DeviceClock,
        schedule_name: &str,
        rate: f64,
        duration: Option<i64>,
    ) -> Result<(), TimelineError> {
        self.ensure_order(clock.time)?;
        self.push_clock_forward(clock.time)?;

        let mut segment =
            BasalSegment::scheduled(clock.clone(), schedule_name.to_owned(), rate, duration);
        let slot = self
            .settings
            .as_ref()
            .and_then(|settings| settings.slot_at(schedule_name, clock.ms_from_midnight()));
        match slot {
            None => {
                if segment.duration.is_none() {
                    segment.duration = Some(0);
                    segment.annotate(Annotation::UnknownDuration);
                }
            }
            Some(slot) if slot.rate == rate => {
                if segment.duration.is_none() {
                    segment.duration = Some(slot.until_next);
                }
            }
            Some(slot) => {
                tracing::warn!(
                    schedule = schedule_name,
                    reported = rate,
                    scheduled = slot.rate,
                    "reported rate disagrees with the schedule"
                );
                if segment.duration.is_none() {
                    segment.duration = Some(0);
                }
                segment.annotate(Annotation::OffScheduleRate);
            }
        }

        if let Some(current) = &self.basal {
            segment.previous = Some(Box::new(current.as_previous()));
        }
        self.begin_segment(segment);
        Ok(())
    }

    /// Reports a time-bounded override of the scheduled rate, absolute
    /// (`rate`) or relative (`percent` of whatever it suppresses).
    pub fn temp_basal(
        &mut self,
        clock: &DeviceClock,
        rate: Option<f64>,
        percent: Option<f64>,
        duration: i64,
    ) -> Result<(), TimelineError> {
        self.ensure_order(clock.time)?;
        self.push_clock_forward(clock.time)?;

        let mut segment = BasalSegment::temp(clock.clone(), rate, percent, duration);
        if let Some(current) = &self.basal {
            if let (Some(percent), Some(underlying)) = (percent, current.rate) {
                segment.rate = Some(percent * underlying);
            }
            segment.suppressed = Some(Box::new(current.detached()));
            segment.previous = Some(Box::new(current.as_previous()));
        }
        self.begin_segment(segment);
        Ok(())
    }

    /// Stops all delivery until a resume is seen.
    pub fn suspend(
        &mut self,
        clock: &DeviceClock,
        cause: SuspendCause,
    ) -> Result<(), TimelineError> {
        self.ensure_order(clock.time)?;
        // Threshold suspends arrive in clusters of repeated notifications;
        // only the first one changes anything.
        if cause == SuspendCause::LowGlucose && self.suspended_for_low_glucose() {
            tracing::debug!(at = %clock.time, "repeated low-glucose suspend ignored");
            return Ok(());
        }
        self.push_clock_forward(clock.time)?;

        let status = StatusEvent {
            clock: clock.clone(),
            status: PumpStatus::Suspended { cause },
            previous: None,
        };
        self.status = Some(status.clone());
        self.ledger.record(Event::Status(status));

        let mut segment = BasalSegment::suspended(clock.clone());
        if let Some(current) = &self.basal {
            segment.suppressed = Some(Box::new(current.detached()));
            segment.previous = Some(Box::new(current.as_previous()));
        }
        self.begin_segment(segment);
        Ok(())
    }

    /// Restarts delivery after a manual suspend, restoring whatever the
    /// suspend displaced.
    pub fn resume(&mut self, clock: &DeviceClock) -> Result<(), TimelineError> {
        // An LGS restart is reported twice: `user_restart_basal`, then a
        // plain resume. The first already did the work.
        if self.lgs_resume_pending {
            self.lgs_resume_pending = false;
            tracing::debug!(at = %clock.time, "trailing resume after user_restart_basal swallowed");
            return Ok(());
        }
        self.ensure_order(clock.time)?;
        if self.finish_suspend(clock, ResumeCause::Manual)? {
            self.restore_suppressed(clock);
        }
        Ok(())
    }

    /// Restarts delivery out of a low-glucose suspend at the user's request
    /// (`user_restart_basal`).
    ///
    /// The device does not always follow up with an explicit next scheduled
    /// segment, so the suppressed chain is restored exactly as for a manual
    /// resume, and the trailing plain resume notification is armed to be
    /// swallowed.
    pub fn lgs_resume(&mut self, clock: &DeviceClock) -> Result<(), TimelineError> {
        self.ensure_order(clock.time)?;
        if self.finish_suspend(clock, ResumeCause::UserRestartBasal)? {
            self.lgs_resume_pending = true;
            self.restore_suppressed(clock);
        }
        Ok(())
    }

    /// Automatic restart at the end of a low-glucose suspend.
    ///
    /// Never picks a still-running temp back up: delivery falls back to the
    /// programmed schedule. Documented device policy, not an oversight; do
    /// not "fix" this to match the manual variants.
    pub fn lgs_auto_resume(&mut self, clock: &DeviceClock) -> Result<(), TimelineError> {
        self.ensure_order(clock.time)?;
        if !self.finish_suspend(clock, ResumeCause::Automatic)? {
            return Ok(());
        }
        let Some(mut next) = self.fabricate_from_schedule(clock) else {
            tracing::debug!(at = %clock.time, "no usable schedule to fall back to after automatic resume");
            return Ok(());
        };
        if let Some(current) = &self.basal {
            next.previous = Some(Box::new(current.as_previous()));
        }
        self.begin_segment(next);
        Ok(())
    }

    /// Installs a new configuration snapshot.
    ///
    /// Already-emitted history is untouched; fabrication from here on reads
    /// this snapshot, even for segments conceptually begun under the old
    /// one.
    pub fn settings(&mut self, settings: PumpSettings) -> Result<(), TimelineError> {
        self.ensure_order(settings.clock.time)?;
        self.push_clock_forward(settings.clock.time)?;

        let clock = settings.clock.clone();
        self.ledger.record(Event::Settings(settings.clone()));
        self.settings = Some(settings);

        if self.basal.is_none() && self.config.auto_schedule_after_settings {
            if let Some(segment) = self.fabricate_from_schedule(&clock) {
                self.begin_segment(segment);
            }
        }
        Ok(())
    }

    fn ensure_order(&mut self, time: DateTime<Utc>) -> Result<(), TimelineError> {
        if let Some(last) = self.last_time {
            if time < last {
                return Err(TimelineError::TimeRegression { last, got: time });
            }
        }
        self.last_time = Some(time);
        Ok(())
    }

    fn suspended_for_low_glucose(&self) -> bool {
        matches!(
            &self.status,
            Some(StatusEvent {
                status: PumpStatus::Suspended {
                    cause: SuspendCause::LowGlucose,
                },
                ..
            })
        )
    }

    /// Installs `segment` as the current top-level delivery and records it,
    /// closing the previous ledger entry at the new segment's start so the
    /// top-level sequence stays free of overlaps.
    fn begin_segment(&mut self, segment: BasalSegment) {
        self.close_open_basal(segment.clock.time);
        self.basal = Some(segment.clone());
        self.ledger.record(Event::Basal(segment));
    }

    /// Trims the most recently recorded segment so it ends where the next
    /// one starts. Durations only ever shrink here; a segment that genuinely
    /// ended earlier keeps its end — the silence in between was real.
    fn close_open_basal(&mut self, at: DateTime<Utc>) {
        let at_ms = at.timestamp_millis();
        if let Some(last) = self.ledger.last_basal_mut() {
            let elapsed = at_ms - last.clock.time.timestamp_millis();
            if last.duration.is_none_or(|duration| duration > elapsed) {
                last.duration = Some(elapsed);
            }
        }
    }

    /// Closes an open suspend at `clock`: fixes its duration to the elapsed
    /// time, advances the chain through any boundaries crossed while
    /// delivery was stopped, and emits the paired resumed status. Returns
    /// false when no suspend is active.
    fn finish_suspend(
        &mut self,
        clock: &DeviceClock,
        cause: ResumeCause,
    ) -> Result<bool, TimelineError> {
        {
            let Some(current) = self.basal.as_mut() else {
                return Ok(false);
            };
            if current.delivery_type != DeliveryType::Suspend {
                return Ok(false);
            }
            let elapsed =
                clock.time.timestamp_millis() - current.clock.time.timestamp_millis();
            current.duration = Some(elapsed);
        }
        self.push_clock_forward(clock.time)?;

        let status = StatusEvent {
            clock: clock.clone(),
            status: PumpStatus::Resumed { cause },
            previous: self.status.as_ref().map(|status| Box::new(status.detached())),
        };
        self.status = Some(status.clone());
        self.ledger.record(Event::Status(status));
        Ok(true)
    }

    /// Brings the segment the suspend displaced back as a fresh top-level
    /// segment, shortened by the time delivery was stopped.
    fn restore_suppressed(&mut self, clock: &DeviceClock) {
        let Some(current) = &self.basal else {
            return;
        };
        let Some(suppressed) = &current.suppressed else {
            tracing::debug!(at = %clock.time, "resume with nothing suppressed; no basal restored");
            return;
        };

        let stopped_for =
            clock.time.timestamp_millis() - current.clock.time.timestamp_millis();
        let mut next = (**suppressed).clone();
        next.annotate(Annotation::FabricatedFromSuppressed);
        if let Some(duration) = next.duration {
            next.duration = Some(duration - stopped_for);
        }
        next.clock = DeviceClock {
            time: clock.time,
            device_time: None,
            timezone_offset: clock.timezone_offset,
            conversion_offset: clock.conversion_offset,
        };
        next.previous = Some(Box::new(current.as_previous()));
        self.begin_segment(next);
    }

    /// Fabricates the segment the active schedule prescribes at `clock`.
    fn fabricate_from_schedule(&self, clock: &DeviceClock) -> Option<BasalSegment> {
        let settings = self.settings.as_ref()?;
        let slot = settings.active_slot_at(clock.ms_from_midnight())?;
        let mut segment = BasalSegment::scheduled(
            DeviceClock {
                time: clock.time,
                device_time: None,
                timezone_offset: clock.timezone_offset,
                conversion_offset: clock.conversion_offset,
            },
            settings.active_schedule.clone(),
            slot.rate,
            Some(slot.until_next),
        );
        segment.annotate(Annotation::FabricatedFromSchedule);
        Some(segment)
    }

    /// Advances the delivery model so every active chain layer spans
    /// `target`, fabricating and recording whatever completes on the way.
    ///
    /// Runs to a fixed point, which lets a single call fast-forward through
    /// hours of silence crossing several schedule boundaries.
    fn push_clock_forward(&mut self, target: DateTime<Utc>) -> Result<(), TimelineError> {
        while self.advance_chain_once(target.timestamp_millis())? {}
        Ok(())
    }

    /// One resolver step: retire (or replace) the soonest-completing chain
    /// layer if it runs out strictly before `target_ms`. Returns whether a
    /// step was taken.
    fn advance_chain_once(&mut self, target_ms: i64) -> Result<bool, TimelineError> {
        let Some(current) = &self.basal else {
            return Ok(false);
        };
        let mut parts = chain_parts(current);

        // The layer finishing soonest decides whether anything happens. A
        // layer with an open duration never finishes; an open top layer (a
        // running suspend) freezes the clock entirely.
        let Some(mut done_ms) = parts[0].completes_at_ms() else {
            return Ok(false);
        };
        let mut done_index = 0;
        for (index, part) in parts.iter().enumerate().skip(1) {
            if let Some(completes) = part.completes_at_ms() {
                if completes < done_ms {
                    done_index = index;
                    done_ms = completes;
                }
            }
        }
        if done_ms >= target_ms {
            return Ok(false);
        }

        match parts[done_index].delivery_type {
            // Exhausted overrides simply fall away, exposing what they hid.
            DeliveryType::Temp | DeliveryType::Suspend => {
                parts.remove(done_index);
            }
            // An exhausted scheduled layer rolls over into the next slot of
            // whatever schedule is active *now*.
            DeliveryType::Scheduled => {
                let rollover_clock = DeviceClock {
                    time: utc_from_ms(done_ms),
                    device_time: None,
                    timezone_offset: parts[done_index].clock.timezone_offset,
                    conversion_offset: parts[done_index].clock.conversion_offset,
                };
                match self.fabricate_from_schedule(&rollover_clock) {
                    Some(replacement) => parts[done_index] = replacement,
                    None => {
                        parts.remove(done_index);
                    }
                }
            }
        }

        let Some(top) = parts.first_mut() else {
            // Everything ran out with nothing to fabricate from.
            self.basal = None;
            return Ok(false);
        };

        let top_start_ms = top.clock.time.timestamp_millis();
        if done_ms < top_start_ms {
            return Err(TimelineError::UnresolvableChain {
                target: utc_from_ms(target_ms),
                completes: utc_from_ms(done_ms),
            });
        }
        if let Some(duration) = top.duration {
            top.duration = Some(duration - (done_ms - top_start_ms));
        }
        top.clock.time = utc_from_ms(done_ms);
        top.clock.device_time = None;

        // A percent temp tracks whatever now sits beneath it.
        for index in (0..parts.len().saturating_sub(1)).rev() {
            if parts[index].delivery_type == DeliveryType::Temp {
                if let (Some(percent), Some(underlying)) =
                    (parts[index].percent, parts[index + 1].rate)
                {
                    parts[index].rate = Some(percent * underlying);
                }
            }
        }

        let Some(mut rebuilt) = rebuild_chain(parts) else {
            self.basal = None;
            return Ok(false);
        };
        rebuilt.previous = self.basal.as_ref().map(|current| Box::new(current.as_previous()));
        tracing::debug!(
            at = %rebuilt.clock.time,
            delivery = ?rebuilt.delivery_type,
            "advanced basal chain across a completed layer"
        );
        self.begin_segment(rebuilt);
        Ok(true)
    }
}
