//! Replay command: reconstruct per-device timelines from an exported log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use rayon::prelude::*;

use pumplog_core::{Event, Timeline, TimelineConfig};

use crate::Config;
use crate::rows::{LogEvent, LogRow};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Exported device log to replay.
    #[arg(long)]
    pub input: PathBuf,

    /// Write the reconstructed timelines here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pub pretty: bool,
}

pub fn run(args: &ReplayArgs, config: &Config) -> Result<()> {
    let batches = load_batches(&args.input)?;
    tracing::info!(devices = batches.len(), "replaying exported log");

    let engine_config = TimelineConfig {
        auto_schedule_after_settings: config.auto_schedule,
    };
    let timelines = replay_batches(batches, engine_config)?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&timelines)?
    } else {
        serde_json::to_string(&timelines)?
    };
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

/// Reads the log and groups rows into per-device batches, each sorted by
/// time. The sort is stable, so same-instant rows keep their file order.
pub(crate) fn load_batches(path: &Path) -> Result<BTreeMap<String, Vec<LogEvent>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut batches: BTreeMap<String, Vec<LogEvent>> = BTreeMap::new();
    for (index, result) in reader.deserialize::<LogRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {}", index + 1))?;
        let device_id = row.device_id.clone();
        let event = row
            .into_event()
            .with_context(|| format!("invalid row {}", index + 1))?;
        batches.entry(device_id).or_default().push(event);
    }
    for events in batches.values_mut() {
        events.sort_by_key(LogEvent::time);
    }
    Ok(batches)
}

/// Replays every batch through its own engine. Streams are independent by
/// contract, so devices run in parallel.
pub(crate) fn replay_batches(
    batches: BTreeMap<String, Vec<LogEvent>>,
    config: TimelineConfig,
) -> Result<BTreeMap<String, Vec<Event>>> {
    batches
        .into_par_iter()
        .map(|(device_id, events)| {
            let reconstructed = replay_one(events, config)
                .with_context(|| format!("failed to reconstruct device {device_id}"))?;
            Ok((device_id, reconstructed))
        })
        .collect()
}

fn replay_one(events: Vec<LogEvent>, config: TimelineConfig) -> Result<Vec<Event>> {
    let mut timeline = Timeline::with_config(config);
    for event in events {
        match event {
            LogEvent::Cbg(reading) => timeline.cbg(reading)?,
            LogEvent::Smbg(reading) => timeline.smbg(reading)?,
            LogEvent::BolusNormal(bolus) => timeline.bolus_normal(bolus)?,
            LogEvent::BolusSquare(bolus) => timeline.bolus_square(bolus)?,
            LogEvent::BolusDual(bolus) => timeline.bolus_dual(bolus)?,
            LogEvent::ScheduledBasal {
                clock,
                schedule_name,
                rate,
                duration,
            } => timeline.scheduled_basal(&clock, &schedule_name, rate, duration)?,
            LogEvent::TempBasal {
                clock,
                rate,
                percent,
                duration,
            } => timeline.temp_basal(&clock, rate, percent, duration)?,
            LogEvent::Suspend { clock, cause } => timeline.suspend(&clock, cause)?,
            LogEvent::Resume(clock) => timeline.resume(&clock)?,
            LogEvent::LgsResume(clock) => timeline.lgs_resume(&clock)?,
            LogEvent::LgsAutoResume(clock) => timeline.lgs_auto_resume(&clock)?,
            LogEvent::Settings(settings) => timeline.settings(settings)?,
        }
    }
    Ok(timeline.into_events())
}
