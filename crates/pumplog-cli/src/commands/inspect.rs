//! Inspect command: summarize an exported log without replaying it.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::commands::replay;
use crate::rows::LogEvent;

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Exported device log to summarize.
    #[arg(long)]
    pub input: PathBuf,

    /// Emit the summary as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    device_id: String,
    events: usize,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
    by_kind: BTreeMap<&'static str, usize>,
}

pub fn run(args: &InspectArgs) -> Result<()> {
    let batches = replay::load_batches(&args.input)?;
    let summaries: Vec<DeviceSummary> = batches
        .iter()
        .filter_map(|(device_id, events)| summarize(device_id, events))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            println!(
                "{}: {} events, {} .. {}",
                summary.device_id, summary.events, summary.first, summary.last
            );
            for (kind, count) in &summary.by_kind {
                println!("  {kind}: {count}");
            }
        }
    }
    Ok(())
}

fn summarize(device_id: &str, events: &[LogEvent]) -> Option<DeviceSummary> {
    let first = events.first()?.time();
    let last = events.last()?.time();
    let mut by_kind = BTreeMap::new();
    for event in events {
        *by_kind.entry(event.kind()).or_insert(0) += 1;
    }
    Some(DeviceSummary {
        device_id: device_id.to_string(),
        events: events.len(),
        first,
        last,
        by_kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumplog_core::DeviceClock;

    #[test]
    fn summary_counts_by_kind_and_spans_times() {
        let clock = |minutes: i64| {
            DeviceClock::new(
                "2014-03-10T00:00:00Z"
                    .parse::<DateTime<Utc>>()
                    .expect("valid timestamp")
                    + chrono::Duration::minutes(minutes),
                0,
            )
        };
        let events = vec![
            LogEvent::Resume(clock(0)),
            LogEvent::Resume(clock(5)),
            LogEvent::LgsResume(clock(10)),
        ];

        let summary = summarize("pump-1", &events).expect("non-empty batch");
        assert_eq!(summary.events, 3);
        assert_eq!(summary.by_kind["resume"], 2);
        assert_eq!(summary.by_kind["lgs_resume"], 1);
        assert_eq!(summary.first, clock(0).time);
        assert_eq!(summary.last, clock(10).time);
    }
}
