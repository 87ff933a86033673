//! End-to-end tests for the exported-log replay flow.
//!
//! Runs the built binary against a real CSV on disk and checks the
//! reconstructed JSON that comes back.

use std::process::Command;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

fn pumplog_binary() -> String {
    env!("CARGO_BIN_EXE_pumplog").to_string()
}

const HEADER: &str = "device_id,type,time,device_time,timezone_offset,conversion_offset,value,units,rate,percent,duration,schedule_name,normal,extended,cause,payload";

/// Two devices: pump-1 exercises the basal machinery (settings, scheduled,
/// temp, suspend/resume), pump-2 only simple events.
fn sample_log() -> String {
    let settings_payload = r#""{""active_schedule"":""standard"",""basal_schedules"":{""standard"":[{""start"":0,""rate"":1.0},{""start"":3600000,""rate"":2.0}]},""units"":""mg/dL""}""#;
    format!(
        "{HEADER}\n\
         pump-1,settings,2014-03-10T00:00:00Z,2014-03-10T00:00:00,0,,,,,,,,,,,{settings_payload}\n\
         pump-1,scheduled_basal,2014-03-10T00:00:00Z,2014-03-10T00:00:00,0,,,,1.0,,,standard,,,,\n\
         pump-1,temp_basal,2014-03-10T00:30:00Z,2014-03-10T00:30:00,0,,,,,0.5,3600000,,,,,\n\
         pump-1,suspend,2014-03-10T00:40:00Z,2014-03-10T00:40:00,0,,,,,,,,,,manual,\n\
         pump-1,resume,2014-03-10T00:50:00Z,2014-03-10T00:50:00,0,,,,,,,,,,,\n\
         pump-1,scheduled_basal,2014-03-10T01:00:00Z,2014-03-10T01:00:00,0,,,,2.0,,,standard,,,,\n\
         pump-2,cbg,2014-03-10T00:05:00Z,2014-03-10T00:05:00,0,,132.0,mg/dL,,,,,,,,\n\
         pump-2,bolus_normal,2014-03-10T00:10:00Z,2014-03-10T00:10:00,0,,,,,,,,2.5,,,\n"
    )
}

fn write_log(temp: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = temp.path().join("export.csv");
    std::fs::write(&path, contents).expect("failed to write test log");
    path
}

#[test]
fn replay_reconstructs_each_device_independently() {
    let temp = TempDir::new().unwrap();
    let log = write_log(&temp, &sample_log());

    let output = Command::new(pumplog_binary())
        .arg("replay")
        .arg("--input")
        .arg(&log)
        .output()
        .expect("failed to run pumplog replay");
    assert!(
        output.status.success(),
        "replay should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let timelines: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let devices: Vec<&String> = timelines.as_object().unwrap().keys().collect();
    assert_eq!(devices, ["pump-1", "pump-2"]);

    // pump-2 saw only a reading and a bolus.
    let pump2 = timelines["pump-2"].as_array().unwrap();
    assert_eq!(pump2.len(), 2);
    assert_eq!(pump2[0]["type"], "cbg");
    assert_eq!(pump2[1]["type"], "bolus");
    assert_eq!(pump2[1]["sub_type"], "normal");
}

#[test]
fn replayed_basal_segments_are_contiguous() {
    let temp = TempDir::new().unwrap();
    let log = write_log(&temp, &sample_log());

    let output = Command::new(pumplog_binary())
        .arg("replay")
        .arg("--input")
        .arg(&log)
        .output()
        .unwrap();
    assert!(output.status.success());

    let timelines: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let basals: Vec<&serde_json::Value> = timelines["pump-1"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|event| event["type"] == "basal")
        .collect();

    // scheduled, temp, suspend, restored temp, scheduled.
    assert_eq!(basals.len(), 5);
    assert_eq!(basals[2]["delivery_type"], "suspend");
    assert!(
        basals[3]["annotations"]
            .as_array()
            .unwrap()
            .iter()
            .any(|code| code == "basal/fabricated-from-suppressed"),
        "restored segment should be marked as inferred"
    );

    for pair in basals.windows(2) {
        let start: DateTime<Utc> = pair[0]["time"].as_str().unwrap().parse().unwrap();
        let duration = pair[0]["duration"].as_i64().expect("closed segment");
        let next: DateTime<Utc> = pair[1]["time"].as_str().unwrap().parse().unwrap();
        assert_eq!(
            start.timestamp_millis() + duration,
            next.timestamp_millis(),
            "gap or overlap between {pair:?}"
        );
    }
}

#[test]
fn replay_writes_pretty_output_to_a_file() {
    let temp = TempDir::new().unwrap();
    let log = write_log(&temp, &sample_log());
    let out = temp.path().join("timelines.json");

    let output = Command::new(pumplog_binary())
        .arg("replay")
        .arg("--input")
        .arg(&log)
        .arg("--output")
        .arg(&out)
        .arg("--pretty")
        .output()
        .unwrap();
    assert!(output.status.success());

    let contents = std::fs::read_to_string(&out).unwrap();
    assert!(contents.contains('\n'), "pretty output should be multiline");
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert!(parsed.get("pump-1").is_some());
}

#[test]
fn malformed_rows_fail_with_line_context() {
    let temp = TempDir::new().unwrap();
    let log = write_log(
        &temp,
        &format!(
            "{HEADER}\n\
             pump-1,wizardry,2014-03-10T00:00:00Z,2014-03-10T00:00:00,0,,,,,,,,,,,\n"
        ),
    );

    let output = Command::new(pumplog_binary())
        .arg("replay")
        .arg("--input")
        .arg(&log)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid row 1"), "stderr was: {stderr}");
    assert!(stderr.contains("unknown event type"), "stderr was: {stderr}");
}

#[test]
fn inspect_summarizes_each_device() {
    let temp = TempDir::new().unwrap();
    let log = write_log(&temp, &sample_log());

    let output = Command::new(pumplog_binary())
        .arg("inspect")
        .arg("--input")
        .arg(&log)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pump-1: 6 events"), "stdout was: {stdout}");
    assert!(stdout.contains("pump-2: 2 events"), "stdout was: {stdout}");
    assert!(stdout.contains("scheduled_basal: 2"), "stdout was: {stdout}");
}
