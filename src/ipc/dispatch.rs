use anyhow::Result;
use serde::Serialize;
use std::io::Write;

use super::pipeline::SharedProfile;
use crate::gestures::{GestureEvent, GestureKind};

/// One line of the event stream handed to the assistant layer.
#[derive(Debug, Serialize)]
struct EventRecord {
    timestamp: f64,
    #[serde(rename = "type")]
    record_type: &'static str,
    gesture: GestureKind,
    message: String,
    response: Option<String>,
}

pub fn dispatch_gesture(
    ev: &GestureEvent,
    profile: &SharedProfile,
    out: &mut impl Write,
) -> Result<()> {
    let response = profile.with(|p| p.response_for(ev.kind).map(str::to_string));
    let record = EventRecord {
        timestamp: ev.timestamp,
        record_type: "gesture",
        gesture: ev.kind,
        message: format!("gesture: {}", ev.kind),
        response,
    };
    writeln!(out, "{}", serde_json::to_string(&record)?)?;
    out.flush()?;
    Ok(())
}
