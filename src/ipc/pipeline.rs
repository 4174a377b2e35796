use anyhow::{Result, anyhow};
use log::{info, warn};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use super::dispatch::dispatch_gesture;
use crate::config::Profile;
use crate::engine::GestureEngine;
use crate::gestures::GestureEvent;
use crate::landmarks::RawFrame;

/// Where pose frames come from: newline-delimited JSON.
#[derive(Debug, Clone)]
pub enum FrameSource {
    Stdin,
    File(PathBuf),
}

impl FrameSource {
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            FrameSource::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            FrameSource::File(p) => {
                let f = File::open(p).map_err(|e| anyhow!("failed to open {}: {e}", p.display()))?;
                Ok(Box::new(BufReader::new(f)))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            FrameSource::Stdin => "stdin".to_string(),
            FrameSource::File(p) => p.display().to_string(),
        }
    }
}

/// Active profile plus a generation counter bumped on every swap, so the
/// pipeline knows when to rebuild its engine.
#[derive(Debug)]
pub struct SharedProfile {
    profile: Mutex<Profile>,
    generation: AtomicU64,
}

impl SharedProfile {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Mutex::new(profile),
            generation: AtomicU64::new(0),
        }
    }

    pub fn replace(&self, profile: Profile) {
        if let Ok(mut p) = self.profile.lock() {
            *p = profile;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn with<R>(&self, f: impl FnOnce(&Profile) -> R) -> R {
        match self.profile.lock() {
            Ok(p) => f(&p),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

/// Counters copied out for status queries. Kept apart from the engine so
/// readers never touch detector state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub frames_seen: u64,
    pub frames_absent: u64,
    pub frames_rejected: u64,
    pub lines_malformed: u64,
    pub events_emitted: u64,
    pub engine_rebuilds: u64,
    pub cooldown_secs: f64,
    pub detectors: Vec<String>,
    pub windows: BTreeMap<String, usize>,
    pub last_event: Option<GestureEvent>,
}

pub type SharedStats = Arc<Mutex<PipelineStats>>;

fn update_stats(stats: &SharedStats, f: impl FnOnce(&mut PipelineStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

fn build_engine(profile: &SharedProfile, stats: &SharedStats) -> GestureEngine {
    let engine = profile.with(GestureEngine::from_profile);
    let order: Vec<String> = engine.order().iter().map(|k| k.to_string()).collect();
    info!("engine ready: [{}]", order.join(" > "));
    update_stats(stats, |s| {
        s.cooldown_secs = engine.gate().cooldown();
        s.detectors = order;
        s.windows.clear();
    });
    engine
}

/// Drive frames from `reader` through one engine until end of input.
pub fn run_pipeline(
    reader: impl BufRead,
    profile: &SharedProfile,
    stats: &SharedStats,
    out: &mut impl Write,
) -> Result<()> {
    let mut generation = profile.generation();
    let mut engine = build_engine(profile, stats);

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if profile.generation() != generation {
            generation = profile.generation();
            engine = build_engine(profile, stats);
            update_stats(stats, |s| s.engine_rebuilds += 1);
        }

        let raw: RawFrame = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping malformed frame line: {e}");
                update_stats(stats, |s| s.lines_malformed += 1);
                continue;
            }
        };
        let absent = raw.landmarks.is_none();

        match engine.ingest(raw) {
            Ok(event) => {
                if let Some(ev) = &event {
                    if let Err(e) = dispatch_gesture(ev, profile, out) {
                        warn!("dispatch failed: {e}");
                    }
                }
                let windows: BTreeMap<String, usize> = engine
                    .order()
                    .into_iter()
                    .filter_map(|k| engine.buffered(k).map(|n| (k.to_string(), n)))
                    .collect();
                update_stats(stats, |s| {
                    s.frames_seen += 1;
                    if absent {
                        s.frames_absent += 1;
                    }
                    if let Some(ev) = event {
                        s.events_emitted += 1;
                        s.last_event = Some(ev);
                    }
                    s.windows = windows;
                });
            }
            Err(e) => {
                warn!("rejected frame: {e}");
                update_stats(stats, |s| s.frames_rejected += 1);
            }
        }
    }
    Ok(())
}

/// Run a recorded session through a fresh engine.
pub fn replay(source: &FrameSource, profile: Profile, out: &mut impl Write) -> Result<PipelineStats> {
    let reader = source.open()?;
    let shared = SharedProfile::new(profile);
    let stats = SharedStats::default();
    run_pipeline(reader, &shared, &stats, out)?;
    let snapshot = stats
        .lock()
        .map_err(|_| anyhow!("stats lock poisoned"))?
        .clone();
    Ok(snapshot)
}
