//! Gesture vocabulary and the per-gesture detectors.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::GestureTable;
use crate::landmarks::LandmarkFrame;

mod clap;
mod nod;
mod raise_hands;
mod shake;
mod wave;

pub use clap::ClapDetector;
pub use nod::NodDetector;
pub use raise_hands::RaiseHandsDetector;
pub use shake::ShakeDetector;
pub use wave::WaveDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum GestureKind {
    /// Wave.
    Hi,
    /// Both arms raised.
    Wow,
    /// Clap.
    Good,
    /// Nod.
    Yes,
    /// Head shake.
    No,
}

impl GestureKind {
    pub const ALL: [GestureKind; 5] = [
        GestureKind::Hi,
        GestureKind::Wow,
        GestureKind::Good,
        GestureKind::Yes,
        GestureKind::No,
    ];

    pub const DEFAULT_PRIORITY: [GestureKind; 5] = [
        GestureKind::Wow,
        GestureKind::Good,
        GestureKind::Hi,
        GestureKind::Yes,
        GestureKind::No,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GestureKind::Hi => "Hi",
            GestureKind::Wow => "Wow",
            GestureKind::Good => "Good",
            GestureKind::Yes => "Yes",
            GestureKind::No => "No",
        }
    }
}

impl std::fmt::Display for GestureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GestureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GestureKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown gesture '{s}'"))
    }
}

impl TryFrom<String> for GestureKind {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One emitted gesture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GestureEvent {
    pub kind: GestureKind,
    pub timestamp: f64,
}

/// A single gesture recognizer. Detectors own whatever history they need
/// and update it as a side effect of `observe`.
pub trait Detector: Send {
    fn kind(&self) -> GestureKind;

    /// Feed one frame; true when the gesture is present.
    fn observe(&mut self, frame: &LandmarkFrame) -> bool;

    /// The estimator reported no body this tick.
    fn observe_absence(&mut self) {}

    /// Drop accumulated history (called after this detector fires).
    fn reset(&mut self) {}

    /// Samples currently retained.
    fn buffered(&self) -> usize {
        0
    }
}

pub fn build_detector(kind: GestureKind, table: &GestureTable) -> Box<dyn Detector> {
    match kind {
        GestureKind::Hi => Box::new(WaveDetector::new(table.hi.clone())),
        GestureKind::Wow => Box::new(RaiseHandsDetector::new(table.wow.clone())),
        GestureKind::Good => Box::new(ClapDetector::new(table.good.clone())),
        GestureKind::Yes => Box::new(NodDetector::new(table.yes.clone())),
        GestureKind::No => Box::new(ShakeDetector::new(table.no.clone())),
    }
}
