use log::debug;

use super::{Detector, GestureKind};
use crate::config::ClapConfig;
use crate::landmarks::{Landmark, LandmarkFrame};
use crate::window::SlidingWindow;

/// Hands meeting and parting in front of the chest, measured as pixel
/// distance between the wrists.
#[derive(Debug)]
pub struct ClapDetector {
    cfg: ClapConfig,
    separations: SlidingWindow<f32>,
}

impl ClapDetector {
    pub fn new(cfg: ClapConfig) -> Self {
        let separations = SlidingWindow::new(cfg.window);
        Self { cfg, separations }
    }

    fn in_chest_band(&self, frame: &LandmarkFrame) -> bool {
        let band = |wrist: Landmark, shoulder: Landmark| {
            let wy = frame.normalized(wrist).y;
            let sy = frame.normalized(shoulder).y;
            wy > sy - self.cfg.band_above && wy < sy + self.cfg.band_below
        };
        band(Landmark::LeftWrist, Landmark::LeftShoulder)
            && band(Landmark::RightWrist, Landmark::RightShoulder)
    }

    fn oscillating(&self) -> bool {
        let Some((lo, hi)) = self.separations.bounds() else {
            return false;
        };
        if hi - lo <= self.cfg.min_range {
            return false;
        }
        let band = self.cfg.close_band;
        let close = self.separations.iter().filter(|d| **d < lo + band).count();
        let far = self.separations.iter().filter(|d| **d > hi - band).count();
        close >= self.cfg.min_close && far >= self.cfg.min_far
    }
}

impl Detector for ClapDetector {
    fn kind(&self) -> GestureKind {
        GestureKind::Good
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> bool {
        if !self.in_chest_band(frame) {
            if !self.separations.is_empty() {
                debug!("clap: hands left chest band, dropping {} samples", self.separations.len());
                self.separations.clear();
            }
            return false;
        }

        let d = frame
            .pixel(Landmark::LeftWrist)
            .distance(&frame.pixel(Landmark::RightWrist));
        self.separations.push(d);

        self.separations.len() >= self.cfg.min_samples && self.oscillating()
    }

    fn observe_absence(&mut self) {
        self.separations.clear();
    }

    fn reset(&mut self) {
        self.separations.clear();
    }

    fn buffered(&self) -> usize {
        self.separations.len()
    }
}
