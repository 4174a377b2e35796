use log::debug;

use super::{Detector, GestureKind};
use crate::config::WaveConfig;
use crate::landmarks::{Landmark, LandmarkFrame, Point2D};
use crate::window::SlidingWindow;

/// Side-to-side swing of one raised hand. The right hand is checked first;
/// only one wrist is tracked per frame.
#[derive(Debug)]
pub struct WaveDetector {
    cfg: WaveConfig,
    wrists: SlidingWindow<Point2D>,
}

impl WaveDetector {
    pub fn new(cfg: WaveConfig) -> Self {
        let wrists = SlidingWindow::new(cfg.window);
        Self { cfg, wrists }
    }

    fn raised_wrist(&self, frame: &LandmarkFrame) -> Option<Landmark> {
        let limit = frame.normalized(Landmark::Nose).y + self.cfg.nose_slack;
        let raised = |wrist: Landmark, shoulder: Landmark| {
            let wy = frame.normalized(wrist).y;
            wy < frame.normalized(shoulder).y && wy < limit
        };

        if raised(Landmark::RightWrist, Landmark::RightShoulder) {
            Some(Landmark::RightWrist)
        } else if raised(Landmark::LeftWrist, Landmark::LeftShoulder) {
            Some(Landmark::LeftWrist)
        } else {
            None
        }
    }

    fn direction_changes(&self) -> usize {
        let step = self.cfg.step;
        let xs: Vec<f32> = self.wrists.iter().map(|p| p.x).collect();
        let deltas: Vec<f32> = xs.windows(2).map(|w| w[1] - w[0]).collect();
        deltas
            .windows(2)
            .filter(|d| (d[1] > step && d[0] < -step) || (d[1] < -step && d[0] > step))
            .count()
    }
}

impl Detector for WaveDetector {
    fn kind(&self) -> GestureKind {
        GestureKind::Hi
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> bool {
        let Some(wrist) = self.raised_wrist(frame) else {
            if !self.wrists.is_empty() {
                debug!("wave: hand lowered, dropping {} samples", self.wrists.len());
                self.wrists.clear();
            }
            return false;
        };

        self.wrists.push(frame.pixel(wrist));
        if self.wrists.len() < self.cfg.min_samples {
            return false;
        }
        self.direction_changes() >= self.cfg.min_changes
    }

    fn observe_absence(&mut self) {
        self.wrists.clear();
    }

    fn reset(&mut self) {
        self.wrists.clear();
    }

    fn buffered(&self) -> usize {
        self.wrists.len()
    }
}
