use super::{Detector, GestureKind};
use crate::config::NodConfig;
use crate::landmarks::{Landmark, LandmarkFrame};
use crate::window::SlidingWindow;

/// Vertical head bob. Samples nose y every frame, ungated.
#[derive(Debug)]
pub struct NodDetector {
    cfg: NodConfig,
    nose_y: SlidingWindow<f32>,
}

impl NodDetector {
    pub fn new(cfg: NodConfig) -> Self {
        let nose_y = SlidingWindow::new(cfg.window);
        Self { cfg, nose_y }
    }

    /// Counts (peaks, valleys). A peak must clear both predecessors and the
    /// successor; valleys mirror that.
    fn extrema(&self) -> (usize, usize) {
        let ys = self.nose_y.to_vec();
        let step = self.cfg.step;
        let approach = self.cfg.approach_step;
        let (mut peaks, mut valleys) = (0, 0);

        for i in 2..ys.len().saturating_sub(2) {
            let v = ys[i];
            if v > ys[i - 1] + step && v > ys[i - 2] + approach && v > ys[i + 1] + step {
                peaks += 1;
            } else if v < ys[i - 1] - step && v < ys[i - 2] - approach && v < ys[i + 1] - step {
                valleys += 1;
            }
        }
        (peaks, valleys)
    }
}

impl Detector for NodDetector {
    fn kind(&self) -> GestureKind {
        GestureKind::Yes
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> bool {
        self.nose_y.push(frame.pixel(Landmark::Nose).y);
        if self.nose_y.len() < self.cfg.min_samples {
            return false;
        }
        // jitter
        if self.nose_y.range() < self.cfg.min_range {
            return false;
        }
        let (peaks, valleys) = self.extrema();
        peaks >= self.cfg.min_changes && valleys >= self.cfg.min_changes
    }

    fn reset(&mut self) {
        self.nose_y.clear();
    }

    fn buffered(&self) -> usize {
        self.nose_y.len()
    }
}
