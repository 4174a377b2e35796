use super::{Detector, GestureKind};
use crate::config::ShakeConfig;
use crate::landmarks::{Landmark, LandmarkFrame};
use crate::window::SlidingWindow;

/// Horizontal head turn back and forth. Samples nose x every frame, ungated.
#[derive(Debug)]
pub struct ShakeDetector {
    cfg: ShakeConfig,
    nose_x: SlidingWindow<f32>,
}

impl ShakeDetector {
    pub fn new(cfg: ShakeConfig) -> Self {
        let nose_x = SlidingWindow::new(cfg.window);
        Self { cfg, nose_x }
    }

    fn turning_points(&self) -> usize {
        let step = self.cfg.step;
        self.nose_x
            .to_vec()
            .windows(3)
            .filter(|w| {
                let (prev, cur, next) = (w[0], w[1], w[2]);
                (cur > prev + step && cur > next + step) || (cur < prev - step && cur < next - step)
            })
            .count()
    }
}

impl Detector for ShakeDetector {
    fn kind(&self) -> GestureKind {
        GestureKind::No
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> bool {
        self.nose_x.push(frame.pixel(Landmark::Nose).x);
        if self.nose_x.len() < self.cfg.min_samples {
            return false;
        }
        if self.nose_x.range() < self.cfg.min_range {
            return false;
        }
        self.turning_points() >= self.cfg.min_changes
    }

    fn reset(&mut self) {
        self.nose_x.clear();
    }

    fn buffered(&self) -> usize {
        self.nose_x.len()
    }
}
