use super::{Detector, GestureKind};
use crate::config::RaiseHandsConfig;
use crate::landmarks::{Landmark, LandmarkFrame};

/// Both arms fully raised: wrists above the nose and clear of the
/// shoulders, elbows above the shoulders. Single-frame, no history.
#[derive(Debug)]
pub struct RaiseHandsDetector {
    cfg: RaiseHandsConfig,
}

impl RaiseHandsDetector {
    pub fn new(cfg: RaiseHandsConfig) -> Self {
        Self { cfg }
    }

    fn arm_raised(
        &self,
        frame: &LandmarkFrame,
        wrist: Landmark,
        elbow: Landmark,
        shoulder: Landmark,
    ) -> bool {
        let nose_y = frame.normalized(Landmark::Nose).y;
        let wy = frame.normalized(wrist).y;
        let sy = frame.normalized(shoulder).y;
        wy < nose_y && wy < sy - self.cfg.wrist_margin && frame.normalized(elbow).y < sy
    }
}

impl Detector for RaiseHandsDetector {
    fn kind(&self) -> GestureKind {
        GestureKind::Wow
    }

    fn observe(&mut self, frame: &LandmarkFrame) -> bool {
        self.arm_raised(
            frame,
            Landmark::LeftWrist,
            Landmark::LeftElbow,
            Landmark::LeftShoulder,
        ) && self.arm_raised(
            frame,
            Landmark::RightWrist,
            Landmark::RightElbow,
            Landmark::RightShoulder,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::FrameBuilder;

    fn arms_up(t: f64) -> FrameBuilder {
        FrameBuilder::standing(t)
            .set(Landmark::Nose, 0.5, 0.5)
            .set(Landmark::LeftShoulder, 0.6, 0.45)
            .set(Landmark::RightShoulder, 0.4, 0.45)
            .set(Landmark::LeftElbow, 0.65, 0.3)
            .set(Landmark::RightElbow, 0.35, 0.3)
            .set(Landmark::LeftWrist, 0.65, 0.2)
            .set(Landmark::RightWrist, 0.35, 0.2)
    }

    #[test]
    fn single_frame_fires() {
        let mut d = RaiseHandsDetector::new(RaiseHandsConfig::default());
        assert!(d.observe(&arms_up(0.0).build()));
    }

    #[test]
    fn one_arm_is_not_enough() {
        let mut d = RaiseHandsDetector::new(RaiseHandsConfig::default());
        let f = arms_up(0.0)
            .set(Landmark::LeftElbow, 0.62, 0.65)
            .set(Landmark::LeftWrist, 0.63, 0.9)
            .build();
        assert!(!d.observe(&f));
    }

    #[test]
    fn forearm_only_does_not_count() {
        let mut d = RaiseHandsDetector::new(RaiseHandsConfig::default());
        let f = arms_up(0.0).set(Landmark::RightElbow, 0.35, 0.5).build();
        assert!(!d.observe(&f));
    }

    #[test]
    fn wrists_must_clear_shoulder_margin() {
        let mut d = RaiseHandsDetector::new(RaiseHandsConfig::default());
        // Above the nose yet only 0.05 above the shoulders.
        let f = arms_up(0.0)
            .set(Landmark::Nose, 0.5, 0.6)
            .set(Landmark::LeftWrist, 0.65, 0.4)
            .set(Landmark::RightWrist, 0.35, 0.4)
            .build();
        assert!(!d.observe(&f));
    }

    #[test]
    fn standing_pose_is_negative() {
        let mut d = RaiseHandsDetector::new(RaiseHandsConfig::default());
        assert!(!d.observe(&FrameBuilder::standing(0.0).build()));
        assert_eq!(d.buffered(), 0);
    }
}
