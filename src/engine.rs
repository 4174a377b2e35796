//! Cooldown gating and priority arbitration over the detectors.
//!
//! One engine per pose source. Calls must be serialized by the caller; the
//! engine holds unsynchronized window and cooldown state.

use log::{debug, info, trace, warn};

use crate::config::Profile;
use crate::gestures::{Detector, GestureEvent, GestureKind, build_detector};
use crate::landmarks::{FrameError, LandmarkFrame, PoseSample, RawFrame};

/// Refractory timer shared by all gestures.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    last_fired_at: Option<f64>,
    cooldown: f64,
}

impl CooldownGate {
    pub fn new(cooldown_secs: f64) -> Self {
        Self {
            last_fired_at: None,
            cooldown: cooldown_secs,
        }
    }

    /// Arbitration may run only once the full cooldown has strictly elapsed.
    pub fn is_armed(&self, now: f64) -> bool {
        match self.last_fired_at {
            None => true,
            Some(t) => now - t > self.cooldown,
        }
    }

    pub fn mark_fired(&mut self, now: f64) {
        self.last_fired_at = Some(now);
    }

    /// A timestamp before the last event means the source clock restarted.
    /// The cooldown is counted again from `now`.
    pub fn rebase_if_rewound(&mut self, now: f64) -> bool {
        match self.last_fired_at {
            Some(t) if now < t => {
                self.last_fired_at = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn cooldown(&self) -> f64 {
        self.cooldown
    }
}

/// A detector with its position in the evaluation order (0 = highest).
struct Ranked {
    rank: usize,
    detector: Box<dyn Detector>,
}

pub struct GestureEngine {
    gate: CooldownGate,
    chain: Vec<Ranked>,
}

impl GestureEngine {
    /// Builds the chain from the profile's priority list, skipping disabled
    /// gestures entirely.
    pub fn from_profile(profile: &Profile) -> Self {
        let chain = profile
            .engine
            .priority
            .iter()
            .enumerate()
            .filter(|(_, kind)| profile.gestures.is_enabled(**kind))
            .map(|(rank, kind)| Ranked {
                rank,
                detector: build_detector(*kind, &profile.gestures),
            })
            .collect();
        Self::with_chain(profile.engine.cooldown_secs, chain)
    }

    /// Engine over an explicit detector list, evaluated in the given order.
    pub fn with_detectors(cooldown_secs: f64, detectors: Vec<Box<dyn Detector>>) -> Self {
        let chain = detectors
            .into_iter()
            .enumerate()
            .map(|(rank, detector)| Ranked { rank, detector })
            .collect();
        Self::with_chain(cooldown_secs, chain)
    }

    fn with_chain(cooldown_secs: f64, mut chain: Vec<Ranked>) -> Self {
        chain.sort_by_key(|r| r.rank);
        Self {
            gate: CooldownGate::new(cooldown_secs),
            chain,
        }
    }

    /// Validate one wire frame and run it. Rejected frames leave every
    /// detector untouched.
    pub fn ingest(&mut self, raw: RawFrame) -> Result<Option<GestureEvent>, FrameError> {
        match raw.into_sample()? {
            PoseSample::Pose(frame) => Ok(self.process(&frame)),
            PoseSample::Absent { timestamp } => {
                self.observe_absence(timestamp);
                Ok(None)
            }
        }
    }

    pub fn process(&mut self, frame: &LandmarkFrame) -> Option<GestureEvent> {
        let now = frame.timestamp;
        if self.gate.rebase_if_rewound(now) {
            warn!(
                "frame clock went back to {now:.3}; restarting {:.1}s cooldown",
                self.gate.cooldown()
            );
        }
        if !self.gate.is_armed(now) {
            trace!("cooldown: skipping frame at {now:.3}");
            return None;
        }

        // Short-circuit: detectors after the winner see nothing this frame.
        let idx = self
            .chain
            .iter_mut()
            .position(|r| r.detector.observe(frame))?;

        let winner = &mut self.chain[idx].detector;
        winner.reset();
        self.gate.mark_fired(now);

        let event = GestureEvent {
            kind: winner.kind(),
            timestamp: now,
        };
        info!("gesture {} at {now:.3}", event.kind);
        Some(event)
    }

    /// No body in view: gated detectors drop their history, ungated ones
    /// keep theirs until fresh samples arrive. Like any other frame, an
    /// absent tick during cooldown is not evaluated.
    pub fn observe_absence(&mut self, now: f64) {
        if !self.gate.is_armed(now) {
            trace!("cooldown: skipping absent tick at {now:.3}");
            return;
        }
        debug!("no pose at {now:.3}");
        for r in &mut self.chain {
            r.detector.observe_absence();
        }
    }

    /// Evaluation order currently in effect.
    pub fn order(&self) -> Vec<GestureKind> {
        self.chain.iter().map(|r| r.detector.kind()).collect()
    }

    /// Retained samples for one gesture, `None` if it is not in the chain.
    pub fn buffered(&self, kind: GestureKind) -> Option<usize> {
        self.chain
            .iter()
            .find(|r| r.detector.kind() == kind)
            .map(|r| r.detector.buffered())
    }

    pub fn gate(&self) -> &CooldownGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;
    use crate::landmarks::fixtures::FrameBuilder;

    const FPS: f64 = 30.0;
    const SWING: [f32; 8] = [100.0, 106.0, 99.0, 108.0, 95.0, 110.0, 93.0, 112.0];

    fn engine() -> GestureEngine {
        GestureEngine::from_profile(&Profile::default())
    }

    fn engine_all_enabled() -> GestureEngine {
        let mut p = Profile::default();
        for k in GestureKind::ALL {
            p.gestures.set_enabled(k, true);
        }
        GestureEngine::from_profile(&p)
    }

    fn wave_frame(t: f64, x_px: f32) -> LandmarkFrame {
        FrameBuilder::standing(t)
            .set_px(Landmark::RightWrist, x_px, 110.0)
            .build()
    }

    fn arms_up(t: f64) -> LandmarkFrame {
        FrameBuilder::standing(t)
            .set(Landmark::Nose, 0.5, 0.5)
            .set(Landmark::LeftElbow, 0.65, 0.3)
            .set(Landmark::RightElbow, 0.35, 0.3)
            .set(Landmark::LeftWrist, 0.65, 0.2)
            .set(Landmark::RightWrist, 0.35, 0.2)
            .build()
    }

    fn raw(frame: &LandmarkFrame) -> RawFrame {
        RawFrame {
            timestamp: frame.timestamp,
            width: frame.width as i64,
            height: frame.height as i64,
            landmarks: Some(
                Landmark::ALL
                    .iter()
                    .map(|lm| {
                        let p = frame.normalized(*lm);
                        (lm.as_str().to_string(), [p.x, p.y])
                    })
                    .collect(),
            ),
        }
    }

    fn absent(t: f64) -> RawFrame {
        RawFrame {
            timestamp: t,
            width: 0,
            height: 0,
            landmarks: None,
        }
    }

    #[test]
    fn gate_requires_strictly_elapsed_cooldown() {
        let mut g = CooldownGate::new(2.0);
        assert!(g.is_armed(0.0));
        g.mark_fired(10.0);
        assert!(!g.is_armed(11.0));
        assert!(!g.is_armed(12.0));
        assert!(g.is_armed(12.01));
    }

    #[test]
    fn default_chain_skips_nod_and_shake() {
        let e = engine();
        assert_eq!(
            e.order(),
            vec![GestureKind::Wow, GestureKind::Good, GestureKind::Hi]
        );
        assert_eq!(e.buffered(GestureKind::Yes), None);
        assert_eq!(engine_all_enabled().order(), GestureKind::DEFAULT_PRIORITY.to_vec());
    }

    #[test]
    fn custom_priority_is_respected() {
        let mut p = Profile::default();
        p.engine.priority = vec![
            GestureKind::Hi,
            GestureKind::No,
            GestureKind::Wow,
            GestureKind::Yes,
            GestureKind::Good,
        ];
        p.gestures.set_enabled(GestureKind::No, true);
        let e = GestureEngine::from_profile(&p);
        assert_eq!(
            e.order(),
            vec![GestureKind::Hi, GestureKind::No, GestureKind::Wow, GestureKind::Good]
        );
    }

    #[test]
    fn raise_hands_fires_on_a_single_frame() {
        let mut e = engine();
        let ev = e.process(&arms_up(5.0)).unwrap();
        assert_eq!(ev.kind, GestureKind::Wow);
        assert_eq!(ev.timestamp, 5.0);
    }

    #[test]
    fn wave_fires_once_per_raised_streak() {
        let mut e = engine();
        let mut events = Vec::new();
        for i in 0..40 {
            let x = SWING[i % SWING.len()];
            if let Some(ev) = e.process(&wave_frame(i as f64 / FPS, x)) {
                events.push((i, ev));
            }
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 7);
        assert_eq!(events[0].1.kind, GestureKind::Hi);
        assert_eq!(e.buffered(GestureKind::Hi), Some(0));
    }

    #[test]
    fn arms_up_beats_wave_on_the_same_frame() {
        let mut e = engine();
        for (i, x) in SWING[..7].iter().enumerate() {
            assert!(e.process(&wave_frame(i as f64 / FPS, *x)).is_none());
        }
        assert_eq!(e.buffered(GestureKind::Hi), Some(7));

        // Both the raise-hands and the raised-wrist conditions hold here.
        let ev = e.process(&arms_up(7.0 / FPS)).unwrap();
        assert_eq!(ev.kind, GestureKind::Wow);
        // Wave was never evaluated on the winning frame.
        assert_eq!(e.buffered(GestureKind::Hi), Some(7));
    }

    #[test]
    fn losers_before_the_winner_still_update() {
        let mut e = engine_all_enabled();
        // Clap runs ahead of wave and clears on a frame outside its band;
        // nod sits behind wave and is untouched on wave's winning frame.
        for (i, x) in SWING.iter().enumerate() {
            let ev = e.process(&wave_frame(i as f64 / FPS, *x));
            assert_eq!(ev.map(|ev| ev.kind), (i == 7).then_some(GestureKind::Hi));
        }
        assert_eq!(e.buffered(GestureKind::Good), Some(0));
        assert_eq!(e.buffered(GestureKind::Yes), Some(7));
        assert_eq!(e.buffered(GestureKind::No), Some(7));
    }

    #[test]
    fn clap_fires_and_only_its_window_is_cleared() {
        let mut e = engine_all_enabled();
        let seps = [150.0f32, 60.0, 140.0, 55.0, 145.0, 58.0, 150.0, 60.0];
        let mut fired = None;
        for (i, sep) in seps.iter().enumerate() {
            let f = FrameBuilder::standing(i as f64 / FPS)
                .set_px(Landmark::LeftWrist, 320.0 + sep / 2.0, 288.0)
                .set_px(Landmark::RightWrist, 320.0 - sep / 2.0, 288.0)
                .build();
            if let Some(ev) = e.process(&f) {
                fired = Some((i, ev.kind));
            }
        }
        assert_eq!(fired, Some((7, GestureKind::Good)));
        assert_eq!(e.buffered(GestureKind::Good), Some(0));
        // Nod saw the first seven frames; the eighth never reached it.
        assert_eq!(e.buffered(GestureKind::Yes), Some(7));
    }

    #[test]
    fn events_respect_the_refractory_period() {
        let mut e = engine();
        let mut times = Vec::new();
        for i in 0..300 {
            let t = i as f64 / FPS;
            // Alternate bursts of raised arms and a waving hand.
            let f = if (i / 20) % 2 == 0 {
                arms_up(t)
            } else {
                wave_frame(t, SWING[i % SWING.len()])
            };
            if let Some(ev) = e.process(&f) {
                times.push(ev.timestamp);
            }
        }
        assert!(times.len() >= 3);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] > 2.0, "{pair:?}");
        }
    }

    #[test]
    fn frames_during_cooldown_do_not_touch_windows() {
        let mut e = engine();
        e.process(&arms_up(0.0)).unwrap();
        for (i, x) in SWING.iter().enumerate() {
            assert!(e.process(&wave_frame(0.1 + i as f64 / FPS, *x)).is_none());
        }
        assert_eq!(e.buffered(GestureKind::Hi), Some(0));
    }

    #[test]
    fn rejected_frames_mutate_nothing() {
        let mut e = engine_all_enabled();
        for (i, x) in SWING[..5].iter().enumerate() {
            e.process(&wave_frame(i as f64 / FPS, *x));
        }

        let mut missing = raw(&wave_frame(1.0, 300.0));
        missing
            .landmarks
            .as_mut()
            .unwrap()
            .remove("right_elbow");
        assert_eq!(
            e.ingest(missing),
            Err(FrameError::MissingLandmark(Landmark::RightElbow))
        );

        let mut flat = raw(&arms_up(1.1));
        flat.height = 0;
        assert!(matches!(
            e.ingest(flat),
            Err(FrameError::InvalidDimensions { width: 640, height: 0 })
        ));

        assert_eq!(e.buffered(GestureKind::Hi), Some(5));
        assert_eq!(e.buffered(GestureKind::Yes), Some(5));
        assert_eq!(e.buffered(GestureKind::No), Some(5));
        assert!(e.gate().is_armed(0.0));
    }

    #[test]
    fn absent_tick_during_cooldown_leaves_windows() {
        let mut e = engine();
        for (i, x) in SWING[..5].iter().enumerate() {
            assert!(e.process(&wave_frame(i as f64 / FPS, *x)).is_none());
        }
        let ev = e.process(&arms_up(0.2)).unwrap();
        assert_eq!(ev.kind, GestureKind::Wow);

        // Lowered hands and an empty tick inside the cooldown: no evaluation.
        assert!(e.process(&FrameBuilder::standing(0.3).build()).is_none());
        assert_eq!(e.ingest(absent(0.5)), Ok(None));
        assert_eq!(e.buffered(GestureKind::Hi), Some(5));

        assert_eq!(e.ingest(absent(2.5)), Ok(None));
        assert_eq!(e.buffered(GestureKind::Hi), Some(0));
    }

    #[test]
    fn clock_rewind_restarts_cooldown() {
        let mut e = engine();
        e.process(&arms_up(100.0)).unwrap();

        // Source restarted its clock at zero.
        assert!(e.process(&arms_up(1.0)).is_none());
        assert!(e.process(&arms_up(2.5)).is_none());
        let ev = e.process(&arms_up(3.1)).unwrap();
        assert_eq!(ev.timestamp, 3.1);
    }

    #[test]
    fn gap_without_pose_breaks_the_swing() {
        let mut e = engine();
        let mut t = 0.0;
        let mut next = || {
            t += 1.0 / FPS;
            t
        };

        for x in &SWING[..6] {
            assert_eq!(e.ingest(raw(&wave_frame(next(), *x))), Ok(None));
        }
        for _ in 0..5 {
            assert_eq!(e.ingest(absent(next())), Ok(None));
        }
        assert_eq!(e.buffered(GestureKind::Hi), Some(0));

        // Six more samples would have completed the old swing; they do not fire.
        let mut fired_at = None;
        for (i, x) in SWING.iter().enumerate() {
            if let Some(ev) = e.ingest(raw(&wave_frame(next(), *x))).unwrap() {
                assert_eq!(ev.kind, GestureKind::Hi);
                fired_at = Some(i);
            }
        }
        assert_eq!(fired_at, Some(7));
    }

    #[test]
    fn absence_keeps_head_motion_history() {
        let mut e = engine_all_enabled();
        for i in 0..4 {
            e.process(&FrameBuilder::standing(i as f64 / FPS).build());
        }
        e.observe_absence(1.0);
        assert_eq!(e.buffered(GestureKind::Yes), Some(4));
        assert_eq!(e.buffered(GestureKind::No), Some(4));
    }

    #[test]
    fn explicit_detector_list_sets_order() {
        use crate::config::{RaiseHandsConfig, WaveConfig};
        use crate::gestures::{RaiseHandsDetector, WaveDetector};

        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(WaveDetector::new(WaveConfig::default())),
            Box::new(RaiseHandsDetector::new(RaiseHandsConfig::default())),
        ];
        let mut e = GestureEngine::with_detectors(1.0, detectors);
        assert_eq!(e.order(), vec![GestureKind::Hi, GestureKind::Wow]);
        for (i, x) in SWING[..7].iter().enumerate() {
            e.process(&wave_frame(i as f64 / FPS, *x));
        }
        // Wave first: a wave-completing arms-up frame now yields Hi.
        let f = FrameBuilder::standing(7.0 / FPS)
            .set(Landmark::Nose, 0.5, 0.5)
            .set(Landmark::LeftElbow, 0.65, 0.3)
            .set(Landmark::RightElbow, 0.35, 0.3)
            .set(Landmark::LeftWrist, 0.65, 0.2)
            .set_px(Landmark::RightWrist, SWING[7], 96.0)
            .build();
        assert_eq!(e.process(&f).map(|ev| ev.kind), Some(GestureKind::Hi));
        assert_eq!(e.gate().cooldown(), 1.0);
    }
}
