//! Pose landmark frames: the validated per-tick input of the engine.

use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// The keypoints the detectors read. Estimators may send more; extras are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Landmark {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
}

impl Landmark {
    pub const ALL: [Landmark; 7] = [
        Landmark::Nose,
        Landmark::LeftShoulder,
        Landmark::RightShoulder,
        Landmark::LeftElbow,
        Landmark::RightElbow,
        Landmark::LeftWrist,
        Landmark::RightWrist,
    ];

    /// Key used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Landmark::Nose => "nose",
            Landmark::LeftShoulder => "left_shoulder",
            Landmark::RightShoulder => "right_shoulder",
            Landmark::LeftElbow => "left_elbow",
            Landmark::RightElbow => "right_elbow",
            Landmark::LeftWrist => "left_wrist",
            Landmark::RightWrist => "right_wrist",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Landmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("frame is missing required landmark '{0}'")]
    MissingLandmark(Landmark),
    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// One validated pose estimate. Coordinates are normalized to the image,
/// origin top-left; pixel positions are derived on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
    points: [Point2D; 7],
}

impl LandmarkFrame {
    pub fn try_new(
        timestamp: f64,
        width: i64,
        height: i64,
        mut lookup: impl FnMut(Landmark) -> Option<Point2D>,
    ) -> Result<Self, FrameError> {
        if !timestamp.is_finite() {
            return Err(FrameError::NonFinite("timestamp"));
        }
        if width <= 0 || height <= 0 || width > u32::MAX as i64 || height > u32::MAX as i64 {
            return Err(FrameError::InvalidDimensions { width, height });
        }

        let mut points = [Point2D::default(); 7];
        for lm in Landmark::ALL {
            let p = lookup(lm).ok_or(FrameError::MissingLandmark(lm))?;
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(FrameError::NonFinite(lm.as_str()));
            }
            points[lm.index()] = p;
        }

        Ok(Self {
            timestamp,
            width: width as u32,
            height: height as u32,
            points,
        })
    }

    /// Resolution-independent position, used for above/below relations.
    pub fn normalized(&self, lm: Landmark) -> Point2D {
        self.points[lm.index()]
    }

    /// Position in source-image pixels, used for distance thresholds.
    pub fn pixel(&self, lm: Landmark) -> Point2D {
        let p = self.normalized(lm);
        Point2D::new(p.x * self.width as f32, p.y * self.height as f32)
    }
}

/// Wire form of one pose-estimator tick (one JSON line).
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub timestamp: f64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    /// `None` when the estimator found no body this tick.
    #[serde(default)]
    pub landmarks: Option<HashMap<String, [f32; 2]>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoseSample {
    Pose(LandmarkFrame),
    Absent { timestamp: f64 },
}

impl RawFrame {
    pub fn into_sample(self) -> Result<PoseSample, FrameError> {
        match self.landmarks {
            None => {
                if !self.timestamp.is_finite() {
                    return Err(FrameError::NonFinite("timestamp"));
                }
                Ok(PoseSample::Absent {
                    timestamp: self.timestamp,
                })
            }
            Some(map) => {
                let frame = LandmarkFrame::try_new(self.timestamp, self.width, self.height, |lm| {
                    map.get(lm.as_str()).map(|[x, y]| Point2D::new(*x, *y))
                })?;
                Ok(PoseSample::Pose(frame))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const WIDTH: f32 = 640.0;
    pub const HEIGHT: f32 = 480.0;

    /// Builds frames starting from a relaxed standing pose (arms down,
    /// hands well below the chest band).
    #[derive(Debug, Clone)]
    pub struct FrameBuilder {
        timestamp: f64,
        points: HashMap<Landmark, Point2D>,
    }

    impl FrameBuilder {
        pub fn standing(timestamp: f64) -> Self {
            let mut points = HashMap::new();
            points.insert(Landmark::Nose, Point2D::new(0.5, 0.3));
            points.insert(Landmark::LeftShoulder, Point2D::new(0.6, 0.45));
            points.insert(Landmark::RightShoulder, Point2D::new(0.4, 0.45));
            points.insert(Landmark::LeftElbow, Point2D::new(0.62, 0.65));
            points.insert(Landmark::RightElbow, Point2D::new(0.38, 0.65));
            points.insert(Landmark::LeftWrist, Point2D::new(0.63, 0.9));
            points.insert(Landmark::RightWrist, Point2D::new(0.37, 0.9));
            Self { timestamp, points }
        }

        pub fn set(mut self, lm: Landmark, x: f32, y: f32) -> Self {
            self.points.insert(lm, Point2D::new(x, y));
            self
        }

        /// Place a landmark by pixel coordinates.
        pub fn set_px(self, lm: Landmark, x: f32, y: f32) -> Self {
            self.set(lm, x / WIDTH, y / HEIGHT)
        }

        pub fn build(self) -> LandmarkFrame {
            LandmarkFrame::try_new(self.timestamp, WIDTH as i64, HEIGHT as i64, |lm| {
                self.points.get(&lm).copied()
            })
            .expect("fixture frame is valid")
        }
    }
}
