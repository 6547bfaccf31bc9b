//! Post-capture view filter for objects rendered inside a scene

use serde::{Deserialize, Serialize};

use crate::render::sampler::Rig;

/// Minimum tight/loose area ratio of an accepted view
pub const AREA_RATIO_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox2d {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BBox2d {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn area(&self) -> f64 {
        (self.x_max - self.x_min) * (self.y_max - self.y_min)
    }
}

/// `tight / loose`, or 0 when the loose box has no area
pub fn area_ratio(tight: &BBox2d, loose: &BBox2d) -> f64 {
    let loose_area = loose.area();
    if loose_area > 0.0 { tight.area() / loose_area } else { 0.0 }
}

/// Tight and loose boxes of the target object in one view
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Detection {
    pub tight: Option<BBox2d>,
    pub loose: Option<BBox2d>,
}

impl Detection {
    pub fn new(tight: BBox2d, loose: BBox2d) -> Self {
        Self { tight: Some(tight), loose: Some(loose) }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted,
    /// Object missing from the tight or loose detection
    NotDetected,
    /// Tight box covers too little of the loose box
    Occluded { ratio: f64 },
    /// The top-ring view at the same azimuth was not detected
    TopRingFailed,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::NotDetected => "not_detected",
            Verdict::Occluded { .. } => "occluded",
            Verdict::TopRingFailed => "top_ring_failed",
        }
    }
}

/// Verdict for a single view on its own detection
pub fn judge(detection: &Detection) -> Verdict {
    match (&detection.tight, &detection.loose) {
        (Some(tight), Some(loose)) => {
            let ratio = area_ratio(tight, loose);
            if ratio >= AREA_RATIO_THRESHOLD {
                Verdict::Accepted
            } else {
                Verdict::Occluded { ratio }
            }
        }
        _ => Verdict::NotDetected,
    }
}

/// Verdicts for a two-ring rig, top ring first
///
/// A bottom view whose top partner (same azimuth index) was not detected is
/// rejected regardless of its own detection. The rule only runs top to bottom:
/// an undetected bottom view never rejects its top partner, and an occluded
/// (but detected) top view does not cascade.
pub fn gate_two_ring(detections: &[Detection]) -> Vec<Verdict> {
    let half = detections.len() / 2;
    let mut verdicts: Vec<Verdict> = Vec::with_capacity(detections.len());
    for (idx, detection) in detections.iter().enumerate() {
        let own = judge(detection);
        let verdict = if idx >= half && verdicts[idx - half] == Verdict::NotDetected {
            Verdict::TopRingFailed
        } else {
            own
        };
        verdicts.push(verdict);
    }
    verdicts
}

/// Orbit views are always kept; two-ring views go through [`gate_two_ring`]
pub fn gate(rig: &Rig, detections: &[Detection]) -> Vec<Verdict> {
    if rig.is_two_ring() {
        gate_two_ring(detections)
    } else {
        vec![Verdict::Accepted; detections.len()]
    }
}
