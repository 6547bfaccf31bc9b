//! Camera rigs around an asset's bounding box
//!
//! Everything here is pure f64 arithmetic, so two runs over the same bounding
//! box produce bit-identical poses.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ELEVATION: f64 = 35.0;
pub const DEFAULT_TWO_RING_AZIMUTH: f64 = 30.0;

/// Axis-aligned bounding box in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) / 2.0
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).length()
    }

    /// Finite and with a non-zero diagonal
    pub fn is_usable(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.diagonal() > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: DVec3,
    /// Quaternion as `[w, x, y, z]`
    pub orientation: [f64; 4],
}

impl CameraPose {
    /// Camera at `(azimuth, elevation, distance)` spherical offset from `target`, looking at it
    pub fn look_at(target: DVec3, azimuth: f64, elevation: f64, distance: f64) -> Self {
        let (elev, azim) = (elevation.to_radians(), azimuth.to_radians());
        let offset = DVec3::new(
            distance * elev.cos() * azim.cos(),
            distance * elev.cos() * azim.sin(),
            distance * elev.sin(),
        );
        // extrinsic x-y-z: roll 0, pitch = elevation, yaw = azimuth - 180
        let q = DQuat::from_rotation_z((azimuth - 180.0).to_radians())
            * DQuat::from_rotation_y(elev)
            * DQuat::from_rotation_x(0.0);
        Self { position: target + offset, orientation: [q.w, q.x, q.y, q.z] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewSample {
    pub index: usize,
    pub azimuth: f64,
    pub elevation: f64,
    pub distance: f64,
    /// Filled in after capture
    pub valid: Option<bool>,
}

impl ViewSample {
    pub fn pose(&self, center: DVec3) -> CameraPose {
        CameraPose::look_at(center, self.azimuth, self.elevation, self.distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rig {
    /// One ring at a fixed elevation around an isolated object
    Orbit { init_azimuth: f64, elevation: f64 },
    /// Two rings at `+elevation` and `-elevation` sharing azimuths, for objects in a scene
    TwoRing { base_azimuth: f64, elevation: f64 },
}

impl Rig {
    pub fn orbit(init_azimuth: f64) -> Self {
        Self::Orbit { init_azimuth, elevation: DEFAULT_ELEVATION }
    }

    pub fn two_ring() -> Self {
        Self::TwoRing { base_azimuth: DEFAULT_TWO_RING_AZIMUTH, elevation: DEFAULT_ELEVATION }
    }

    /// `(azimuth, elevation)` of each of the `n` views
    pub fn angles(&self, n: usize) -> Vec<(f64, f64)> {
        match *self {
            Rig::Orbit { init_azimuth, elevation } => (0..n)
                .map(|i| (init_azimuth + i as f64 * 360.0 / n as f64, elevation))
                .collect(),
            Rig::TwoRing { base_azimuth, elevation } => {
                let half = n / 2;
                (0..n)
                    .map(|i| {
                        let azimuth = base_azimuth + i as f64 * 360.0 / half as f64;
                        let elevation = if i < half { elevation } else { -elevation };
                        (azimuth, elevation)
                    })
                    .collect()
            }
        }
    }

    /// Rig of `n` views around `bbox`, at `diagonal * scale` from its center
    pub fn sample(&self, bbox: &Aabb, n: usize, scale: f64) -> Vec<ViewSample> {
        let distance = bbox.diagonal() * scale;
        self.angles(n)
            .into_iter()
            .enumerate()
            .map(|(index, (azimuth, elevation))| ViewSample {
                index,
                azimuth,
                elevation,
                distance,
                valid: None,
            })
            .collect()
    }

    pub fn is_two_ring(&self) -> bool {
        matches!(self, Rig::TwoRing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn unit_box() -> Aabb {
        Aabb::new(DVec3::new(-1.0, -1.0, 0.0), DVec3::new(1.0, 1.0, 2.0))
    }

    #[test]
    fn test_orbit_angles() {
        let views = Rig::orbit(0.0).sample(&unit_box(), 4, 1.0);
        let az: Vec<f64> = views.iter().map(|v| v.azimuth).collect();
        assert_eq!(az, vec![0.0, 90.0, 180.0, 270.0]);
        assert!(views.iter().all(|v| v.elevation == 35.0 && v.valid.is_none()));
        assert!((views[0].distance - 12f64.sqrt()).abs() < EPS);
    }

    #[test]
    fn test_two_ring_angles() {
        let angles = Rig::two_ring().angles(6);
        assert_eq!(
            angles,
            vec![
                (30.0, 35.0),
                (150.0, 35.0),
                (270.0, 35.0),
                (390.0, -35.0),
                (510.0, -35.0),
                (630.0, -35.0),
            ]
        );
        // paired views share an azimuth modulo a full turn
        for k in 0..3 {
            assert_eq!(angles[k].0.rem_euclid(360.0), angles[k + 3].0.rem_euclid(360.0));
        }
    }

    #[test]
    fn test_look_at_position() {
        let pose = CameraPose::look_at(DVec3::new(1.0, 2.0, 3.0), 90.0, 0.0, 2.0);
        assert!((pose.position - DVec3::new(1.0, 4.0, 3.0)).length() < EPS);

        let pose = CameraPose::look_at(DVec3::ZERO, 0.0, 90.0, 1.0);
        assert!((pose.position - DVec3::Z).length() < EPS);
    }

    #[test]
    fn test_look_at_orientation() {
        // azimuth 180, elevation 0: yaw 0, no rotation at all
        let pose = CameraPose::look_at(DVec3::ZERO, 180.0, 0.0, 1.0);
        let [w, x, y, z] = pose.orientation;
        assert!((w - 1.0).abs() < EPS && x.abs() < EPS && y.abs() < EPS && z.abs() < EPS);

        // azimuth 0: yaw -180 about z
        let pose = CameraPose::look_at(DVec3::ZERO, 0.0, 0.0, 1.0);
        let q = DQuat::from_array([
            pose.orientation[1],
            pose.orientation[2],
            pose.orientation[3],
            pose.orientation[0],
        ]);
        let forward = q * DVec3::X;
        assert!((forward - DVec3::NEG_X).length() < EPS);
    }

    #[test]
    fn test_camera_faces_target() {
        // local +x axis is the viewing direction; it must point from camera to target
        for (az, el) in [(0.0, 35.0), (120.0, 35.0), (30.0, -35.0), (250.0, 10.0)] {
            let center = DVec3::new(0.5, -0.2, 1.0);
            let pose = CameraPose::look_at(center, az, el, 3.0);
            let [w, x, y, z] = pose.orientation;
            let forward = DQuat::from_xyzw(x, y, z, w) * DVec3::X;
            let to_target = (center - pose.position).normalize();
            assert!((forward - to_target).length() < 1e-9, "az={az} el={el}");
        }
    }

    #[test]
    fn test_reproducible() {
        let bbox = Aabb::new(DVec3::new(0.1, 0.2, 0.3), DVec3::new(1.7, 0.9, 2.3));
        let a: Vec<_> = Rig::two_ring().sample(&bbox, 6, 1.0).iter().map(|v| v.pose(bbox.center())).collect();
        let b: Vec<_> = Rig::two_ring().sample(&bbox, 6, 1.0).iter().map(|v| v.pose(bbox.center())).collect();
        for (pa, pb) in a.iter().zip(&b) {
            assert_eq!(pa.position.to_array().map(f64::to_bits), pb.position.to_array().map(f64::to_bits));
            assert_eq!(pa.orientation.map(f64::to_bits), pb.orientation.map(f64::to_bits));
        }
    }

    #[test]
    fn test_degenerate_box() {
        let flat = Aabb::new(DVec3::ONE, DVec3::ONE);
        assert!(!flat.is_usable());
        let nan = Aabb::new(DVec3::splat(f64::NAN), DVec3::ONE);
        assert!(!nan.is_usable());
        assert!(unit_box().is_usable());
    }
}
