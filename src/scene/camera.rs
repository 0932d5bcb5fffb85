//! Camera, lights and damped orbit controls.

use crate::math::{Color, Vec3};
use std::f32::consts::{FRAC_PI_2, PI};

const DEFAULT_HEIGHT: u32 = 360;

/// Perspective camera looking at `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl Camera {
    pub fn new(fov_degrees: f32, width: u32, height: u32) -> Self {
        let mut camera = Self {
            fov_degrees,
            aspect: 1.0,
            near: 0.1,
            far: 100.0,
            position: Vec3::new(0.0, 1.2, 3.2),
            target: Vec3::ZERO,
        };
        camera.set_viewport(width, height);
        camera
    }

    /// Update the aspect ratio for a new surface size. A zero height uses
    /// the default surface height.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        let height = effective_height(height);
        self.aspect = width as f32 / height as f32;
    }
}

/// Zero heights come from collapsed containers; treat them as the default.
pub fn effective_height(height: u32) -> u32 {
    if height == 0 { DEFAULT_HEIGHT } else { height }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient,
    Directional { position: Vec3 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Color,
    pub intensity: f32,
}

/// Soft ambient fill plus one key light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: Light,
    pub key: Light,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: Light {
                kind: LightKind::Ambient,
                color: Color::rgb(1.0, 1.0, 1.0),
                intensity: 0.7,
            },
            key: Light {
                kind: LightKind::Directional {
                    position: Vec3::new(2.0, 4.0, 3.0),
                },
                color: Color::rgb(1.0, 1.0, 1.0),
                intensity: 0.6,
            },
        }
    }
}

/// Spherical coordinates around the orbit target; `polar` is measured
/// from +Y, `azimuth` around Y from +Z.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    radius: f32,
    polar: f32,
    azimuth: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius == 0.0 {
            return Self {
                radius: 0.0,
                polar: 0.0,
                azimuth: 0.0,
            };
        }
        Self {
            radius,
            polar: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            azimuth: offset.x.atan2(offset.z),
        }
    }

    fn to_offset(self) -> Vec3 {
        let ring = self.radius * self.polar.sin();
        Vec3::new(
            ring * self.azimuth.sin(),
            self.radius * self.polar.cos(),
            ring * self.azimuth.cos(),
        )
    }
}

/// Mouse-driven orbit around a target with damping.
///
/// Input accumulates into pending deltas; each [`update`](Self::update)
/// applies a `damping` fraction of them and decays the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub damping: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub max_polar: f32,
    pub rotate_speed: f32,
    target: Vec3,
    pending_azimuth: f32,
    pending_polar: f32,
    pending_scale: f32,
}

impl OrbitControls {
    const ZOOM_STEP: f32 = 0.95;
    const MIN_POLAR: f32 = 1e-4;

    pub fn new(camera: &Camera) -> Self {
        Self {
            damping: 0.05,
            min_distance: 1.0,
            max_distance: 10.0,
            max_polar: FRAC_PI_2,
            rotate_speed: 1.0,
            target: camera.target,
            pending_azimuth: 0.0,
            pending_polar: 0.0,
            pending_scale: 1.0,
        }
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Pointer drag in pixels over a surface `height` pixels tall. A drag
    /// across the full height turns the camera once around.
    pub fn drag(&mut self, dx: f32, dy: f32, height: u32) {
        let height = effective_height(height) as f32;
        self.pending_azimuth -= 2.0 * PI * dx / height * self.rotate_speed;
        self.pending_polar -= 2.0 * PI * dy / height * self.rotate_speed;
    }

    /// Wheel input: positive moves away from the target, negative closer.
    pub fn zoom(&mut self, delta: f32) {
        if delta > 0.0 {
            self.pending_scale /= Self::ZOOM_STEP;
        } else if delta < 0.0 {
            self.pending_scale *= Self::ZOOM_STEP;
        }
    }

    /// Advance one frame and move `camera`.
    pub fn update(&mut self, camera: &mut Camera) {
        let mut spherical = Spherical::from_offset(camera.position - self.target);

        spherical.azimuth += self.pending_azimuth * self.damping;
        spherical.polar += self.pending_polar * self.damping;
        spherical.polar = spherical.polar.clamp(Self::MIN_POLAR, self.max_polar);
        spherical.radius =
            (spherical.radius * self.pending_scale).clamp(self.min_distance, self.max_distance);

        camera.position = self.target + spherical.to_offset();
        camera.target = self.target;

        let decay = 1.0 - self.damping;
        self.pending_azimuth *= decay;
        self.pending_polar *= decay;
        self.pending_scale = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(camera: &Camera) -> f32 {
        (camera.position - camera.target).length()
    }

    #[test]
    fn camera_defaults() {
        let camera = Camera::new(45.0, 720, 360);
        assert_eq!(camera.aspect, 2.0);
        assert_eq!(camera.position, Vec3::new(0.0, 1.2, 3.2));
        assert_eq!((camera.near, camera.far), (0.1, 100.0));
    }

    #[test]
    fn zero_height_falls_back() {
        let mut camera = Camera::new(45.0, 360, 0);
        assert_eq!(camera.aspect, 1.0);
        camera.set_viewport(1080, 0);
        assert_eq!(camera.aspect, 3.0);
    }

    #[test]
    fn idle_update_keeps_camera_in_place() {
        let mut camera = Camera::new(45.0, 640, 360);
        let before = camera.position;
        let mut controls = OrbitControls::new(&camera);
        controls.update(&mut camera);
        assert!((camera.position - before).length() < 1e-4);
    }

    #[test]
    fn zoom_respects_distance_limits() {
        let mut camera = Camera::new(45.0, 640, 360);
        let mut controls = OrbitControls::new(&camera);
        for _ in 0..200 {
            controls.zoom(1.0);
            controls.update(&mut camera);
        }
        assert!((distance(&camera) - 10.0).abs() < 1e-3);

        for _ in 0..200 {
            controls.zoom(-1.0);
            controls.update(&mut camera);
        }
        assert!((distance(&camera) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn drag_is_damped_and_stays_above_floor() {
        let mut camera = Camera::new(45.0, 640, 360);
        let mut controls = OrbitControls::new(&camera);
        let start = camera.position;

        controls.drag(90.0, 0.0, 360);
        controls.update(&mut camera);
        let first_step = (camera.position - start).length();
        assert!(first_step > 0.0);
        assert!(first_step < 0.5);

        controls.drag(0.0, -10_000.0, 360);
        for _ in 0..500 {
            controls.update(&mut camera);
        }
        assert!(camera.position.y >= -1e-4);
    }
}
