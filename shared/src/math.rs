use serde::{Deserialize, Serialize};

/// Represents a vector in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns the normalized vector, or zero for a zero vector.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::ZERO
        } else {
            self.scale(1.0 / mag)
        }
    }

    /// Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }

    /// Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    /// Returns the difference of two vectors.
    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    pub fn dot(&self, other: &Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Returns the vector shortened to `max` if it is longer than `max`.
    pub fn clamp_magnitude(&self, max: f32) -> Vec3 {
        let mag = self.magnitude();
        if mag > max {
            self.scale(max / mag)
        } else {
            *self
        }
    }

    /// Unit forward vector for a yaw/pitch orientation. Yaw 0 looks down +z,
    /// positive pitch looks up.
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Vec3 {
        Vec3 {
            x: yaw.sin() * pitch.cos(),
            y: pitch.sin(),
            z: yaw.cos() * pitch.cos(),
        }
    }
}

/// Tests a travel segment against a sphere and returns the earliest
/// intersection parameter in [0, 1], or None for a miss.
///
/// This is the projectile hit test: checking the whole per-tick segment
/// instead of sampling the endpoint means fast projectiles cannot tunnel
/// through a target between ticks. A segment starting inside the sphere
/// reports t = 0.
pub fn segment_hits_sphere(start: Vec3, end: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let d = end.sub(&start);
    let m = start.sub(&center);

    let c = m.dot(&m) - radius * radius;
    if c <= 0.0 {
        return Some(0.0);
    }

    let a = d.dot(&d);
    if a == 0.0 {
        return None;
    }

    let b = m.dot(&d);
    // Pointing away from the sphere while outside it.
    if b > 0.0 {
        return None;
    }

    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return None;
    }

    let t = (-b - discriminant.sqrt()) / a;
    if (0.0..=1.0).contains(&t) {
        Some(t)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_magnitude_and_normalize() {
        let v = Vec3::new(3.0, 0.0, 4.0);
        assert_approx_eq!(v.magnitude(), 5.0, 1e-6);

        let n = v.normalize();
        assert_approx_eq!(n.magnitude(), 1.0, 1e-6);
        assert_approx_eq!(n.x, 0.6, 1e-6);
        assert_approx_eq!(n.z, 0.8, 1e-6);

        assert_eq!(Vec3::ZERO.normalize(), Vec3::ZERO);
    }

    #[test]
    fn test_clamp_magnitude() {
        let v = Vec3::new(10.0, 0.0, 0.0);
        let clamped = v.clamp_magnitude(1.0);
        assert_approx_eq!(clamped.magnitude(), 1.0, 1e-6);

        let short = Vec3::new(0.25, 0.0, 0.0);
        assert_eq!(short.clamp_magnitude(1.0), short);
    }

    #[test]
    fn test_from_yaw_pitch() {
        let forward = Vec3::from_yaw_pitch(0.0, 0.0);
        assert_approx_eq!(forward.x, 0.0, 1e-6);
        assert_approx_eq!(forward.y, 0.0, 1e-6);
        assert_approx_eq!(forward.z, 1.0, 1e-6);

        let up = Vec3::from_yaw_pitch(0.0, std::f32::consts::FRAC_PI_2);
        assert_approx_eq!(up.y, 1.0, 1e-6);

        let right = Vec3::from_yaw_pitch(std::f32::consts::FRAC_PI_2, 0.0);
        assert_approx_eq!(right.x, 1.0, 1e-6);
        assert_approx_eq!(right.z, 0.0, 1e-6);
    }

    #[test]
    fn test_segment_hits_sphere_direct() {
        let t = segment_hits_sphere(
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .unwrap();
        // Entry point at x = -1, i.e. 4 units into a 10 unit segment.
        assert_approx_eq!(t, 0.4, 1e-5);
    }

    #[test]
    fn test_segment_misses_sphere() {
        assert!(segment_hits_sphere(
            Vec3::new(-5.0, 3.0, 0.0),
            Vec3::new(5.0, 3.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .is_none());
    }

    #[test]
    fn test_segment_stops_short_of_sphere() {
        assert!(segment_hits_sphere(
            Vec3::new(-5.0, 0.0, 0.0),
            Vec3::new(-3.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .is_none());
    }

    #[test]
    fn test_segment_pointing_away() {
        assert!(segment_hits_sphere(
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .is_none());
    }

    #[test]
    fn test_segment_starting_inside_sphere() {
        let t = segment_hits_sphere(
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .unwrap();
        assert_eq!(t, 0.0);
    }

    #[test]
    fn test_zero_length_segment() {
        assert!(segment_hits_sphere(
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::ZERO,
            1.0,
        )
        .is_none());

        // Degenerate segment inside the sphere still reports a hit.
        assert!(segment_hits_sphere(Vec3::ZERO, Vec3::ZERO, Vec3::ZERO, 1.0).is_some());
    }

    #[test]
    fn test_fast_segment_does_not_tunnel() {
        // One tick of travel far longer than the sphere diameter.
        let t = segment_hits_sphere(
            Vec3::new(0.0, 0.0, -500.0),
            Vec3::new(0.0, 0.0, 500.0),
            Vec3::ZERO,
            0.8,
        );
        assert!(t.is_some());
    }
}
