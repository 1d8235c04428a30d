//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f32::consts::PI;
pub use ultraviolet as uv;

/// All collision geometry is single precision.
pub type Vec2 = uv::Vec2;

/// An angle in either degrees or radians.
/// Entity rotations are stored in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f32),
    Deg(f32),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f32 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f32 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Deg(0.0)
    }
}

/// A precomputed rotation in screen space (y pointing down),
/// positive angles turning clockwise on screen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rotation {
    pub cos: f32,
    pub sin: f32,
}

impl Rotation {
    #[inline]
    pub fn new(angle: Angle) -> Self {
        let (sin, cos) = angle.rad().sin_cos();
        Rotation { cos, sin }
    }

    #[inline]
    pub fn apply(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            v.x * self.cos - v.y * self.sin,
            v.x * self.sin + v.y * self.cos,
        )
    }

    /// Rotate a point given relative to a shape's origin around `pivot`,
    /// also given relative to the origin.
    #[inline]
    pub fn apply_about(&self, v: Vec2, pivot: Vec2) -> Vec2 {
        self.apply(v - pivot) + pivot
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    #[inline]
    pub fn into_inner(self) -> Vec2 {
        self.0
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

// Vec2 utils

#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}

/// 2D cross product, the z component of the 3D one.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.x * b.y - a.y * b.x
}

/// Closest points between segments `p1-q1` and `p2-q2`,
/// returned as (point on first, point on second).
pub fn closest_points_segment_segment(p1: Vec2, q1: Vec2, p2: Vec2, q2: Vec2) -> (Vec2, Vec2) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.mag_sq();
    let e = d2.mag_sq();
    let f = d2.dot(r);

    if a == 0.0 && e == 0.0 {
        return (p1, p2);
    }
    let (s, t) = if a == 0.0 {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e == 0.0 {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            // parallel segments have denom 0, any s works as a starting point
            let mut s = if denom != 0.0 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_turns_clockwise_on_screen() {
        let rot = Rotation::new(Angle::Deg(90.0));
        let v = rot.apply(Vec2::unit_x());
        assert!(v.x.abs() < 1e-6 && (v.y - 1.0).abs() < 1e-6, "{v:?}");

        let about = rot.apply_about(Vec2::new(10.0, 5.0), Vec2::new(5.0, 5.0));
        assert!((about.x - 5.0).abs() < 1e-5 && (about.y - 10.0).abs() < 1e-5);
    }

    #[test]
    fn segment_closest_points() {
        // crossing segments touch at the crossing point
        let (a, b) = closest_points_segment_segment(
            Vec2::new(-1.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.0, 1.0),
        );
        assert!(a.mag() < 1e-6 && b.mag() < 1e-6);

        // parallel segments
        let (a, b) = closest_points_segment_segment(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 4.0),
            Vec2::new(3.0, 2.0),
            Vec2::new(3.0, 10.0),
        );
        assert!(((b - a).mag() - 3.0).abs() < 1e-6);
        assert!(a.y >= 2.0 && a.y <= 4.0);
    }
}
