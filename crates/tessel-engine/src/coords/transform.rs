use core::ops::Mul;

use super::{Rect, Vec2};

/// 2D affine transform stored as the first two rows of a 3×3 matrix.
///
/// `[a c e]`
/// `[b d f]`
///
/// Composition follows matrix order: `(lhs * rhs).map(p) == lhs.map(rhs.map(p))`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Affine2 {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine2 {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    #[inline]
    pub const fn translate(x: f32, y: f32) -> Self {
        Self { e: x, f: y, ..Self::IDENTITY }
    }

    #[inline]
    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self { a: sx, d: sy, ..Self::IDENTITY }
    }

    #[inline]
    pub const fn uniform_scale(s: f32) -> Self {
        Self::scale(s, s)
    }

    /// Rotation about the origin. Positive angles turn +X towards +Y.
    #[inline]
    pub fn rotate_degrees(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    #[inline]
    pub fn determinant(self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Returns `None` for singular or non-finite transforms.
    pub fn invert(self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() || !self.is_finite() {
            return None;
        }

        let inv = 1.0 / det;
        let a = self.d * inv;
        let b = -self.b * inv;
        let c = -self.c * inv;
        let d = self.a * inv;
        let e = -(a * self.e + c * self.f);
        let f = -(b * self.e + d * self.f);

        Some(Self { a, b, c, d, e, f })
    }

    #[inline]
    pub fn map_point(self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }

    /// Maps the four corners of `rect` and returns their bounding box.
    pub fn map_rect_bounds(self, rect: Rect) -> Rect {
        let min = rect.min();
        let max = rect.max();
        let corners = [
            Vec2::new(min.x, min.y),
            Vec2::new(max.x, min.y),
            Vec2::new(max.x, max.y),
            Vec2::new(min.x, max.y),
        ];

        corners[1..]
            .iter()
            .fold(Rect::from_point(self.map_point(corners[0])), |acc, p| {
                acc.union(Rect::from_point(self.map_point(*p)))
            })
    }

    /// Column-major 4×4 matrix for WGSL `mat4x4<f32>` uniforms.
    pub fn to_mat4_cols(self) -> [[f32; 4]; 4] {
        [
            [self.a, self.b, 0.0, 0.0],
            [self.c, self.d, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [self.e, self.f, 0.0, 1.0],
        ]
    }
}

impl Default for Affine2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Affine2 {
    type Output = Affine2;

    #[inline]
    fn mul(self, rhs: Affine2) -> Affine2 {
        Affine2 {
            a: self.a * rhs.a + self.c * rhs.b,
            b: self.b * rhs.a + self.d * rhs.b,
            c: self.a * rhs.c + self.c * rhs.d,
            d: self.b * rhs.c + self.d * rhs.d,
            e: self.a * rhs.e + self.c * rhs.f + self.e,
            f: self.b * rhs.e + self.d * rhs.f + self.f,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a.x - b.x).abs() < 1e-4 && (a.y - b.y).abs() < 1e-4
    }

    #[test]
    fn composition_applies_right_first() {
        let t = Affine2::translate(10.0, 0.0) * Affine2::uniform_scale(2.0);
        assert_eq!(t.map_point(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 2.0));
    }

    #[test]
    fn rotation_quarter_turn() {
        let p = Affine2::rotate_degrees(90.0).map_point(Vec2::new(1.0, 0.0));
        assert!(close(p, Vec2::new(0.0, 1.0)));
    }

    #[test]
    fn invert_round_trips() {
        let t = Affine2::scale(0.5, -0.25)
            * Affine2::translate(3.0, -7.0)
            * Affine2::rotate_degrees(33.0)
            * Affine2::uniform_scale(1.7);
        let inv = t.invert().unwrap();
        let p = Vec2::new(12.5, -4.0);
        assert!(close(inv.map_point(t.map_point(p)), p));
        assert!(close(t.map_point(inv.map_point(p)), p));
    }

    #[test]
    fn singular_has_no_inverse() {
        assert!(Affine2::uniform_scale(0.0).invert().is_none());
        assert!(Affine2::uniform_scale(f32::NAN).invert().is_none());
    }

    #[test]
    fn rect_bounds_of_rotated_square() {
        let r = Affine2::rotate_degrees(45.0).map_rect_bounds(Rect::new(-1.0, -1.0, 2.0, 2.0));
        let half = 2.0f32.sqrt();
        assert!(close(r.min(), Vec2::new(-half, -half)));
        assert!(close(r.max(), Vec2::new(half, half)));
    }

    #[test]
    fn mat4_columns_carry_translation_last() {
        let m = Affine2::translate(4.0, 5.0).to_mat4_cols();
        assert_eq!(m[3], [4.0, 5.0, 0.0, 1.0]);
    }
}
