use super::Vec2;

/// Axis-aligned rectangle (top-left origin, +Y down).
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub origin: Vec2,
    pub size: Vec2,
}

impl Rect {
    #[inline]
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            origin: Vec2::new(x, y),
            size: Vec2::new(w, h),
        }
    }

    #[inline]
    pub const fn from_origin_size(origin: Vec2, size: Vec2) -> Self {
        Self { origin, size }
    }

    #[inline]
    pub fn min(self) -> Vec2 {
        self.origin
    }

    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.origin.x + self.size.x, self.origin.y + self.size.y)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.size.x <= 0.0 || self.size.y <= 0.0
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.origin.is_finite() && self.size.is_finite()
    }

    /// Normalizes the rectangle so width/height are non-negative.
    #[inline]
    pub fn normalized(self) -> Self {
        let mut x = self.origin.x;
        let mut y = self.origin.y;
        let mut w = self.size.x;
        let mut h = self.size.y;

        if w < 0.0 {
            x += w;
            w = -w;
        }
        if h < 0.0 {
            y += h;
            h = -h;
        }

        Rect::new(x, y, w, h)
    }

    /// Half-open containment: [min, max).
    #[inline]
    pub fn contains(self, p: Vec2) -> bool {
        let r = self.normalized();
        p.x >= r.origin.x
            && p.y >= r.origin.y
            && p.x < (r.origin.x + r.size.x)
            && p.y < (r.origin.y + r.size.y)
    }

    /// Smallest rectangle covering both operands.
    #[inline]
    pub fn union(self, other: Rect) -> Rect {
        let a = self.normalized();
        let b = other.normalized();
        let min = Vec2::new(a.origin.x.min(b.origin.x), a.origin.y.min(b.origin.y));
        let max = Vec2::new(a.max().x.max(b.max().x), a.max().y.max(b.max().y));
        Rect::from_origin_size(min, max - min)
    }

    /// Grows the rectangle by `amount` on every side.
    #[inline]
    pub fn inflate(self, amount: f32) -> Rect {
        let r = self.normalized();
        Rect::new(
            r.origin.x - amount,
            r.origin.y - amount,
            r.size.x + amount * 2.0,
            r.size.y + amount * 2.0,
        )
    }

    /// Zero-size rectangle at `p`.
    #[inline]
    pub fn from_point(p: Vec2) -> Rect {
        Rect::from_origin_size(p, Vec2::zero())
    }

    /// Open-interval overlap test; rectangles sharing only an edge do not overlap.
    ///
    /// Unlike [`Rect::intersect`], a zero-size rectangle strictly inside `self`
    /// still overlaps it.
    #[inline]
    pub fn overlaps(self, other: Rect) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        a.origin.x < b.max().x
            && b.origin.x < a.max().x
            && a.origin.y < b.max().y
            && b.origin.y < a.max().y
    }

    #[inline]
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let a = self.normalized();
        let b = other.normalized();

        let x0 = a.origin.x.max(b.origin.x);
        let y0 = a.origin.y.max(b.origin.y);
        let x1 = (a.origin.x + a.size.x).min(b.origin.x + b.size.x);
        let y1 = (a.origin.y + a.size.y).min(b.origin.y + b.size.y);

        let w = x1 - x0;
        let h = y1 - y0;

        if w <= 0.0 || h <= 0.0 {
            None
        } else {
            Some(Rect::new(x0, y0, w, h))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(x: f32, y: f32, w: f32, h: f32) -> Rect { Rect::new(x, y, w, h) }

    // ── normalized ────────────────────────────────────────────────────────

    #[test]
    fn normalized_positive_is_identity() {
        let rect = r(1.0, 2.0, 10.0, 20.0);
        assert_eq!(rect.normalized(), rect);
    }

    #[test]
    fn normalized_negative_width() {
        let rect = r(10.0, 0.0, -4.0, 5.0);
        let n = rect.normalized();
        assert_eq!(n.origin.x, 6.0);
        assert_eq!(n.size.x, 4.0);
    }

    #[test]
    fn normalized_negative_height() {
        let rect = r(0.0, 10.0, 5.0, -3.0);
        let n = rect.normalized();
        assert_eq!(n.origin.y, 7.0);
        assert_eq!(n.size.y, 3.0);
    }

    // ── contains ──────────────────────────────────────────────────────────

    #[test]
    fn contains_interior_point() {
        assert!(r(0.0, 0.0, 10.0, 10.0).contains(Vec2::new(5.0, 5.0)));
    }

    #[test]
    fn contains_top_left_inclusive() {
        assert!(r(0.0, 0.0, 10.0, 10.0).contains(Vec2::new(0.0, 0.0)));
    }

    #[test]
    fn contains_bottom_right_exclusive() {
        // Half-open [min, max) — the max edge is not contained.
        assert!(!r(0.0, 0.0, 10.0, 10.0).contains(Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn contains_outside() {
        assert!(!r(0.0, 0.0, 10.0, 10.0).contains(Vec2::new(-1.0, 5.0)));
        assert!(!r(0.0, 0.0, 10.0, 10.0).contains(Vec2::new(5.0, -1.0)));
    }

    // ── intersect ─────────────────────────────────────────────────────────

    #[test]
    fn intersect_overlapping() {
        let a = r(0.0, 0.0, 10.0, 10.0);
        let b = r(5.0, 5.0, 10.0, 10.0);
        let i = a.intersect(b).unwrap();
        assert_eq!(i, r(5.0, 5.0, 5.0, 5.0));
    }

    #[test]
    fn intersect_contained() {
        let outer = r(0.0, 0.0, 100.0, 100.0);
        let inner = r(10.0, 10.0, 20.0, 20.0);
        assert_eq!(outer.intersect(inner).unwrap(), inner);
    }

    #[test]
    fn intersect_touching_edge_returns_none() {
        // Rects share an edge — zero-width overlap is not a valid intersection.
        let a = r(0.0, 0.0, 10.0, 10.0);
        let b = r(10.0, 0.0, 10.0, 10.0);
        assert!(a.intersect(b).is_none());
    }

    #[test]
    fn intersect_disjoint_returns_none() {
        let a = r(0.0, 0.0, 5.0, 5.0);
        let b = r(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersect(b).is_none());
    }

    // ── union / inflate / overlaps ────────────────────────────────────────

    #[test]
    fn union_covers_both() {
        let a = r(0.0, 0.0, 2.0, 2.0);
        let b = r(5.0, -1.0, 1.0, 1.0);
        assert_eq!(a.union(b), r(0.0, -1.0, 6.0, 3.0));
    }

    #[test]
    fn union_of_points_is_bounding_box() {
        let a = Rect::from_point(Vec2::new(3.0, 4.0));
        let b = Rect::from_point(Vec2::new(-1.0, 10.0));
        assert_eq!(a.union(b), r(-1.0, 4.0, 4.0, 6.0));
    }

    #[test]
    fn inflate_grows_every_side() {
        assert_eq!(r(10.0, 10.0, 0.0, 0.0).inflate(5.0), r(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn overlaps_point_inside() {
        let tile = r(0.0, 0.0, 256.0, 256.0);
        assert!(tile.overlaps(Rect::from_point(Vec2::new(10.0, 10.0))));
    }

    #[test]
    fn overlaps_shared_edge_is_false() {
        let a = r(0.0, 0.0, 10.0, 10.0);
        let b = r(10.0, 0.0, 10.0, 10.0);
        assert!(!a.overlaps(b));
    }

    // ── is_empty ──────────────────────────────────────────────────────────

    #[test]
    fn is_empty_zero_size() {
        assert!(r(0.0, 0.0, 0.0, 5.0).is_empty());
        assert!(r(0.0, 0.0, 5.0, 0.0).is_empty());
    }

    #[test]
    fn is_empty_positive_size() {
        assert!(!r(0.0, 0.0, 1.0, 1.0).is_empty());
    }
}