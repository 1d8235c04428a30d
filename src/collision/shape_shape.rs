//! Exact overlap tests between every pair of shapes.
//!
//! Every test reports the normal pointing from the first shape toward the second,
//! so swapping the arguments negates the normal and keeps the penetration.
//! Touching shapes (zero overlap) do not collide.

use super::shape::{Quad, Rect, Shape, ShapeKind, Transform};
use crate::math::{self as m, Unit, Vec2};

/// Result of testing two shapes against each other.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CollisionInfo {
    pub is_colliding: bool,
    /// Unit normal pointing from the first shape toward the second.
    /// Zero when not colliding.
    pub normal: Vec2,
    /// Distance the shapes need to move apart along `normal` to stop overlapping.
    pub penetration: f32,
    /// Approximate point of contact in world space.
    pub point: Vec2,
    /// Set by collision handlers to keep the info and apply it as resolution.
    pub accumulated: bool,
}

impl CollisionInfo {
    pub const NONE: Self = CollisionInfo {
        is_colliding: false,
        normal: Vec2 { x: 0.0, y: 0.0 },
        penetration: 0.0,
        point: Vec2 { x: 0.0, y: 0.0 },
        accumulated: false,
    };

    #[inline]
    fn hit(normal: Unit<Vec2>, penetration: f32, point: Vec2) -> Self {
        CollisionInfo {
            is_colliding: true,
            normal: normal.into_inner(),
            penetration,
            point,
            accumulated: false,
        }
    }

    /// The same collision seen from the other shape.
    #[inline]
    pub fn flipped(self) -> Self {
        CollisionInfo {
            normal: -self.normal,
            ..self
        }
    }

    /// Mark the info to be folded into the receiving entity's resolution
    /// once the handler returns.
    #[inline]
    pub fn accumulate(&mut self) {
        self.accumulated = true;
    }
}

type TestFn = fn(&Shape, &Transform, &Shape, &Transform) -> CollisionInfo;

/// Test functions indexed by `[ShapeKind of A][ShapeKind of B]`.
const DISPATCH: [[TestFn; ShapeKind::COUNT]; ShapeKind::COUNT] = [
    [rect_rect, rect_circle, rect_capsule, poly_poly],
    [circle_rect, round_round, round_round, round_poly],
    [capsule_rect, round_round, round_round, round_poly],
    [poly_poly, poly_round, poly_round, poly_poly],
];

/// Checks two shapes for intersection.
#[inline]
pub fn intersection_check(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    DISPATCH[a.kind() as usize][b.kind() as usize](a, ta, b, tb)
}

/// Whether a rect pair is handled by the axis-aligned test without any trigonometry.
#[inline]
pub fn takes_aligned_path(ta: &Transform, tb: &Transform) -> bool {
    !ta.is_rotated() && !tb.is_rotated()
}

macro_rules! flipped {
    ($name:ident => $inner:ident) => {
        fn $name(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
            $inner(b, tb, a, ta).flipped()
        }
    };
}

flipped!(rect_circle => circle_rect);
flipped!(rect_capsule => capsule_rect);
flipped!(poly_round => round_poly);

//
// RECT <-> RECT
//

fn rect_rect(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    if takes_aligned_path(ta, tb) {
        aabb_aabb(&a.bounds(ta), &b.bounds(tb))
    } else {
        sat(&a.quad(ta), &b.quad(tb))
    }
}

/// Overlap test for two unrotated rects.
///
/// The normal is along the axis of smallest overlap, preferring y when both are equal.
pub fn aabb_aabb(a: &Rect, b: &Rect) -> CollisionInfo {
    if !a.overlaps(b) {
        return CollisionInfo::NONE;
    }
    let (a_min, a_max) = (a.min(), a.max());
    let (b_min, b_max) = (b.min(), b.max());

    let fwd = a_max - b_min;
    let back = b_max - a_min;
    let overlap = fwd.min_by_component(back);

    let normal = if overlap.x < overlap.y {
        Unit::unit_x()
    } else {
        Unit::unit_y()
    };
    let normal = if normal.dot(fwd) <= normal.dot(back) {
        normal
    } else {
        -normal
    };

    let inter_min = a_min.max_by_component(b_min);
    let inter_max = a_max.min_by_component(b_max);
    CollisionInfo::hit(
        normal,
        overlap.x.min(overlap.y),
        (inter_min + inter_max) * 0.5,
    )
}

//
// POLYGON <-> POLYGON
//

/// Separating axis test between two convex quads,
/// either of which may be a triangle with a repeated vertex.
///
/// Among axes with equal minimal overlap, the one whose direction comes first
/// lexicographically (after flipping it to point toward positive x, or positive y
/// if vertical) is chosen, so the result doesn't depend on argument order.
pub fn sat(a: &Quad, b: &Quad) -> CollisionInfo {
    if !Rect::enclosing(a).overlaps(&Rect::enclosing(b)) {
        return CollisionInfo::NONE;
    }
    let axes = edge_axes(a).chain(edge_axes(b));
    match least_overlap(axes, |axis| project(a, axis), |axis| project(b, axis)) {
        AxisTest::Overlap(penetration, normal) => {
            // deepest point of b inside a, moved to the middle of the overlap
            let support = deepest_vertex(b, -*normal);
            CollisionInfo::hit(normal, penetration, support + *normal * (penetration * 0.5))
        }
        // no axes means every edge was degenerate and the shapes have no area
        AxisTest::Separated | AxisTest::NoAxes => CollisionInfo::NONE,
    }
}

enum AxisTest {
    Separated,
    /// Smallest overlap and the normal oriented from the first shape toward the second.
    Overlap(f32, Unit<Vec2>),
    NoAxes,
}

/// Project both shapes on every axis and find the one with the least overlap.
/// Axes must be in canonical direction (see [`canonical`]) for the tie-break
/// to be independent of argument order.
fn least_overlap(
    axes: impl Iterator<Item = Vec2>,
    proj_a: impl Fn(Vec2) -> (f32, f32),
    proj_b: impl Fn(Vec2) -> (f32, f32),
) -> AxisTest {
    let mut best: Option<(f32, Vec2, Unit<Vec2>)> = None;
    for axis in axes {
        let (min_a, max_a) = proj_a(axis);
        let (min_b, max_b) = proj_b(axis);
        let fwd = max_a - min_b;
        let back = max_b - min_a;
        let overlap = fwd.min(back);
        if !(overlap > 0.0) {
            return AxisTest::Separated;
        }

        let is_better = match best {
            None => true,
            Some((pen, best_axis, _)) => {
                overlap < pen || (overlap == pen && comes_before(axis, best_axis))
            }
        };
        if is_better {
            let normal = Unit::new_unchecked(if fwd <= back { axis } else { -axis });
            best = Some((overlap, axis, normal));
        }
    }
    match best {
        Some((pen, _, normal)) => AxisTest::Overlap(pen, normal),
        None => AxisTest::NoAxes,
    }
}

/// Unit edge normals of a quad in canonical direction, skipping zero-length edges.
fn edge_axes(q: &Quad) -> impl Iterator<Item = Vec2> + '_ {
    (0..4).filter_map(move |i| segment_axis(q[i], q[(i + 1) % 4]))
}

/// Unit normal of a segment in canonical direction, if it has a length.
#[inline]
fn segment_axis(a: Vec2, b: Vec2) -> Option<Vec2> {
    let edge = b - a;
    let len_sq = edge.mag_sq();
    (len_sq > f32::EPSILON * f32::EPSILON).then(|| canonical(m::right_normal(edge) / len_sq.sqrt()))
}

/// Flip an axis to point toward positive x, or positive y if it's vertical.
#[inline]
fn canonical(n: Vec2) -> Vec2 {
    if n.x < 0.0 || (n.x == 0.0 && n.y < 0.0) {
        -n
    } else {
        n
    }
}

#[inline]
fn comes_before(a: Vec2, b: Vec2) -> bool {
    a.x < b.x || (a.x == b.x && a.y < b.y)
}

#[inline]
fn project(q: &Quad, axis: Vec2) -> (f32, f32) {
    q.iter().fold((f32::MAX, f32::MIN), |(lo, hi), v| {
        let d = v.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

#[inline]
fn deepest_vertex(q: &Quad, dir: Vec2) -> Vec2 {
    q.iter()
        .copied()
        .fold((f32::MIN, q[0]), |(best, best_v), v| {
            let d = v.dot(dir);
            if d > best {
                (d, v)
            } else {
                (best, best_v)
            }
        })
        .1
}

fn poly_poly(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    sat(&a.quad(ta), &b.quad(tb))
}

//
// ROUND <-> ROUND
//

/// Circles and capsules are both a core segment (a point for circles) plus a radius.
fn round_round(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    let (a0, a1, ra) = a.capsule(ta);
    let (b0, b1, rb) = b.capsule(tb);
    let (pa, pb) = m::closest_points_segment_segment(a0, a1, b0, b1);

    let dist = pb - pa;
    let dist_sq = dist.mag_sq();
    let r_sum = ra + rb;
    if dist_sq >= r_sum * r_sum {
        return CollisionInfo::NONE;
    }
    let dist_len = dist_sq.sqrt();
    if dist_len > TOUCH_EPSILON {
        let normal = Unit::new_unchecked(dist / dist_len);
        return CollisionInfo::hit(normal, r_sum - dist_len, pa + *normal * ra);
    }

    // cores touch or cross, separate along one of their normals
    let swept = |p0: Vec2, p1: Vec2, r: f32| {
        move |axis: Vec2| {
            let (d0, d1) = (p0.dot(axis), p1.dot(axis));
            (d0.min(d1) - r, d0.max(d1) + r)
        }
    };
    let axes = segment_axis(a0, a1).into_iter().chain(segment_axis(b0, b1));
    match least_overlap(axes, swept(a0, a1, ra), swept(b0, b1, rb)) {
        AxisTest::Overlap(penetration, normal) => {
            CollisionInfo::hit(normal, penetration, pa)
        }
        AxisTest::Separated => CollisionInfo::NONE,
        // two circles at the same position, consider penetration to be on x axis
        AxisTest::NoAxes => CollisionInfo::hit(Unit::unit_x(), r_sum, pa),
    }
}

//
// ROUND <-> RECT
//

fn circle_rect(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    if takes_aligned_path(ta, tb) {
        let (center, r) = a.circle(ta);
        circle_aabb(center, r, &b.bounds(tb))
    } else {
        round_poly(a, ta, b, tb)
    }
}

fn capsule_rect(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    round_poly(a, ta, b, tb)
}

/// Circle against an unrotated rect.
fn circle_aabb(center: Vec2, r: f32, rect: &Rect) -> CollisionInfo {
    let (min, max) = (rect.min(), rect.max());
    let closest = center.max_by_component(min).min_by_component(max);

    if closest != center {
        let to_rect = closest - center;
        let dist_sq = to_rect.mag_sq();
        if dist_sq >= r * r {
            return CollisionInfo::NONE;
        }
        let dist = dist_sq.sqrt();
        return CollisionInfo::hit(Unit::new_unchecked(to_rect / dist), r - dist, closest);
    }

    // center inside the rect, push out through the nearest side
    let sides = [
        (center.x - min.x, Vec2::new(-1.0, 0.0)),
        (max.x - center.x, Vec2::new(1.0, 0.0)),
        (center.y - min.y, Vec2::new(0.0, -1.0)),
        (max.y - center.y, Vec2::new(0.0, 1.0)),
    ];
    let (depth, outward) = sides
        .into_iter()
        .fold(sides[0], |best, side| if side.0 < best.0 { side } else { best });
    CollisionInfo::hit(
        Unit::new_unchecked(-outward),
        r + depth,
        center + outward * depth,
    )
}

//
// ROUND <-> POLYGON
//

fn round_poly(a: &Shape, ta: &Transform, b: &Shape, tb: &Transform) -> CollisionInfo {
    let (p0, p1, r) = a.capsule(ta);
    segment_poly(p0, p1, r, &b.quad(tb))
}

/// Distances below this count as the core touching the other shape.
const TOUCH_EPSILON: f32 = 1e-4;

/// A segment swept by a radius against a convex quad.
/// With `p0 == p1` this is a circle.
pub fn segment_poly(p0: Vec2, p1: Vec2, r: f32, poly: &Quad) -> CollisionInfo {
    let core = Rect::enclosing(&[p0, p1]);
    let swept = Rect::new(
        core.x - r,
        core.y - r,
        core.width + 2.0 * r,
        core.height + 2.0 * r,
    );
    if !swept.overlaps(&Rect::enclosing(poly)) {
        return CollisionInfo::NONE;
    }

    if !point_in_convex(p0, poly) && !point_in_convex(p1, poly) {
        let (on_seg, on_poly, _) = edges(poly)
            .map(|(e0, e1)| m::closest_points_segment_segment(p0, p1, e0, e1))
            .fold((p0, poly[0], f32::MAX), |best, (s, p)| {
                let d = (p - s).mag_sq();
                if d < best.2 {
                    (s, p, d)
                } else {
                    best
                }
            });
        let to_poly = on_poly - on_seg;
        let dist = to_poly.mag();
        if dist >= r {
            return CollisionInfo::NONE;
        }
        if dist > TOUCH_EPSILON {
            return CollisionInfo::hit(Unit::new_unchecked(to_poly / dist), r - dist, on_poly);
        }
    }

    // the core reaches into the polygon, find the shallowest way out
    let proj_round = |axis: Vec2| {
        let (d0, d1) = (p0.dot(axis), p1.dot(axis));
        (d0.min(d1) - r, d0.max(d1) + r)
    };
    let axes = edge_axes(poly).chain(segment_axis(p0, p1));
    match least_overlap(axes, proj_round, |axis| project(poly, axis)) {
        AxisTest::Overlap(penetration, normal) => {
            CollisionInfo::hit(normal, penetration, deepest_vertex(poly, -*normal))
        }
        AxisTest::Separated | AxisTest::NoAxes => CollisionInfo::NONE,
    }
}

/// Non-degenerate edges of a quad.
fn edges(q: &Quad) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
    (0..4)
        .map(move |i| (q[i], q[(i + 1) % 4]))
        .filter(|(a, b)| (*b - *a).mag_sq() > f32::EPSILON * f32::EPSILON)
}

/// Inside or on the boundary of a convex quad of either winding.
fn point_in_convex(p: Vec2, q: &Quad) -> bool {
    let mut sign = 0.0f32;
    for (a, b) in edges(q) {
        let c = m::cross(b - a, p - a);
        if c == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = c.signum();
        } else if c.signum() != sign {
            return false;
        }
    }
    true
}
