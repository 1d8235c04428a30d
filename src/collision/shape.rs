//! Components and geometry of collidable entities.

use super::shape_shape::CollisionInfo;
use crate::math::{Angle, Rotation, Vec2};

/// Identifies one loaded map. Entities only collide with things on their own map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct MapId(pub u16);

/// Gameplay type of an entity, used to find its
/// [`CollisionScript`][super::script::CollisionScript].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct EntityKind(pub u16);

/// Bitmask of collision layers. Two shapes are only tested against each other
/// if their masks share at least one bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = LayerMask(0);
    pub const ALL: Self = LayerMask(u32::MAX);

    /// A mask with only the given layer set.
    #[inline]
    pub const fn layer(idx: u32) -> Self {
        LayerMask(1 << idx)
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        LayerMask::layer(0)
    }
}

impl std::ops::BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        LayerMask(self.0 | rhs.0)
    }
}

/// An axis-aligned rectangle given by its top-left corner and size.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const ZERO: Self = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    /// The smallest rectangle containing all the given points.
    pub fn enclosing(points: &[Vec2]) -> Self {
        let (min, max) = points.iter().fold(
            (Vec2::broadcast(f32::MAX), Vec2::broadcast(f32::MIN)),
            |(min, max), &p| (min.min_by_component(p), max.max_by_component(p)),
        );
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// True if the rectangle has no area.
    /// Freed collider slots hold a zero rectangle, so this doubles as the liveness check.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[inline]
    pub fn min(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn max(&self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Multiply position and size by a factor.
    #[inline]
    pub fn scaled(&self, scale: f32) -> Self {
        Rect::new(
            self.x * scale,
            self.y * scale,
            self.width * scale,
            self.height * scale,
        )
    }

    /// Strict overlap test, touching edges do not count.
    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }

    /// The four corners in clockwise order on screen starting from the top left.
    #[inline]
    pub fn corners(&self) -> [Vec2; 4] {
        let min = self.min();
        let max = self.max();
        [min, Vec2::new(max.x, min.y), max, Vec2::new(min.x, max.y)]
    }
}

/// Where an entity is. Coordinates are screen space with y pointing down,
/// and `(x, y)` is the top-left corner of the entity's collision shape.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct Position {
    pub x: f32,
    pub y: f32,
    /// Rotation in degrees about the shape's anchor, clockwise on screen.
    pub rotation: f32,
    pub map: MapId,
    pub kind: EntityKind,
}

impl Position {
    pub fn new(x: f32, y: f32, map: MapId, kind: EntityKind) -> Self {
        Position {
            x,
            y,
            rotation: 0.0,
            map,
            kind,
        }
    }

    pub fn with_rotation(mut self, rotation: Angle) -> Self {
        self.rotation = rotation.deg();
        self
    }

    #[inline]
    pub fn origin(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Discriminant of [`Shape`], used to index the narrow phase dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Rect = 0,
    Circle = 1,
    Capsule = 2,
    Triangle = 3,
}

impl ShapeKind {
    pub const COUNT: usize = 4;
}

/// Geometry of a collision shape relative to its top-left origin.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Shape {
    Rect { width: f32, height: f32 },
    Circle { radius: f32 },
    /// A vertical capsule `2 * radius` wide and `height` tall, caps included.
    Capsule { radius: f32, height: f32 },
    /// Triangle with one vertex at the origin and the other two at the given offsets.
    Triangle { b: Vec2, c: Vec2 },
}

impl Shape {
    #[inline]
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Rect { .. } => ShapeKind::Rect,
            Shape::Circle { .. } => ShapeKind::Circle,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::Triangle { .. } => ShapeKind::Triangle,
        }
    }

    /// Unrotated bounding box relative to the origin.
    pub fn local_bounds(&self) -> Rect {
        match *self {
            Shape::Rect { width, height } => Rect::new(0.0, 0.0, width, height),
            Shape::Circle { radius } => Rect::new(0.0, 0.0, 2.0 * radius, 2.0 * radius),
            Shape::Capsule { radius, height } => Rect::new(0.0, 0.0, 2.0 * radius, height),
            Shape::Triangle { b, c } => Rect::enclosing(&[Vec2::zero(), b, c]),
        }
    }
}

/// Placement of a shape in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Top-left origin of the shape.
    pub origin: Vec2,
    /// Rotation in degrees about `anchor`.
    pub rotation: f32,
    /// Rotation pivot relative to `origin`.
    pub anchor: Vec2,
}

impl Transform {
    #[inline]
    pub fn new(origin: Vec2, rotation: f32, anchor: Vec2) -> Self {
        Transform {
            origin,
            rotation,
            anchor,
        }
    }

    /// A transform without rotation.
    #[inline]
    pub fn at(x: f32, y: f32) -> Self {
        Transform::new(Vec2::new(x, y), 0.0, Vec2::zero())
    }

    #[inline]
    pub fn of(pos: &Position, shape: &CollisionShape) -> Self {
        Transform::new(pos.origin(), pos.rotation, shape.anchor)
    }

    #[inline]
    pub fn is_rotated(&self) -> bool {
        self.rotation != 0.0
    }

    /// Map a point from shape-local to world space.
    #[inline]
    pub fn point(&self, local: Vec2) -> Vec2 {
        if self.is_rotated() {
            self.origin + Rotation::new(Angle::Deg(self.rotation)).apply_about(local, self.anchor)
        } else {
            self.origin + local
        }
    }

    fn points<const N: usize>(&self, local: [Vec2; N]) -> [Vec2; N] {
        if self.is_rotated() {
            let rot = Rotation::new(Angle::Deg(self.rotation));
            local.map(|p| self.origin + rot.apply_about(p, self.anchor))
        } else {
            local.map(|p| self.origin + p)
        }
    }
}

/// World space vertices of a polygonal shape.
/// Triangles repeat their first vertex to fill the fourth slot.
pub type Quad = [Vec2; 4];

impl Shape {
    /// Polygon of a rect or triangle in world space.
    /// Round shapes give their rotated bounding box.
    pub fn quad(&self, t: &Transform) -> Quad {
        match *self {
            Shape::Triangle { b, c } => t.points([Vec2::zero(), b, c, Vec2::zero()]),
            _ => t.points(self.local_bounds().corners()),
        }
    }

    /// Center and radius of a circle in world space.
    pub fn circle(&self, t: &Transform) -> (Vec2, f32) {
        match *self {
            Shape::Circle { radius } => (t.point(Vec2::broadcast(radius)), radius),
            _ => {
                let b = self.local_bounds();
                (t.point(b.center()), b.width.max(b.height) * 0.5)
            }
        }
    }

    /// End points of the core segment and the radius of a capsule in world space.
    /// A capsule shorter than its width degenerates to a circle.
    pub fn capsule(&self, t: &Transform) -> (Vec2, Vec2, f32) {
        match *self {
            Shape::Capsule { radius, height } => {
                let half = (height * 0.5 - radius).max(0.0);
                let center = Vec2::new(radius, height * 0.5);
                let [top, bottom] = t.points([
                    center - Vec2::new(0.0, half),
                    center + Vec2::new(0.0, half),
                ]);
                (top, bottom, radius)
            }
            _ => {
                let (center, r) = self.circle(t);
                (center, center, r)
            }
        }
    }

    /// The four corners of the shape's local bounding box, rotated into world space.
    /// Used for grid insertion of rotated shapes.
    #[inline]
    pub fn corners(&self, t: &Transform) -> [Vec2; 4] {
        t.points(self.local_bounds().corners())
    }

    /// Axis-aligned bounds in world space, accounting for rotation.
    pub fn bounds(&self, t: &Transform) -> Rect {
        if !t.is_rotated() {
            let local = self.local_bounds();
            return Rect::new(t.origin.x + local.x, t.origin.y + local.y, local.width, local.height);
        }
        match *self {
            Shape::Circle { .. } => {
                let (center, r) = self.circle(t);
                Rect::new(center.x - r, center.y - r, 2.0 * r, 2.0 * r)
            }
            Shape::Capsule { .. } => {
                let (a, b, r) = self.capsule(t);
                let min = a.min_by_component(b) - Vec2::broadcast(r);
                let max = a.max_by_component(b) + Vec2::broadcast(r);
                Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
            }
            _ => Rect::enclosing(&self.quad(t)),
        }
    }
}

bitflags::bitflags! {
    /// Sides of an entity that were pushed on by accumulated collisions.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ContactDirs: u8 {
        const TOP = 1 << 0;
        const BOTTOM = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
    }
}

impl ContactDirs {
    /// The side facing along a normal.
    pub fn facing(normal: Vec2) -> Self {
        if normal.x.abs() >= normal.y.abs() {
            if normal.x > 0.0 {
                ContactDirs::RIGHT
            } else if normal.x < 0.0 {
                ContactDirs::LEFT
            } else {
                ContactDirs::empty()
            }
        } else if normal.y > 0.0 {
            ContactDirs::BOTTOM
        } else {
            ContactDirs::TOP
        }
    }
}

/// Collisions an entity chose to accumulate during the last tick it collided in.
/// Cleared when the entity is next inserted into the grid, so gameplay code
/// can read it between ticks, e.g. to see if something is standing on ground.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Contacts {
    pub dirs: ContactDirs,
    pub last: Option<CollisionInfo>,
    /// Contact point height of the last axis-aligned rect push on each side,
    /// indexed like [`Side`].
    edges: [Option<f32>; 4],
}

/// Side of an entity an axis-aligned push came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Top = 0,
    Bottom = 1,
    Left = 2,
    Right = 3,
}

impl Side {
    fn of(normal: Vec2) -> Option<Self> {
        match (normal.x, normal.y) {
            (x, y) if y == 0.0 && x > 0.0 => Some(Side::Right),
            (x, y) if y == 0.0 && x < 0.0 => Some(Side::Left),
            (x, y) if x == 0.0 && y > 0.0 => Some(Side::Bottom),
            (x, y) if x == 0.0 && y < 0.0 => Some(Side::Top),
            _ => None,
        }
    }

    #[inline]
    fn is_horizontal(self) -> bool {
        matches!(self, Side::Left | Side::Right)
    }

    #[inline]
    fn dir(self) -> ContactDirs {
        match self {
            Side::Top => ContactDirs::TOP,
            Side::Bottom => ContactDirs::BOTTOM,
            Side::Left => ContactDirs::LEFT,
            Side::Right => ContactDirs::RIGHT,
        }
    }
}

/// Contact points closer than this are on the same row of tiles.
const EDGE_EPSILON: f32 = 1e-3;

/// Collision component of an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct CollisionShape {
    pub shape: Shape,
    /// Rotation pivot relative to the top-left origin.
    pub anchor: Vec2,
    pub layer: LayerMask,
    #[cfg_attr(feature = "serde-types", serde(skip))]
    pub(crate) resolution: Vec2,
    #[cfg_attr(feature = "serde-types", serde(skip))]
    pub contacts: Contacts,
}

impl CollisionShape {
    pub fn new(shape: Shape) -> Self {
        CollisionShape {
            shape,
            anchor: Vec2::zero(),
            layer: LayerMask::default(),
            resolution: Vec2::zero(),
            contacts: Contacts::default(),
        }
    }

    pub fn rect(width: f32, height: f32) -> Self {
        Self::new(Shape::Rect { width, height })
    }

    pub fn circle(radius: f32) -> Self {
        Self::new(Shape::Circle { radius })
    }

    pub fn capsule(radius: f32, height: f32) -> Self {
        Self::new(Shape::Capsule { radius, height })
    }

    pub fn triangle(b: impl Into<Vec2>, c: impl Into<Vec2>) -> Self {
        Self::new(Shape::Triangle {
            b: b.into(),
            c: c.into(),
        })
    }

    pub fn with_anchor(mut self, anchor: impl Into<Vec2>) -> Self {
        self.anchor = anchor.into();
        self
    }

    /// Rotate about the center of the shape's bounds.
    pub fn with_centered_anchor(mut self) -> Self {
        self.anchor = self.shape.local_bounds().center();
        self
    }

    pub fn with_layer(mut self, layer: LayerMask) -> Self {
        self.layer = layer;
        self
    }

    /// Displacement that will be applied to the entity at the end of the current tick.
    #[inline]
    pub fn resolution(&self) -> Vec2 {
        self.resolution
    }

    /// Fold an accumulated collision into the pending resolution.
    ///
    /// The entity moves against the normal. Per axis, a push in the same direction
    /// as what's already pending keeps the larger of the two, opposite pushes add up.
    ///
    /// Against rects, a sideways push at the same height as a vertical one
    /// comes from the seam between two adjacent colliders, e.g. floor tiles,
    /// and is dropped so the entity doesn't snag on the seam.
    pub(crate) fn accumulate(&mut self, info: &CollisionInfo, other: ShapeKind) {
        if other == ShapeKind::Rect {
            if let Some(side) = Side::of(info.normal) {
                if !self.resolve_seam(side, info.point.y) {
                    return;
                }
                self.contacts.edges[side as usize] = Some(info.point.y);
            }
        }

        let push = -info.normal * info.penetration;
        self.resolution = Vec2::new(
            fold_axis(self.resolution.x, push.x),
            fold_axis(self.resolution.y, push.y),
        );
        self.contacts.dirs |= ContactDirs::facing(info.normal);
        self.contacts.last = Some(*info);
    }

    /// Returns false if the push should be ignored.
    fn resolve_seam(&mut self, side: Side, height: f32) -> bool {
        let on_edge = |edge: Option<f32>| edge.map_or(false, |e| (e - height).abs() < EDGE_EPSILON);
        let crossing = if side.is_horizontal() {
            [Side::Top, Side::Bottom]
        } else {
            [Side::Left, Side::Right]
        };
        for edge in crossing {
            if !on_edge(self.contacts.edges[edge as usize]) {
                continue;
            }
            if side.is_horizontal() {
                return false;
            }
            // a seam push already went in, take it back out
            self.resolution.x = 0.0;
            self.contacts.dirs.remove(edge.dir());
            self.contacts.edges[edge as usize] = None;
        }
        true
    }
}

#[inline]
fn fold_axis(pending: f32, push: f32) -> f32 {
    if pending * push > 0.0 {
        if pending.abs() >= push.abs() {
            pending
        } else {
            push
        }
    } else {
        pending + push
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(normal: Vec2, penetration: f32) -> CollisionInfo {
        CollisionInfo {
            is_colliding: true,
            normal,
            penetration,
            point: Vec2::zero(),
            accumulated: true,
        }
    }

    #[test]
    fn accumulate_keeps_max_or_sums() {
        let mut shape = CollisionShape::rect(10.0, 10.0);
        // pushed left by 2, then left by 3: larger wins
        shape.accumulate(&info(Vec2::unit_x(), 2.0), ShapeKind::Circle);
        shape.accumulate(&info(Vec2::unit_x(), 3.0), ShapeKind::Circle);
        assert_eq!(shape.resolution(), Vec2::new(-3.0, 0.0));
        // pushed right by 1: opposite directions add
        shape.accumulate(&info(-Vec2::unit_x(), 1.0), ShapeKind::Circle);
        assert_eq!(shape.resolution(), Vec2::new(-2.0, 0.0));
        // ground below
        shape.accumulate(&info(Vec2::unit_y(), 0.5), ShapeKind::Circle);
        assert_eq!(shape.resolution(), Vec2::new(-2.0, -0.5));
        assert_eq!(
            shape.contacts.dirs,
            ContactDirs::RIGHT | ContactDirs::LEFT | ContactDirs::BOTTOM
        );
    }

    fn hit_at(normal: Vec2, penetration: f32, point: Vec2) -> CollisionInfo {
        CollisionInfo {
            point,
            ..info(normal, penetration)
        }
    }

    #[test]
    fn tile_seams_do_not_push_sideways() {
        // standing on two floor tiles, overlapping the second one by 1 on x
        let floor = hit_at(Vec2::unit_y(), 2.0, Vec2::new(8.5, 17.0));
        let seam = hit_at(Vec2::unit_x(), 1.0, Vec2::new(16.5, 17.0));

        let mut shape = CollisionShape::rect(16.0, 16.0);
        shape.accumulate(&floor, ShapeKind::Rect);
        shape.accumulate(&seam, ShapeKind::Rect);
        assert_eq!(shape.resolution(), Vec2::new(0.0, -2.0));
        assert_eq!(shape.contacts.dirs, ContactDirs::BOTTOM);

        let mut shape = CollisionShape::rect(16.0, 16.0);
        shape.accumulate(&seam, ShapeKind::Rect);
        shape.accumulate(&floor, ShapeKind::Rect);
        assert_eq!(shape.resolution(), Vec2::new(0.0, -2.0));
        assert_eq!(shape.contacts.dirs, ContactDirs::BOTTOM);

        // a wall at a different height still pushes
        let wall = hit_at(Vec2::unit_x(), 1.0, Vec2::new(16.5, 9.0));
        shape.accumulate(&wall, ShapeKind::Rect);
        assert_eq!(shape.resolution(), Vec2::new(-1.0, -2.0));
        assert_eq!(shape.contacts.dirs, ContactDirs::BOTTOM | ContactDirs::RIGHT);

        // only rects form seams
        let mut shape = CollisionShape::rect(16.0, 16.0);
        shape.accumulate(&floor, ShapeKind::Circle);
        shape.accumulate(&seam, ShapeKind::Circle);
        assert_eq!(shape.resolution(), Vec2::new(-1.0, -2.0));
    }

    #[test]
    fn unrotated_bounds_match_local_bounds() {
        let t = Transform::at(3.0, 4.0);
        let tri = Shape::Triangle {
            b: Vec2::new(-2.0, 5.0),
            c: Vec2::new(6.0, 1.0),
        };
        assert_eq!(tri.bounds(&t), Rect::new(1.0, 4.0, 8.0, 5.0));
        let cap = Shape::Capsule {
            radius: 2.0,
            height: 10.0,
        };
        assert_eq!(cap.bounds(&t), Rect::new(3.0, 4.0, 4.0, 10.0));
        let (top, bottom, r) = cap.capsule(&t);
        assert_eq!((top, bottom, r), (Vec2::new(5.0, 6.0), Vec2::new(5.0, 12.0), 2.0));
    }

    #[test]
    fn rotated_rect_bounds_grow() {
        let shape = Shape::Rect {
            width: 10.0,
            height: 10.0,
        };
        let t = Transform::new(Vec2::zero(), 45.0, Vec2::new(5.0, 5.0));
        let b = shape.bounds(&t);
        let half_diag = 50.0f32.sqrt();
        assert!((b.x - (5.0 - half_diag)).abs() < 1e-4);
        assert!((b.width - 2.0 * half_diag).abs() < 1e-4);
        // rotating a circle about its own center changes nothing
        let circle = Shape::Circle { radius: 5.0 };
        let cb = circle.bounds(&t);
        assert!((cb.x).abs() < 1e-4 && (cb.width - 10.0).abs() < 1e-4);
    }

    #[test]
    fn rect_overlap_is_strict() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.overlaps(&Rect::new(9.0, 9.0, 10.0, 10.0)));
        assert!(!a.overlaps(&Rect::new(10.0, 0.0, 10.0, 10.0)));
        assert!(Rect::ZERO.is_empty());
    }
}
