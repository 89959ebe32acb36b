//! Pixel geometry tagged with the coordinate space it lives in.
//!
//! Crop math runs inside the *safe area* (the source frame minus any
//! letterbox/pillarbox bars) while everything persisted or exported uses
//! absolute frame pixels. [`Point`] and [`Rect`] carry a zero-sized space
//! marker so the two cannot be mixed, and [`SafeArea`] owns the only
//! conversions between them.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Marker trait for coordinate spaces.
pub trait CoordinateSpace: Copy + Default + fmt::Debug + PartialEq {}

/// Absolute source-frame pixels, origin at the top-left of the decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frame;

/// Pixels relative to the safe-area origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafeRelative;

impl CoordinateSpace for Frame {}
impl CoordinateSpace for SafeRelative {}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// `width / height`, or 0 for a degenerate size.
    pub fn aspect(&self) -> f64 {
        if self.height <= 0.0 {
            0.0
        } else {
            self.width / self.height
        }
    }
}

/// A 2D pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Point<S: CoordinateSpace = Frame> {
    pub x: f64,
    pub y: f64,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S: CoordinateSpace> Point<S> {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            space: PhantomData,
        }
    }

    /// Euclidean distance to another point in the same space.
    pub fn distance_to(&self, other: &Point<S>) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Offset by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Rect<S: CoordinateSpace = Frame> {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip)]
    space: PhantomData<S>,
}

impl<S: CoordinateSpace> Rect<S> {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            space: PhantomData,
        }
    }

    /// Rectangle of the given size anchored at the origin.
    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    /// Rectangle of `size` with its top-left at `origin`.
    pub fn at(origin: Point<S>, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn origin(&self) -> Point<S> {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// The center point of this rectangle.
    pub fn center(&self) -> Point<S> {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Check if a point is within this rectangle (edges inclusive).
    pub fn contains(&self, p: &Point<S>) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Smallest rectangle enclosing both.
    pub fn union(&self, other: &Rect<S>) -> Rect<S> {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Minimal bounding box of a set of rectangles, `None` when empty.
    pub fn bounding<'a, I>(rects: I) -> Option<Rect<S>>
    where
        I: IntoIterator<Item = &'a Rect<S>>,
        S: 'a,
    {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(b) => Some(b.union(r)),
        })
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

/// Clamp a desired crop top-left so a `crop` sized window stays inside a
/// `bounds` sized area anchored at the origin. The lower bound of 0 wins
/// when the crop is larger than the bounds.
pub fn clamp_crop_origin<S: CoordinateSpace>(desired: Point<S>, bounds: Size, crop: Size) -> Point<S> {
    let max_x = (bounds.width - crop.width).max(0.0);
    let max_y = (bounds.height - crop.height).max(0.0);
    Point::new(desired.x.clamp(0.0, max_x), desired.y.clamp(0.0, max_y))
}

/// The sub-rectangle of a source frame that excludes black bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafeArea {
    rect: Rect<Frame>,
}

impl SafeArea {
    pub fn new(rect: Rect<Frame>) -> Self {
        Self { rect }
    }

    /// Safe area covering the whole source frame.
    pub fn full_frame(source: Size) -> Self {
        Self::new(Rect::from_size(source))
    }

    /// The safe area in absolute frame coordinates.
    pub fn rect(&self) -> Rect<Frame> {
        self.rect
    }

    /// Safe-area dimensions (the bounds every relative computation uses).
    pub fn size(&self) -> Size {
        self.rect.size()
    }

    pub fn to_relative_point(&self, p: Point<Frame>) -> Point<SafeRelative> {
        Point::new(p.x - self.rect.x, p.y - self.rect.y)
    }

    pub fn to_absolute_point(&self, p: Point<SafeRelative>) -> Point<Frame> {
        Point::new(p.x + self.rect.x, p.y + self.rect.y)
    }

    pub fn to_relative_rect(&self, r: Rect<Frame>) -> Rect<SafeRelative> {
        Rect::new(r.x - self.rect.x, r.y - self.rect.y, r.width, r.height)
    }

    pub fn to_absolute_rect(&self, r: Rect<SafeRelative>) -> Rect<Frame> {
        Rect::new(r.x + self.rect.x, r.y + self.rect.y, r.width, r.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_center_and_edges() {
        let r: Rect = Rect::new(100.0, 50.0, 200.0, 100.0);
        assert_eq!(r.center(), Point::new(200.0, 100.0));
        assert_eq!(r.right(), 300.0);
        assert_eq!(r.bottom(), 150.0);
        assert!(r.contains(&Point::new(300.0, 150.0)));
        assert!(!r.contains(&Point::new(301.0, 150.0)));
    }

    #[test]
    fn test_bounding_box_of_spread_regions() {
        let rects: Vec<Rect> = vec![
            Rect::new(50.0, 100.0, 100.0, 100.0),
            Rect::new(850.0, 300.0, 100.0, 120.0),
        ];
        let bbox = Rect::bounding(&rects).unwrap();
        assert_eq!(bbox, Rect::new(50.0, 100.0, 900.0, 320.0));
        assert!(Rect::<Frame>::bounding(&[]).is_none());
    }

    #[test]
    fn test_clamp_keeps_crop_inside_bounds() {
        let bounds = Size::new(1000.0, 1000.0);
        let crop = Size::new(400.0, 400.0);
        let p: Point = clamp_crop_origin(Point::new(-20.0, 900.0), bounds, crop);
        assert_eq!(p, Point::new(0.0, 600.0));
    }

    #[test]
    fn test_clamp_oversized_crop_pins_to_origin() {
        let p: Point = clamp_crop_origin(
            Point::new(30.0, 30.0),
            Size::new(100.0, 100.0),
            Size::new(200.0, 50.0),
        );
        assert_eq!(p, Point::new(0.0, 30.0));
    }

    #[test]
    fn test_safe_area_translation_applies_offset_once() {
        let safe = SafeArea::new(Rect::new(0.0, 140.0, 1920.0, 800.0));
        let abs: Point = Point::new(960.0, 540.0);
        let rel = safe.to_relative_point(abs);
        assert_eq!(rel, Point::new(960.0, 400.0));
        assert_eq!(safe.to_absolute_point(rel), abs);

        let region: Rect = Rect::new(10.0, 150.0, 20.0, 20.0);
        let rel_region = safe.to_relative_rect(region);
        assert_eq!(rel_region.y, 10.0);
        assert_eq!(safe.to_absolute_rect(rel_region), region);
    }

    #[test]
    fn test_point_serializes_without_space_marker() {
        let p: Point = Point::new(1.5, 2.0);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"x":1.5,"y":2.0}"#);
        let back: Point = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_point_distance() {
        let a: Point = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
    }
}
