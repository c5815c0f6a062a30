//! Geometry aliases in Visio page space: inches, Y-up.

pub type Unit = euclid::UnknownUnit;

pub type Point = euclid::Point2D<f64, Unit>;
pub type Size = euclid::Size2D<f64, Unit>;
pub type Rect = euclid::Rect<f64, Unit>;

pub fn point(x: f64, y: f64) -> Point {
    euclid::point2(x, y)
}

pub fn size(w: f64, h: f64) -> Size {
    euclid::size2(w, h)
}

/// Axis-aligned bounding box accumulated from center/size pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Grow to cover a shape given its center and size.
    pub fn add_centered(&mut self, center: Point, size: Size) {
        self.min_x = self.min_x.min(center.x - size.width / 2.0);
        self.max_x = self.max_x.max(center.x + size.width / 2.0);
        self.min_y = self.min_y.min(center.y - size.height / 2.0);
        self.max_y = self.max_y.max(center.y + size.height / 2.0);
    }

    pub fn width(&self) -> f64 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max_y - self.min_y).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_accumulates_centered_boxes() {
        let mut b = Bounds::empty();
        assert!(b.is_empty());
        b.add_centered(point(2.0, 3.0), size(1.0, 1.0));
        b.add_centered(point(4.0, 1.0), size(2.0, 0.5));
        assert_eq!(b.min_x, 1.5);
        assert_eq!(b.max_x, 5.0);
        assert_eq!(b.min_y, 0.75);
        assert_eq!(b.max_y, 3.5);
        assert!((b.width() - 3.5).abs() < 1e-12);
    }
}
