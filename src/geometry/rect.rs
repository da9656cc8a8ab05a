use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{GroundingError, Result};

/// Integer rectangle stored as two corners.
///
/// The corners are kept exactly as given: `x1 <= x2` and `y1 <= y2` are not
/// required. Width, height and area are derived with absolute differences, so
/// they are never negative. Supported input formats:
/// - XYXY: two corners
/// - CXCYWH: center x, center y, width, height
/// - XYWH: top-left x, top-left y, width, height
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rectangle {
    /// Create a Rectangle from integer corners.
    #[inline]
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a Rectangle from two corners, truncating each coordinate toward zero.
    #[inline]
    pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32)
    }

    /// Create a Rectangle from CXCYWH format (center x, center y, width, height).
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Result<Self> {
        check_dimensions(w, h)?;
        Ok(Self::from_xyxy(
            cx - w / 2.0,
            cy - h / 2.0,
            cx + w / 2.0,
            cy + h / 2.0,
        ))
    }

    /// Create a Rectangle from XYWH format (top-left x, top-left y, width, height).
    pub fn from_xywh(top_left_x: f32, top_left_y: f32, w: f32, h: f32) -> Result<Self> {
        check_dimensions(w, h)?;
        Ok(Self::from_xyxy(
            top_left_x,
            top_left_y,
            top_left_x + w,
            top_left_y + h,
        ))
    }

    /// Horizontal extent, independent of corner order.
    #[inline]
    pub fn width(&self) -> u32 {
        self.x1.abs_diff(self.x2)
    }

    /// Vertical extent, independent of corner order.
    #[inline]
    pub fn height(&self) -> u32 {
        self.y1.abs_diff(self.y2)
    }

    /// Get the area of the rectangle.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Center measured from the first stored corner, clamped to `i32`.
    #[inline]
    pub fn center(&self) -> (i32, i32) {
        let offset = |start: i32, extent: u32| {
            let center = i64::from(start) + i64::from(extent / 2);
            center.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        };
        (offset(self.x1, self.width()), offset(self.y1, self.height()))
    }

    /// Corners as `(min_x, min_y, max_x, max_y)`.
    #[inline]
    pub fn to_corners_sorted(&self) -> (i32, i32, i32, i32) {
        (
            self.x1.min(self.x2),
            self.y1.min(self.y2),
            self.x1.max(self.x2),
            self.y1.max(self.y2),
        )
    }

    /// Overlap of two rectangles.
    ///
    /// Disjoint rectangles produce a zero-area rectangle anchored at the
    /// would-be top-left corner of the overlap, never a negative extent.
    pub fn intersect(&self, other: &Rectangle) -> Rectangle {
        let (ax1, ay1, ax2, ay2) = self.to_corners_sorted();
        let (bx1, by1, bx2, by2) = other.to_corners_sorted();

        let left = ax1.max(bx1);
        let top = ay1.max(by1);
        let right = ax2.min(bx2);
        let bottom = ay2.min(by2);

        Rectangle::new(left, top, left.max(right), top.max(bottom))
    }
}

fn check_dimensions(w: f32, h: f32) -> Result<()> {
    if w < 0.0 || h < 0.0 {
        return Err(GroundingError::InvalidDimension {
            width: w,
            height: h,
        });
    }
    Ok(())
}

/// Intersection over Union of two rectangles.
///
/// Returns 0 when either rectangle has no area.
pub fn iou(a: &Rectangle, b: &Rectangle) -> f64 {
    let (area_a, area_b) = (a.area(), b.area());
    if area_a == 0 || area_b == 0 {
        return 0.0;
    }
    let inter = a.intersect(b).area();
    inter as f64 / (area_a + area_b - inter) as f64
}

/// Calculate IoU matrix between two sets of rectangles.
///
/// Returns a matrix of shape (M, N) where M is the length of `boxes_a`
/// and N is the length of `boxes_b`.
pub fn iou_batch(boxes_a: &[Rectangle], boxes_b: &[Rectangle]) -> Array2<f64> {
    let mut ious = Array2::zeros((boxes_a.len(), boxes_b.len()));
    for (i, a) in boxes_a.iter().enumerate() {
        for (j, b) in boxes_b.iter().enumerate() {
            ious[[i, j]] = iou(a, b);
        }
    }
    ious
}
