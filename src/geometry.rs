//! Axis-aligned rectangles, overlap measures and batch box rescaling.

mod rect;
mod rescale;

pub use rect::{Rectangle, iou, iou_batch};
pub use rescale::{box_cxcywh_to_xyxy, rescale_boxes};
