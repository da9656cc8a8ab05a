//! Batch conversion of normalized detector boxes to pixel corners.

use ndarray::{Array1, Array2, ArrayView2, Zip};

use crate::error::{GroundingError, Result};

/// Convert an (N, 4) array of CXCYWH boxes to XYXY corners.
pub fn box_cxcywh_to_xyxy(boxes: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    if boxes.ncols() != 4 {
        return Err(GroundingError::InvalidBoxShape(boxes.ncols()));
    }
    let mut corners = Array2::zeros(boxes.raw_dim());
    Zip::from(corners.rows_mut())
        .and(boxes.rows())
        .for_each(|mut dst, src| {
            let (cx, cy, w, h) = (src[0], src[1], src[2], src[3]);
            dst[0] = cx - 0.5 * w;
            dst[1] = cy - 0.5 * h;
            dst[2] = cx + 0.5 * w;
            dst[3] = cy + 0.5 * h;
        });
    Ok(corners)
}

/// Scale normalized CXCYWH boxes to XYXY pixel coordinates of an image of
/// `(width, height)`.
///
/// Boxes are converted to corners in normalized space first, then scaled.
pub fn rescale_boxes(boxes: ArrayView2<'_, f32>, size: (u32, u32)) -> Result<Array2<f32>> {
    let (img_w, img_h) = (size.0 as f32, size.1 as f32);
    let mut corners = box_cxcywh_to_xyxy(boxes)?;
    corners *= &Array1::from(vec![img_w, img_h, img_w, img_h]);
    Ok(corners)
}
