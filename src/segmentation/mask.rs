use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use crate::models::BoundingBox;

/// Rasterize a polygon into a binary mask the size of the source image.
///
/// Returns `None` when fewer than three distinct vertices remain after
/// truncating to pixel coordinates.
pub fn rasterize(polygon: &[(f32, f32)], width: u32, height: u32) -> Option<GrayImage> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(polygon.len());
    for &(x, y) in polygon {
        let point = Point::new(x as i32, y as i32);
        if points.last() != Some(&point) {
            points.push(point);
        }
    }
    // draw_polygon_mut rejects an explicitly closed ring
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }

    let mut mask = GrayImage::new(width, height);
    draw_polygon_mut(&mut mask, &points, Luma([255u8]));
    Some(mask)
}

/// Tight bounds of the non-zero mask pixels
pub fn mask_bounds(mask: &GrayImage) -> Option<BoundingBox> {
    let (width, height) = mask.dimensions();
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut has_content = false;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > 0 {
            has_content = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !has_content {
        return None;
    }

    Some(BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Copy `bounds` out of `image`, blacking out every pixel the mask excludes
pub fn masked_crop(image: &DynamicImage, mask: &GrayImage, bounds: BoundingBox) -> DynamicImage {
    let rgb = image.to_rgb8();
    let cropped = RgbImage::from_fn(bounds.width, bounds.height, |x, y| {
        let (sx, sy) = (bounds.x + x, bounds.y + y);
        if mask.get_pixel(sx, sy)[0] > 0 {
            *rgb.get_pixel(sx, sy)
        } else {
            Rgb([0, 0, 0])
        }
    });
    DynamicImage::ImageRgb8(cropped)
}

/// Mask and crop one polygon out of `image`
pub fn crop_polygon(image: &DynamicImage, polygon: &[(f32, f32)]) -> Option<DynamicImage> {
    let (width, height) = image.dimensions();
    let mask = rasterize(polygon, width, height)?;
    let bounds = mask_bounds(&mask)?;
    Some(masked_crop(image, &mask, bounds))
}
