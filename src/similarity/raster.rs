//! Raster helpers shared by the similarity metrics: grayscale conversion,
//! bilinear resampling, and the fast-profile downsample.

use crate::types::{ColorSpace, RasterImage};

/// Collapses an RGB image to single-channel luminance. Gray input is
/// returned as a plain copy.
pub fn to_gray(image: &RasterImage) -> RasterImage {
    if image.colorspace() == ColorSpace::Gray {
        return image.clone();
    }

    let width = image.width();
    let height = image.height();
    let mut data = Vec::with_capacity(image.pixel_count());
    for y in 0..height {
        for x in 0..width {
            data.push(image.luma(x, y));
        }
    }
    // Dimensions and length are consistent by construction
    RasterImage::new(width, height, ColorSpace::Gray, data)
        .unwrap_or_else(|_| image.clone())
}

/// Bilinear resample to the requested dimensions, preserving colorspace.
pub fn resize_bilinear(image: &RasterImage, new_width: u32, new_height: u32) -> RasterImage {
    if new_width == image.width() && new_height == image.height() {
        return image.clone();
    }

    let channels = image.colorspace().channels();
    let src_w = image.width() as f64;
    let src_h = image.height() as f64;
    let x_ratio = if new_width > 1 { (src_w - 1.0) / (new_width as f64 - 1.0) } else { 0.0 };
    let y_ratio = if new_height > 1 { (src_h - 1.0) / (new_height as f64 - 1.0) } else { 0.0 };

    let mut data = Vec::with_capacity(new_width as usize * new_height as usize * channels);
    for y in 0..new_height {
        let sy = y as f64 * y_ratio;
        let y0 = sy.floor() as u32;
        let y1 = (y0 + 1).min(image.height() - 1);
        let fy = sy - y0 as f64;

        for x in 0..new_width {
            let sx = x as f64 * x_ratio;
            let x0 = sx.floor() as u32;
            let x1 = (x0 + 1).min(image.width() - 1);
            let fx = sx - x0 as f64;

            match image.colorspace() {
                ColorSpace::Gray => {
                    data.push(lerp2(
                        image.luma(x0, y0), image.luma(x1, y0),
                        image.luma(x0, y1), image.luma(x1, y1),
                        fx, fy,
                    ));
                }
                ColorSpace::Rgb => {
                    let tl = image.rgb(x0, y0);
                    let tr = image.rgb(x1, y0);
                    let bl = image.rgb(x0, y1);
                    let br = image.rgb(x1, y1);
                    for c in 0..3 {
                        data.push(lerp2(tl[c], tr[c], bl[c], br[c], fx, fy));
                    }
                }
            }
        }
    }

    RasterImage::new(new_width, new_height, image.colorspace(), data)
        .unwrap_or_else(|_| image.clone())
}

#[inline]
fn lerp2(tl: u8, tr: u8, bl: u8, br: u8, fx: f64, fy: f64) -> u8 {
    let top = tl as f64 + (tr as f64 - tl as f64) * fx;
    let bottom = bl as f64 + (br as f64 - bl as f64) * fx;
    (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8
}

/// Shrinks the image so its larger dimension fits `max_dim`, preserving
/// aspect ratio. Images already small enough come back unchanged.
pub fn downsample_to_fit(image: &RasterImage, max_dim: u32) -> RasterImage {
    let largest = image.width().max(image.height());
    if largest <= max_dim {
        return image.clone();
    }
    let scale = max_dim as f64 / largest as f64;
    let new_w = ((image.width() as f64 * scale).round() as u32).max(1);
    let new_h = ((image.height() as f64 * scale).round() as u32).max(1);
    resize_bilinear(image, new_w, new_h)
}

#[cfg(test)]
pub(crate) fn solid(width: u32, height: u32, value: u8) -> RasterImage {
    RasterImage::new(
        width,
        height,
        ColorSpace::Gray,
        vec![value; width as usize * height as usize],
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorSpace, RasterImage};

    #[test]
    fn gray_conversion_uses_luminance_weights() {
        let img = RasterImage::new(1, 1, ColorSpace::Rgb, vec![255, 0, 0]).unwrap();
        let gray = to_gray(&img);
        assert_eq!(gray.colorspace(), ColorSpace::Gray);
        // 0.299 * 255 ~= 76
        assert_eq!(gray.luma(0, 0), 76);
    }

    #[test]
    fn resize_preserves_solid_color() {
        let img = solid(10, 10, 128);
        let resized = resize_bilinear(&img, 4, 7);
        assert_eq!(resized.width(), 4);
        assert_eq!(resized.height(), 7);
        assert!(resized.data().iter().all(|&p| p == 128));
    }

    #[test]
    fn downsample_respects_aspect_ratio() {
        let img = solid(200, 100, 50);
        let small = downsample_to_fit(&img, 50);
        assert_eq!(small.width(), 50);
        assert_eq!(small.height(), 25);

        let untouched = downsample_to_fit(&img, 400);
        assert_eq!(untouched.width(), 200);
    }
}
