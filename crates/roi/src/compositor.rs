//! Crops, cut-outs and painted overlays.

use image::{DynamicImage, Rgb, RgbaImage};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};
use tracing::{debug, instrument};

use crate::{
    error::{Result, RoiError},
    extractor::detect,
    handle::ImageHandle,
    options::PaintOptions,
    types::Region,
};

/// Validate a crop request against a `image_width` x `image_height` image
/// and clamp its extent. The origin must lie inside the image.
pub(crate) fn clamp_rect(
    image_width: u32,
    image_height: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<(u32, u32, u32, u32)> {
    if x >= image_width || y >= image_height || width == 0 || height == 0 {
        return Err(RoiError::OutOfBounds {
            x,
            y,
            width,
            height,
            image_width,
            image_height,
        });
    }
    Ok((x, y, width.min(image_width - x), height.min(image_height - y)))
}

fn cropped(source: &ImageHandle, x: u32, y: u32, width: u32, height: u32) -> Result<ImageHandle> {
    let (x, y, width, height) = clamp_rect(source.width(), source.height(), x, y, width, height)?;
    let pixels = source.pixels().crop_imm(x, y, width, height);
    let stencil = source
        .stencil()
        .map(|stencil| image::imageops::crop_imm(stencil, x, y, width, height).to_image());
    Ok(source.derive(pixels, stencil))
}

pub(crate) fn crop_in_place(handle: &mut ImageHandle, x: u32, y: u32, width: u32, height: u32) -> Result<()> {
    let crop = cropped(handle, x, y, width, height)?;
    let stencil = crop.stencil().cloned();
    handle.replace_all(crop.into_pixels(), stencil);
    Ok(())
}

/// One crop per region bounding box, in region order. Fails as a whole if
/// any region starts outside the image.
#[instrument(level = "debug", skip_all, fields(regions = regions.len()))]
pub fn split(source: &ImageHandle, regions: &[Region]) -> Result<Vec<ImageHandle>> {
    regions
        .iter()
        .map(|region| cropped(source, region.x(), region.y(), region.width(), region.height()))
        .collect()
}

/// RGBA copy of `source`, opaque on `mask`'s foreground and fully
/// transparent elsewhere.
pub fn transparent_composite(source: &ImageHandle, mask: &ImageHandle) -> Result<ImageHandle> {
    if (mask.width(), mask.height()) != (source.width(), source.height()) {
        return Err(RoiError::DimensionMismatch {
            mask_width: mask.width(),
            mask_height: mask.height(),
            image_width: source.width(),
            image_height: source.height(),
        });
    }
    let foreground = mask.foreground();
    let mut rgba: RgbaImage = source.pixels().to_rgba8();
    for (pixel, mark) in rgba.pixels_mut().zip(foreground.pixels()) {
        pixel.0[3] = if mark.0[0] > 0 { 255 } else { 0 };
    }
    Ok(source.derive(DynamicImage::ImageRgba8(rgba), Some(foreground)))
}

pub fn paint_mask(source: &ImageHandle, mask: &ImageHandle, options: &PaintOptions) -> Result<ImageHandle> {
    let regions = detect(mask)?;
    debug!(regions = regions.len(), "painting mask outlines");
    paint_regions(source, &regions, options)
}

/// Paint region outlines, and optionally fills, onto an RGB copy of `source`.
pub fn paint_regions(source: &ImageHandle, regions: &[Region], options: &PaintOptions) -> Result<ImageHandle> {
    if regions.is_empty() {
        return Ok(source.duplicate());
    }

    let mut canvas = source.pixels().to_rgb8();
    let (width, height) = canvas.dimensions();

    if let Some(fill) = options.fill_color {
        for region in regions {
            for (x, y) in region.pixels().filter(|&(x, y)| x < width && y < height) {
                canvas.put_pixel(x, y, Rgb(fill.0));
            }
        }
    }

    if options.stroke_size > 0 {
        let size = options.stroke_size;
        let half = ((size - 1) / 2) as i32;
        let stroke = Rgb(options.stroke_color.0);
        for region in regions {
            for (x, y) in region.outline() {
                let square = Rect::at(x as i32 - half, y as i32 - half).of_size(size, size);
                draw_filled_rect_mut(&mut canvas, square, stroke);
            }
        }
    }

    Ok(source.derive(DynamicImage::ImageRgb8(canvas), source.stencil().cloned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        handle::MaskOrRegions,
        options::{Color, RegionFilterSpec},
        test_support::{blobs, gradient},
    };
    use image::GrayImage;

    #[test]
    fn crop_clamps_the_extent() {
        let mut image = gradient(100, 100);
        image.crop(0, 0, 10_000, 10_000).unwrap();
        assert_eq!((image.width(), image.height()), (100, 100));

        let mut image = gradient(100, 100);
        image.crop(90, 95, 50, 50).unwrap();
        assert_eq!((image.width(), image.height()), (10, 5));
    }

    #[test]
    fn crop_rejects_origins_outside() {
        let mut image = gradient(100, 100);
        let err = image.crop(100, 0, 5, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        let err = image.crop(10, 10, 0, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        assert_eq!(image.width(), 100);
    }

    #[test]
    fn crop_carries_the_stencil() {
        let image = blobs(50, 50, &[(10, 10, 10, 10)]);
        let mut mask = image.create_mask(&Default::default()).unwrap();
        mask.crop(5, 5, 20, 20).unwrap();
        let stencil = mask.stencil().unwrap();
        assert_eq!(stencil.dimensions(), (20, 20));
        assert_eq!(stencil.get_pixel(5, 5).0[0], 255);
        assert_eq!(stencil.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn split_crops_paste_back_onto_the_source() {
        let source = gradient(120, 80);
        let regions = vec![Region::rectangle(3, 4, 30, 20), Region::rectangle(60, 40, 50, 30)];
        let crops = split(&source, &regions).unwrap();
        assert_eq!(crops.len(), 2);

        let mut rebuilt = GrayImage::new(120, 80);
        for (region, crop) in regions.iter().zip(&crops) {
            image::imageops::replace(&mut rebuilt, &crop.pixels().to_luma8(), region.x() as i64, region.y() as i64);
        }
        let original = source.pixels().to_luma8();
        for region in &regions {
            for (x, y) in region.pixels() {
                assert_eq!(rebuilt.get_pixel(x, y), original.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn split_fails_whole_on_a_bad_region() {
        let source = gradient(50, 50);
        let regions = vec![Region::rectangle(0, 0, 10, 10), Region::rectangle(60, 0, 5, 5)];
        assert_eq!(split(&source, &regions).unwrap_err().kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn split_accepts_regions_from_another_image() {
        let mask_source = blobs(64, 64, &[(4, 4, 8, 8), (30, 30, 16, 4)]);
        let mask = mask_source.create_mask(&Default::default()).unwrap();
        let regions = mask.regions(&RegionFilterSpec::default()).unwrap();

        let other = gradient(64, 64);
        let crops = other.split(&regions, &RegionFilterSpec::default()).unwrap();
        let sizes: Vec<(u32, u32)> = crops.iter().map(|c| (c.width(), c.height())).collect();
        assert_eq!(sizes, vec![(8, 8), (16, 4)]);
        let via_mask = other.split(MaskOrRegions::Mask(&mask), &RegionFilterSpec::default()).unwrap();
        assert_eq!(via_mask.len(), 2);
    }

    #[test]
    fn transparent_alpha_follows_the_mask() {
        let image = blobs(30, 30, &[(5, 5, 10, 10)]);
        let mask = image.create_mask(&Default::default()).unwrap();
        let cutout = transparent_composite(&gradient(30, 30), &mask).unwrap();
        let rgba = cutout.pixels().to_rgba8();
        assert_eq!(rgba.get_pixel(7, 7).0[3], 255);
        assert_eq!(rgba.get_pixel(20, 20).0[3], 0);
        assert_eq!(rgba.get_pixel(7, 7).0[0], gradient(30, 30).pixels().to_luma8().get_pixel(7, 7).0[0]);
    }

    #[test]
    fn transparent_rejects_mismatched_masks() {
        let mask = blobs(10, 10, &[(1, 1, 2, 2)]);
        let err = transparent_composite(&gradient(20, 20), &mask).unwrap_err();
        assert!(matches!(err, RoiError::DimensionMismatch { mask_width: 10, .. }));
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn painting_nothing_is_an_identical_copy() {
        let source = gradient(40, 40);
        let painted = paint_regions(&source, &[], &PaintOptions::default()).unwrap();
        assert_eq!(painted.pixels(), source.pixels());
        assert_eq!(painted.channel_count(), 1);
    }

    #[test]
    fn outline_is_stamped_and_interior_untouched() {
        let source = blobs(40, 40, &[]);
        let region = Region::rectangle(10, 10, 12, 12);
        let options = PaintOptions {
            stroke_size: 1,
            ..Default::default()
        };
        let painted = source.paint_region(&region, &options).unwrap().pixels().to_rgb8();
        assert_eq!(painted.get_pixel(10, 15).0, [255, 0, 0]);
        assert_eq!(painted.get_pixel(15, 15).0, [0, 0, 0]);
        assert_eq!(painted.get_pixel(9, 15).0, [0, 0, 0]);

        let thick = PaintOptions {
            stroke_size: 3,
            fill_color: Some(Color([0, 0, 255])),
            ..Default::default()
        };
        let painted = source.paint_region(&region, &thick).unwrap().pixels().to_rgb8();
        assert_eq!(painted.get_pixel(9, 15).0, [255, 0, 0]);
        assert_eq!(painted.get_pixel(15, 15).0, [0, 0, 255]);
    }

    #[test]
    fn paint_mask_outlines_each_blob() {
        let source = blobs(40, 40, &[(5, 5, 6, 6), (25, 25, 6, 6)]);
        let mask = source.create_mask(&Default::default()).unwrap();
        let painted = paint_mask(&source, &mask, &PaintOptions::default()).unwrap().pixels().to_rgb8();
        assert_eq!(painted.get_pixel(5, 8).0, [255, 0, 0]);
        assert_eq!(painted.get_pixel(25, 28).0, [255, 0, 0]);
        assert_eq!(painted.get_pixel(18, 18).0, [0, 0, 0]);
    }
}
