//! Bundled [`PixelEngine`] built on `image`, `imageproc` and `palette`.

mod codec;
mod filters;
mod regions;
mod threshold;

use std::path::Path;

use image::{imageops::FilterType, DynamicImage, GrayImage};
use tracing::instrument;

pub(crate) use codec::normalize;

use super::{PixelEngine, RawRegion};
use crate::{
    error::Result,
    options::{ColorOptions, ContrastMode, GreyOptions, ResizeOptions, SaveOptions, ThresholdMethod},
};

/// Side of the square the average hash is computed on.
const HASH_SIDE: u32 = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageprocEngine;

impl ImageprocEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PixelEngine for ImageprocEngine {
    fn name(&self) -> &'static str {
        "imageproc"
    }

    fn load_path(&self, path: &Path) -> Result<DynamicImage> {
        codec::load_path(path)
    }

    fn load_encoded(&self, bytes: &[u8]) -> Result<DynamicImage> {
        codec::load_encoded(bytes)
    }

    fn save(&self, image: &DynamicImage, path: &Path, options: &SaveOptions) -> Result<()> {
        codec::save(image, path, options)
    }

    fn split_rgb(&self, image: &DynamicImage) -> Result<[GrayImage; 3]> {
        Ok(filters::split_rgb(image))
    }

    fn split_hsb(&self, image: &DynamicImage) -> Result<[GrayImage; 3]> {
        Ok(filters::split_hsb(image))
    }

    fn edge(&self, image: &DynamicImage) -> Result<DynamicImage> {
        Ok(filters::edge(image))
    }

    fn grey(&self, image: &DynamicImage, options: &GreyOptions) -> Result<GrayImage> {
        Ok(filters::grey(image, options))
    }

    fn texture(&self, image: &DynamicImage) -> Result<GrayImage> {
        Ok(filters::texture(image))
    }

    fn quantize_colors(&self, image: &DynamicImage, options: &ColorOptions) -> Result<DynamicImage> {
        Ok(filters::quantize_colors(image, options))
    }

    #[instrument(level = "debug", skip(self, image), fields(width = image.width(), height = image.height()))]
    fn threshold(&self, image: &GrayImage, method: ThresholdMethod, dark_background: bool) -> Result<GrayImage> {
        threshold::binarize(image, method, dark_background)
    }

    #[instrument(level = "debug", skip(self, mask), fields(width = mask.width(), height = mask.height()))]
    fn extract_regions(&self, mask: &GrayImage) -> Result<Vec<RawRegion>> {
        Ok(regions::extract(mask))
    }

    /// Average hash: bit set where the 8x8 bilinear thumbnail is darker
    /// than its mean, most significant bit first.
    fn compute_hash(&self, image: &DynamicImage) -> Result<u64> {
        let grey = image.to_luma8();
        let thumb = image::imageops::resize(&grey, HASH_SIDE, HASH_SIDE, FilterType::Triangle);
        let mean = thumb.pixels().map(|p| p.0[0] as f64).sum::<f64>() / (HASH_SIDE * HASH_SIDE) as f64;
        Ok(thumb
            .pixels()
            .fold(0u64, |hash, p| (hash << 1) | u64::from((p.0[0] as f64) < mean)))
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32, options: &ResizeOptions) -> Result<DynamicImage> {
        Ok(filters::resize(image, width, height, options))
    }

    fn contrast(&self, image: &DynamicImage, mode: ContrastMode) -> Result<DynamicImage> {
        Ok(filters::contrast(image, mode))
    }

    fn histogram(&self, image: &DynamicImage) -> Result<Vec<u32>> {
        Ok(filters::histogram(image))
    }

    fn color_histogram(&self, image: &DynamicImage, factor: u8) -> Result<Vec<u32>> {
        filters::color_histogram(image, factor)
    }

    fn reduce_colors(&self, image: &DynamicImage, factor: u8) -> Result<DynamicImage> {
        filters::reduce_colors(image, factor)
    }

    fn count_colors(&self, image: &DynamicImage) -> Result<usize> {
        filters::count_colors(image)
    }
}
