//! Fixtures shared by the unit tests.

use std::{
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::{
    engine::{ImageprocEngine, PixelEngine, RawRegion},
    error::Result,
    handle::ImageHandle,
    options::{ColorOptions, ContrastMode, GreyOptions, ResizeOptions, SaveOptions, ThresholdMethod},
};

/// Black grey image with white rectangles at `(x, y, width, height)`.
pub fn blobs(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> ImageHandle {
    let image = GrayImage::from_fn(width, height, |px, py| {
        let inside = rects
            .iter()
            .any(|&(x, y, w, h)| px >= x && px < x + w && py >= y && py < y + h);
        Luma([if inside { 255 } else { 0 }])
    });
    ImageHandle::new(DynamicImage::ImageLuma8(image))
}

/// Grey diagonal ramp, dark top-left to bright bottom-right.
pub fn gradient(width: u32, height: u32) -> ImageHandle {
    let span = (width + height).saturating_sub(2).max(1);
    let image = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) * 255 / span) as u8]));
    ImageHandle::new(DynamicImage::ImageLuma8(image))
}

/// Orange left half and blue right half with the same luma.
pub fn equal_luma_two_hue(width: u32, height: u32) -> ImageHandle {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([150, 100, 50])
        } else {
            Rgb([50, 120, 150])
        }
    });
    ImageHandle::new(DynamicImage::ImageRgb8(image))
}

/// Bundled engine that counts every call made through the trait.
#[derive(Debug, Default)]
pub struct CountingEngine {
    inner: ImageprocEngine,
    calls: AtomicUsize,
}

impl CountingEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tick(&self) -> &ImageprocEngine {
        self.calls.fetch_add(1, Ordering::SeqCst);
        &self.inner
    }
}

impl PixelEngine for CountingEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn load_path(&self, path: &Path) -> Result<DynamicImage> {
        self.tick().load_path(path)
    }

    fn load_encoded(&self, bytes: &[u8]) -> Result<DynamicImage> {
        self.tick().load_encoded(bytes)
    }

    fn save(&self, image: &DynamicImage, path: &Path, options: &SaveOptions) -> Result<()> {
        self.tick().save(image, path, options)
    }

    fn split_rgb(&self, image: &DynamicImage) -> Result<[GrayImage; 3]> {
        self.tick().split_rgb(image)
    }

    fn split_hsb(&self, image: &DynamicImage) -> Result<[GrayImage; 3]> {
        self.tick().split_hsb(image)
    }

    fn edge(&self, image: &DynamicImage) -> Result<DynamicImage> {
        self.tick().edge(image)
    }

    fn grey(&self, image: &DynamicImage, options: &GreyOptions) -> Result<GrayImage> {
        self.tick().grey(image, options)
    }

    fn texture(&self, image: &DynamicImage) -> Result<GrayImage> {
        self.tick().texture(image)
    }

    fn quantize_colors(&self, image: &DynamicImage, options: &ColorOptions) -> Result<DynamicImage> {
        self.tick().quantize_colors(image, options)
    }

    fn threshold(&self, image: &GrayImage, method: ThresholdMethod, dark_background: bool) -> Result<GrayImage> {
        self.tick().threshold(image, method, dark_background)
    }

    fn extract_regions(&self, mask: &GrayImage) -> Result<Vec<RawRegion>> {
        self.tick().extract_regions(mask)
    }

    fn compute_hash(&self, image: &DynamicImage) -> Result<u64> {
        self.tick().compute_hash(image)
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32, options: &ResizeOptions) -> Result<DynamicImage> {
        self.tick().resize(image, width, height, options)
    }

    fn contrast(&self, image: &DynamicImage, mode: ContrastMode) -> Result<DynamicImage> {
        self.tick().contrast(image, mode)
    }

    fn histogram(&self, image: &DynamicImage) -> Result<Vec<u32>> {
        self.tick().histogram(image)
    }

    fn color_histogram(&self, image: &DynamicImage, factor: u8) -> Result<Vec<u32>> {
        self.tick().color_histogram(image, factor)
    }

    fn reduce_colors(&self, image: &DynamicImage, factor: u8) -> Result<DynamicImage> {
        self.tick().reduce_colors(image, factor)
    }

    fn count_colors(&self, image: &DynamicImage) -> Result<usize> {
        self.tick().count_colors(image)
    }
}
