//! The pixel engine seam.
//!
//! Everything numeric lives behind [`PixelEngine`]: codecs, colour-space
//! splits, filters, threshold selection, connected-component labelling and
//! the perceptual hash. The rest of the crate only orchestrates calls to it,
//! so an alternative backend can be dropped in by implementing the trait.

pub mod imageproc;

use std::path::Path;

use image::{DynamicImage, GrayImage};

pub use self::imageproc::ImageprocEngine;
use crate::{
    error::Result,
    options::{ColorOptions, ContrastMode, GreyOptions, ResizeOptions, SaveOptions, ThresholdMethod},
    types::Span,
};

/// A connected foreground component as reported by the engine, before any
/// statistics are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRegion {
    /// `(x, y, width, height)` of the bounding box.
    pub bounds: (u32, u32, u32, u32),
    /// Member pixels as horizontal runs, in raster order.
    pub spans: Vec<Span>,
    /// Length of the outer boundary in pixels.
    pub contour_length: f64,
}

/// Capability set consumed by [`ImageHandle`](crate::ImageHandle) and the
/// components built on it.
///
/// Implementations must be stateless with respect to the images they are
/// given: every method takes its inputs by reference and returns new buffers.
pub trait PixelEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Decode the file at `path`.
    fn load_path(&self, path: &Path) -> Result<DynamicImage>;

    /// Decode an in-memory encoded image (PNG, JPEG, ...).
    fn load_encoded(&self, bytes: &[u8]) -> Result<DynamicImage>;

    /// Encode `image` to `path`, choosing the format from the extension.
    fn save(&self, image: &DynamicImage, path: &Path, options: &SaveOptions) -> Result<()>;

    /// Red, green and blue planes.
    fn split_rgb(&self, image: &DynamicImage) -> Result<[GrayImage; 3]>;

    /// Hue, saturation and brightness planes, each scaled to `0..=255`.
    fn split_hsb(&self, image: &DynamicImage) -> Result<[GrayImage; 3]>;

    /// Gradient magnitude, same colour type as the input.
    fn edge(&self, image: &DynamicImage) -> Result<DynamicImage>;

    /// Luminance reduced to `options.levels` evenly spaced grey levels.
    fn grey(&self, image: &DynamicImage, options: &GreyOptions) -> Result<GrayImage>;

    /// Local texture descriptor, one byte per pixel.
    fn texture(&self, image: &DynamicImage) -> Result<GrayImage>;

    /// Reduce the palette to at most `options.colors` colours.
    fn quantize_colors(&self, image: &DynamicImage, options: &ColorOptions) -> Result<DynamicImage>;

    /// Binarize with an automatically selected level.
    ///
    /// The result holds 255 on foreground and 0 elsewhere. With
    /// `dark_background` the foreground is every pixel above the level,
    /// otherwise every pixel at or below it.
    fn threshold(&self, image: &GrayImage, method: ThresholdMethod, dark_background: bool) -> Result<GrayImage>;

    /// 8-connected components of the non-zero pixels of `mask`, in raster
    /// order of their first pixel.
    fn extract_regions(&self, mask: &GrayImage) -> Result<Vec<RawRegion>>;

    /// 64-bit perceptual hash.
    fn compute_hash(&self, image: &DynamicImage) -> Result<u64>;

    fn resize(&self, image: &DynamicImage, width: u32, height: u32, options: &ResizeOptions)
    -> Result<DynamicImage>;

    fn contrast(&self, image: &DynamicImage, mode: ContrastMode) -> Result<DynamicImage>;

    /// 256-bin intensity histogram (luminance for colour images).
    fn histogram(&self, image: &DynamicImage) -> Result<Vec<u32>>;

    /// Histogram over the top `factor` bits of each RGB channel,
    /// `2^(3 * factor)` bins.
    fn color_histogram(&self, image: &DynamicImage, factor: u8) -> Result<Vec<u32>>;

    /// Keep the top `factor` bits of each RGB channel.
    fn reduce_colors(&self, image: &DynamicImage, factor: u8) -> Result<DynamicImage>;

    /// Number of distinct colours at 5 bits per channel.
    fn count_colors(&self, image: &DynamicImage) -> Result<usize>;
}
