use std::{fmt, path::Path, sync::Arc};

use base64::Engine as _;
use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage, Luma};
use tracing::{debug, instrument};

use crate::{
    analysis,
    compositor,
    engine::{imageproc::normalize, ImageprocEngine, PixelEngine},
    error::{Result, RoiError},
    extractor::{RegionExtractor, RegionSource},
    hash::Fingerprint,
    mask_builder::MaskBuilder,
    options::{
        ColorOptions, ContrastOptions, GreyOptions, MaskOptions, MaskSpec, PaintOptions, RegionFilterSpec,
        ResizeOptions, ResizeSpec, SaveOptions,
    },
    types::{Region, RegionStats},
};

/// One in-memory image together with the engine that operates on it.
///
/// Pixel buffers are always 8-bit grey, RGB or RGBA. A handle may carry a
/// stencil: the binary foreground recorded when the handle was produced as
/// a mask. Derived handles own their own buffers; nothing is aliased.
#[derive(Clone)]
pub struct ImageHandle {
    engine: Arc<dyn PixelEngine>,
    pixels: DynamicImage,
    stencil: Option<GrayImage>,
}

/// Where regions come from when an operation accepts either.
#[derive(Debug, Clone, Copy)]
pub enum MaskOrRegions<'a> {
    /// Extract from this mask's foreground.
    Mask(&'a ImageHandle),
    /// Use an existing region list.
    Regions(&'a [Region]),
    /// Build a default mask from the receiver first.
    None,
}

impl<'a> From<&'a ImageHandle> for MaskOrRegions<'a> {
    fn from(mask: &'a ImageHandle) -> Self {
        Self::Mask(mask)
    }
}

impl<'a> From<&'a [Region]> for MaskOrRegions<'a> {
    fn from(regions: &'a [Region]) -> Self {
        Self::Regions(regions)
    }
}

impl<'a> From<&'a Vec<Region>> for MaskOrRegions<'a> {
    fn from(regions: &'a Vec<Region>) -> Self {
        Self::Regions(regions)
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("engine", &self.engine.name())
            .field("width", &self.width())
            .field("height", &self.height())
            .field("channels", &self.channel_count())
            .field("stencil", &self.stencil.is_some())
            .finish()
    }
}

fn default_engine() -> Arc<dyn PixelEngine> {
    Arc::new(ImageprocEngine)
}

impl ImageHandle {
    /// Wrap an existing buffer, using the bundled engine.
    pub fn new(pixels: DynamicImage) -> Self {
        Self::with_engine(default_engine(), pixels)
    }

    pub fn with_engine(engine: Arc<dyn PixelEngine>, pixels: DynamicImage) -> Self {
        Self {
            engine,
            pixels: normalize(pixels),
            stencil: None,
        }
    }

    pub(crate) fn from_parts(engine: Arc<dyn PixelEngine>, pixels: DynamicImage, stencil: Option<GrayImage>) -> Self {
        Self {
            engine,
            pixels: normalize(pixels),
            stencil,
        }
    }

    /// Derived handle on the same engine.
    pub(crate) fn derive(&self, pixels: DynamicImage, stencil: Option<GrayImage>) -> Self {
        Self::from_parts(Arc::clone(&self.engine), pixels, stencil)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(default_engine(), path)
    }

    pub fn load_with(engine: Arc<dyn PixelEngine>, path: impl AsRef<Path>) -> Result<Self> {
        let pixels = engine.load_path(path.as_ref())?;
        Ok(Self::with_engine(engine, pixels))
    }

    pub fn load_encoded(bytes: &[u8]) -> Result<Self> {
        let engine = default_engine();
        let pixels = engine.load_encoded(bytes)?;
        Ok(Self::with_engine(engine, pixels))
    }

    /// Decode base64 image data, with or without a `data:...;base64,` prefix.
    pub fn load_base64(data: &str) -> Result<Self> {
        let payload = match data.split_once(',') {
            Some((header, rest)) if header.starts_with("data:") => rest,
            _ => data,
        };
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
        Self::load_encoded(&bytes)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// 1 for grey, 3 for colour (alpha is not counted).
    pub fn channel_count(&self) -> u8 {
        match self.pixels {
            DynamicImage::ImageLuma8(_) => 1,
            _ => 3,
        }
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }

    pub fn stencil(&self) -> Option<&GrayImage> {
        self.stencil.as_ref()
    }

    pub fn engine(&self) -> &Arc<dyn PixelEngine> {
        &self.engine
    }

    /// Binary foreground: the stencil when present, otherwise every
    /// non-zero grey pixel.
    pub fn foreground(&self) -> GrayImage {
        match &self.stencil {
            Some(stencil) => stencil.clone(),
            None => {
                let mut grey = self.pixels.to_luma8();
                for pixel in grey.pixels_mut() {
                    pixel.0[0] = if pixel.0[0] > 0 { 255 } else { 0 };
                }
                grey
            }
        }
    }

    /// New pixels from a filter; the old stencil no longer describes them.
    fn replace(&mut self, pixels: DynamicImage) -> &mut Self {
        self.pixels = normalize(pixels);
        self.stencil = None;
        self
    }

    pub(crate) fn replace_all(&mut self, pixels: DynamicImage, stencil: Option<GrayImage>) {
        self.pixels = normalize(pixels);
        self.stencil = stencil;
    }

    pub fn save(&self, path: impl AsRef<Path>, options: &SaveOptions) -> Result<()> {
        self.engine.save(&self.pixels, path.as_ref(), options)
    }

    /// Save the transparent composite of this image and `mask` as PNG.
    pub fn save_transparent_png(&self, path: impl AsRef<Path>, mask: &ImageHandle) -> Result<()> {
        let path = path.as_ref().with_extension("png");
        self.transparent(mask)?.save(path, &SaveOptions::default())
    }

    pub fn duplicate(&self) -> ImageHandle {
        self.clone()
    }

    #[instrument(level = "debug", skip_all, fields(spec = %spec))]
    pub fn resize(&mut self, spec: &ResizeSpec, options: &ResizeOptions) -> Result<&mut Self> {
        let (width, height) = spec.target(self.width(), self.height())?;
        if (width, height) == (self.width(), self.height()) {
            return Ok(self);
        }
        let pixels = self.engine.resize(&self.pixels, width, height, options)?;
        let stencil = self
            .stencil
            .take()
            .map(|stencil| image::imageops::resize(&stencil, width, height, FilterType::Nearest));
        self.replace_all(pixels, stencil);
        Ok(self)
    }

    pub fn contrast(&mut self, options: &ContrastOptions) -> Result<&mut Self> {
        let mode = options.mode()?;
        let pixels = self.engine.contrast(&self.pixels, mode)?;
        Ok(self.replace(pixels))
    }

    /// Crop in place. The extent is clamped to the image; the origin is not.
    pub fn crop(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<&mut Self> {
        compositor::crop_in_place(self, x, y, width, height)?;
        Ok(self)
    }

    pub fn edge(&mut self) -> Result<&mut Self> {
        let pixels = self.engine.edge(&self.pixels)?;
        Ok(self.replace(pixels))
    }

    pub fn grey(&mut self, options: &GreyOptions) -> Result<&mut Self> {
        options.validate()?;
        let grey = self.engine.grey(&self.pixels, options)?;
        Ok(self.replace(DynamicImage::ImageLuma8(grey)))
    }

    pub fn color(&mut self, options: &ColorOptions) -> Result<&mut Self> {
        options.validate()?;
        let pixels = self.engine.quantize_colors(&self.pixels, options)?;
        Ok(self.replace(pixels))
    }

    pub fn texture(&mut self) -> Result<&mut Self> {
        let texture = self.engine.texture(&self.pixels)?;
        Ok(self.replace(DynamicImage::ImageLuma8(texture)))
    }

    /// Invert the pixels. A stencil is inverted with them, so the
    /// foreground stays the non-zero part of the result.
    pub fn invert(&mut self) -> Result<&mut Self> {
        self.pixels.invert();
        if let Some(stencil) = self.stencil.as_mut() {
            image::imageops::invert(stencil);
        }
        Ok(self)
    }

    /// Promote to RGB.
    pub fn rgb(&mut self) -> Result<&mut Self> {
        let rgb = DynamicImage::ImageRgb8(self.pixels.to_rgb8());
        let stencil = self.stencil.take();
        self.replace_all(rgb, stencil);
        Ok(self)
    }

    fn require_colour(&self, option: &'static str) -> Result<()> {
        if self.channel_count() == 3 {
            Ok(())
        } else {
            Err(RoiError::invalid(option, "grey image"))
        }
    }

    /// Keep the top `factor` bits of each channel, `factor` in `1..=7`.
    pub fn reduce_color(&mut self, factor: u8) -> Result<&mut Self> {
        if !(1..=7).contains(&factor) {
            return Err(RoiError::invalid("factor", factor));
        }
        self.require_colour("reduceColor")?;
        let pixels = self.engine.reduce_colors(&self.pixels, factor)?;
        Ok(self.replace(pixels))
    }

    pub fn histogram(&self) -> Result<Vec<u32>> {
        self.engine.histogram(&self.pixels)
    }

    /// Histogram over `2^(3 * factor)` colour bins, `factor` in `1..=5`.
    pub fn color_histogram(&self, factor: u8) -> Result<Vec<u32>> {
        if !(1..=5).contains(&factor) {
            return Err(RoiError::invalid("factor", factor));
        }
        self.require_colour("colorHistogram")?;
        self.engine.color_histogram(&self.pixels, factor)
    }

    pub fn color_count(&self) -> Result<usize> {
        self.require_colour("colorCount")?;
        self.engine.count_colors(&self.pixels)
    }

    fn planes(&self, planes: [GrayImage; 3]) -> [ImageHandle; 3] {
        planes.map(|plane| self.derive(DynamicImage::ImageLuma8(plane), None))
    }

    pub fn split_rgb(&self) -> Result<[ImageHandle; 3]> {
        Ok(self.planes(self.engine.split_rgb(&self.pixels)?))
    }

    pub fn split_hsb(&self) -> Result<[ImageHandle; 3]> {
        Ok(self.planes(self.engine.split_hsb(&self.pixels)?))
    }

    pub fn create_mask(&self, spec: &MaskSpec) -> Result<ImageHandle> {
        MaskBuilder::new(*spec).build(self)
    }

    /// Parse loosely typed options, then build the mask.
    pub fn create_mask_with(&self, options: &MaskOptions) -> Result<ImageHandle> {
        let spec = MaskSpec::try_from(options)?;
        self.create_mask(&spec)
    }

    /// Regions of this image's own foreground.
    pub fn regions(&self, filter: &RegionFilterSpec) -> Result<Vec<Region>> {
        RegionExtractor::new(*filter).extract(RegionSource::Mask(self))
    }

    pub(crate) fn resolve_regions(&self, input: MaskOrRegions<'_>, filter: &RegionFilterSpec) -> Result<Vec<Region>> {
        filter.validate()?;
        let extractor = RegionExtractor::new(*filter);
        match input {
            MaskOrRegions::Mask(mask) => extractor.extract(RegionSource::Mask(mask)),
            MaskOrRegions::Regions(regions) => extractor.extract(RegionSource::Regions(regions)),
            MaskOrRegions::None => {
                debug!("no mask supplied, building the default one");
                let mask = self.create_mask(&MaskSpec::default())?;
                extractor.extract(RegionSource::Mask(&mask))
            }
        }
    }

    /// Statistics of each region, measured against this image.
    pub fn analyze<'a>(
        &self,
        input: impl Into<MaskOrRegions<'a>>,
        filter: &RegionFilterSpec,
    ) -> Result<Vec<RegionStats>> {
        let regions = self.resolve_regions(input.into(), filter)?;
        Ok(analysis::measure(self, regions))
    }

    /// One crop of this image per region.
    pub fn split<'a>(&self, input: impl Into<MaskOrRegions<'a>>, filter: &RegionFilterSpec) -> Result<Vec<ImageHandle>> {
        let regions = self.resolve_regions(input.into(), filter)?;
        compositor::split(self, &regions)
    }

    pub fn paint_mask(&self, mask: &ImageHandle, options: &PaintOptions) -> Result<ImageHandle> {
        compositor::paint_mask(self, mask, options)
    }

    pub fn paint_regions(&self, regions: &[Region], options: &PaintOptions) -> Result<ImageHandle> {
        compositor::paint_regions(self, regions, options)
    }

    pub fn paint_region(&self, region: &Region, options: &PaintOptions) -> Result<ImageHandle> {
        compositor::paint_regions(self, std::slice::from_ref(region), options)
    }

    /// RGBA copy whose alpha is opaque exactly on `mask`'s foreground.
    pub fn transparent(&self, mask: &ImageHandle) -> Result<ImageHandle> {
        compositor::transparent_composite(self, mask)
    }

    pub fn hash(&self) -> Result<Fingerprint> {
        Fingerprint::of(self)
    }

    /// Attach a stencil; any non-zero pixel becomes foreground.
    pub fn with_stencil(mut self, stencil: GrayImage) -> Result<Self> {
        if stencil.dimensions() != self.pixels.dimensions() {
            return Err(RoiError::DimensionMismatch {
                mask_width: stencil.width(),
                mask_height: stencil.height(),
                image_width: self.width(),
                image_height: self.height(),
            });
        }
        let binary = GrayImage::from_fn(stencil.width(), stencil.height(), |x, y| {
            Luma([if stencil.get_pixel(x, y).0[0] > 0 { 255 } else { 0 }])
        });
        self.stencil = Some(binary);
        Ok(self)
    }
}
