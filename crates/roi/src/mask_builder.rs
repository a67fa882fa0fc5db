use image::{DynamicImage, GrayImage, Rgb};
use tracing::{debug, instrument};

use crate::{
    error::Result,
    handle::ImageHandle,
    options::{ChannelDerivation, GreyOptions, MaskColor, MaskOptions, MaskSpec},
};

/// Builds binary masks from images.
///
/// The returned handle always carries the foreground as its stencil, so the
/// rendering chosen by [`MaskColor`] never changes what later region
/// extraction sees.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskBuilder {
    spec: MaskSpec,
}

impl MaskBuilder {
    pub fn new(spec: MaskSpec) -> Self {
        Self { spec }
    }

    pub fn from_options(options: &MaskOptions) -> Result<Self> {
        Ok(Self::new(MaskSpec::try_from(options)?))
    }

    pub fn spec(&self) -> &MaskSpec {
        &self.spec
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(
            channel = %self.spec.channel_derivation,
            method = %self.spec.threshold_method,
            dark_background = self.spec.dark_background,
        )
    )]
    pub fn build(&self, source: &ImageHandle) -> Result<ImageHandle> {
        let input = self.derive_channel(source)?;
        let grey = input.to_luma8();
        let stencil = source
            .engine()
            .threshold(&grey, self.spec.threshold_method, self.spec.dark_background)?;
        debug!(
            foreground = stencil.pixels().filter(|p| p.0[0] > 0).count(),
            "thresholded mask input"
        );

        let pixels = match self.spec.mask_color {
            MaskColor::Red => paint_red(&grey, &stencil),
            MaskColor::BlackWhite => DynamicImage::ImageLuma8(stencil.clone()),
            MaskColor::Original => input,
        };
        Ok(source.derive(pixels, Some(stencil)))
    }

    /// The single-channel image the threshold runs on, or the source itself
    /// for [`ChannelDerivation::None`].
    fn derive_channel(&self, source: &ImageHandle) -> Result<DynamicImage> {
        let engine = source.engine();
        let pixels = source.pixels();
        let plane = |planes: [GrayImage; 3], index: usize| {
            let [first, second, third] = planes;
            DynamicImage::ImageLuma8(match index {
                0 => first,
                1 => second,
                _ => third,
            })
        };

        Ok(match self.spec.channel_derivation {
            ChannelDerivation::None => pixels.clone(),
            ChannelDerivation::Red => plane(engine.split_rgb(pixels)?, 0),
            ChannelDerivation::Green => plane(engine.split_rgb(pixels)?, 1),
            ChannelDerivation::Blue => plane(engine.split_rgb(pixels)?, 2),
            ChannelDerivation::Hue => plane(engine.split_hsb(pixels)?, 0),
            ChannelDerivation::Saturation => plane(engine.split_hsb(pixels)?, 1),
            ChannelDerivation::Brightness => plane(engine.split_hsb(pixels)?, 2),
            ChannelDerivation::Edge => engine.edge(pixels)?,
            ChannelDerivation::Grey => DynamicImage::ImageLuma8(engine.grey(pixels, &GreyOptions::default())?),
            ChannelDerivation::Texture => DynamicImage::ImageLuma8(engine.texture(pixels)?),
        })
    }
}

/// Grey rendering of `grey` with every foreground pixel pure red.
fn paint_red(grey: &GrayImage, stencil: &GrayImage) -> DynamicImage {
    let mut rgb = DynamicImage::ImageLuma8(grey.clone()).to_rgb8();
    for (pixel, mark) in rgb.pixels_mut().zip(stencil.pixels()) {
        if mark.0[0] > 0 {
            *pixel = Rgb([255, 0, 0]);
        }
    }
    DynamicImage::ImageRgb8(rgb)
}
