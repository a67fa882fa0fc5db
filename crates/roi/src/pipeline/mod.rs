pub mod builder;

use tracing::{info, instrument};

use crate::{
    analysis,
    compositor,
    error::Result,
    extractor::{RegionExtractor, RegionSource},
    handle::ImageHandle,
    mask_builder::MaskBuilder,
    options::{MaskSpec, RegionFilterSpec},
    types::{Region, RegionStats},
};

/// Mask construction followed by region extraction, configured once and
/// applied to any number of images.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pipeline {
    mask: MaskSpec,
    filter: RegionFilterSpec,
}

impl Pipeline {
    pub fn builder() -> builder::PipelineBuilder {
        builder::PipelineBuilder::new()
    }

    pub fn new(mask: MaskSpec, filter: RegionFilterSpec) -> Self {
        Self { mask, filter }
    }

    pub fn mask_spec(&self) -> &MaskSpec {
        &self.mask
    }

    pub fn filter(&self) -> &RegionFilterSpec {
        &self.filter
    }

    /// Build the mask of `image` and extract its regions.
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn process(&self, image: &ImageHandle) -> Result<Segmentation> {
        self.filter.validate()?;
        let mask = MaskBuilder::new(self.mask).build(image)?;
        let regions = RegionExtractor::new(self.filter).extract(RegionSource::Mask(&mask))?;
        info!(regions = regions.len(), "{}", self.info());

        Ok(Segmentation {
            mask,
            regions,
            image_width: image.width(),
            image_height: image.height(),
        })
    }

    pub fn info(&self) -> String {
        format!(
            "Pipeline: {} channel, {} threshold, {} background, sort by {}",
            self.mask.channel_derivation,
            self.mask.threshold_method,
            if self.mask.dark_background { "dark" } else { "light" },
            self.filter.sort_by.map_or("none", |key| key.into()),
        )
    }
}

/// Output of [`Pipeline::process`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub mask: ImageHandle,
    pub regions: Vec<Region>,
    pub image_width: u32,
    pub image_height: u32,
}

impl Segmentation {
    /// One crop of `source` per region.
    pub fn crops(&self, source: &ImageHandle) -> Result<Vec<ImageHandle>> {
        compositor::split(source, &self.regions)
    }

    /// One crop of the mask per region.
    pub fn mask_crops(&self) -> Result<Vec<ImageHandle>> {
        compositor::split(&self.mask, &self.regions)
    }

    pub fn stats(&self, source: &ImageHandle) -> Vec<RegionStats> {
        analysis::measure(source, self.regions.clone())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        options::{ChannelDerivation, SortKey},
        test_support::{blobs, equal_luma_two_hue},
    };

    #[test]
    fn default_pipeline_finds_every_blob() {
        let image = blobs(120, 90, &[(10, 10, 30, 20), (70, 50, 25, 25)]);
        let segmentation = Pipeline::default().process(&image).unwrap();
        assert_eq!(segmentation.len(), 2);
        assert_eq!((segmentation.image_width, segmentation.image_height), (120, 90));

        let crops = segmentation.crops(&image).unwrap();
        let sizes: Vec<(u32, u32)> = crops.iter().map(|c| (c.width(), c.height())).collect();
        assert_eq!(sizes, vec![(30, 20), (25, 25)]);

        let mask_crops = segmentation.mask_crops().unwrap();
        assert!(mask_crops.iter().all(|crop| crop.stencil().is_some()));
    }

    #[test]
    fn builder_settings_flow_through() {
        let pipeline = Pipeline::builder()
            .channel(ChannelDerivation::Hue)
            .sort_by(SortKey::Surface)
            .build();
        let segmentation = pipeline.process(&equal_luma_two_hue(60, 30)).unwrap();
        assert_eq!(segmentation.len(), 1);
        assert_eq!(segmentation.regions[0].x(), 30);
        assert!(pipeline.info().contains("hue"));
    }

    #[test]
    fn invalid_scale_fails_before_masking() {
        let pipeline = Pipeline::builder().scale(0.0).build();
        let err = pipeline.process(&blobs(10, 10, &[])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOption);
    }

    #[test]
    fn stats_measure_the_source() {
        let image = blobs(40, 40, &[(5, 5, 10, 10)]);
        let segmentation = Pipeline::default().process(&image).unwrap();
        let stats = segmentation.stats(&image);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].histogram[255], 100);
    }
}
