use crate::{
    options::{ChannelDerivation, MaskColor, MaskSpec, RegionFilterSpec, SortKey, ThresholdMethod},
    pipeline::Pipeline,
};

/// Builder for [`Pipeline`] with a fluent API
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineBuilder {
    mask: MaskSpec,
    filter: RegionFilterSpec,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole mask configuration
    pub fn mask_spec(mut self, spec: MaskSpec) -> Self {
        self.mask = spec;
        self
    }

    /// Channel the threshold runs on
    pub fn channel(mut self, channel: ChannelDerivation) -> Self {
        self.mask.channel_derivation = channel;
        self
    }

    pub fn threshold(mut self, method: ThresholdMethod) -> Self {
        self.mask.threshold_method = method;
        self
    }

    pub fn dark_background(mut self, dark: bool) -> Self {
        self.mask.dark_background = dark;
        self
    }

    pub fn mask_color(mut self, color: MaskColor) -> Self {
        self.mask.mask_color = color;
        self
    }

    /// Replace the whole region filter, including sort key and scale
    pub fn filter(mut self, filter: RegionFilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.filter.sort_by = Some(key);
        self
    }

    /// Multiply region geometry before filtering
    pub fn scale(mut self, scale: f64) -> Self {
        self.filter.scale = Some(scale);
        self
    }

    /// Keep regions whose surface lies in `min..=max`
    pub fn surface_between(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.filter.min_surface = min;
        self.filter.max_surface = max;
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline::new(self.mask, self.filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_calls_override_earlier_ones() {
        let pipeline = PipelineBuilder::new()
            .threshold(ThresholdMethod::Otsu)
            .mask_spec(MaskSpec {
                dark_background: false,
                ..Default::default()
            })
            .threshold(ThresholdMethod::Yen)
            .sort_by(SortKey::X)
            .filter(RegionFilterSpec::default())
            .scale(2.0)
            .build();
        assert_eq!(pipeline.mask_spec().threshold_method, ThresholdMethod::Yen);
        assert!(!pipeline.mask_spec().dark_background);
        assert_eq!(pipeline.filter().sort_by, None);
        assert_eq!(pipeline.filter().scale, Some(2.0));
    }

    #[test]
    fn surface_bounds_are_set_together() {
        let pipeline = PipelineBuilder::new().surface_between(Some(10.0), None).build();
        assert_eq!(pipeline.filter().min_surface, Some(10.0));
        assert_eq!(pipeline.filter().max_surface, None);
    }
}
