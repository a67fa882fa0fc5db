use std::cmp::Ordering;

use tracing::{debug, instrument};

use crate::{
    error::Result,
    handle::ImageHandle,
    options::{RegionFilterSpec, SortKey},
    types::Region,
};

/// Input to [`RegionExtractor::extract`].
#[derive(Debug, Clone, Copy)]
pub enum RegionSource<'a> {
    /// Run connected-component analysis over this mask's foreground.
    Mask(&'a ImageHandle),
    /// Reuse regions from an earlier extraction.
    Regions(&'a [Region]),
}

/// Turns a mask or an existing region list into a filtered, ordered list of
/// regions.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionExtractor {
    filter: RegionFilterSpec,
}

impl RegionExtractor {
    pub fn new(filter: RegionFilterSpec) -> Self {
        Self { filter }
    }

    #[instrument(level = "debug", skip_all)]
    pub fn extract(&self, source: RegionSource<'_>) -> Result<Vec<Region>> {
        self.filter.validate()?;
        let regions = match source {
            RegionSource::Mask(mask) => detect(mask)?,
            RegionSource::Regions(regions) => regions.to_vec(),
        };
        let found = regions.len();
        let refined = self.refine(regions);
        debug!(found, kept = refined.len(), "filtered regions");
        Ok(refined)
    }

    /// Scale, filter and sort, in that order.
    pub fn refine(&self, regions: Vec<Region>) -> Vec<Region> {
        let mut regions: Vec<Region> = match self.filter.scale {
            Some(scale) if scale != 1.0 => regions.iter().map(|r| r.scaled(scale)).collect(),
            _ => regions,
        };
        regions.retain(|region| accepts(&self.filter, region));
        if let Some(key) = self.filter.sort_by {
            sort_regions(&mut regions, key);
        }
        regions
    }
}

/// Connected components of `mask`'s foreground, measured against the mask's
/// own grey values.
pub(crate) fn detect(mask: &ImageHandle) -> Result<Vec<Region>> {
    let foreground = mask.foreground();
    let raw = mask.engine().extract_regions(&foreground)?;
    let grey = mask.pixels().to_luma8();
    Ok(raw
        .into_iter()
        .map(|r| {
            Region::measured(r.bounds, r.spans, r.contour_length, |x, y| {
                grey.get_pixel_checked(x, y).map(|p| p.0[0])
            })
        })
        .collect())
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
}

/// Inclusive bounds on length, width, height and surface; an absent bound
/// always passes.
pub fn accepts(filter: &RegionFilterSpec, region: &Region) -> bool {
    within(region.length() as f64, filter.min_length, filter.max_length)
        && within(region.width() as f64, filter.min_width, filter.max_width)
        && within(region.height() as f64, filter.min_height, filter.max_height)
        && within(region.surface(), filter.min_surface, filter.max_surface)
}

/// Stable ascending sort; ties keep their current order.
pub fn sort_regions(regions: &mut [Region], key: SortKey) {
    let compare: fn(&Region, &Region) -> Ordering = match key {
        SortKey::X => |a, b| a.x().cmp(&b.x()),
        SortKey::Y => |a, b| a.y().cmp(&b.y()),
        SortKey::Xy => |a, b| (a.y(), a.x()).cmp(&(b.y(), b.x())),
        SortKey::Length => |a, b| a.length().cmp(&b.length()),
        SortKey::Surface => |a, b| a.surface().total_cmp(&b.surface()),
    };
    regions.sort_by(compare);
}
