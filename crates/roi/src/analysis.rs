use tracing::debug;

use crate::{handle::ImageHandle, types::{Region, RegionStats}};

/// Statistics of `regions` with intensities taken from `source`.
///
/// Geometry is kept as extracted; histogram and centre of mass are measured
/// again against the source's luma, skipping pixels that fall outside it.
pub(crate) fn measure(source: &ImageHandle, regions: Vec<Region>) -> Vec<RegionStats> {
    let luma = source.pixels().to_luma8();
    let stats: Vec<RegionStats> = regions
        .into_iter()
        .map(|mut region| {
            region.remeasure(|x, y| luma.get_pixel_checked(x, y).map(|p| p.0[0]));
            region.to_stats()
        })
        .collect();
    debug!(regions = stats.len(), "measured regions");
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handle::MaskOrRegions,
        options::{RegionFilterSpec, SortKey},
        test_support::{blobs, gradient},
    };
    use image::{DynamicImage, GrayImage, Luma};

    #[test]
    fn histogram_counts_source_intensities() {
        let mask = blobs(40, 40, &[(10, 10, 4, 5)]);
        let source = ImageHandle::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([77]))));
        let stats = source.analyze(&mask, &RegionFilterSpec::default()).unwrap();
        assert_eq!(stats.len(), 1);
        let record = &stats[0];
        assert_eq!(record.histogram.len(), 256);
        assert_eq!(record.histogram[77], 20);
        assert_eq!(record.histogram.iter().sum::<u32>(), 20);
        assert_eq!((record.x, record.y, record.width, record.height), (10, 10, 4, 5));
        assert_eq!(record.surface, 20.0);
        assert_eq!((record.x_centroid, record.y_centroid), (12.0, 12.5));
        assert_eq!((record.x_center_of_mass, record.y_center_of_mass), (12.0, 12.5));
    }

    #[test]
    fn center_of_mass_leans_to_brighter_pixels() {
        let regions = vec![Region::rectangle(0, 0, 10, 1)];
        let source = gradient(10, 1);
        let stats = source.analyze(&regions, &RegionFilterSpec::default()).unwrap();
        let (centroid, mass) = (stats[0].x_centroid, stats[0].x_center_of_mass);
        assert_eq!(centroid, 5.0);
        assert!(mass > centroid);
    }

    #[test]
    fn regions_past_the_edge_are_clipped() {
        let source = gradient(10, 10);
        let regions = vec![Region::rectangle(5, 5, 10, 10)];
        let stats = source.analyze(&regions, &RegionFilterSpec::default()).unwrap();
        assert_eq!(stats[0].histogram.iter().sum::<u32>(), 25);
        assert_eq!(stats[0].width, 10);
    }

    #[test]
    fn stats_serialize_with_scripting_keys() {
        let image = blobs(50, 50, &[(30, 5, 6, 6), (5, 20, 10, 10)]);
        let stats = image
            .analyze(MaskOrRegions::None, &RegionFilterSpec::default().sorted_by(SortKey::X))
            .unwrap();
        assert_eq!(stats.iter().map(|s| s.x).collect::<Vec<_>>(), vec![5, 30]);
        let json = serde_json::to_value(&stats).unwrap();
        let first = &json[0];
        for key in ["xCenterOfMass", "yCentroid", "roundRectArcSize", "contour", "histogram"] {
            assert!(first.get(key).is_some(), "missing {key}");
        }
    }
}
