use std::collections::HashMap;

use geo::EuclideanLength;
use geo_types::LineString;
use image::{GrayImage, Luma};
use imageproc::{
    contours::{find_contours, BorderType},
    region_labelling::{connected_components, Connectivity},
};

use crate::{engine::RawRegion, types::Span};

#[derive(Debug)]
struct RegionBuilder {
    spans: Vec<Span>,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl RegionBuilder {
    fn new(span: Span) -> Self {
        Self {
            min_x: span.x_start,
            min_y: span.y,
            max_x: span.x_end - 1,
            max_y: span.y,
            spans: vec![span],
        }
    }

    fn push(&mut self, span: Span) {
        self.min_x = self.min_x.min(span.x_start);
        self.max_x = self.max_x.max(span.x_end - 1);
        self.max_y = self.max_y.max(span.y);
        self.spans.push(span);
    }
}

/// Label the 8-connected foreground of `mask` and collect each component's
/// runs, bounding box and outer contour length.
pub(crate) fn extract(mask: &GrayImage) -> Vec<RawRegion> {
    let (width, height) = mask.dimensions();
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut builders: HashMap<u32, RegionBuilder> = HashMap::new();
    let mut order = Vec::new();
    for y in 0..height {
        let mut x = 0;
        while x < width {
            let label = labels.get_pixel(x, y).0[0];
            if label == 0 {
                x += 1;
                continue;
            }
            let start = x;
            while x < width && labels.get_pixel(x, y).0[0] == label {
                x += 1;
            }
            let span = Span {
                y,
                x_start: start,
                x_end: x,
            };
            match builders.get_mut(&label) {
                Some(builder) => builder.push(span),
                None => {
                    order.push(label);
                    builders.insert(label, RegionBuilder::new(span));
                }
            }
        }
    }

    let contour_lengths = outer_contour_lengths(mask, |x, y| labels.get_pixel(x, y).0[0]);

    order
        .into_iter()
        .filter_map(|label| {
            let builder = builders.remove(&label)?;
            Some(RawRegion {
                bounds: (
                    builder.min_x,
                    builder.min_y,
                    builder.max_x - builder.min_x + 1,
                    builder.max_y - builder.min_y + 1,
                ),
                spans: builder.spans,
                contour_length: contour_lengths.get(&label).copied().unwrap_or(0.0),
            })
        })
        .collect()
}

fn outer_contour_lengths<F>(mask: &GrayImage, label_at: F) -> HashMap<u32, f64>
where
    F: Fn(u32, u32) -> u32,
{
    let mut lengths = HashMap::new();
    for contour in find_contours::<i32>(mask) {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let Some(first) = contour.points.first() else {
            continue;
        };
        let label = label_at(first.x as u32, first.y as u32);
        let mut coords: Vec<(f64, f64)> = contour.points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
        if coords.len() > 1 {
            coords.push(coords[0]);
        }
        let length = LineString::from(coords).euclidean_length();
        lengths
            .entry(label)
            .and_modify(|existing: &mut f64| *existing = existing.max(length))
            .or_insert(length);
    }
    lengths
}
