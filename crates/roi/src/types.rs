use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A horizontal run of member pixels, `x_start..x_end` on row `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Span {
    pub y: u32,
    pub x_start: u32,
    pub x_end: u32,
}

impl Span {
    pub fn len(&self) -> u32 {
        self.x_end.saturating_sub(self.x_start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A connected foreground area, described by its bounding box, its pixel
/// membership and a set of shape statistics.
///
/// Coordinates are in the pixel space of the image the region was extracted
/// from. Regions own no pixel data and stay valid after that image is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    surface: f64,
    centroid_x: f64,
    centroid_y: f64,
    center_of_mass_x: f64,
    center_of_mass_y: f64,
    histogram: Vec<u32>,
    contour_length: f64,
    corner_radius: f64,
    spans: Vec<Span>,
}

/// Shape statistics of a region in the JSON layout of the scripting API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RegionStats {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub surface: f64,
    #[serde(rename = "xCenterOfMass")]
    pub x_center_of_mass: f64,
    #[serde(rename = "yCenterOfMass")]
    pub y_center_of_mass: f64,
    #[serde(rename = "xCentroid")]
    pub x_centroid: f64,
    #[serde(rename = "yCentroid")]
    pub y_centroid: f64,
    pub histogram: Vec<u32>,
    pub contour: f64,
    #[serde(rename = "roundRectArcSize")]
    pub round_rect_arc_size: f64,
}

impl Region {
    /// A solid rectangular region, for callers supplying their own ROIs.
    pub fn rectangle(x: u32, y: u32, width: u32, height: u32) -> Self {
        // coordinates saturate at u32::MAX rather than wrap
        let x_end = x.saturating_add(width);
        let spans = (y..y.saturating_add(height))
            .map(|row| Span {
                y: row,
                x_start: x,
                x_end,
            })
            .collect();
        let cx = x as f64 + width as f64 / 2.0;
        let cy = y as f64 + height as f64 / 2.0;
        Self {
            x,
            y,
            width,
            height,
            surface: width as f64 * height as f64,
            centroid_x: cx,
            centroid_y: cy,
            center_of_mass_x: cx,
            center_of_mass_y: cy,
            histogram: Vec::new(),
            contour_length: 2.0 * (width as f64 + height as f64),
            corner_radius: 0.0,
            spans,
        }
    }

    /// Build a region from raw membership, measuring histogram and centre of
    /// mass against `intensity(x, y)`.
    pub(crate) fn measured<F>(
        bounds: (u32, u32, u32, u32),
        spans: Vec<Span>,
        contour_length: f64,
        intensity: F,
    ) -> Self
    where
        F: Fn(u32, u32) -> Option<u8>,
    {
        let (x, y, width, height) = bounds;
        let mut region = Self {
            x,
            y,
            width,
            height,
            surface: 0.0,
            centroid_x: 0.0,
            centroid_y: 0.0,
            center_of_mass_x: 0.0,
            center_of_mass_y: 0.0,
            histogram: Vec::new(),
            contour_length,
            corner_radius: 0.0,
            spans,
        };

        let mut count = 0u64;
        let (mut sum_x, mut sum_y) = (0.0f64, 0.0f64);
        for (px, py) in region.pixels() {
            count += 1;
            sum_x += px as f64 + 0.5;
            sum_y += py as f64 + 0.5;
        }
        region.surface = count as f64;
        if count > 0 {
            region.centroid_x = sum_x / count as f64;
            region.centroid_y = sum_y / count as f64;
        } else {
            region.centroid_x = x as f64 + width as f64 / 2.0;
            region.centroid_y = y as f64 + height as f64 / 2.0;
        }
        region.remeasure(intensity);
        region
    }

    /// Recompute histogram and centre of mass from another intensity source.
    /// Pixels for which `intensity` returns `None` are skipped.
    pub(crate) fn remeasure<F>(&mut self, intensity: F)
    where
        F: Fn(u32, u32) -> Option<u8>,
    {
        let mut histogram = vec![0u32; 256];
        let (mut weight, mut sum_x, mut sum_y) = (0.0f64, 0.0f64, 0.0f64);
        for (px, py) in self.pixels() {
            let Some(value) = intensity(px, py) else {
                continue;
            };
            histogram[value as usize] += 1;
            let v = value as f64;
            weight += v;
            sum_x += v * (px as f64 + 0.5);
            sum_y += v * (py as f64 + 0.5);
        }
        if weight > 0.0 {
            self.center_of_mass_x = sum_x / weight;
            self.center_of_mass_y = sum_y / weight;
        } else {
            self.center_of_mass_x = self.centroid_x;
            self.center_of_mass_y = self.centroid_y;
        }
        self.histogram = histogram;
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Longer side of the bounding box.
    pub fn length(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn surface(&self) -> f64 {
        self.surface
    }

    pub fn centroid(&self) -> (f64, f64) {
        (self.centroid_x, self.centroid_y)
    }

    pub fn center_of_mass(&self) -> (f64, f64) {
        (self.center_of_mass_x, self.center_of_mass_y)
    }

    pub fn histogram(&self) -> &[u32] {
        &self.histogram
    }

    pub fn contour_length(&self) -> f64 {
        self.contour_length
    }

    pub fn corner_radius(&self) -> f64 {
        self.corner_radius
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Member pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.spans
            .iter()
            .flat_map(|span| (span.x_start..span.x_end).map(move |px| (px, span.y)))
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        self.spans
            .iter()
            .any(|span| span.y == py && px >= span.x_start && px < span.x_end)
    }

    /// Member pixels with at least one 4-neighbour outside the region.
    pub fn outline(&self) -> Vec<(u32, u32)> {
        let map = Membership::new(self);
        self.pixels()
            .filter(|&(px, py)| {
                let (px, py) = (px as i64, py as i64);
                !(map.contains(px - 1, py)
                    && map.contains(px + 1, py)
                    && map.contains(px, py - 1)
                    && map.contains(px, py + 1))
            })
            .collect()
    }

    /// Rescale about the bounding-box centre.
    ///
    /// Width and height become `round(side * factor)`; the surface, contour
    /// length and corner radius are multiplied by `factor`. The membership is
    /// re-rasterized by sampling the unscaled shape. An origin pushed below
    /// zero is clipped, shrinking the box by the clipped amount.
    pub fn scaled(&self, factor: f64) -> Region {
        if factor == 1.0 {
            return self.clone();
        }

        let cx = self.x as f64 + self.width as f64 / 2.0;
        let cy = self.y as f64 + self.height as f64 / 2.0;
        let new_width = ((self.width as f64 * factor).round() as i64).max(1);
        let new_height = ((self.height as f64 * factor).round() as i64).max(1);
        let left = (cx - new_width as f64 / 2.0).round() as i64;
        let top = (cy - new_height as f64 / 2.0).round() as i64;
        let x0 = left.max(0);
        let y0 = top.max(0);
        let width = (left + new_width - x0).max(1);
        let height = (top + new_height - y0).max(1);

        let map = Membership::new(self);
        let mut spans = Vec::new();
        for py in y0..y0 + height {
            let sy = (cy + (py as f64 + 0.5 - cy) / factor).floor() as i64;
            let mut run_start: Option<i64> = None;
            for px in x0..x0 + width {
                let sx = (cx + (px as f64 + 0.5 - cx) / factor).floor() as i64;
                match (map.contains(sx, sy), run_start) {
                    (true, None) => run_start = Some(px),
                    (false, Some(start)) => {
                        spans.push(Span {
                            y: py as u32,
                            x_start: start as u32,
                            x_end: px as u32,
                        });
                        run_start = None;
                    }
                    _ => {}
                }
            }
            if let Some(start) = run_start {
                spans.push(Span {
                    y: py as u32,
                    x_start: start as u32,
                    x_end: (x0 + width) as u32,
                });
            }
        }

        Region {
            x: x0 as u32,
            y: y0 as u32,
            width: width as u32,
            height: height as u32,
            surface: self.surface * factor,
            centroid_x: cx + (self.centroid_x - cx) * factor,
            centroid_y: cy + (self.centroid_y - cy) * factor,
            center_of_mass_x: cx + (self.center_of_mass_x - cx) * factor,
            center_of_mass_y: cy + (self.center_of_mass_y - cy) * factor,
            histogram: self.histogram.clone(),
            contour_length: self.contour_length * factor,
            corner_radius: self.corner_radius * factor,
            spans,
        }
    }

    pub fn to_stats(&self) -> RegionStats {
        RegionStats {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            surface: self.surface,
            x_center_of_mass: self.center_of_mass_x,
            y_center_of_mass: self.center_of_mass_y,
            x_centroid: self.centroid_x,
            y_centroid: self.centroid_y,
            histogram: self.histogram.clone(),
            contour: self.contour_length,
            round_rect_arc_size: self.corner_radius,
        }
    }
}

/// Dense membership lookup over a region's bounding box.
struct Membership {
    x0: i64,
    y0: i64,
    width: i64,
    height: i64,
    bits: Vec<bool>,
}

impl Membership {
    fn new(region: &Region) -> Self {
        let (x0, y0) = (region.x as i64, region.y as i64);
        let (width, height) = (region.width as i64, region.height as i64);
        let mut bits = vec![false; (width * height) as usize];
        for (px, py) in region.pixels() {
            let (lx, ly) = (px as i64 - x0, py as i64 - y0);
            if lx >= 0 && ly >= 0 && lx < width && ly < height {
                bits[(ly * width + lx) as usize] = true;
            }
        }
        Self {
            x0,
            y0,
            width,
            height,
            bits,
        }
    }

    fn contains(&self, px: i64, py: i64) -> bool {
        let (lx, ly) = (px - self.x0, py - self.y0);
        lx >= 0 && ly >= 0 && lx < self.width && ly < self.height && self.bits[(ly * self.width + lx) as usize]
    }
}
