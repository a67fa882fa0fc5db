use std::collections::HashMap;

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::{contrast::equalize_histogram, gradients::sobel_gradients, local_binary_patterns::local_binary_pattern};
use palette::{FromColor, Hsv, Srgb};

use crate::{
    error::{Result, RoiError},
    options::{ColorOptions, ContrastMode, GreyOptions, ResizeMethod, ResizeOptions},
};

pub(crate) fn split_rgb(image: &DynamicImage) -> [GrayImage; 3] {
    let rgb = image.to_rgb8();
    let plane = |channel: usize| GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| Luma([rgb.get_pixel(x, y).0[channel]]));
    [plane(0), plane(1), plane(2)]
}

pub(crate) fn split_hsb(image: &DynamicImage) -> [GrayImage; 3] {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut planes = [GrayImage::new(width, height), GrayImage::new(width, height), GrayImage::new(width, height)];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let srgb = Srgb::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
        let hsv = Hsv::from_color(srgb);
        let hue = hsv.hue.into_positive_degrees() / 360.0;
        let values = [hue, hsv.saturation, hsv.value];
        for (plane, value) in planes.iter_mut().zip(values) {
            plane.put_pixel(x, y, Luma([(value.clamp(0.0, 1.0) * 255.0).round() as u8]));
        }
    }
    planes
}

fn sobel(plane: &GrayImage) -> GrayImage {
    let gradients = sobel_gradients(plane);
    GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        Luma([gradients.get_pixel(x, y).0[0].min(255) as u8])
    })
}

/// Sobel magnitude, per channel for colour input.
pub(crate) fn edge(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(grey) => DynamicImage::ImageLuma8(sobel(grey)),
        other => {
            let [r, g, b] = split_rgb(other).map(|plane| sobel(&plane));
            DynamicImage::ImageRgb8(merge(&r, &g, &b))
        }
    }
}

fn merge(r: &GrayImage, g: &GrayImage, b: &GrayImage) -> RgbImage {
    RgbImage::from_fn(r.width(), r.height(), |x, y| {
        Rgb([r.get_pixel(x, y).0[0], g.get_pixel(x, y).0[0], b.get_pixel(x, y).0[0]])
    })
}

/// Spread `levels` evenly over `0..=255`.
fn posterize(value: u8, levels: u16) -> u8 {
    if levels >= 256 {
        return value;
    }
    let levels = levels as u32;
    let bucket = value as u32 * levels / 256;
    (bucket * 255 / (levels - 1)) as u8
}

pub(crate) fn grey(image: &DynamicImage, options: &GreyOptions) -> GrayImage {
    let mut grey = image.to_luma8();
    if options.levels < 256 {
        for pixel in grey.pixels_mut() {
            pixel.0[0] = posterize(pixel.0[0], options.levels);
        }
    }
    grey
}

/// Local binary pattern code of every interior pixel; the border is zero.
pub(crate) fn texture(image: &DynamicImage) -> GrayImage {
    let grey = image.to_luma8();
    GrayImage::from_fn(grey.width(), grey.height(), |x, y| {
        Luma([local_binary_pattern(&grey, x, y).unwrap_or(0)])
    })
}

pub(crate) fn quantize_colors(image: &DynamicImage, options: &ColorOptions) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) => DynamicImage::ImageLuma8(grey(image, &GreyOptions::from(options.colors))),
        other => DynamicImage::ImageRgb8(median_cut(&other.to_rgb8(), options.colors as usize)),
    }
}

/// A box of distinct colours in RGB space, split along its widest axis.
struct ColorBox {
    colors: Vec<([u8; 3], u32)>,
}

impl ColorBox {
    fn widest_axis(&self) -> (usize, u8) {
        (0..3)
            .map(|axis| {
                let (lo, hi) = self
                    .colors
                    .iter()
                    .fold((u8::MAX, u8::MIN), |(lo, hi), (c, _)| (lo.min(c[axis]), hi.max(c[axis])));
                (axis, hi.saturating_sub(lo))
            })
            .max_by_key(|&(_, range)| range)
            .unwrap_or((0, 0))
    }

    fn split(mut self) -> (ColorBox, ColorBox) {
        let (axis, _) = self.widest_axis();
        self.colors.sort_by_key(|(c, _)| c[axis]);
        let half: u64 = self.colors.iter().map(|&(_, n)| n as u64).sum::<u64>() / 2;
        let mut running = 0u64;
        let mut cut = 1;
        for (i, &(_, n)) in self.colors.iter().enumerate() {
            running += n as u64;
            if running >= half {
                cut = (i + 1).clamp(1, self.colors.len() - 1);
                break;
            }
        }
        let upper = self.colors.split_off(cut);
        (self, ColorBox { colors: upper })
    }

    fn mean(&self) -> [u8; 3] {
        let mut sums = [0u64; 3];
        let mut count = 0u64;
        for &(c, n) in &self.colors {
            for axis in 0..3 {
                sums[axis] += c[axis] as u64 * n as u64;
            }
            count += n as u64;
        }
        sums.map(|sum| (sum / count.max(1)) as u8)
    }
}

fn median_cut(rgb: &RgbImage, colors: usize) -> RgbImage {
    let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
    for pixel in rgb.pixels() {
        *counts.entry(pixel.0).or_default() += 1;
    }
    if counts.len() <= colors {
        return rgb.clone();
    }

    let mut boxes = vec![ColorBox {
        colors: counts.into_iter().collect(),
    }];
    while boxes.len() < colors {
        let Some(index) = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by_key(|(_, b)| b.widest_axis().1)
            .map(|(i, _)| i)
        else {
            break;
        };
        let (lower, upper) = boxes.swap_remove(index).split();
        boxes.push(lower);
        boxes.push(upper);
    }

    let mut lookup: HashMap<[u8; 3], [u8; 3]> = HashMap::new();
    for color_box in &boxes {
        let mean = color_box.mean();
        for &(c, _) in &color_box.colors {
            lookup.insert(c, mean);
        }
    }
    RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let c = rgb.get_pixel(x, y).0;
        Rgb(lookup.get(&c).copied().unwrap_or(c))
    })
}

pub(crate) fn resize(image: &DynamicImage, width: u32, height: u32, options: &ResizeOptions) -> DynamicImage {
    let downsizing = width < image.width() || height < image.height();
    if options.average && downsizing {
        return image.thumbnail_exact(width, height);
    }
    let filter = match options.method {
        ResizeMethod::None => FilterType::Nearest,
        ResizeMethod::Bilinear => FilterType::Triangle,
        ResizeMethod::Bicubic => FilterType::CatmullRom,
    };
    image.resize_exact(width, height, filter)
}

fn apply_lut(image: &DynamicImage, lut: &[u8; 256]) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(grey) => {
            let mut grey = grey.clone();
            grey.pixels_mut().for_each(|p| p.0[0] = lut[p.0[0] as usize]);
            DynamicImage::ImageLuma8(grey)
        }
        DynamicImage::ImageRgba8(rgba) => {
            let mut rgba = rgba.clone();
            for pixel in rgba.pixels_mut() {
                for c in &mut pixel.0[..3] {
                    *c = lut[*c as usize];
                }
            }
            DynamicImage::ImageRgba8(rgba)
        }
        other => {
            let mut rgb = other.to_rgb8();
            rgb.pixels_mut().for_each(|p| p.0.iter_mut().for_each(|c| *c = lut[*c as usize]));
            DynamicImage::ImageRgb8(rgb)
        }
    }
}

pub(crate) fn contrast(image: &DynamicImage, mode: ContrastMode) -> DynamicImage {
    match mode {
        ContrastMode::Equalize => match image {
            DynamicImage::ImageLuma8(grey) => DynamicImage::ImageLuma8(equalize_histogram(grey)),
            other => {
                let [r, g, b] = split_rgb(other).map(|plane| equalize_histogram(&plane));
                DynamicImage::ImageRgb8(merge(&r, &g, &b))
            }
        },
        ContrastMode::Stretch { saturated } => {
            let histogram = histogram(image);
            let total: u64 = histogram.iter().map(|&n| n as u64).sum();
            let clip = (total as f64 * saturated / 200.0) as u64;

            let mut low = 0usize;
            let mut running = 0u64;
            while low < 255 {
                running += histogram[low] as u64;
                if running > clip {
                    break;
                }
                low += 1;
            }
            let mut high = 255usize;
            running = 0;
            while high > 0 {
                running += histogram[high] as u64;
                if running > clip {
                    break;
                }
                high -= 1;
            }
            if high <= low {
                return image.clone();
            }

            let mut lut = [0u8; 256];
            for (value, slot) in lut.iter_mut().enumerate() {
                let scaled = (value as f64 - low as f64) * 255.0 / (high - low) as f64;
                *slot = scaled.round().clamp(0.0, 255.0) as u8;
            }
            apply_lut(image, &lut)
        }
    }
}

pub(crate) fn histogram(image: &DynamicImage) -> Vec<u32> {
    let mut bins = vec![0u32; 256];
    for pixel in image.to_luma8().pixels() {
        bins[pixel.0[0] as usize] += 1;
    }
    bins
}

fn require_rgb(image: &DynamicImage, operation: &str) -> Result<RgbImage> {
    match image {
        DynamicImage::ImageLuma8(_) => Err(RoiError::EngineFailure(format!("{operation} needs an RGB image"))),
        other => Ok(other.to_rgb8()),
    }
}

pub(crate) fn color_histogram(image: &DynamicImage, factor: u8) -> Result<Vec<u32>> {
    let rgb = require_rgb(image, "color histogram")?;
    let shift = 8 - factor as u32;
    let bits = factor as u32;
    let mut bins = vec![0u32; 1 << (3 * bits)];
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0.map(|c| (c as u32) >> shift);
        bins[((r << (2 * bits)) | (g << bits) | b) as usize] += 1;
    }
    Ok(bins)
}

pub(crate) fn reduce_colors(image: &DynamicImage, factor: u8) -> Result<DynamicImage> {
    let mut rgb = require_rgb(image, "color reduction")?;
    let mask = 0xFFu8 << (8 - factor as u32);
    for pixel in rgb.pixels_mut() {
        pixel.0.iter_mut().for_each(|c| *c &= mask);
    }
    Ok(DynamicImage::ImageRgb8(rgb))
}

pub(crate) fn count_colors(image: &DynamicImage) -> Result<usize> {
    let rgb = require_rgb(image, "color count")?;
    let mut seen = vec![false; 1 << 15];
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0.map(|c| (c >> 3) as usize);
        seen[(r << 10) | (g << 5) | b] = true;
    }
    Ok(seen.into_iter().filter(|&s| s).count())
}
