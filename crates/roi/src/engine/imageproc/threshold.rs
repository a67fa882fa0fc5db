//! Automatic threshold selection on 8-bit histograms.
//!
//! Each selector returns the level `t` that separates the two classes; the
//! caller decides which side of `t` is foreground. Selectors that can fail to
//! settle report `None`.

use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;
use tracing::debug;

use crate::{
    error::{Result, RoiError},
    options::ThresholdMethod,
};

const MAX_ITERATIONS: usize = 10_000;
const DBL_EPSILON: f64 = f64::EPSILON;

pub(crate) fn binarize(image: &GrayImage, method: ThresholdMethod, dark_background: bool) -> Result<GrayImage> {
    let level = select_level(image, method)?;
    debug!(%method, level, dark_background, "selected threshold level");
    let mut mask = GrayImage::new(image.width(), image.height());
    for (source, target) in image.pixels().zip(mask.pixels_mut()) {
        let value = source.0[0];
        let foreground = if dark_background { value > level } else { value <= level };
        *target = Luma([if foreground { 255 } else { 0 }]);
    }
    Ok(mask)
}

pub(crate) fn select_level(image: &GrayImage, method: ThresholdMethod) -> Result<u8> {
    if image.width() == 0 || image.height() == 0 {
        return Err(RoiError::EngineFailure("cannot threshold an empty image".into()));
    }
    let mut histogram = [0i64; 256];
    for pixel in image.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }

    let level = match method {
        ThresholdMethod::Default => ij_default(&histogram),
        ThresholdMethod::Huang => Some(huang(&histogram)),
        ThresholdMethod::IjIsoData => Some(ij_isodata(&histogram)),
        ThresholdMethod::Intermodes => intermodes(&histogram),
        ThresholdMethod::IsoData => isodata(&histogram),
        ThresholdMethod::Li => li(&histogram),
        ThresholdMethod::MaxEntropy => Some(max_entropy(&histogram)),
        ThresholdMethod::Mean => Some(mean(&histogram)),
        ThresholdMethod::MinError => min_error(&histogram),
        ThresholdMethod::Minimum => minimum(&histogram),
        ThresholdMethod::Moments => Some(moments(&histogram)),
        ThresholdMethod::Otsu => Some(otsu_level(image) as i32),
        ThresholdMethod::Percentile => Some(percentile(&histogram)),
        ThresholdMethod::RenyiEntropy => Some(renyi_entropy(&histogram)),
        ThresholdMethod::Shanbhag => Some(shanbhag(&histogram)),
        ThresholdMethod::Triangle => Some(triangle(&histogram)),
        ThresholdMethod::Yen => Some(yen(&histogram)),
    };

    match level {
        Some(level) => Ok(level.clamp(0, 255) as u8),
        None => Err(RoiError::EngineFailure(format!("{method} threshold did not converge"))),
    }
}

type Histogram = [i64; 256];

fn total(data: &Histogram) -> f64 {
    data.iter().sum::<i64>() as f64
}

/// IJ_IsoData after clipping an overwhelming mode.
fn ij_default(data: &Histogram) -> Option<i32> {
    let mut clipped = *data;
    let (mode, max_count) = data
        .iter()
        .enumerate()
        .fold((0, 0), |best, (i, &count)| if count > best.1 { (i, count) } else { best });
    let second = data
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != mode)
        .map(|(_, &count)| count)
        .max()
        .unwrap_or(0);
    if max_count > second * 2 && second != 0 {
        clipped[mode] = (second as f64 * 1.5) as i64;
    }
    Some(ij_isodata(&clipped))
}

fn ij_isodata(data: &Histogram) -> i32 {
    let mut data = *data;
    let max_value = 255usize;
    data[0] = 0;
    data[max_value] = 0;

    let mut min = 0;
    while data[min] == 0 && min < max_value {
        min += 1;
    }
    let mut max = max_value;
    while data[max] == 0 && max > 0 {
        max -= 1;
    }
    if min >= max {
        return 128;
    }

    let mut moving = min;
    let mut result;
    loop {
        let (mut sum1, mut sum2, mut sum3, mut sum4) = (0.0, 0.0, 0.0, 0.0);
        for (i, &count) in data.iter().enumerate().take(moving + 1).skip(min) {
            sum1 += i as f64 * count as f64;
            sum2 += count as f64;
        }
        for (i, &count) in data.iter().enumerate().take(max + 1).skip(moving + 1) {
            sum3 += i as f64 * count as f64;
            sum4 += count as f64;
        }
        result = (sum1 / sum2 + sum3 / sum4) / 2.0;
        moving += 1;
        if !((moving + 1) as f64 <= result && moving < max - 1) {
            break;
        }
    }
    result.round() as i32
}

fn huang(data: &Histogram) -> i32 {
    let first = data.iter().position(|&c| c != 0).unwrap_or(0);
    let last = data.iter().rposition(|&c| c != 0).unwrap_or(255).max(first);
    if first == last {
        return first as i32;
    }
    let term = 1.0 / (last - first) as f64;

    let mut mu_0 = [0.0f64; 256];
    let (mut sum, mut count) = (0.0, 0.0);
    for ih in first..256 {
        sum += ih as f64 * data[ih] as f64;
        count += data[ih] as f64;
        mu_0[ih] = sum / count;
    }
    let mut mu_1 = [0.0f64; 256];
    let (mut sum, mut count) = (0.0, 0.0);
    for ih in (1..=last).rev() {
        sum += ih as f64 * data[ih] as f64;
        count += data[ih] as f64;
        mu_1[ih - 1] = sum / count;
    }

    let fuzzy = |count: i64, mu_x: f64| {
        if mu_x < 1e-6 || mu_x > 0.999999 {
            0.0
        } else {
            count as f64 * (-mu_x * mu_x.ln() - (1.0 - mu_x) * (1.0 - mu_x).ln())
        }
    };

    let mut threshold = -1;
    let mut min_ent = f64::MAX;
    for it in 0..256 {
        let mut ent = 0.0;
        for ih in 0..=it {
            ent += fuzzy(data[ih], 1.0 / (1.0 + term * (ih as f64 - mu_0[it]).abs()));
        }
        for ih in it + 1..256 {
            ent += fuzzy(data[ih], 1.0 / (1.0 + term * (ih as f64 - mu_1[it]).abs()));
        }
        if ent < min_ent {
            min_ent = ent;
            threshold = it as i32;
        }
    }
    threshold
}

fn is_bimodal(y: &[f64; 256]) -> bool {
    let mut modes = 0;
    for k in 1..255 {
        if y[k - 1] < y[k] && y[k + 1] < y[k] {
            modes += 1;
            if modes > 2 {
                return false;
            }
        }
    }
    modes == 2
}

/// Smooth with a 3-point running mean until exactly two peaks remain.
fn smooth_until_bimodal(data: &Histogram) -> Option<[f64; 256]> {
    let mut histo = [0.0f64; 256];
    for (target, &count) in histo.iter_mut().zip(data) {
        *target = count as f64;
    }
    let mut iterations = 0;
    while !is_bimodal(&histo) {
        let mut smoothed = [0.0f64; 256];
        for i in 1..255 {
            smoothed[i] = (histo[i - 1] + histo[i] + histo[i + 1]) / 3.0;
        }
        smoothed[0] = (histo[0] + histo[1]) / 3.0;
        smoothed[255] = (histo[254] + histo[255]) / 3.0;
        histo = smoothed;
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return None;
        }
    }
    Some(histo)
}

fn intermodes(data: &Histogram) -> Option<i32> {
    let histo = smooth_until_bimodal(data)?;
    let peaks: usize = (1..255)
        .filter(|&i| histo[i - 1] < histo[i] && histo[i + 1] < histo[i])
        .sum();
    Some((peaks as f64 / 2.0).floor() as i32)
}

fn minimum(data: &Histogram) -> Option<i32> {
    let max = data.iter().rposition(|&c| c > 0).unwrap_or(0);
    let histo = smooth_until_bimodal(data)?;
    (1..max)
        .find(|&i| histo[i - 1] > histo[i] && histo[i + 1] >= histo[i])
        .map(|i| i as i32)
}

fn isodata(data: &Histogram) -> Option<i32> {
    let mut g = (1..256).find(|&i| data[i] > 0).map(|i| i + 1).unwrap_or(0);
    loop {
        let (mut low, mut low_count) = (0i64, 0i64);
        for i in 0..(g + 1).min(256) {
            low_count += data[i];
            low += data[i] * i as i64;
        }
        let (mut high, mut high_count) = (0i64, 0i64);
        for i in (g + 1).min(256)..256 {
            high_count += data[i];
            high += data[i] * i as i64;
        }
        if low_count > 0 && high_count > 0 {
            let l = low / low_count;
            let h = high / high_count;
            if g as i64 == ((l + h) as f64 / 2.0).round() as i64 {
                return Some(g as i32);
            }
        }
        g += 1;
        if g > 254 {
            return None;
        }
    }
}

fn li(data: &Histogram) -> Option<i32> {
    let tolerance = 0.5;
    let num_pixels = total(data);
    let mean = (1..256).map(|ih| ih as f64 * data[ih] as f64).sum::<f64>() / num_pixels;

    let mut new_thresh = mean;
    let mut threshold;
    let mut iterations = 0;
    loop {
        let old_thresh = new_thresh;
        threshold = ((old_thresh + 0.5) as i64).clamp(0, 255) as usize;

        let (mut sum_back, mut num_back) = (0.0, 0.0);
        for ih in 0..=threshold {
            sum_back += ih as f64 * data[ih] as f64;
            num_back += data[ih] as f64;
        }
        let mean_back = if num_back == 0.0 { 0.0 } else { sum_back / num_back };

        let (mut sum_obj, mut num_obj) = (0.0, 0.0);
        for ih in threshold + 1..256 {
            sum_obj += ih as f64 * data[ih] as f64;
            num_obj += data[ih] as f64;
        }
        let mean_obj = if num_obj == 0.0 { 0.0 } else { sum_obj / num_obj };

        let temp = (mean_back - mean_obj) / (mean_back.ln() - mean_obj.ln());
        new_thresh = if temp < -DBL_EPSILON {
            (temp - 0.5).trunc()
        } else {
            (temp + 0.5).trunc()
        };

        // NaN compares false and ends the search like a converged one
        if !((new_thresh - old_thresh).abs() > tolerance) {
            break;
        }
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return None;
        }
    }
    Some(threshold as i32)
}

/// Normalized histogram with its cumulative sums and the first and last
/// bins that carry probability mass.
struct Cumulative {
    norm: [f64; 256],
    p1: [f64; 256],
    p2: [f64; 256],
    first: usize,
    last: usize,
}

impl Cumulative {
    fn new(data: &Histogram) -> Self {
        let total = total(data);
        let mut norm = [0.0; 256];
        for (target, &count) in norm.iter_mut().zip(data) {
            *target = count as f64 / total;
        }
        let mut p1 = [0.0; 256];
        let mut p2 = [0.0; 256];
        p1[0] = norm[0];
        p2[0] = 1.0 - p1[0];
        for ih in 1..256 {
            p1[ih] = p1[ih - 1] + norm[ih];
            p2[ih] = 1.0 - p1[ih];
        }
        let first = (0..256).find(|&ih| p1[ih].abs() >= DBL_EPSILON).unwrap_or(0);
        let last = (first..256).rev().find(|&ih| p2[ih].abs() >= DBL_EPSILON).unwrap_or(255);
        Self {
            norm,
            p1,
            p2,
            first,
            last,
        }
    }

    /// Shannon entropy of both classes at split `it`.
    fn shannon(&self, data: &Histogram, it: usize) -> f64 {
        let mut back = 0.0;
        for ih in 0..=it {
            if data[ih] != 0 {
                let p = self.norm[ih] / self.p1[it];
                back -= p * p.ln();
            }
        }
        let mut obj = 0.0;
        for ih in it + 1..256 {
            if data[ih] != 0 {
                let p = self.norm[ih] / self.p2[it];
                obj -= p * p.ln();
            }
        }
        back + obj
    }
}

fn max_entropy(data: &Histogram) -> i32 {
    let cumulative = Cumulative::new(data);
    let mut threshold = -1;
    let mut max_ent = f64::MIN_POSITIVE;
    for it in cumulative.first..=cumulative.last {
        let ent = cumulative.shannon(data, it);
        if max_ent < ent {
            max_ent = ent;
            threshold = it as i32;
        }
    }
    threshold
}

fn mean(data: &Histogram) -> i32 {
    let sum: f64 = data.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();
    (sum / total(data)).floor() as i32
}

fn partial_sums(data: &Histogram, j: usize) -> (f64, f64, f64) {
    let (mut a, mut b, mut c) = (0.0, 0.0, 0.0);
    for (i, &count) in data.iter().enumerate().take(j + 1) {
        let (i, count) = (i as f64, count as f64);
        a += count;
        b += i * count;
        c += i * i * count;
    }
    (a, b, c)
}

/// Kittler and Illingworth minimum error, iterated from the mean level.
fn min_error(data: &Histogram) -> Option<i32> {
    let mut threshold = mean(data);
    let mut previous = -2;
    let (a_all, b_all, c_all) = partial_sums(data, 255);
    let mut iterations = 0;

    while threshold != previous {
        let (a, b, c) = partial_sums(data, threshold.clamp(0, 255) as usize);
        let mu = b / a;
        let nu = (b_all - b) / (a_all - a);
        let p = a / a_all;
        let q = (a_all - a) / a_all;
        let sigma2 = c / a - mu * mu;
        let tau2 = (c_all - c) / (a_all - a) - nu * nu;

        let w0 = 1.0 / sigma2 - 1.0 / tau2;
        let w1 = mu / sigma2 - nu / tau2;
        let w2 = mu * mu / sigma2 - nu * nu / tau2 + ((sigma2 * q * q) / (tau2 * p * p)).log10();

        let sqterm = w1 * w1 - w0 * w2;
        if sqterm < 0.0 {
            debug!("MinError stopped early: the next level would be imaginary");
            break;
        }
        previous = threshold;
        let next = (w1 + sqterm.sqrt()) / w0;
        if !next.is_nan() {
            threshold = next.floor() as i32;
        }

        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return None;
        }
    }
    Some(threshold)
}

fn moments(data: &Histogram) -> i32 {
    let total = total(data);
    let mut histo = [0.0f64; 256];
    for (target, &count) in histo.iter_mut().zip(data) {
        *target = count as f64 / total;
    }
    let m0 = 1.0;
    let (mut m1, mut m2, mut m3) = (0.0, 0.0, 0.0);
    for (i, &p) in histo.iter().enumerate() {
        let di = i as f64;
        m1 += di * p;
        m2 += di * di * p;
        m3 += di * di * di * p;
    }
    let cd = m0 * m2 - m1 * m1;
    let c0 = (-m2 * m2 + m1 * m3) / cd;
    let c1 = (m0 * -m3 + m2 * m1) / cd;
    let root = (c1 * c1 - 4.0 * c0).sqrt();
    let z0 = 0.5 * (-c1 - root);
    let z1 = 0.5 * (-c1 + root);
    let p0 = (z1 - m1) / (z1 - z0);

    let mut sum = 0.0;
    for (i, &p) in histo.iter().enumerate() {
        sum += p;
        if sum > p0 {
            return i as i32;
        }
    }
    -1
}

fn percentile(data: &Histogram) -> i32 {
    let ptile = 0.5;
    let total = total(data);
    let mut threshold = -1;
    let mut best = 1.0;
    let mut running = 0.0;
    for (i, &count) in data.iter().enumerate() {
        running += count as f64;
        let distance = (running / total - ptile).abs();
        if distance < best {
            best = distance;
            threshold = i as i32;
        }
    }
    threshold
}

fn renyi_entropy(data: &Histogram) -> i32 {
    let cumulative = Cumulative::new(data);
    let Cumulative {
        norm, p1, p2, first, last, ..
    } = &cumulative;
    let (first, last) = (*first, *last);

    // alpha = 1 is plain maximum entropy
    let mut t_star2 = 0;
    let mut max_ent = 0.0;
    for it in first..=last {
        let ent = cumulative.shannon(data, it);
        if max_ent < ent {
            max_ent = ent;
            t_star2 = it;
        }
    }

    let renyi = |alpha: f64| {
        let term = 1.0 / (1.0 - alpha);
        let mut best = 0;
        let mut max_ent = 0.0;
        for it in first..=last {
            let mut back = 0.0;
            for ih in 0..=it {
                back += (norm[ih] / p1[it]).powf(alpha);
            }
            let mut obj = 0.0;
            for ih in it + 1..256 {
                obj += (norm[ih] / p2[it]).powf(alpha);
            }
            let product = back * obj;
            let ent = term * if product > 0.0 { product.ln() } else { 0.0 };
            if ent > max_ent {
                max_ent = ent;
                best = it;
            }
        }
        best
    };
    let mut t_star1 = renyi(0.5);
    let mut t_star3 = renyi(2.0);

    if t_star2 < t_star1 {
        std::mem::swap(&mut t_star1, &mut t_star2);
    }
    if t_star3 < t_star2 {
        std::mem::swap(&mut t_star2, &mut t_star3);
    }
    if t_star2 < t_star1 {
        std::mem::swap(&mut t_star1, &mut t_star2);
    }

    let close = |a: usize, b: usize| a.abs_diff(b) <= 5;
    let (beta1, beta2, beta3) = match (close(t_star1, t_star2), close(t_star2, t_star3)) {
        (true, true) => (1.0, 2.0, 1.0),
        (true, false) => (0.0, 1.0, 3.0),
        (false, true) => (3.0, 1.0, 0.0),
        (false, false) => (1.0, 2.0, 1.0),
    };
    let omega = p1[t_star3] - p1[t_star1];
    (t_star1 as f64 * (p1[t_star1] + 0.25 * omega * beta1)
        + 0.25 * t_star2 as f64 * omega * beta2
        + t_star3 as f64 * (p2[t_star3] + 0.25 * omega * beta3)) as i32
}

fn shanbhag(data: &Histogram) -> i32 {
    let Cumulative {
        norm, p1, p2, first, last,
    } = Cumulative::new(data);

    let mut threshold = -1;
    let mut min_ent = f64::MAX;
    for it in first..=last {
        let term = 0.5 / p1[it];
        let mut back = 0.0;
        for ih in 1..=it {
            back -= norm[ih] * (1.0 - term * p1[ih - 1]).ln();
        }
        back *= term;

        let term = 0.5 / p2[it];
        let mut obj = 0.0;
        for ih in it + 1..256 {
            obj -= norm[ih] * (1.0 - term * p2[ih]).ln();
        }
        obj *= term;

        let ent = (back - obj).abs();
        if ent < min_ent {
            min_ent = ent;
            threshold = it as i32;
        }
    }
    threshold
}

/// Zack's triangle method, measured toward the longer tail.
fn triangle(data: &Histogram) -> i32 {
    let mut data = *data;
    let len = data.len();

    let mut min = data.iter().position(|&c| c > 0).unwrap_or(0);
    if min > 0 {
        min -= 1;
    }
    let mut min2 = (1..len).rev().find(|&i| data[i] > 0).unwrap_or(0);
    if min2 < len - 1 {
        min2 += 1;
    }
    let mut max = 0;
    let mut dmax = 0;
    for (i, &count) in data.iter().enumerate() {
        if count > dmax {
            max = i;
            dmax = count;
        }
    }

    let inverted = (max as i64 - min as i64) < (min2 as i64 - max as i64);
    if inverted {
        data.reverse();
        min = len - 1 - min2;
        max = len - 1 - max;
    }
    if min == max {
        return min as i32;
    }

    let mut nx = data[max] as f64;
    let mut ny = min as f64 - max as f64;
    let d = (nx * nx + ny * ny).sqrt();
    nx /= d;
    ny /= d;
    let d = nx * min as f64 + ny * data[min] as f64;

    let mut split = min as i64;
    let mut split_distance = 0.0;
    for i in min + 1..=max {
        let distance = nx * i as f64 + ny * data[i] as f64 - d;
        if distance > split_distance {
            split = i as i64;
            split_distance = distance;
        }
    }
    split -= 1;

    if inverted {
        (len as i64 - 1 - split) as i32
    } else {
        split as i32
    }
}

fn yen(data: &Histogram) -> i32 {
    let total = total(data);
    let mut norm = [0.0f64; 256];
    for (target, &count) in norm.iter_mut().zip(data) {
        *target = count as f64 / total;
    }
    let mut p1 = [0.0f64; 256];
    let mut p1_sq = [0.0f64; 256];
    p1[0] = norm[0];
    p1_sq[0] = norm[0] * norm[0];
    for ih in 1..256 {
        p1[ih] = p1[ih - 1] + norm[ih];
        p1_sq[ih] = p1_sq[ih - 1] + norm[ih] * norm[ih];
    }
    let mut p2_sq = [0.0f64; 256];
    for ih in (0..255).rev() {
        p2_sq[ih] = p2_sq[ih + 1] + norm[ih + 1] * norm[ih + 1];
    }

    let mut threshold = -1;
    let mut max_crit = f64::MIN_POSITIVE;
    for it in 0..256 {
        let sq = p1_sq[it] * p2_sq[it];
        let spread = p1[it] * (1.0 - p1[it]);
        let crit = -(if sq > 0.0 { sq.ln() } else { 0.0 }) + 2.0 * if spread > 0.0 { spread.ln() } else { 0.0 };
        if crit > max_crit {
            max_crit = crit;
            threshold = it as i32;
        }
    }
    threshold
}
