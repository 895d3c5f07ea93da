//! Template matching on screen captures
//!
//! Scores are zero-mean normalized cross-correlation over luma, so a score of
//! `1.0` means the region is an affine brightness transform of the template
//! and flat regions score `0.0`. Large templates are searched coarse-to-fine:
//! both images are box-downsampled, the strongest separated coarse peaks are
//! refined at full resolution, and the reported confidence is always the
//! full-resolution score. When downsampling erases the template's detail, or
//! the refined peak misses the threshold, the whole screen is scanned at full
//! resolution instead.

use crate::platforms::ScreenSource;
use crate::templates::TemplateStore;
use crate::types::MatchResult;
use crate::AutomationError;
use image::{DynamicImage, GrayImage};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

// a downsampled template side never drops below this
const MIN_PYRAMID_SIDE: u32 = 8;
const COARSE_CANDIDATES: usize = 16;
const FLAT_VARIANCE: f64 = 1e-6;
// coarse needle RMS contrast relative to full resolution below which the
// pyramid is skipped
const MIN_COARSE_DETAIL: f64 = 0.1;

/// Finds a template image on the current screen.
pub trait TemplateLocator: Send + Sync {
    /// Center of the best match scoring at least `threshold`, or `None`.
    fn locate(
        &self,
        template: &Path,
        threshold: f32,
    ) -> Result<Option<MatchResult>, AutomationError>;
}

/// [`TemplateLocator`] that captures the screen on every call
pub struct ScreenMatcher {
    screen: Arc<dyn ScreenSource>,
    templates: Arc<TemplateStore>,
}

impl ScreenMatcher {
    pub fn new(screen: Arc<dyn ScreenSource>, templates: Arc<TemplateStore>) -> Self {
        Self { screen, templates }
    }
}

impl TemplateLocator for ScreenMatcher {
    #[instrument(level = "debug", skip(self, template), fields(template = %template.display()))]
    fn locate(
        &self,
        template: &Path,
        threshold: f32,
    ) -> Result<Option<MatchResult>, AutomationError> {
        let needle = self.templates.load(template)?;
        let shot = self.screen.capture()?;
        let frame = shot.to_image().ok_or_else(|| {
            AutomationError::PlatformError(format!(
                "screenshot buffer does not match {}x{}",
                shot.width, shot.height
            ))
        })?;
        let haystack = DynamicImage::ImageRgba8(frame).to_luma8();

        let Some(best) = find_best_match(&haystack, &needle.pixels, threshold) else {
            debug!(
                "template {}x{} does not fit in screen {}x{}",
                needle.pixels.width(),
                needle.pixels.height(),
                shot.width,
                shot.height
            );
            return Ok(None);
        };

        debug!(
            "best score {:.4} at ({}, {}), threshold {:.2}",
            best.score, best.x, best.y, threshold
        );
        if best.score < threshold {
            return Ok(None);
        }

        Ok(Some(MatchResult {
            x: shot.origin.x + (best.x + needle.pixels.width() / 2) as i32,
            y: shot.origin.y + (best.y + needle.pixels.height() / 2) as i32,
            confidence: best.score,
        }))
    }
}

/// Top-left corner and score of a match in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Best ZNCC placement of `needle` inside `haystack`.
///
/// A coarse-to-fine result is returned only when it scores at least
/// `min_score`. Otherwise the answer comes from an exhaustive full-resolution
/// scan, so any placement reaching `min_score` is never missed.
///
/// Returns `None` when the needle is empty or larger than the haystack.
pub fn find_best_match(
    haystack: &GrayImage,
    needle: &GrayImage,
    min_score: f32,
) -> Option<Placement> {
    let (hw, hh) = haystack.dimensions();
    let (tw, th) = needle.dimensions();
    if tw == 0 || th == 0 || tw > hw || th > hh {
        return None;
    }

    let full = Correlator::new(haystack, needle);
    let factor = pyramid_factor(tw, th);
    if factor == 1 {
        return full.best_exhaustive();
    }

    let small_haystack = downsample(haystack, factor);
    let small_needle = downsample(needle, factor);
    let coarse = Correlator::new(&small_haystack, &small_needle);
    if coarse.contrast() < full.contrast() * MIN_COARSE_DETAIL {
        debug!("template detail lost at 1/{factor} scale, scanning full resolution");
        return full.best_exhaustive();
    }

    let mut best: Option<Placement> = None;
    for candidate in coarse.top_candidates(COARSE_CANDIDATES) {
        let cx = candidate.x * factor;
        let cy = candidate.y * factor;
        let xs = cx.saturating_sub(factor)..=(cx + factor).min(hw - tw);
        let ys = cy.saturating_sub(factor)..=(cy + factor).min(hh - th);
        if let Some(refined) = full.best_in(xs, ys) {
            if best.map_or(true, |b| refined.score > b.score) {
                best = Some(refined);
            }
        }
    }

    match best {
        Some(found) if found.score >= min_score => Some(found),
        _ => {
            debug!(
                "coarse peak {:.4} below {:.2}, scanning full resolution",
                best.map_or(0.0, |b| b.score),
                min_score
            );
            full.best_exhaustive()
        }
    }
}

fn pyramid_factor(tw: u32, th: u32) -> u32 {
    [4, 2]
        .into_iter()
        .find(|f| tw / f >= MIN_PYRAMID_SIDE && th / f >= MIN_PYRAMID_SIDE)
        .unwrap_or(1)
}

/// Box-average `image` over `factor`x`factor` blocks, dropping partial blocks
fn downsample(image: &GrayImage, factor: u32) -> GrayImage {
    let (w, h) = (image.width() / factor, image.height() / factor);
    let area = factor * factor;
    GrayImage::from_fn(w, h, |x, y| {
        let mut sum = 0u32;
        for dy in 0..factor {
            for dx in 0..factor {
                sum += u32::from(image.get_pixel(x * factor + dx, y * factor + dy)[0]);
            }
        }
        image::Luma([((sum + area / 2) / area) as u8])
    })
}

/// Summed-area tables of pixel values and squared pixel values
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0.0; stride * (h + 1)];
        let mut sq = vec![0.0; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = f64::from(raw[y * w + x]);
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let (a, b, c, d) = (y * s + x, y * s + x + w, (y + h) * s + x, (y + h) * s + x + w);
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// Scores placements of one needle inside one haystack
struct Correlator<'a> {
    haystack: &'a [u8],
    haystack_width: usize,
    haystack_height: usize,
    integral: Integral,
    width: usize,
    height: usize,
    // needle minus its mean, row-major
    centered: Vec<f32>,
    needle_norm: f64,
}

impl<'a> Correlator<'a> {
    fn new(haystack: &'a GrayImage, needle: &GrayImage) -> Self {
        let n = f64::from(needle.width() * needle.height());
        let mean = needle.as_raw().iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let centered: Vec<f64> = needle.as_raw().iter().map(|&v| f64::from(v) - mean).collect();
        let needle_norm = centered.iter().map(|v| v * v).sum::<f64>().sqrt();
        let centered = centered.into_iter().map(|v| v as f32).collect();
        Self {
            haystack: haystack.as_raw(),
            haystack_width: haystack.width() as usize,
            haystack_height: haystack.height() as usize,
            integral: Integral::new(haystack),
            width: needle.width() as usize,
            height: needle.height() as usize,
            centered,
            needle_norm,
        }
    }

    /// RMS deviation of the needle from its mean
    fn contrast(&self) -> f64 {
        self.needle_norm / ((self.width * self.height) as f64).sqrt()
    }

    fn score_at(&self, x: usize, y: usize) -> f32 {
        let n = (self.width * self.height) as f64;
        let (sum, sq) = self.integral.window(x, y, self.width, self.height);
        let variance = sq - sum * sum / n;
        if variance <= FLAT_VARIANCE || self.needle_norm <= FLAT_VARIANCE {
            return 0.0;
        }

        // the needle is zero-mean, so the window mean drops out of the numerator
        let mut numerator = 0.0;
        for row in 0..self.height {
            let start = (y + row) * self.haystack_width + x;
            let window_row = &self.haystack[start..start + self.width];
            let needle_row = &self.centered[row * self.width..(row + 1) * self.width];
            let row_sum: f32 = window_row
                .iter()
                .zip(needle_row)
                .map(|(&p, &t)| f32::from(p) * t)
                .sum();
            numerator += f64::from(row_sum);
        }

        (numerator / (self.needle_norm * variance.sqrt())).clamp(-1.0, 1.0) as f32
    }

    fn best_in(
        &self,
        xs: std::ops::RangeInclusive<u32>,
        ys: std::ops::RangeInclusive<u32>,
    ) -> Option<Placement> {
        let mut best: Option<Placement> = None;
        for y in ys {
            for x in xs.clone() {
                let score = self.score_at(x as usize, y as usize);
                if best.map_or(true, |b| score > b.score) {
                    best = Some(Placement { x, y, score });
                }
            }
        }
        best
    }

    /// Every placement scored, with rows split across worker threads
    fn best_exhaustive(&self) -> Option<Placement> {
        let max_x = (self.haystack_width - self.width) as u32;
        let rows = self.haystack_height - self.height + 1;
        let workers = std::thread::available_parallelism()
            .map_or(1, |n| n.get())
            .min(rows);
        let band = rows.div_ceil(workers);
        debug!(
            "full scan of {} placements x {} pixels on {} threads",
            (max_x as usize + 1) * rows,
            self.width * self.height,
            workers
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|i| {
                    let start = (i * band) as u32;
                    let end = ((i + 1) * band).min(rows) as u32;
                    scope.spawn(move || {
                        if start >= end {
                            return None;
                        }
                        self.best_in(0..=max_x, start..=end - 1)
                    })
                })
                .collect();

            // bands are merged in row order so ties keep the first placement
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok().flatten())
                .fold(None, |best: Option<Placement>, p| match best {
                    Some(b) if b.score >= p.score => Some(b),
                    _ => Some(p),
                })
        })
    }

    /// Up to `k` best placements, each at least half a needle away from
    /// every stronger one
    fn top_candidates(&self, k: usize) -> Vec<Placement> {
        let max_x = self.haystack_width - self.width;
        let max_y = self.haystack_height - self.height;
        let mut scored = Vec::new();
        for y in 0..=max_y {
            for x in 0..=max_x {
                let score = self.score_at(x, y);
                if score > 0.0 {
                    scored.push(Placement {
                        x: x as u32,
                        y: y as u32,
                        score,
                    });
                }
            }
        }
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let rx = (self.width as u32 / 2).max(1);
        let ry = (self.height as u32 / 2).max(1);
        let mut picked: Vec<Placement> = Vec::with_capacity(k);
        for p in scored {
            if picked.len() == k {
                break;
            }
            if picked
                .iter()
                .all(|q| q.x.abs_diff(p.x) > rx || q.y.abs_diff(p.y) > ry)
            {
                picked.push(p);
            }
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn texture(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(37) ^ y.wrapping_mul(91)).wrapping_add(x * y) % 251;
            Luma([v as u8])
        })
    }

    fn crop(image: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> GrayImage {
        image::imageops::crop_imm(image, x, y, w, h).to_image()
    }

    #[test]
    fn exact_crop_scores_one() {
        let screen = texture(64, 48);
        let needle = crop(&screen, 21, 13, 6, 5);
        let best = find_best_match(&screen, &needle, 0.8).unwrap();
        assert_eq!((best.x, best.y), (21, 13));
        assert!(best.score > 0.999, "score {}", best.score);
    }

    #[test]
    fn oversized_needle_has_no_placement() {
        let screen = texture(10, 10);
        let needle = texture(11, 4);
        assert!(find_best_match(&screen, &needle, 0.8).is_none());
    }

    #[test]
    fn flat_regions_score_zero() {
        let screen = GrayImage::from_pixel(20, 20, Luma([128]));
        let needle = crop(&texture(20, 20), 0, 0, 5, 5);
        let best = find_best_match(&screen, &needle, 0.8).unwrap();
        assert_eq!(best.score, 0.0);
    }

    #[test]
    fn coarse_candidates_are_separated() {
        let screen = texture(64, 48);
        let needle = crop(&screen, 20, 10, 8, 8);
        let candidates = Correlator::new(&screen, &needle).top_candidates(6);

        assert_eq!((candidates[0].x, candidates[0].y), (20, 10));
        for (i, a) in candidates.iter().enumerate() {
            for b in &candidates[i + 1..] {
                assert!(a.x.abs_diff(b.x) > 4 || a.y.abs_diff(b.y) > 4, "{a:?} {b:?}");
            }
        }
    }

    #[test]
    fn lost_detail_falls_back_to_full_scan() {
        let mut screen = GrayImage::from_pixel(120, 80, Luma([240]));
        let needle = GrayImage::from_fn(16, 16, |x, y| Luma([if (x + y) % 2 == 0 { 0 } else { 255 }]));
        image::imageops::replace(&mut screen, &needle, 97, 61);

        let best = find_best_match(&screen, &needle, 0.8).unwrap();
        assert_eq!((best.x, best.y), (97, 61));
    }

    #[test]
    fn pyramid_factor_keeps_min_side() {
        assert_eq!(pyramid_factor(64, 40), 4);
        assert_eq!(pyramid_factor(64, 20), 2);
        assert_eq!(pyramid_factor(15, 64), 1);
    }
}
