use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use image::{
    Rgba, RgbaImage,
    imageops::{self, FilterType},
};
use log::debug;

use crate::{
    background::ScalingMode,
    error::{Error, Result},
};

/// Bilinear, matching what the backdrop windows use when they scale.
const FILTER: FilterType = FilterType::Triangle;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScaleKey {
    path: PathBuf,
    mode: ScalingMode,
    width: u32,
    height: u32,
}

/// Decoded images and their scaled variants for one topology generation.
///
/// Every buffer handed out stays alive, and identical, for as long as the
/// cache does. Drop the cache when monitor sizes may have changed.
#[derive(Debug, Default)]
pub struct ImageCache {
    originals: HashMap<PathBuf, Arc<RgbaImage>>,
    scaled: HashMap<ScaleKey, Arc<RgbaImage>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `path` fitted into `width`×`height` according to `mode`.
    ///
    /// With [`ScalingMode::Source`] the decoded image is returned as is, so
    /// its size may differ from the requested one.
    pub fn get(
        &mut self,
        path: &Path,
        mode: ScalingMode,
        width: u32,
        height: u32,
    ) -> Result<Arc<RgbaImage>> {
        let key = ScaleKey {
            path: path.to_path_buf(),
            mode,
            width: width.max(1),
            height: height.max(1),
        };

        if let Some(scaled) = self.scaled.get(&key) {
            return Ok(scaled.clone());
        }

        let original = self.original(path)?;
        let scaled = match mode {
            ScalingMode::Source => original,
            ScalingMode::Stretched => Arc::new(imageops::resize(
                &*original,
                key.width,
                key.height,
                FILTER,
            )),
            ScalingMode::Zoomed => Arc::new(zoom(&original, key.width, key.height)),
        };

        debug!(
            "Scaled {} ({}) to {}x{}",
            path.display(),
            mode,
            scaled.width(),
            scaled.height()
        );

        self.scaled.insert(key, scaled.clone());
        Ok(scaled)
    }

    pub fn len(&self) -> usize {
        self.scaled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scaled.is_empty()
    }

    fn original(&mut self, path: &Path) -> Result<Arc<RgbaImage>> {
        if let Some(original) = self.originals.get(path) {
            return Ok(original.clone());
        }

        let decoded = image::open(path).map_err(|source| Error::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let original = Arc::new(decoded.into_rgba8());

        self.originals.insert(path.to_path_buf(), original.clone());
        Ok(original)
    }
}

/// Placement of a uniformly scaled source over a target box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomPlan {
    pub scale: f64,
    /// Offset of the scaled image relative to the target, never positive.
    pub offset_x: f64,
    pub offset_y: f64,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl ZoomPlan {
    pub fn new(source_width: u32, source_height: u32, width: u32, height: u32) -> Self {
        let (source_w, source_h) = (
            f64::from(source_width.max(1)),
            f64::from(source_height.max(1)),
        );
        let (target_w, target_h) = (f64::from(width), f64::from(height));

        let scale_x = target_w / source_w;
        let scale_y = target_h / source_h;

        let (scale, offset_x, offset_y) = if scale_x < scale_y {
            (scale_y, (target_w - source_w * scale_y) / 2.0, 0.0)
        } else {
            (scale_x, 0.0, (target_h - source_h * scale_x) / 2.0)
        };

        Self {
            scale,
            offset_x,
            offset_y,
            scaled_width: ((source_w * scale).ceil() as u32).max(width),
            scaled_height: ((source_h * scale).ceil() as u32).max(height),
        }
    }
}

/// Covers a `width`×`height` opaque canvas with `source`, centered.
///
/// Only the visible part of the source is scaled, so the largest buffer is
/// the target itself however lopsided the aspect ratios are.
fn zoom(source: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
    if source.width() == 0 || source.height() == 0 {
        return canvas;
    }

    let plan = ZoomPlan::new(source.width(), source.height(), width, height);
    let (x, visible_width) = visible_span(plan.offset_x, plan.scale, width, source.width());
    let (y, visible_height) = visible_span(plan.offset_y, plan.scale, height, source.height());

    let visible = imageops::crop_imm(source, x, y, visible_width, visible_height).to_image();
    let scaled = imageops::resize(&visible, width, height, FILTER);

    imageops::overlay(&mut canvas, &scaled, 0, 0);
    canvas
}

/// Start and length, in source pixels, of the part of one axis that lands
/// inside the target.
fn visible_span(offset: f64, scale: f64, target: u32, source: u32) -> (u32, u32) {
    let length = ((f64::from(target) / scale).round() as u32).clamp(1, source);
    let start = ((-offset / scale).round() as u32).min(source - length);

    (start, length)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
        .save(&path)
        .unwrap();
        path
    }

    #[test]
    fn scaled_dimensions_follow_the_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "wall.png", 40, 30);
        let mut cache = ImageCache::new();

        for (width, height) in [(100, 100), (16, 9), (1, 200), (333, 77)] {
            let stretched = cache
                .get(&path, ScalingMode::Stretched, width, height)
                .unwrap();
            assert_eq!(stretched.dimensions(), (width, height));

            let zoomed = cache.get(&path, ScalingMode::Zoomed, width, height).unwrap();
            assert_eq!(zoomed.dimensions(), (width, height));

            let source = cache.get(&path, ScalingMode::Source, width, height).unwrap();
            assert_eq!(source.dimensions(), (40, 30));
        }
    }

    #[test]
    fn identical_keys_share_one_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "wall.png", 20, 20);
        let mut cache = ImageCache::new();

        let first = cache.get(&path, ScalingMode::Zoomed, 64, 48).unwrap();
        let second = cache.get(&path, ScalingMode::Zoomed, 64, 48).unwrap();
        let other = cache.get(&path, ScalingMode::Zoomed, 48, 64).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn source_mode_shares_the_decoded_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "wall.png", 20, 10);
        let mut cache = ImageCache::new();

        let small = cache.get(&path, ScalingMode::Source, 10, 10).unwrap();
        let large = cache.get(&path, ScalingMode::Source, 1000, 1000).unwrap();

        assert!(Arc::ptr_eq(&small, &large));
    }

    #[test]
    fn decode_failures_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        let mut cache = ImageCache::new();

        let err = cache
            .get(&path, ScalingMode::Zoomed, 10, 10)
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(cache.is_empty());
        assert!(cache.originals.is_empty());

        write_image(dir.path(), "broken.png", 4, 4);
        assert!(cache.get(&path, ScalingMode::Zoomed, 10, 10).is_ok());
    }

    #[test]
    fn missing_files_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new();

        assert!(matches!(
            cache.get(&dir.path().join("gone.png"), ScalingMode::Source, 1, 1),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn zoom_plan_covers_the_target() {
        for (source, target) in [
            ((1920, 1080), (1280, 1024)),
            ((800, 600), (1920, 1080)),
            ((3, 7), (1366, 768)),
            ((1000, 1000), (1000, 1000)),
            ((4096, 17), (640, 480)),
        ] {
            let plan = ZoomPlan::new(source.0, source.1, target.0, target.1);

            assert!(plan.scaled_width >= target.0, "{source:?} -> {target:?}");
            assert!(plan.scaled_height >= target.1, "{source:?} -> {target:?}");
            assert!(plan.offset_x <= 0.0 && plan.offset_y <= 0.0);
            assert!(plan.offset_x == 0.0 || plan.offset_y == 0.0);
        }
    }

    #[test]
    fn zoom_plan_centers_the_cropped_axis() {
        // 2:1 source into a square: width overflows and is centered.
        let plan = ZoomPlan::new(200, 100, 100, 100);

        assert_eq!(plan.scale, 1.0);
        assert_eq!(plan.offset_x, -50.0);
        assert_eq!(plan.offset_y, 0.0);
        assert_eq!((plan.scaled_width, plan.scaled_height), (200, 100));
    }

    #[test]
    fn zoomed_output_is_opaque_and_centered() {
        let dir = tempfile::tempdir().unwrap();
        // Left half red, right half blue.
        let path = write_image(dir.path(), "wall.png", 200, 100);
        let mut cache = ImageCache::new();

        let zoomed = cache.get(&path, ScalingMode::Zoomed, 100, 100).unwrap();

        assert!(zoomed.pixels().all(|pixel| pixel.0[3] == 255));
        assert_eq!(zoomed.get_pixel(10, 50), &Rgba([255, 0, 0, 255]));
        assert_eq!(zoomed.get_pixel(90, 50), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn panoramic_sources_keep_their_middle_on_portrait_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panorama.png");
        // Three screens wide: red, green, blue.
        RgbaImage::from_fn(300, 10, |x, _| match x / 100 {
            0 => Rgba([255, 0, 0, 255]),
            1 => Rgba([0, 255, 0, 255]),
            _ => Rgba([0, 0, 255, 255]),
        })
        .save(&path)
        .unwrap();
        let mut cache = ImageCache::new();

        let zoomed = cache.get(&path, ScalingMode::Zoomed, 10, 40).unwrap();

        assert_eq!(zoomed.dimensions(), (10, 40));
        assert_eq!(zoomed.get_pixel(5, 20), &Rgba([0, 255, 0, 255]));
        assert!(zoomed.pixels().all(|pixel| *pixel == Rgba([0, 255, 0, 255])));
    }

    #[test]
    fn visible_span_stays_inside_the_source() {
        // 5760x1080 onto a portrait 1080x1920 monitor.
        let plan = ZoomPlan::new(5760, 1080, 1080, 1920);
        let (x, width) = visible_span(plan.offset_x, plan.scale, 1080, 5760);
        let (y, height) = visible_span(plan.offset_y, plan.scale, 1920, 1080);

        assert_eq!((y, height), (0, 1080));
        assert!((607..=608).contains(&width));
        assert_eq!(x, 2576);

        // Thinner than a pixel once scaled back.
        assert_eq!(visible_span(-10.0, 1000.0, 1, 4), (0, 1));
    }
}
