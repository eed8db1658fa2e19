use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::bucket::ColorBucket;
use crate::error::SamplerError;
use crate::hsv::rgb_to_hsv;

/// Largest edge of the working raster. The classifier's thresholds were tuned
/// against images at this resolution.
pub const MAX_DIMENSION: u32 = 1000;

/// Only every 4th pixel of the row-major pixel sequence is visited.
pub const SAMPLE_STRIDE: usize = 4;

/// Pixels with alpha below this are treated as background and skipped.
pub const ALPHA_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub green: u64,
    #[serde(rename = "yellow-green")]
    pub yellow_green: u64,
    pub yellow: u64,
    pub speckled: u64,
    pub brown: u64,
}

impl BucketCounts {
    pub fn get(&self, bucket: ColorBucket) -> u64 {
        match bucket {
            ColorBucket::Green => self.green,
            ColorBucket::YellowGreen => self.yellow_green,
            ColorBucket::Yellow => self.yellow,
            ColorBucket::Speckled => self.speckled,
            ColorBucket::Brown => self.brown,
        }
    }

    fn increment(&mut self, bucket: ColorBucket) {
        let slot = match bucket {
            ColorBucket::Green => &mut self.green,
            ColorBucket::YellowGreen => &mut self.yellow_green,
            ColorBucket::Yellow => &mut self.yellow,
            ColorBucket::Speckled => &mut self.speckled,
            ColorBucket::Brown => &mut self.brown,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        ColorBucket::all().iter().map(|bucket| self.get(*bucket)).sum()
    }
}

/// Coarse color distribution of one photograph. This is the payload handed
/// to the classification authority, so the serialized field names follow
/// its JSON contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleHistogram {
    #[serde(rename = "colorCounts")]
    bucket_counts: BucketCounts,
    #[serde(rename = "totalPixels")]
    total_sampled: u64,
    /// Unix epoch milliseconds.
    timestamp: i64,
}

impl SampleHistogram {
    /// Builds a histogram from precomputed counts; the total is derived so it
    /// always equals the bucket sum.
    pub fn from_counts(bucket_counts: BucketCounts) -> Self {
        Self {
            total_sampled: bucket_counts.total(),
            bucket_counts,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn bucket_counts(&self) -> &BucketCounts {
        &self.bucket_counts
    }

    pub fn total_sampled(&self) -> u64 {
        self.total_sampled
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn count(&self, bucket: ColorBucket) -> u64 {
        self.bucket_counts.get(bucket)
    }

    pub fn is_empty(&self) -> bool {
        self.total_sampled == 0
    }

    pub fn ratio(&self, bucket: ColorBucket) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.count(bucket) as f64 / self.total_sampled as f64
    }

    /// Bucket with the highest count; ties go to the earlier bucket.
    pub fn dominant_bucket(&self) -> Option<ColorBucket> {
        if self.is_empty() {
            return None;
        }
        ColorBucket::all()
            .iter()
            .copied()
            .fold(None, |best: Option<ColorBucket>, bucket| match best {
                Some(b) if self.count(b) >= self.count(bucket) => Some(b),
                _ => Some(bucket),
            })
    }
}

/// Size of the raster actually sampled for an image of `width` x `height`.
///
/// Images whose longer edge exceeds [`MAX_DIMENSION`] are scaled down so that
/// edge becomes exactly `MAX_DIMENSION`; the other edge is rounded down and
/// never drops below 1. Smaller images are left alone.
pub fn working_size(width: u32, height: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= MAX_DIMENSION {
        return (width, height);
    }

    let scale = |edge: u32| -> u32 {
        let scaled = edge as u64 * MAX_DIMENSION as u64 / longest as u64;
        (scaled as u32).max(1)
    };
    (scale(width), scale(height))
}

/// Reduces a photograph to a [`SampleHistogram`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorSampler;

impl ColorSampler {
    pub fn new() -> Self {
        Self
    }

    /// Decodes `bytes` (any format the `image` crate recognizes) and samples it.
    pub fn sample(&self, bytes: &[u8]) -> Result<SampleHistogram, SamplerError> {
        let img = image::load_from_memory(bytes)?;
        Ok(self.sample_image(&img))
    }

    pub fn sample_file<P: AsRef<Path>>(&self, path: P) -> Result<SampleHistogram, SamplerError> {
        let bytes = std::fs::read(path.as_ref())?;
        debug!("Read {} bytes from {}", bytes.len(), path.as_ref().display());
        self.sample(&bytes)
    }

    /// Runs decode and sampling on the blocking pool so callers on the async
    /// runtime are only suspended, never blocked.
    pub async fn sample_async(&self, bytes: Vec<u8>) -> Result<SampleHistogram, SamplerError> {
        let sampler = *self;
        tokio::task::spawn_blocking(move || sampler.sample(&bytes))
            .await
            .map_err(|e| SamplerError::Task(e.to_string()))?
    }

    pub fn sample_image(&self, img: &DynamicImage) -> SampleHistogram {
        let (width, height) = img.dimensions();
        let (target_width, target_height) = working_size(width, height);

        let raster = if (target_width, target_height) == (width, height) {
            img.to_rgba8()
        } else {
            debug!(
                "Downscaling {}x{} to {}x{} for sampling",
                width, height, target_width, target_height
            );
            image::imageops::resize(
                &img.to_rgba8(),
                target_width,
                target_height,
                FilterType::Triangle,
            )
        };

        self.sample_raster(&raster)
    }

    fn sample_raster(&self, raster: &RgbaImage) -> SampleHistogram {
        let mut bucket_counts = BucketCounts::default();
        let mut total_sampled = 0u64;

        for pixel in raster.pixels().step_by(SAMPLE_STRIDE) {
            let [r, g, b, a] = pixel.0;
            if a < ALPHA_THRESHOLD {
                continue;
            }
            total_sampled += 1;
            bucket_counts.increment(ColorBucket::classify(rgb_to_hsv(r, g, b)));
        }

        debug!(
            "Sampled {} of {} pixels ({}x{})",
            total_sampled,
            raster.width() as u64 * raster.height() as u64,
            raster.width(),
            raster.height()
        );

        SampleHistogram {
            bucket_counts,
            total_sampled,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}
