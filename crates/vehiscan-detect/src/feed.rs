use std::path::{Path, PathBuf};

use image::{imageops, Rgb, RgbImage};
use ndarray::{s, Array2, Array3, Array4};

use vehiscan_core::{DetectError, Result};

/// Fill value for the canvas area the scaled image does not cover.
const CANVAS_FILL: u8 = 128;

/// Canvas size and pixel statistics for network input preparation.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Square canvas edge the graph was exported with.
    pub input_size: u32,
    /// Per-channel mean, applied after scaling pixels to [0, 1].
    pub mean: [f32; 3],
    /// Per-channel standard deviation.
    pub std: [f32; 3],
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            input_size: 608,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl FeedConfig {
    /// Letterbox `image` onto the canvas and normalize to CHW floats.
    pub fn prepare(&self, image: &RgbImage) -> Array3<f32> {
        let canvas = letterbox(image, self.input_size);
        let size = self.input_size as usize;
        let mut out = Array3::<f32>::zeros((3, size, size));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                out[[channel, y as usize, x as usize]] =
                    (pixel[channel] as f32 / 255.0 - self.mean[channel]) / self.std[channel];
            }
        }
        out
    }
}

/// Input to one detection call.
///
/// Paths and decoded images are alternative sources; when both are
/// non-empty, paths win and the images are ignored.
#[derive(Debug, Clone, Default)]
pub struct DetectInput {
    pub paths: Vec<PathBuf>,
    pub images: Vec<RgbImage>,
}

impl DetectInput {
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            images: Vec::new(),
        }
    }

    pub fn from_images(images: Vec<RgbImage>) -> Self {
        Self {
            paths: Vec::new(),
            images,
        }
    }

    /// Number of live inputs.
    pub fn len(&self) -> usize {
        if !self.paths.is_empty() {
            self.paths.len()
        } else {
            self.images.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One engine-ready batch.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Normalized CHW pixels, [batch, 3, S, S].
    pub images: Array4<f32>,
    /// Original (height, width) per image, [batch, 2].
    pub sizes: Array2<i32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.images.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
enum Source<'a> {
    Paths(&'a [PathBuf]),
    Images(&'a [RgbImage]),
}

impl Source<'_> {
    fn len(&self) -> usize {
        match self {
            Source::Paths(paths) => paths.len(),
            Source::Images(images) => images.len(),
        }
    }
}

/// Lazily decodes, letterboxes, and batches inputs for the engine.
///
/// A single pass: each `next` call decodes the next `batch_size` inputs
/// and stacks them; the final batch may be short. A decode failure
/// surfaces on the batch that pulled it and ends the feed.
#[derive(Debug)]
pub struct ImageFeed<'a> {
    source: Source<'a>,
    config: &'a FeedConfig,
    batch_size: usize,
    cursor: usize,
}

impl<'a> ImageFeed<'a> {
    /// Set up a feed over `input`.
    ///
    /// Path inputs are checked for existence up front so a bad path
    /// fails the call before any decoding starts.
    pub fn new(input: &'a DetectInput, config: &'a FeedConfig, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(DetectError::InvalidInput(
                "batch_size must be at least 1".into(),
            ));
        }
        let source = if !input.paths.is_empty() {
            for path in &input.paths {
                if !path.is_file() {
                    return Err(DetectError::InvalidInput(format!(
                        "image path does not exist: {}",
                        path.display()
                    )));
                }
            }
            Source::Paths(&input.paths)
        } else {
            Source::Images(&input.images)
        };
        Ok(Self {
            source,
            config,
            batch_size,
            cursor: 0,
        })
    }

    fn make_batch(&self, take: usize) -> Result<Batch> {
        let size = self.config.input_size as usize;
        let mut images = Array4::<f32>::zeros((take, 3, size, size));
        let mut sizes = Array2::<i32>::zeros((take, 2));

        for slot in 0..take {
            let index = self.cursor + slot;
            let decoded;
            let image = match self.source {
                Source::Paths(paths) => {
                    decoded = load_rgb(&paths[index])?;
                    &decoded
                }
                Source::Images(list) => &list[index],
            };
            sizes[[slot, 0]] = image.height() as i32;
            sizes[[slot, 1]] = image.width() as i32;
            let plane = self.config.prepare(image);
            images.slice_mut(s![slot, .., .., ..]).assign(&plane);
        }

        tracing::debug!(
            first = self.cursor,
            count = take,
            "prepared detection batch"
        );

        Ok(Batch { images, sizes })
    }
}

impl Iterator for ImageFeed<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.source.len().saturating_sub(self.cursor);
        if remaining == 0 {
            return None;
        }
        let take = remaining.min(self.batch_size);
        match self.make_batch(take) {
            Ok(batch) => {
                self.cursor += take;
                Some(Ok(batch))
            }
            Err(e) => {
                // Decode failures are not retried; end the feed.
                self.cursor = self.source.len();
                Some(Err(e))
            }
        }
    }
}

/// Decode an image file into RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let image = image::open(path)
        .map_err(|e| DetectError::ImageDecode(format!("{}: {e}", path.display())))?;
    Ok(image.to_rgb8())
}

/// Scale factor that fits (width, height) inside the square canvas.
pub fn letterbox_scale(width: u32, height: u32, input_size: u32) -> f32 {
    (input_size as f32 / width as f32).min(input_size as f32 / height as f32)
}

/// Extent the scaled image occupies on the canvas.
pub fn scaled_extent(width: u32, height: u32, input_size: u32) -> (u32, u32) {
    let scale = letterbox_scale(width, height, input_size);
    let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, input_size);
    let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, input_size);
    (scaled_w, scaled_h)
}

/// Aspect-preserving resize onto a top-left-anchored square canvas.
///
/// Anchoring at the origin keeps the inverse mapping a pure per-axis
/// scale, with no offset term for the postprocessor to undo.
fn letterbox(image: &RgbImage, input_size: u32) -> RgbImage {
    let (scaled_w, scaled_h) = scaled_extent(image.width(), image.height(), input_size);
    let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([CANVAS_FILL; 3]));
    imageops::overlay(&mut canvas, &resized, 0, 0);
    canvas
}
