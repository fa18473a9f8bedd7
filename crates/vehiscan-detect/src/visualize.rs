//! Draws labelled boxes onto detection results and writes them to disk.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use vehiscan_core::{DetectError, Detection, Result};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: u32 = 2;
const FONT_SIZE: f32 = 16.0;
const TEXT_PADDING: i32 = 2;

static FONT_BYTES: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");
static FONT: OnceLock<FontRef<'static>> = OnceLock::new();

fn label_font() -> &'static FontRef<'static> {
    FONT.get_or_init(|| FontRef::try_from_slice(FONT_BYTES).expect("bundled label font is valid"))
}

/// Draw every detection onto the image: a red box plus a white strip
/// above its top-left corner carrying `label: confidence%`.
pub fn annotate(image: &mut RgbImage, detections: &[Detection]) {
    let font = label_font();
    let scale = PxScale::from(FONT_SIZE);

    for det in detections {
        let left = det.left.round() as i32;
        let top = det.top.round() as i32;
        let right = det.right.round() as i32;
        let bottom = det.bottom.round() as i32;
        draw_box(image, left, top, right, bottom);

        let text = format!("{}: {:.2}%", det.label, det.confidence * 100.0);
        let (text_w, text_h) = text_size(scale, font, &text);
        let strip_top = (top - text_h as i32 - 2 * TEXT_PADDING).max(0);
        draw_filled_rect_mut(
            image,
            Rect::at(left, strip_top).of_size(
                text_w + 2 * TEXT_PADDING as u32,
                text_h + 2 * TEXT_PADDING as u32,
            ),
            TEXT_BACKGROUND,
        );
        draw_text_mut(
            image,
            TEXT_COLOR,
            left + TEXT_PADDING,
            strip_top + TEXT_PADDING,
            scale,
            font,
            &text,
        );
    }
}

fn draw_box(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32) {
    // Drawn as four filled strips so the outline keeps its thickness;
    // imageproc clips rectangles that leak past the image bounds.
    let w = (right - left).max(1) as u32;
    let h = (bottom - top).max(1) as u32;
    let t = BOX_THICKNESS as i32;
    draw_filled_rect_mut(image, Rect::at(left, top).of_size(w, BOX_THICKNESS), BOX_COLOR);
    draw_filled_rect_mut(
        image,
        Rect::at(left, bottom - t + 1).of_size(w, BOX_THICKNESS),
        BOX_COLOR,
    );
    draw_filled_rect_mut(image, Rect::at(left, top).of_size(BOX_THICKNESS, h), BOX_COLOR);
    draw_filled_rect_mut(
        image,
        Rect::at(right - t + 1, top).of_size(BOX_THICKNESS, h),
        BOX_COLOR,
    );
}

/// File name for an annotated copy. Named inputs keep their stem and,
/// when the encoder supports it, their extension; in-memory inputs get
/// a timestamped name so repeated calls never collide.
pub fn save_name(source: Option<&Path>, index: usize) -> String {
    match source {
        Some(path) => {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("image");
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .filter(|e| matches!(e.as_str(), "jpg" | "jpeg" | "png" | "bmp"))
                .unwrap_or_else(|| "png".to_owned());
            format!("{stem}.{ext}")
        }
        None => format!(
            "image_{}_{index}.png",
            chrono::Utc::now().format("%Y%m%d%H%M%S%3f")
        ),
    }
}

/// Write an annotated image under `output_dir`, creating the directory
/// on demand. An existing file of the same name is replaced.
pub fn save_annotated(image: &RgbImage, output_dir: &Path, file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(file_name);
    image.save(&path).map_err(|e| {
        DetectError::Visualization(format!("failed to write {}: {e}", path.display()))
    })?;
    Ok(path)
}
