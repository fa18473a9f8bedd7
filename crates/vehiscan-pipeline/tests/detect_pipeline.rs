//! End-to-end pipeline tests over a scripted engine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::{ArrayView2, ArrayView4};

use vehiscan_core::{DetectError, DetectOptions, InferenceEngine, LabelMap, RawDetection, Result};
use vehiscan_detect::{DetectInput, FeedConfig};
use vehiscan_pipeline::DetectPipeline;

/// Engine that replays scripted rows: the nth image it ever sees gets
/// the nth script entry, re-indexed to its batch slot.
struct MockEngine {
    name: &'static str,
    script: Vec<Vec<RawDetection>>,
    cursor: AtomicUsize,
    calls: Arc<AtomicUsize>,
}

impl MockEngine {
    fn new(name: &'static str, script: Vec<Vec<RawDetection>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = Self {
            name,
            script,
            cursor: AtomicUsize::new(0),
            calls: Arc::clone(&calls),
        };
        (engine, calls)
    }
}

impl InferenceEngine for MockEngine {
    fn name(&self) -> &str {
        self.name
    }

    fn run(
        &self,
        images: ArrayView4<'_, f32>,
        sizes: ArrayView2<'_, i32>,
    ) -> Result<Vec<RawDetection>> {
        assert_eq!(images.shape()[0], sizes.shape()[0]);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let batch = sizes.shape()[0];
        let mut rows = Vec::new();
        for slot in 0..batch {
            let scripted = self.cursor.fetch_add(1, Ordering::SeqCst);
            if let Some(image_rows) = self.script.get(scripted) {
                rows.extend(image_rows.iter().map(|row| RawDetection {
                    image_index: slot,
                    ..*row
                }));
            }
        }
        Ok(rows)
    }
}

fn labels() -> LabelMap {
    LabelMap::from_text("car\ntruck\nbus\nmotorbike\ntricycle\ncarplate")
}

fn row(class_id: i64, confidence: f32, bbox: [f32; 4]) -> RawDetection {
    RawDetection {
        image_index: 0,
        class_id,
        confidence,
        x1: bbox[0],
        y1: bbox[1],
        x2: bbox[2],
        y2: bbox[3],
    }
}

fn pipeline_with(script: Vec<Vec<RawDetection>>) -> (DetectPipeline, Arc<AtomicUsize>) {
    let (engine, calls) = MockEngine::new("mock-cpu", script);
    let pipeline =
        DetectPipeline::with_engines(Box::new(engine), None, labels(), FeedConfig::default());
    (pipeline, calls)
}

fn solid_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([90, 90, 90]))
}

fn no_viz() -> DetectOptions {
    DetectOptions {
        visualization: false,
        ..DetectOptions::default()
    }
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vehiscan_{tag}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn results_match_input_count_and_order() {
    let (pipeline, calls) = pipeline_with(vec![
        vec![row(0, 0.9, [60.8, 60.8, 121.6, 121.6])],
        vec![],
        vec![
            row(2, 0.8, [60.8, 60.8, 121.6, 121.6]),
            row(1, 0.7, [121.6, 121.6, 182.4, 182.4]),
        ],
    ]);
    let input = DetectInput::from_images(vec![
        solid_image(100, 100),
        solid_image(100, 100),
        solid_image(100, 100),
    ]);
    let options = DetectOptions {
        batch_size: 2,
        ..no_viz()
    };

    let results = pipeline.detect(&input, &options).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].data.len(), 1);
    assert_eq!(results[0].data[0].label, "car");
    assert!(results[1].data.is_empty());
    assert_eq!(results[2].data.len(), 2);
    assert_eq!(results[2].data[0].label, "bus");
    assert_eq!(results[2].data[1].label, "truck");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn detections_respect_threshold_and_bounds() {
    let (pipeline, _) = pipeline_with(vec![vec![
        row(0, 0.9, [-50.0, -10.0, 9999.0, 500.0]),
        row(1, 0.1, [10.0, 10.0, 20.0, 20.0]),
    ]]);
    let input = DetectInput::from_images(vec![solid_image(320, 240)]);

    let results = pipeline.detect(&input, &no_viz()).unwrap();
    assert_eq!(results[0].data.len(), 1);

    let det = &results[0].data[0];
    assert_eq!(det.label, "car");
    assert!(det.confidence >= 0.2 && det.confidence <= 1.0);
    assert!(det.left >= 0.0 && det.right <= 320.0);
    assert!(det.top >= 0.0 && det.bottom <= 240.0);
    assert!(det.left <= det.right && det.top <= det.bottom);
}

#[test]
fn zero_threshold_keeps_every_row_in_engine_order() {
    let (pipeline, _) = pipeline_with(vec![vec![
        row(0, 0.1, [10.0, 10.0, 20.0, 20.0]),
        row(1, 0.5, [30.0, 30.0, 40.0, 40.0]),
        row(2, 0.9, [50.0, 50.0, 60.0, 60.0]),
    ]]);
    let input = DetectInput::from_images(vec![solid_image(608, 608)]);
    let options = DetectOptions {
        score_thresh: 0.0,
        ..no_viz()
    };

    let results = pipeline.detect(&input, &options).unwrap();
    let confidences: Vec<f32> = results[0].data.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.1, 0.5, 0.9]);
    let names: Vec<&str> = results[0].data.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(names, vec!["car", "truck", "bus"]);
}

#[test]
fn below_threshold_rows_leave_data_empty() {
    let output_dir = temp_dir("empty_data");
    let (pipeline, _) = pipeline_with(vec![vec![row(0, 0.05, [10.0, 10.0, 20.0, 20.0])]]);
    let input = DetectInput::from_images(vec![solid_image(64, 64)]);
    let options = DetectOptions {
        output_dir: output_dir.clone(),
        ..DetectOptions::default()
    };

    let results = pipeline.detect(&input, &options).unwrap();
    assert!(results[0].data.is_empty());

    // Visualization still writes the (unannotated) copy.
    let save_path = results[0].save_path.as_deref().unwrap();
    assert!(PathBuf::from(save_path).is_file());

    let _ = std::fs::remove_dir_all(&output_dir);
}

#[test]
fn visualization_writes_one_file_per_input() {
    let output_dir = temp_dir("viz");
    let (pipeline, _) = pipeline_with(vec![
        vec![row(0, 0.9, [100.0, 100.0, 200.0, 200.0])],
        vec![row(2, 0.6, [50.0, 50.0, 150.0, 150.0])],
    ]);
    let input = DetectInput::from_images(vec![solid_image(400, 300), solid_image(640, 480)]);
    let options = DetectOptions {
        output_dir: output_dir.clone(),
        ..DetectOptions::default()
    };

    let results = pipeline.detect(&input, &options).unwrap();
    for result in &results {
        let save_path = result.save_path.as_deref().unwrap();
        assert!(PathBuf::from(save_path).is_file());
    }
    let written = std::fs::read_dir(&output_dir).unwrap().count();
    assert_eq!(written, 2);

    let _ = std::fs::remove_dir_all(&output_dir);
}

#[test]
fn named_inputs_keep_their_stem() {
    let input_dir = temp_dir("named_in");
    let output_dir = temp_dir("named_out");
    std::fs::create_dir_all(&input_dir).unwrap();
    let source = input_dir.join("sedan.png");
    solid_image(100, 80).save(&source).unwrap();

    let (pipeline, _) = pipeline_with(vec![vec![row(0, 0.9, [0.0, 0.0, 304.0, 243.0])]]);
    let input = DetectInput::from_paths([source]);
    let options = DetectOptions {
        output_dir: output_dir.clone(),
        ..DetectOptions::default()
    };

    let results = pipeline.detect(&input, &options).unwrap();
    let save_path = results[0].save_path.as_deref().unwrap();
    assert_eq!(
        save_path,
        output_dir.join("sedan.png").display().to_string()
    );

    // 100x80 scales by 6.08 onto the canvas, so the inverse maps the
    // canvas box corner (304, 243) to (50, 40).
    let det = &results[0].data[0];
    assert!((det.right - 50.0).abs() < 0.5);
    assert!((det.bottom - 40.0).abs() < 0.5);

    let _ = std::fs::remove_dir_all(&input_dir);
    let _ = std::fs::remove_dir_all(&output_dir);
}

#[test]
fn gpu_selection_respects_environment() {
    // All CUDA_VISIBLE_DEVICES manipulation lives in this one test so
    // parallel tests never observe a half-set variable.
    std::env::remove_var("CUDA_VISIBLE_DEVICES");

    let (pipeline, calls) = pipeline_with(vec![vec![row(0, 0.9, [10.0, 10.0, 20.0, 20.0])]]);
    let input = DetectInput::from_images(vec![solid_image(64, 64)]);
    let options = DetectOptions {
        use_gpu: true,
        ..no_viz()
    };

    let err = pipeline.detect(&input, &options).unwrap_err();
    assert!(matches!(err, DetectError::GpuConfig(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    std::env::set_var("CUDA_VISIBLE_DEVICES", "none");
    let err = pipeline.detect(&input, &options).unwrap_err();
    assert!(matches!(err, DetectError::GpuConfig(_)));

    // A usable value cannot resurrect a pipeline built without a GPU
    // engine.
    std::env::set_var("CUDA_VISIBLE_DEVICES", "0");
    let err = pipeline.detect(&input, &options).unwrap_err();
    assert!(matches!(err, DetectError::GpuConfig(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let (gpu_engine, gpu_calls) =
        MockEngine::new("mock-gpu", vec![vec![row(0, 0.9, [10.0, 10.0, 20.0, 20.0])]]);
    let (cpu_engine, cpu_calls) = MockEngine::new("mock-cpu", Vec::new());
    let pipeline = DetectPipeline::with_engines(
        Box::new(cpu_engine),
        Some(Box::new(gpu_engine)),
        labels(),
        FeedConfig::default(),
    );
    assert!(pipeline.gpu_ready());

    let results = pipeline.detect(&input, &options).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].data[0].label, "car");
    assert_eq!(gpu_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cpu_calls.load(Ordering::SeqCst), 0);

    std::env::remove_var("CUDA_VISIBLE_DEVICES");
}

#[test]
fn empty_input_returns_no_results() {
    let (pipeline, calls) = pipeline_with(Vec::new());
    let input = DetectInput::from_images(Vec::new());

    let results = pipeline.detect(&input, &no_viz()).unwrap();
    assert!(results.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_path_fails_before_inference() {
    let (pipeline, calls) = pipeline_with(Vec::new());
    let input = DetectInput::from_paths(["/definitely/not/here.png"]);

    let err = pipeline.detect(&input, &no_viz()).unwrap_err();
    assert!(matches!(err, DetectError::InvalidInput(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn zero_batch_size_is_rejected() {
    let (pipeline, _) = pipeline_with(Vec::new());
    let input = DetectInput::from_images(vec![solid_image(32, 32)]);
    let options = DetectOptions {
        batch_size: 0,
        ..no_viz()
    };

    let err = pipeline.detect(&input, &options).unwrap_err();
    assert!(matches!(err, DetectError::InvalidInput(_)));
}
