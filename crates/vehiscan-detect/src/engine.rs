use std::path::Path;

use ndarray::{Array2, ArrayView2, ArrayView4, ArrayViewD, CowArray};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;

use vehiscan_core::{DetectError, InferenceEngine, RawDetection, Result};

/// Where a session's execution provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Gpu,
}

/// GPU ordinal named by CUDA_VISIBLE_DEVICES, if the variable selects one.
///
/// Follows the launcher convention: only the first comma-separated entry
/// counts, and it must parse as a non-negative integer. Anything else
/// (unset, empty, "none", "-1") means no device.
pub fn cuda_device_from_env() -> Option<u32> {
    parse_cuda_devices(&std::env::var("CUDA_VISIBLE_DEVICES").ok()?)
}

fn parse_cuda_devices(value: &str) -> Option<u32> {
    value.split(',').next()?.trim().parse().ok()
}

/// YOLOv3 vehicle detector backed by an exported ONNX graph.
///
/// The graph embeds the detection head and NMS, so a run returns decoded
/// boxes directly: one [N, 6] f32 tensor of
/// [class_id, score, x1, y1, x2, y2] rows and a [B] i32 tensor of
/// per-image row counts.
pub struct OrtEngine {
    session: Session,
    device: Device,
    input_size: u32,
}

impl OrtEngine {
    /// Load the exported graph and commit it to a CPU or CUDA session.
    pub fn load(model_path: &Path, device: Device, input_size: u32) -> Result<Self> {
        let builder = SessionBuilder::new().map_err(|e| DetectError::ModelLoad(e.to_string()))?;
        let builder = match device {
            Device::Cpu => {
                builder.with_execution_providers([CPUExecutionProvider::default().build()])
            }
            Device::Gpu => builder.with_execution_providers([CUDAExecutionProvider::default()
                .build()
                .error_on_failure()]),
        }
        .map_err(|e| DetectError::ModelLoad(e.to_string()))?;

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectError::ModelLoad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| DetectError::ModelLoad(format!("{}: {e}", model_path.display())))?;

        tracing::info!(
            model = %model_path.display(),
            device = ?device,
            input_size,
            "loaded detection graph"
        );

        Ok(Self {
            session,
            device,
            input_size,
        })
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl InferenceEngine for OrtEngine {
    fn name(&self) -> &str {
        match self.device {
            Device::Cpu => "ort-cpu",
            Device::Gpu => "ort-cuda",
        }
    }

    fn run(
        &self,
        images: ArrayView4<'_, f32>,
        sizes: ArrayView2<'_, i32>,
    ) -> Result<Vec<RawDetection>> {
        let batch = images.shape()[0];
        if sizes.shape()[0] != batch {
            return Err(DetectError::Consistency(format!(
                "size tensor has {} rows for a batch of {batch}",
                sizes.shape()[0]
            )));
        }

        // The exported head rescales its boxes to whatever extent the
        // size tensor names. Inputs are letterboxed, not stretched, so
        // feeding the per-image sizes here would apply the wrong mapping;
        // feeding the canvas extent makes the head's rescale an identity
        // and leaves the canvas-to-original mapping to the postprocessor.
        let canvas = Array2::from_elem((batch, 2), self.input_size as i32);

        let images = CowArray::from(images.to_owned().into_dyn());
        let canvas = CowArray::from(canvas.into_dyn());

        let inputs = ort::inputs![
            "image" => images.view(),
            "im_size" => canvas.view(),
        ]
        .map_err(|e| DetectError::Inference(e.to_string()))?;

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| DetectError::Inference(e.to_string()))?;

        let values: Vec<_> = outputs.iter().map(|(_, value)| value).collect();
        if values.len() != 2 {
            return Err(DetectError::Consistency(format!(
                "expected box and count outputs, graph returned {}",
                values.len()
            )));
        }
        let boxes = values[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectError::Inference(format!("box output: {e}")))?;
        let counts = values[1]
            .try_extract_tensor::<i32>()
            .map_err(|e| DetectError::Inference(format!("count output: {e}")))?;

        let rows = flatten_rows(&boxes.view(), &counts.view(), batch)?;
        tracing::debug!(batch, rows = rows.len(), "inference complete");
        Ok(rows)
    }
}

/// Expand [N, 6] rows plus per-image counts into indexed detections.
fn flatten_rows(
    boxes: &ArrayViewD<'_, f32>,
    counts: &ArrayViewD<'_, i32>,
    batch: usize,
) -> Result<Vec<RawDetection>> {
    if counts.len() != batch {
        return Err(DetectError::Consistency(format!(
            "count tensor covers {} images for a batch of {batch}",
            counts.len()
        )));
    }

    let expected: usize = counts.iter().map(|&c| c.max(0) as usize).sum();
    if expected == 0 {
        return Ok(Vec::new());
    }
    if boxes.ndim() != 2 || boxes.shape()[1] != 6 || boxes.shape()[0] < expected {
        return Err(DetectError::Consistency(format!(
            "box tensor shape {:?} does not hold {expected} rows",
            boxes.shape()
        )));
    }

    let mut rows = Vec::with_capacity(expected);
    let mut offset = 0usize;
    for (image_index, &count) in counts.iter().enumerate() {
        let count = count.max(0) as usize;
        for r in offset..offset + count {
            rows.push(RawDetection {
                image_index,
                class_id: boxes[[r, 0]] as i64,
                confidence: boxes[[r, 1]],
                x1: boxes[[r, 2]],
                y1: boxes[[r, 3]],
                x2: boxes[[r, 4]],
                y2: boxes[[r, 5]],
            });
        }
        offset += count;
    }
    Ok(rows)
}
