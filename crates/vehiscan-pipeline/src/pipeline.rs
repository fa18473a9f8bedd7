//! Detection facade: owns the engines, label table and feed settings,
//! and turns raw inputs into per-image results.

use std::time::Instant;

use image::{Rgb, RgbImage};
use tracing::{debug, info};

use vehiscan_core::{
    DetectError, DetectOptions, Detection, ImageResult, InferenceEngine, LabelMap, Result,
};
use vehiscan_detect::{
    cuda_device_from_env, feed, visualize, DetectInput, DetectionPostprocessor, Device,
    FeedConfig, ImageFeed, OrtEngine,
};

use crate::config::PipelineConfig;

/// End-to-end vehicle detector.
///
/// Holds a CPU engine unconditionally and a GPU engine when the
/// environment named a CUDA device at build time. Shared state is
/// read-only after construction, so `detect` takes `&self`.
pub struct DetectPipeline {
    cpu: Box<dyn InferenceEngine>,
    gpu: Option<Box<dyn InferenceEngine>>,
    labels: LabelMap,
    feed_config: FeedConfig,
}

impl DetectPipeline {
    /// Load the model and label table from disk.
    pub fn build(config: &PipelineConfig) -> Result<Self> {
        let labels = LabelMap::from_file(&config.label_path)?;
        if labels.is_empty() {
            return Err(DetectError::InvalidInput(format!(
                "label file {} is empty",
                config.label_path.display()
            )));
        }
        info!(labels = labels.len(), "loaded label table");

        let cpu: Box<dyn InferenceEngine> = Box::new(OrtEngine::load(
            &config.model_path,
            Device::Cpu,
            config.input_size,
        )?);
        let gpu: Option<Box<dyn InferenceEngine>> = match cuda_device_from_env() {
            Some(device) => {
                info!(device, "CUDA device visible, building GPU engine");
                Some(Box::new(OrtEngine::load(
                    &config.model_path,
                    Device::Gpu,
                    config.input_size,
                )?))
            }
            None => {
                info!("no CUDA device visible, GPU requests will be rejected");
                None
            }
        };

        Ok(Self {
            cpu,
            gpu,
            labels,
            feed_config: config.feed_config(),
        })
    }

    /// Assemble a pipeline from prebuilt engines.
    pub fn with_engines(
        cpu: Box<dyn InferenceEngine>,
        gpu: Option<Box<dyn InferenceEngine>>,
        labels: LabelMap,
        feed_config: FeedConfig,
    ) -> Self {
        Self {
            cpu,
            gpu,
            labels,
            feed_config,
        }
    }

    pub fn gpu_ready(&self) -> bool {
        self.gpu.is_some()
    }

    /// Run detection over every input image.
    ///
    /// Returns one result per input, in input order; an empty input is
    /// answered with an empty vec. With `visualization` set, each result
    /// also carries the path of its annotated copy.
    pub fn detect(&self, input: &DetectInput, options: &DetectOptions) -> Result<Vec<ImageResult>> {
        let engine = self.select_engine(options)?;
        let postprocessor = DetectionPostprocessor::new(self.feed_config.input_size)
            .with_threshold(options.score_thresh);
        let feed = ImageFeed::new(input, &self.feed_config, options.batch_size)?;

        let started = Instant::now();
        let mut results = Vec::with_capacity(input.len());
        for (batch_index, batch) in feed.enumerate() {
            let batch = batch?;
            let rows = engine.run(batch.images.view(), batch.sizes.view())?;
            let per_image = postprocessor.process_batch(&rows, batch.sizes.view(), &self.labels)?;

            // Feed batches are contiguous input slices, so the global
            // index of a batch slot is batch_index * batch_size + slot.
            let offset = batch_index * options.batch_size;
            for (slot, detections) in per_image.into_iter().enumerate() {
                let index = offset + slot;
                let save_path = if options.visualization {
                    Some(self.visualize(input, index, &detections, options)?)
                } else {
                    None
                };
                results.push(ImageResult {
                    save_path,
                    data: detections,
                });
            }
        }

        info!(
            engine = engine.name(),
            inputs = input.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "detection finished"
        );
        Ok(results)
    }

    /// One tiny inference to pull the graph through the session before
    /// the first real request.
    pub fn warmup(&self) -> Result<()> {
        let image = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
        let input = DetectInput::from_images(vec![image]);
        let options = DetectOptions {
            visualization: false,
            ..DetectOptions::default()
        };
        self.detect(&input, &options)?;
        Ok(())
    }

    /// The environment is re-checked on every GPU request: a device
    /// that disappeared since startup must fail before inference, not
    /// during it.
    fn select_engine(&self, options: &DetectOptions) -> Result<&dyn InferenceEngine> {
        if !options.use_gpu {
            return Ok(self.cpu.as_ref());
        }
        if cuda_device_from_env().is_none() {
            return Err(DetectError::GpuConfig(
                "use_gpu is set but CUDA_VISIBLE_DEVICES names no usable device; \
                 set it first, e.g. export CUDA_VISIBLE_DEVICES=0"
                    .into(),
            ));
        }
        self.gpu.as_deref().ok_or_else(|| {
            DetectError::GpuConfig("GPU engine was not initialized at startup".into())
        })
    }

    fn visualize(
        &self,
        input: &DetectInput,
        index: usize,
        detections: &[Detection],
        options: &DetectOptions,
    ) -> Result<String> {
        let (mut image, source) = if !input.paths.is_empty() {
            let path = input.paths.get(index).ok_or_else(|| {
                DetectError::Consistency(format!("no input path for image {index}"))
            })?;
            (feed::load_rgb(path)?, Some(path.as_path()))
        } else {
            let image = input.images.get(index).ok_or_else(|| {
                DetectError::Consistency(format!("no input image for image {index}"))
            })?;
            (image.clone(), None)
        };

        visualize::annotate(&mut image, detections);
        let file_name = visualize::save_name(source, index);
        let path = visualize::save_annotated(&image, &options.output_dir, &file_name)?;
        debug!(path = %path.display(), "wrote annotated image");
        Ok(path.display().to_string())
    }
}
