use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vehiscan_core::{DetectOptions, Result};
use vehiscan_detect::DetectInput;
use vehiscan_pipeline::DetectPipeline;

#[derive(Parser)]
#[command(name = "vehiscan", about = "YOLOv3 vehicle detection: library, CLI and HTTP serving")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to pipeline config file (JSON).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server.
    Serve {
        /// Host to bind to.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to bind to.
        #[arg(long, default_value = "8866")]
        port: u16,
    },
    /// Detect vehicles in a single image and print results as JSON.
    Detect {
        /// Input image path.
        #[arg(long, required = true)]
        input_path: PathBuf,
        /// Images per inference batch.
        #[arg(long, default_value = "1")]
        batch_size: usize,
        /// Run on the GPU engine (requires CUDA_VISIBLE_DEVICES).
        #[arg(long)]
        use_gpu: bool,
        /// Directory annotated images are written to.
        #[arg(long, default_value = "yolov3_vehicles_detect_output")]
        output_dir: PathBuf,
        /// Write annotated copies of the inputs.
        #[arg(long)]
        visualization: bool,
        /// Minimum confidence for a detection to be kept.
        #[arg(long, default_value = "0.2")]
        score_thresh: f32,
    },
}

/// Run detection over a single image via CLI.
pub fn run_detect(
    pipeline: &DetectPipeline,
    input_path: &PathBuf,
    options: &DetectOptions,
) -> Result<()> {
    let input = DetectInput::from_paths([input_path.clone()]);
    let results = pipeline.detect(&input, options)?;
    println!("{}", serde_json::to_string_pretty(&results).unwrap());
    Ok(())
}
