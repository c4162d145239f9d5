//! safety_vision - object detection over images, video files and cameras
//!
//! Modes:
//! 1. `image`: detect on one still image, write the annotated PNG
//! 2. `video`: detect on every frame of a local video, write the annotated video
//! 3. `camera`: detect on a live V4L2 device until Ctrl-C or `--max-frames`
//!
//! Every mode prints a detection summary and can export the run as JSON.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use safety_vision::{
    AppConfig, BackendRegistry, CancelToken, ClassSet, DetectionThreshold, FileConfig, FileSink,
    FileSource, FramePipeline, FrameSink, ImageFileSource, PipelineError, RunResult, StubBackend,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Mode,
    /// Confidence threshold in [0, 1] (overrides config).
    #[arg(long, global = true)]
    threshold: Option<f32>,
    /// Only keep these classes (comma separated).
    #[arg(long, global = true, value_name = "LIST")]
    classes: Option<String>,
    /// Alert when any of these classes is detected (comma separated).
    #[arg(long, global = true, value_name = "LIST")]
    watch: Option<String>,
    /// Inference backend name (stub, tract).
    #[arg(long, global = true)]
    backend: Option<String>,
    /// ONNX model path for the tract backend.
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// Write the detection data as JSON to this path.
    #[arg(long, global = true, value_name = "PATH")]
    json: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Detect objects in a still image (JPEG or PNG).
    Image {
        input: PathBuf,
        /// Annotated PNG path (default: <input>_annotated.png).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Detect objects in every frame of a local video file.
    Video {
        input: String,
        /// Annotated video path, or a directory for PNG frames.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Detect objects on a live camera.
    Camera {
        /// V4L2 device path (overrides config).
        #[arg(long)]
        device: Option<String>,
        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<u64>,
        /// Write annotated frames here; discarded when unset.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = AppConfig::load()?;
    apply_args(&mut cfg, &args)?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let pipeline = {
        let _stage = ui.stage("Load inference backend");
        let registry = build_registry(&cfg)?;
        let adapter = registry.adapter(Some(&cfg.backend.name))?;
        adapter.warm_up()?;
        FramePipeline::new(adapter)
            .with_annotator(cfg.annotator()?)
            .with_alerts(cfg.alert_evaluator())
            .with_cancel_token(cancel)
    };

    let result = match &args.command {
        Mode::Image { input, output } => run_image(&ui, &pipeline, &cfg, input, output.as_deref())?,
        Mode::Video { input, output } => {
            let config = FileConfig {
                path: input.clone(),
                fallback_fps: cfg.video.fallback_fps,
                ..FileConfig::default()
            };
            let mut source = FileSource::new(config)?;
            let output = output.clone().unwrap_or_else(|| cfg.video.output_path.clone());
            let mut sink = FileSink::new(&output)?;
            let result = run_stream(&ui, &pipeline, &cfg, &mut source, &mut sink, None)?;
            println!("Processed video saved to {}", output.display());
            result
        }
        Mode::Camera {
            device,
            max_frames,
            output,
        } => run_camera(&ui, &pipeline, &cfg, device.clone(), *max_frames, output.as_deref())?,
    };

    print_summary(&result, matches!(args.command, Mode::Image { .. }));

    if let Some(path) = &args.json {
        let _stage = ui.stage("Export detection data");
        std::fs::write(path, result.to_json()?)
            .with_context(|| format!("write {}", path.display()))?;
        log::info!("detection data written to {}", path.display());
    }

    Ok(())
}

fn apply_args(cfg: &mut AppConfig, args: &Args) -> Result<()> {
    if let Some(threshold) = args.threshold {
        cfg.threshold = DetectionThreshold::new(threshold)?;
    }
    if let Some(classes) = &args.classes {
        let parsed = ClassSet::parse_csv(classes);
        cfg.classes = if parsed.is_empty() { None } else { Some(parsed) };
    }
    if let Some(watch) = &args.watch {
        cfg.watch = ClassSet::parse_csv(watch);
    }
    if let Some(backend) = &args.backend {
        cfg.backend.name = backend.trim().to_string();
    }
    if let Some(model) = &args.model {
        cfg.backend.model_path = Some(model.clone());
    }
    Ok(())
}

fn build_registry(cfg: &AppConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::demo_scene());

    if cfg.backend.name == "tract" {
        #[cfg(feature = "backend-tract")]
        {
            let model_path = cfg
                .backend
                .model_path
                .as_ref()
                .ok_or_else(|| anyhow!("the tract backend needs --model or SAFETY_VISION_MODEL"))?;
            let backend = safety_vision::detect::backends::TractBackend::new(
                model_path,
                cfg.backend.input_size,
            )?
            .with_iou_threshold(cfg.backend.iou_threshold);
            registry.register(backend);
        }
        #[cfg(not(feature = "backend-tract"))]
        {
            return Err(anyhow!("the tract backend requires the backend-tract feature"));
        }
    }
    log::info!("backends available: {}", registry.list().join(", "));
    Ok(registry)
}

fn run_image(
    ui: &ui::Ui,
    pipeline: &FramePipeline,
    cfg: &AppConfig,
    input: &Path,
    output: Option<&Path>,
) -> Result<RunResult> {
    let result = {
        let _stage = ui.stage("Detect objects");
        let mut source = ImageFileSource::new(input);
        pipeline.process_image_source(&mut source, cfg.threshold, cfg.classes.as_ref())?
    };
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| annotated_path(input));
    if let Some(frame) = result.annotated_frame() {
        let _stage = ui.stage("Write annotated image");
        frame.save(&output)?;
        println!("Annotated image saved to {}", output.display());
    }
    Ok(result)
}

#[cfg(feature = "ingest-v4l2")]
fn run_camera(
    ui: &ui::Ui,
    pipeline: &FramePipeline,
    cfg: &AppConfig,
    device: Option<String>,
    max_frames: Option<u64>,
    output: Option<&Path>,
) -> Result<RunResult> {
    use safety_vision::{NullSink, V4l2Config, V4l2Source};

    let mut source = V4l2Source::new(V4l2Config {
        device: device.unwrap_or_else(|| cfg.camera.device.clone()),
        target_fps: cfg.camera.target_fps,
        width: cfg.camera.width,
        height: cfg.camera.height,
        max_frames,
    })?;
    println!("Camera started. Press Ctrl-C to stop.");
    match output {
        Some(path) => {
            let mut sink = FileSink::new(path)?;
            run_stream(ui, pipeline, cfg, &mut source, &mut sink, max_frames)
        }
        None => {
            let mut sink = NullSink::new();
            run_stream(ui, pipeline, cfg, &mut source, &mut sink, max_frames)
        }
    }
}

#[cfg(not(feature = "ingest-v4l2"))]
fn run_camera(
    _ui: &ui::Ui,
    _pipeline: &FramePipeline,
    _cfg: &AppConfig,
    _device: Option<String>,
    _max_frames: Option<u64>,
    _output: Option<&Path>,
) -> Result<RunResult> {
    Err(anyhow!("camera mode requires the ingest-v4l2 feature"))
}

fn run_stream(
    ui: &ui::Ui,
    pipeline: &FramePipeline,
    cfg: &AppConfig,
    source: &mut dyn safety_vision::FrameSource,
    sink: &mut dyn FrameSink,
    total: Option<u64>,
) -> Result<RunResult> {
    let mut progress = ui.frame_progress(&format!("Process {}", source.describe()), total);
    match pipeline.process_stream_observed(
        source,
        sink,
        cfg.threshold,
        cfg.classes.as_ref(),
        &mut progress,
    ) {
        Ok(result) => Ok(result),
        Err(err) => {
            if let Some(partial) = err.partial_state() {
                eprintln!(
                    "stream stopped after {} frames with {} detections",
                    partial.current_frame_index(),
                    partial.detections().len()
                );
            }
            Err(report(err))
        }
    }
}

fn report(err: PipelineError) -> anyhow::Error {
    match err.frame_index() {
        Some(index) => anyhow::Error::new(err).context(format!("at frame {}", index)),
        None => anyhow::Error::new(err),
    }
}

fn annotated_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}_annotated.png"))
}

fn print_summary(result: &RunResult, detailed: bool) {
    if result.is_empty() {
        println!("No objects detected. Try lowering the confidence threshold.");
    } else {
        println!("Detection Summary");
        for row in result.distribution() {
            println!(
                "  {}: {} ({:.1}%)",
                row.label,
                row.count,
                row.share * 100.0
            );
        }
        if detailed {
            println!("Detailed Results");
            for (i, detection) in result.detections().iter().enumerate() {
                println!(
                    "{}. {} - Confidence: {:.1}%",
                    i + 1,
                    title_case(detection.label()),
                    detection.confidence() * 100.0
                );
            }
        }
    }
    if let Some(stream) = result.stream() {
        println!(
            "Frames written: {} ({} without annotations)",
            stream.frames_written, stream.frames_passed_through
        );
    }
    if let safety_vision::RunOutcome::Cancelled { at_frame } = result.outcome() {
        println!("Stopped by user at frame {}", at_frame);
    }
    if !result.alerts().is_empty() {
        let alerts: Vec<&str> = result.alerts().iter().map(String::as_str).collect();
        println!("ALERT: Detected {}", alerts.join(", "));
    }
}

fn title_case(label: &str) -> String {
    label
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
