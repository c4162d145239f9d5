//! demo - end-to-end synthetic run of the SafetyVision pipeline
//!
//! Runs the scripted street-scene backend over one still frame and one synthetic
//! clip, so the whole pipeline can be exercised without a model or media files.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use safety_vision::{
    AlertEvaluator, Annotator, BackendRegistry, ClassSet, DetectionThreshold, FileConfig,
    FileSink, FileSource, Frame, FramePipeline, RunResult, StubBackend,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of synthetic frames in the clip.
    #[arg(long, default_value_t = 60)]
    frames: u64,
    /// Frames per second reported by the synthetic source.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Synthetic frame width.
    #[arg(long, default_value_t = 320)]
    width: u32,
    /// Synthetic frame height.
    #[arg(long, default_value_t = 240)]
    height: u32,
    /// Confidence threshold in [0, 1].
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,
    /// Classes to alert on (comma separated).
    #[arg(long, default_value = "car")]
    watch: String,
    /// Output directory for demo artifacts.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if args.width == 0 || args.height == 0 {
        return Err(anyhow!("width and height must be >= 1"));
    }
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let out_dir = PathBuf::from(&args.out);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("create output directory {}", out_dir.display()))?;
    let threshold = DetectionThreshold::new(args.threshold)?;

    let pipeline = {
        let _stage = ui.stage("Prepare pipeline");
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::demo_scene());
        FramePipeline::new(registry.adapter(None)?)
            .with_annotator(Annotator::new())
            .with_alerts(AlertEvaluator::new(ClassSet::parse_csv(&args.watch)))
    };

    let image_result = {
        let _stage = ui.stage("Detect on still frame");
        let frame = Frame::filled(args.width, args.height, [96, 96, 96], 0);
        let result = pipeline.process_image(&frame, threshold, None)?;
        if let Some(annotated) = result.annotated_frame() {
            annotated.save(&out_dir.join("demo_image.png"))?;
        }
        write_json(&out_dir.join("demo_image.json"), &result)?;
        result
    };

    let clip_config = FileConfig {
        path: "stub://demo".to_string(),
        fallback_fps: args.fps as f64,
        synthetic_frames: args.frames,
        synthetic_width: args.width,
        synthetic_height: args.height,
    };
    let mut source = FileSource::new(clip_config)?;
    let mut sink = FileSink::new(out_dir.join("frames"))?;
    let mut progress = ui.frame_progress("Process synthetic clip", Some(args.frames));
    let stream_result = pipeline.process_stream_observed(
        &mut source,
        &mut sink,
        threshold,
        None,
        &mut progress,
    )?;
    write_json(&out_dir.join("demo_stream.json"), &stream_result)?;

    println!("demo complete");
    println!("  output: {}", out_dir.display());
    print_result("still frame", &image_result);
    print_result("clip", &stream_result);
    Ok(())
}

fn write_json(path: &Path, result: &RunResult) -> Result<()> {
    fs::write(path, result.to_json()?).with_context(|| format!("write {}", path.display()))
}

fn print_result(name: &str, result: &RunResult) {
    let counts: Vec<String> = result
        .counts()
        .iter()
        .map(|(label, count)| format!("{label}={count}"))
        .collect();
    println!(
        "  {}: {} detections [{}]",
        name,
        result.detections().len(),
        counts.join(", ")
    );
    if !result.alerts().is_empty() {
        let alerts: Vec<&str> = result.alerts().iter().map(String::as_str).collect();
        println!("  ALERT: Detected {}", alerts.join(", "));
    }
}
