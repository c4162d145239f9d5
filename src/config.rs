use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::alert::AlertEvaluator;
use crate::annotate::{load_font, Annotator};
use crate::detect::{ClassSet, DetectionThreshold};

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_OUTPUT_PATH: &str = "output.mp4";
const DEFAULT_FALLBACK_FPS: f64 = 30.0;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_THICKNESS: u32 = 2;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AppConfigFile {
    threshold: Option<f32>,
    classes: Option<Vec<String>>,
    watch: Option<Vec<String>>,
    backend: Option<BackendConfigFile>,
    video: Option<VideoConfigFile>,
    camera: Option<CameraConfigFile>,
    annotate: Option<AnnotateConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BackendConfigFile {
    name: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VideoConfigFile {
    output_path: Option<PathBuf>,
    fallback_fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
    thickness: Option<u32>,
}

/// Settings shared by every operating mode.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub threshold: DetectionThreshold,
    /// Allow-list; `None` keeps every class.
    pub classes: Option<ClassSet>,
    pub watch: ClassSet,
    pub backend: BackendSettings,
    pub video: VideoSettings,
    pub camera: CameraSettings,
    pub annotate: AnnotateSettings,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub name: String,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub output_path: PathBuf,
    pub fallback_fps: f64,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

#[derive(Debug, Clone)]
pub struct AnnotateSettings {
    pub font_path: Option<PathBuf>,
    pub thickness: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            threshold: DetectionThreshold::DEFAULT,
            classes: None,
            watch: ClassSet::new(),
            backend: BackendSettings {
                name: DEFAULT_BACKEND.to_string(),
                model_path: None,
                input_size: DEFAULT_INPUT_SIZE,
                iou_threshold: DEFAULT_IOU_THRESHOLD,
            },
            video: VideoSettings {
                output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
                fallback_fps: DEFAULT_FALLBACK_FPS,
            },
            camera: CameraSettings {
                device: DEFAULT_CAMERA_DEVICE.to_string(),
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                target_fps: DEFAULT_CAMERA_FPS,
            },
            annotate: AnnotateSettings {
                font_path: None,
                thickness: DEFAULT_THICKNESS,
            },
        }
    }
}

impl AppConfig {
    /// File named by `SAFETY_VISION_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SAFETY_VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let threshold = match file.threshold {
            Some(value) => DetectionThreshold::new(value).context("threshold")?,
            None => defaults.threshold,
        };
        let classes = file
            .classes
            .map(|labels| labels.iter().collect::<ClassSet>())
            .filter(|set| !set.is_empty());
        let watch = file
            .watch
            .map(|labels| labels.iter().collect::<ClassSet>())
            .unwrap_or(defaults.watch);

        let backend_file = file.backend.unwrap_or_default();
        let backend = BackendSettings {
            name: backend_file.name.unwrap_or(defaults.backend.name),
            model_path: backend_file.model_path,
            input_size: backend_file
                .input_size
                .unwrap_or(defaults.backend.input_size),
            iou_threshold: backend_file
                .iou_threshold
                .unwrap_or(defaults.backend.iou_threshold),
        };

        let video_file = file.video.unwrap_or_default();
        let video = VideoSettings {
            output_path: video_file
                .output_path
                .unwrap_or(defaults.video.output_path),
            fallback_fps: video_file
                .fallback_fps
                .unwrap_or(defaults.video.fallback_fps),
        };

        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file.device.unwrap_or(defaults.camera.device),
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            target_fps: camera_file
                .target_fps
                .unwrap_or(defaults.camera.target_fps),
        };

        let annotate_file = file.annotate.unwrap_or_default();
        let annotate = AnnotateSettings {
            font_path: annotate_file.font_path,
            thickness: annotate_file
                .thickness
                .unwrap_or(defaults.annotate.thickness),
        };

        Ok(Self {
            threshold,
            classes,
            watch,
            backend,
            video,
            camera,
            annotate,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("SAFETY_VISION_THRESHOLD") {
            let parsed: f32 = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("SAFETY_VISION_THRESHOLD must be a number in [0, 1]"))?;
            self.threshold = DetectionThreshold::new(parsed).context("SAFETY_VISION_THRESHOLD")?;
        }
        if let Ok(classes) = std::env::var("SAFETY_VISION_CLASSES") {
            let parsed = ClassSet::parse_csv(&classes);
            self.classes = if parsed.is_empty() { None } else { Some(parsed) };
        }
        if let Ok(watch) = std::env::var("SAFETY_VISION_WATCH") {
            self.watch = ClassSet::parse_csv(&watch);
        }
        if let Ok(name) = std::env::var("SAFETY_VISION_BACKEND") {
            if !name.trim().is_empty() {
                self.backend.name = name.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("SAFETY_VISION_MODEL") {
            if !path.trim().is_empty() {
                self.backend.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("SAFETY_VISION_FONT") {
            if !path.trim().is_empty() {
                self.annotate.font_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.backend.name = self.backend.name.trim().to_string();
        if self.backend.name.is_empty() {
            return Err(anyhow!("backend name must not be empty"));
        }
        if self.backend.input_size == 0 {
            return Err(anyhow!("backend input_size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.backend.iou_threshold) {
            return Err(anyhow!(
                "backend iou_threshold must be in [0, 1], got {}",
                self.backend.iou_threshold
            ));
        }
        if self.video.fallback_fps.is_nan() || self.video.fallback_fps <= 0.0 {
            return Err(anyhow!("video fallback_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.annotate.thickness == 0 {
            return Err(anyhow!("annotate thickness must be at least 1"));
        }
        Ok(())
    }

    pub fn alert_evaluator(&self) -> AlertEvaluator {
        AlertEvaluator::new(self.watch.clone())
    }

    /// Annotator with the configured thickness. `font_path` replaces the bundled label font.
    pub fn annotator(&self) -> Result<Annotator> {
        let annotator = Annotator::new().with_thickness(self.annotate.thickness);
        match &self.annotate.font_path {
            Some(path) => Ok(annotator.with_font(load_font(path)?)),
            None => Ok(annotator),
        }
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
