use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use safety_vision::{Detection, Frame, FrameObserver, StreamInfo, StreamState};

const PLAIN_PROGRESS_EVERY: u64 = 100;

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Frame counter for stream runs. `total` is known for bounded camera runs only.
    pub fn frame_progress(&self, name: &str, total: Option<u64>) -> FrameProgress {
        let bar = if self.use_pretty() {
            let bar = match total {
                Some(total) => ProgressBar::new(total),
                None => ProgressBar::new_spinner(),
            };
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let template = match total {
                Some(_) => "{spinner} {msg} [{bar:30}] {pos}/{len} frames ({per_sec})",
                None => "{spinner} {msg} {pos} frames ({per_sec})",
            };
            let style = ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar.set_message(name.to_string());
            Some(bar)
        } else {
            eprintln!("==> {}", name);
            None
        };
        FrameProgress {
            name: name.to_string(),
            start: Instant::now(),
            bar,
            frames: 0,
            detections: 0,
            started: false,
            finished: false,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct FrameProgress {
    name: String,
    start: Instant,
    bar: Option<ProgressBar>,
    frames: u64,
    detections: usize,
    started: bool,
    finished: bool,
}

impl FrameObserver for FrameProgress {
    fn on_start(&mut self, info: &StreamInfo) {
        let line = format!(
            "{} ({}x{} @ {:.1} fps)",
            self.name, info.width, info.height, info.frame_rate
        );
        self.started = true;
        match &self.bar {
            Some(bar) => {
                bar.enable_steady_tick(Duration::from_millis(120));
                bar.set_message(line);
            }
            None => eprintln!("    {line}"),
        }
    }

    fn on_state(&mut self, state: StreamState) {
        if !state.is_terminal() || self.finished {
            return;
        }
        self.finished = true;
        let mark = if state == StreamState::Closed && self.started {
            "✔"
        } else {
            "✘"
        };
        let message = format!(
            "{} {} ({} frames, {} detections, {})",
            mark,
            self.name,
            self.frames,
            self.detections,
            format_duration(self.start.elapsed())
        );
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }

    fn on_frame(&mut self, _index: u64, _frame: &Frame, detections: &[Detection]) {
        self.frames += 1;
        self.detections += detections.len();
        match &self.bar {
            Some(bar) => bar.inc(1),
            None if self.frames % PLAIN_PROGRESS_EVERY == 0 => {
                eprintln!("    {} frames, {} detections", self.frames, self.detections)
            }
            None => {}
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
