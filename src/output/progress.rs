use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright, bright_green, bright_yellow};

/// Spinner shown on stderr while pipelines are extracted.
pub struct RunProgress {
    pb: ProgressBar,
}

impl RunProgress {
    pub fn start(pipelines: usize) -> Self {
        eprintln!("{}  {}", bright("⚙️"), bright("Extraction").underlined());
        let pb = create_spinner(bright_yellow(format!("Extracting {pipelines} pipelines")).to_string());
        Self { pb }
    }

    /// Handle the scheduler updates with the pipeline in progress.
    pub fn bar(&self) -> ProgressBar {
        self.pb.clone()
    }

    pub fn finish(self) {
        self.pb
            .finish_with_message(bright_green("Snapshot written ✓").to_string());
        eprintln!();
    }

    pub fn abandon(self) {
        self.pb.abandon();
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
