use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;

const TICK_RATE: Duration = Duration::from_millis(100);
const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
];

pub fn start_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_strings(TICKS));
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(TICK_RATE);
    pb
}

/// Drives a percentage bar until the sending side is dropped.
pub fn follow_progress(mut rx: Receiver<f32>) -> JoinHandle<()> {
    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} [{bar:40.green/black}] {pos:>3}%") {
        pb.set_style(style.tick_strings(TICKS).progress_chars("█▆ "));
    }
    pb.enable_steady_tick(TICK_RATE);

    tokio::spawn(async move {
        while let Some(percent) = rx.recv().await {
            pb.set_position(percent.clamp(0.0, 100.0) as u64);
        }
        pb.finish_and_clear();
    })
}
