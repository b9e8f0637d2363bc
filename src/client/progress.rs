// Terminal progress bars for transfers

use indicatif::{ProgressBar, ProgressStyle};

/// Byte progress bar for one transfer; the length can be set later once the
/// size is known.
pub fn transfer_bar(label: &str, len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(label.to_string());
    bar
}

pub fn finish_success(bar: &ProgressBar, msg: &str) {
    bar.finish_with_message(format!("done: {}", msg));
}

pub fn finish_error(bar: &ProgressBar, msg: &str) {
    bar.abandon_with_message(format!("failed: {}", msg));
}
