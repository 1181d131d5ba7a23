//! Progress bar construction shared by downloads, uploads and batch waits

use indicatif::{ProgressBar, ProgressStyle};

const COUNT_TEMPLATE: &str = "{msg}: {percent:>3}%|{wide_bar}| {pos}/{len} [{elapsed_precise}<{eta_precise}]";
const BYTES_TEMPLATE: &str =
    "{msg}: {percent:>3}%|{wide_bar}| {bytes}/{total_bytes} [{elapsed_precise}, {binary_bytes_per_sec}]";

/// A bar counting finished items, hidden unless `enabled`
pub fn count_bar(total: u64, description: &str, enabled: bool) -> ProgressBar {
    build(total, description, enabled, COUNT_TEMPLATE)
}

/// A bar counting transferred bytes, hidden unless `enabled`
pub fn bytes_bar(total: u64, description: &str, enabled: bool) -> ProgressBar {
    build(total, description, enabled, BYTES_TEMPLATE)
}

fn build(total: u64, description: &str, enabled: bool, template: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    bar.set_message(description.to_string());
    bar
}
