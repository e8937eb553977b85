//! Progress indicators for rpaasctl

use indicatif::{ProgressBar, ProgressStyle};

/// Bar for a batch of API calls. Hidden when there is nothing to count.
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    if len == 0 {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb
}
