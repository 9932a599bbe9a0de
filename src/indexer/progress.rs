use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for a batch of `len` items, hidden when `enabled` is false
pub fn batch_bar(len: u64, unit: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let template = format!(
        "Progress [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{percent}}% | {{pos}}/{{len}} {unit} | ETA: {{eta}} | {{msg}}"
    );
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb
}
