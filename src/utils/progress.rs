//! Terminal progress for `leap index`: a spinner while the roots are walked,
//! then a bar over the files being read. Without the `progress` feature every
//! call is a no-op.

use std::path::Path;

/// Progress of one index build
pub struct BuildProgress {
    #[cfg(feature = "progress")]
    bar: Option<indicatif::ProgressBar>,
}

#[cfg(feature = "progress")]
impl BuildProgress {
    /// Reports nothing
    pub fn hidden() -> Self {
        Self { bar: None }
    }

    /// Starts the discovery spinner unless `silent`
    pub fn start(silent: bool) -> Self {
        use indicatif::{ProgressBar, ProgressStyle};

        if silent {
            return Self::hidden();
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Walking index roots...");
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar: Some(spinner) }
    }

    /// Discovery is over; switch to a bar over `files`
    pub fn found(&mut self, files: usize) {
        use indicatif::{ProgressBar, ProgressStyle};

        let Some(spinner) = self.bar.take() else {
            return;
        };
        spinner.finish_with_message(format!("Found {} files", files));
        let bar = ProgressBar::new(files as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Extracting trigrams...");
        self.bar = Some(bar);
    }

    /// One file read, whether or not it made it into the index
    pub fn file_done(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    /// Postings are being written to `index_path`
    pub fn writing(&self, index_path: &Path) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("Writing {}...", index_path.display()));
        }
    }

    pub fn finish(self, files_indexed: usize) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!("Indexed {} files", files_indexed));
        }
    }

    #[cfg(test)]
    fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

#[cfg(not(feature = "progress"))]
impl BuildProgress {
    pub fn hidden() -> Self {
        Self {}
    }

    pub fn start(_silent: bool) -> Self {
        Self {}
    }

    pub fn found(&mut self, _files: usize) {}

    pub fn file_done(&self) {}

    pub fn writing(&self, _index_path: &Path) {}

    pub fn finish(self, _files_indexed: usize) {}

    #[cfg(test)]
    fn is_visible(&self) -> bool {
        false
    }
}
