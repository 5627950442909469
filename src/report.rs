//! Per-item outcomes of a batch stage.
//!
//! A stage runs every file to completion and records what happened to each
//! one instead of aborting on the first bad file.

use crate::error::PipelineError;

#[derive(Debug)]
pub struct Failure {
    /// Item label, usually the episode file name
    pub item: String,
    pub error: PipelineError,
}

#[derive(Debug)]
pub struct BatchReport<T> {
    pub succeeded: Vec<(String, T)>,
    pub failed: Vec<Failure>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, item: impl Into<String>, result: Result<T, PipelineError>) {
        let item = item.into();
        match result {
            Ok(value) => self.succeeded.push((item, value)),
            Err(error) => {
                tracing::error!("Skipped {item}: {error}");
                let mut source = std::error::Error::source(&error);
                while let Some(cause) = source {
                    tracing::error!("  caused by: {cause}");
                    source = cause.source();
                }
                self.failed.push(Failure { item, error });
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Successful values in input order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.succeeded.iter().map(|(_, v)| v)
    }

    pub fn log_summary(&self, stage: &str) {
        if self.failed.is_empty() {
            tracing::info!("{stage}: {} of {} items succeeded", self.succeeded.len(), self.total());
            return;
        }
        tracing::warn!(
            "{stage}: {} of {} items succeeded, {} failed",
            self.succeeded.len(),
            self.total(),
            self.failed.len()
        );
        for f in self.failed.iter().take(30) {
            tracing::warn!("  {}", f.item);
        }
        if self.failed.len() > 30 {
            tracing::warn!("  ... and {} more", self.failed.len() - 30);
        }
    }
}
