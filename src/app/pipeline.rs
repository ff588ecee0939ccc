// LogWeave - app/pipeline.rs
//
// Wires producers and transforms into the standard processing chain:
//
//   file -> InMemoryLogSource -> MultiLineLogSource --+
//   file -> InMemoryLogSource -> MultiLineLogSource --+-> MergedLogSource -> [FilteredLogSource]
//
// The pipeline owns every stage; dropping it disposes them all.

use crate::app::import;
use crate::core::column;
use crate::core::filter::{FilterState, LogEntryFilter};
use crate::core::model::{Severity, SourceId};
use crate::core::modification::Section;
use crate::core::scheduler::TaskScheduler;
use crate::core::source::{LogSource, LogSourceExt};
use crate::platform::config::AppConfig;
use crate::sources::{
    FilteredLogSource, InMemoryLogSource, MergedLogSource, MultiLineLogSource, SourceOptions,
};
use crate::util::constants::PIPELINE_POLL_INTERVAL_MS;
use crate::util::error::{LogWeaveError, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

impl From<&AppConfig> for SourceOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            maximum_wait: Duration::from_millis(config.maximum_wait_ms),
            batch_size: config.listener_batch_size,
            max_lines_per_tick: config.max_lines_per_tick,
        }
    }
}

/// One row of the pipeline output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub source_id: SourceId,
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Severity,
    pub raw: String,
}

impl OutputRow {
    /// `<source-id> <timestamp> <level> <raw>`
    pub fn format(&self) -> String {
        let timestamp = self
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "-".to_string());
        let level = match self.level.short_label() {
            "" => "-",
            label => label,
        };
        format!("{} {timestamp} {level:<5} {}", self.source_id, self.raw)
    }
}

pub struct Pipeline {
    inputs: Vec<Arc<InMemoryLogSource>>,
    grouped: Vec<Arc<MultiLineLogSource>>,
    merged: Arc<MergedLogSource>,
    filtered: Option<Arc<FilteredLogSource>>,
}

impl Pipeline {
    /// Builds the chain on top of already populated producers.
    ///
    /// `filter` is applied per entry; an empty filter adds no filter stage.
    pub fn new(
        scheduler: Arc<dyn TaskScheduler>,
        inputs: Vec<Arc<InMemoryLogSource>>,
        filter: Option<FilterState>,
        options: SourceOptions,
    ) -> Result<Self> {
        let grouped: Vec<Arc<MultiLineLogSource>> = inputs
            .iter()
            .map(|input| MultiLineLogSource::new(scheduler.clone(), input.clone(), options))
            .collect();
        let merged = MergedLogSource::new(
            scheduler.clone(),
            grouped
                .iter()
                .map(|g| g.clone() as Arc<dyn LogSource>)
                .collect(),
            options,
        )?;
        let filtered = filter.filter(|f| !f.is_empty()).map(|f| {
            let entry_filter: Arc<dyn LogEntryFilter> = Arc::new(f);
            FilteredLogSource::new(
                scheduler.clone(),
                merged.clone(),
                None,
                Some(entry_filter),
                options,
            )
        });

        tracing::info!(
            sources = inputs.len(),
            filtered = filtered.is_some(),
            "Pipeline built"
        );
        Ok(Self {
            inputs,
            grouped,
            merged,
            filtered,
        })
    }

    /// Imports `paths` and builds the chain on top of them.
    pub fn from_files(
        scheduler: Arc<dyn TaskScheduler>,
        paths: &[PathBuf],
        filter: Option<FilterState>,
        options: SourceOptions,
    ) -> Result<Self> {
        let inputs = paths
            .iter()
            .map(|path| import::import_file(path).map_err(LogWeaveError::from))
            .collect::<Result<Vec<_>>>()?;
        Self::new(scheduler, inputs, filter, options)
    }

    pub fn inputs(&self) -> &[Arc<InMemoryLogSource>] {
        &self.inputs
    }

    pub fn merged(&self) -> &Arc<MergedLogSource> {
        &self.merged
    }

    /// The last stage of the chain.
    pub fn output(&self) -> Arc<dyn LogSource> {
        match &self.filtered {
            Some(filtered) => filtered.clone(),
            None => self.merged.clone(),
        }
    }

    /// Polls until the output reports 100% processed. Returns false on
    /// timeout.
    pub fn wait_until_complete(&self, timeout: Duration) -> bool {
        let output = self.output();
        let deadline = Instant::now() + timeout;
        loop {
            if output.is_processing_complete() {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    source = output.name(),
                    progress = %output.properties().percentage_processed,
                    "Timed out waiting for processing"
                );
                return false;
            }
            std::thread::sleep(Duration::from_millis(PIPELINE_POLL_INTERVAL_MS));
        }
    }

    /// Reads every row of the output.
    pub fn rows(&self) -> Vec<OutputRow> {
        let output = self.output();
        let buffer = output.section_entries(
            Section::new(0usize, output.count()),
            &[
                column::SOURCE_ID.clone(),
                column::TIMESTAMP.clone(),
                column::LOG_LEVEL.clone(),
                column::RAW_CONTENT.clone(),
            ],
        );
        buffer
            .entries()
            .into_iter()
            .map(|entry| OutputRow {
                source_id: entry.source_id(),
                timestamp: entry.timestamp(),
                level: entry.level(),
                raw: entry.raw_content().unwrap_or_default().to_string(),
            })
            .collect()
    }

    /// Disposes every stage, output first.
    pub fn dispose(&self) {
        if let Some(filtered) = &self.filtered {
            filtered.dispose();
        }
        self.merged.dispose();
        for grouped in &self.grouped {
            grouped.dispose();
        }
        for input in &self.inputs {
            input.dispose();
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}
