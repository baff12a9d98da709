//! Pipeline orchestration.
//!
//! Drives the per-page stages in order (quality gate, preprocessing, layout
//! analysis, recognition, postprocessing), persists artifacts as soon as they
//! exist, checkpoints at page boundaries, and always finishes with document
//! assembly so partial runs still produce a book.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::assemble;
use crate::checkpoint::{self, CheckpointState};
use crate::core::{OcrError, PipelineConfig};
use crate::engine::{self, BackendHandles, RecognitionBackend};
use crate::layout::{self, LayoutAnalyzer};
use crate::postprocess;
use crate::quality;
use crate::utils::{self, PageFile};

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub completed: Vec<u32>,
    pub failed: Vec<u32>,
    pub elapsed_secs: f64,
    /// Absent in quality-check-only mode.
    pub book_path: Option<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    backend: Arc<dyn RecognitionBackend>,
    layout: LayoutAnalyzer,
}

impl Pipeline {
    /// Builds a pipeline from configuration alone, selecting a backend from
    /// the configured engine's fallback chain. No layout model is wired, so
    /// layout degrades to whole-page regions.
    pub fn from_config(config: PipelineConfig) -> Result<Self, OcrError> {
        let backend = engine::select_backend(&config, BackendHandles::default())?;
        let layout = LayoutAnalyzer::new(None, config.use_layout);
        Ok(Self {
            config,
            backend,
            layout,
        })
    }

    /// Builds a pipeline with injected collaborators.
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn RecognitionBackend>,
        layout: LayoutAnalyzer,
    ) -> Self {
        Self {
            config,
            backend,
            layout,
        }
    }

    /// Runs the pipeline over every page in range.
    pub fn run(&self) -> Result<RunSummary, OcrError> {
        let started = Instant::now();
        self.config.ensure_dirs()?;

        let pages = utils::page_files(
            &self.config.input_dir,
            self.config.page_start,
            self.config.page_end,
        )?;
        if pages.is_empty() {
            return Err(OcrError::config_error_detailed(
                "input",
                format!("no page files found in {}", self.config.input_dir.display()),
            ));
        }
        info!(pages = pages.len(), "starting run");

        if self.config.quality_check_only {
            return self.run_quality_check(&pages, started);
        }

        let checkpoint_path = self.config.checkpoint_path();
        let mut state = if self.config.resume {
            let loaded = checkpoint::load_checkpoint(&checkpoint_path);
            if let Some(state) = &loaded {
                if !state.config_hash.is_empty() && state.config_hash != self.config.config_hash() {
                    warn!("configuration changed since checkpoint was written");
                }
                info!(
                    completed = state.completed_pages.len(),
                    failed = state.failed_pages.len(),
                    "resuming from checkpoint"
                );
            }
            loaded.unwrap_or_default()
        } else {
            CheckpointState::default()
        };

        let remaining = checkpoint::remaining_pages(&pages, self.config.resume.then_some(&state));
        // Retried pages drop out of the failed list before the run.
        state
            .failed_pages
            .retain(|n| !remaining.iter().any(|p| p.number == *n));
        state.total_pages = pages.len() as u32;
        state.engine = self.backend.name().to_string();
        state.config_hash = self.config.config_hash();

        let mut since_save = 0usize;
        for page in &remaining {
            match self.process_page(page) {
                Ok(()) => {
                    state.completed_pages.push(page.number);
                    state.completed_pages.sort_unstable();
                    state.completed_pages.dedup();
                }
                Err(err) => {
                    error!(page = page.number, error = %err, "page failed");
                    state.failed_pages.push(page.number);
                    state.failed_pages.sort_unstable();
                    state.failed_pages.dedup();
                }
            }

            since_save += 1;
            if since_save >= self.config.checkpoint_interval {
                // Losing a checkpoint write costs at most a re-run of these
                // pages; it must not abort the run.
                if let Err(err) = checkpoint::save_checkpoint(&mut state, &checkpoint_path) {
                    warn!(error = %err, "failed to save checkpoint");
                }
                since_save = 0;
            }
        }
        if let Err(err) = checkpoint::save_checkpoint(&mut state, &checkpoint_path) {
            warn!(error = %err, "failed to save checkpoint");
        }

        // Assembly runs even when nothing was processed this invocation, so
        // a fully resumed run still regenerates the book.
        let book_path = assemble::build_book(&self.config)?;

        let summary = RunSummary {
            completed: state.completed_pages.clone(),
            failed: state.failed_pages.clone(),
            elapsed_secs: started.elapsed().as_secs_f64(),
            book_path: Some(book_path),
        };
        info!(
            completed = summary.completed.len(),
            failed = summary.failed.len(),
            elapsed = format_args!("{:.1}s", summary.elapsed_secs),
            "run finished"
        );
        Ok(summary)
    }

    fn run_quality_check(
        &self,
        pages: &[PageFile],
        started: Instant,
    ) -> Result<RunSummary, OcrError> {
        let mut reports = Vec::with_capacity(pages.len());
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for page in pages {
            match utils::load_image(&page.path) {
                Ok(image) => {
                    let report = quality::assess_quality(&image, page.number, &self.config);
                    if report.acceptable {
                        completed.push(page.number);
                    } else {
                        failed.push(page.number);
                    }
                    reports.push(report);
                }
                Err(err) => {
                    error!(page = page.number, error = %err, "failed to load page");
                    failed.push(page.number);
                }
            }
        }
        quality::report_quality_summary(&reports);
        Ok(RunSummary {
            completed,
            failed,
            elapsed_secs: started.elapsed().as_secs_f64(),
            book_path: None,
        })
    }

    /// Processes one page end to end, persisting layout and OCR artifacts.
    fn process_page(&self, page: &PageFile) -> Result<(), OcrError> {
        let page_num = page.number;
        info!(page = page_num, "processing page");
        let output_dir = self.config.output_dir();

        let image = utils::load_image(&page.path)?;

        let report = quality::assess_quality(&image, page_num, &self.config);
        for warning in &report.warnings {
            warn!(page = page_num, warning, "quality warning");
        }
        if !report.acceptable {
            return Err(OcrError::QualityRejected {
                page_num,
                blur_score: report.blur_score,
            });
        }

        let processed = crate::preprocess::preprocess(&image, &self.config);

        let mut page_layout = self.layout.analyze(&processed, page_num);
        layout::extract_figures(&processed, &mut page_layout, &self.config)?;
        // Saved before recognition so figure references survive an OCR crash.
        layout::save_layout(&page_layout, &output_dir)?;

        let textual: Vec<_> = page_layout
            .regions
            .iter()
            .filter(|r| r.region_type.is_textual())
            .cloned()
            .collect();

        let mut ocr = engine::run_ocr(
            self.backend.as_ref(),
            &processed,
            page_num,
            Some(&textual),
            &self.config,
        )?;
        postprocess::postprocess_page(&mut ocr.results, &self.config);
        engine::save_ocr(&ocr, &output_dir)?;

        Ok(())
    }
}
