pub mod detection;
pub mod oracle;
pub mod render;
pub mod store;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use crate::utils::{error_println, has_valid_extension, image_display_name, verbose_println, warn_println};
use detection::DetectionRecord;
use oracle::{Oracle, Pacer};
use store::ResultStore;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extensions: Vec<String>,
    pub pace_interval: Duration,
    pub verbose: bool,
}

/// What happened to one image during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Both artifacts already existed, nothing to do
    UpToDate,
    /// Annotated raster written this run (fresh analysis or render-only retry)
    Rendered,
    /// Record holds no anomalies; no raster by design, terminal state
    NoDetections,
    /// Detector output persisted but does not look like JSON; render skipped
    NotJson,
    /// Detector call or record persistence failed; no record written
    AnalysisFailed,
    /// Record exists but reading, parsing, or drawing failed; no raster written
    RenderFailed,
}

/// Per-image result for the end-of-run summary
#[derive(Debug)]
pub struct ImageReport {
    pub image: PathBuf,
    pub outcome: ImageOutcome,
    /// Whether the external detector was actually called for this image
    pub oracle_invoked: bool,
    /// Human-readable cause for failures and warnings
    pub detail: Option<String>,
}

impl ImageReport {
    fn new(image: &Path, outcome: ImageOutcome, oracle_invoked: bool) -> Self {
        Self {
            image: image.to_path_buf(),
            outcome,
            oracle_invoked,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sequential batch pipeline: one image at a time, detector call then render,
/// with the filesystem store as the only cross-run state.
pub struct PipelineEngine<O: Oracle> {
    config: PipelineConfig,
    store: ResultStore,
    oracle: O,
    pacer: Pacer,
}

impl<O: Oracle> PipelineEngine<O> {
    pub fn new(config: PipelineConfig, store: ResultStore, oracle: O) -> Self {
        let pacer = Pacer::new(config.pace_interval);
        Self {
            config,
            store,
            oracle,
            pacer,
        }
    }

    /// Discover image files at the top level of the input directory,
    /// filtered by extension and sorted for a deterministic order
    pub fn discover_images(&self, input_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut image_files = Vec::new();

        for entry in WalkDir::new(input_dir).follow_links(false).max_depth(1) {
            let entry = entry.context("Failed to read directory entry")?;
            let path = entry.path();

            if path.is_file() && has_valid_extension(path, &self.config.extensions) {
                image_files.push(path.to_path_buf());
            }
        }

        image_files.sort();

        verbose_println(
            self.config.verbose,
            &format!("Found {} image files", image_files.len()),
        );
        Ok(image_files)
    }

    /// Run one image through the resume-aware state machine.
    ///
    /// An existing JSON record always wins: the detector is never re-invoked
    /// for it, even when the record is malformed or empty. The raster is the
    /// independent second artifact and is regenerated on its own whenever it
    /// is missing. Failures are reported, never propagated; the batch moves on.
    pub fn process_image(&mut self, image_path: &Path, instruction: &str) -> ImageReport {
        let name = image_display_name(image_path);

        if self.store.has_analysis(image_path) {
            verbose_println(
                self.config.verbose,
                &format!("Skipping {} (record already exists)", name),
            );

            if self.store.has_render(image_path) {
                return ImageReport::new(image_path, ImageOutcome::UpToDate, false);
            }

            return match self.render_from_store(image_path) {
                Ok(true) => ImageReport::new(image_path, ImageOutcome::Rendered, false),
                Ok(false) => ImageReport::new(image_path, ImageOutcome::NoDetections, false),
                Err(e) => {
                    error_println(&format!("Could not visualize {}: {:#}", name, e));
                    ImageReport::new(image_path, ImageOutcome::RenderFailed, false)
                        .with_detail(format!("{:#}", e))
                }
            };
        }

        verbose_println(self.config.verbose, &format!("Analyzing: {}...", name));

        self.pacer.wait();
        let raw_output = match self.oracle.analyze(image_path, instruction) {
            Ok(raw) => raw,
            Err(e) => {
                error_println(&format!("Detector failed on {}: {:#}", name, e));
                return ImageReport::new(image_path, ImageOutcome::AnalysisFailed, true)
                    .with_detail(format!("{:#}", e));
            }
        };

        // Persist verbatim before anything else; this file is the resume marker
        if let Err(e) = self.store.write_analysis(image_path, &raw_output) {
            error_println(&format!("{:#}", e));
            return ImageReport::new(image_path, ImageOutcome::AnalysisFailed, true)
                .with_detail(format!("{:#}", e));
        }

        if !raw_output.trim_start().starts_with('{') {
            warn_println(&format!(
                "Output for {} might not be valid JSON; skipping visualization",
                name
            ));
            return ImageReport::new(image_path, ImageOutcome::NotJson, true)
                .with_detail("detector output does not look like JSON".to_string());
        }

        match self.render_from_store(image_path) {
            Ok(true) => ImageReport::new(image_path, ImageOutcome::Rendered, true),
            Ok(false) => ImageReport::new(image_path, ImageOutcome::NoDetections, true),
            Err(e) => {
                error_println(&format!("Could not visualize {}: {:#}", name, e));
                ImageReport::new(image_path, ImageOutcome::RenderFailed, true)
                    .with_detail(format!("{:#}", e))
            }
        }
    }

    /// Render the stored record onto the source image.
    ///
    /// Returns `Ok(true)` when a raster was written and `Ok(false)` when the
    /// record legitimately produces no output (empty anomalies).
    fn render_from_store(&self, image_path: &Path) -> Result<bool> {
        let raw = self.store.read_analysis(image_path)?;
        let record: DetectionRecord = serde_json::from_str(&raw).with_context(|| {
            format!(
                "Invalid detection record for {}",
                image_display_name(image_path)
            )
        })?;

        let img = image::open(image_path)
            .with_context(|| format!("Failed to open image: {}", image_path.display()))?;

        match render::render(&img, &record) {
            Some(annotated) => {
                let out_path = self.store.render_path(image_path);
                annotated
                    .save(&out_path)
                    .with_context(|| format!("Failed to save annotation: {}", out_path.display()))?;
                verbose_println(
                    self.config.verbose,
                    &format!("Saved annotation: {}", out_path.display()),
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
