use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Filesystem-backed store for per-image artifacts.
///
/// Artifacts are keyed by the source image's base filename: `photo.jpg` owns
/// `photo.json` (the raw detector output, byte-for-byte) and
/// `photo_annotated.jpg` (the rendered overlay), both in the output
/// directory. Existence of those files is the pipeline's resume state; there
/// is no separate index to fall out of sync.
pub struct ResultStore {
    output_dir: PathBuf,
}

impl ResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn stem(image_path: &Path) -> &str {
        image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image")
    }

    /// Path of the persisted JSON record for this image
    pub fn analysis_path(&self, image_path: &Path) -> PathBuf {
        self.output_dir
            .join(format!("{}.json", Self::stem(image_path)))
    }

    /// Path of the annotated overlay raster for this image
    pub fn render_path(&self, image_path: &Path) -> PathBuf {
        self.output_dir
            .join(format!("{}_annotated.jpg", Self::stem(image_path)))
    }

    pub fn has_analysis(&self, image_path: &Path) -> bool {
        self.analysis_path(image_path).exists()
    }

    pub fn has_render(&self, image_path: &Path) -> bool {
        self.render_path(image_path).exists()
    }

    /// Persist the raw detector output verbatim.
    ///
    /// Written exactly once per image; the orchestrator never calls this when
    /// a record already exists.
    pub fn write_analysis(&self, image_path: &Path, raw_output: &str) -> Result<()> {
        let path = self.analysis_path(image_path);
        std::fs::write(&path, raw_output)
            .with_context(|| format!("Failed to write detection record: {}", path.display()))?;
        Ok(())
    }

    pub fn read_analysis(&self, image_path: &Path) -> Result<String> {
        let path = self.analysis_path(image_path);
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read detection record: {}", path.display()))
    }
}
