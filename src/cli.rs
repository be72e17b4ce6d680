use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "anomaly-annotator",
    about = "Batch anomaly detection and annotation for image folders",
    long_about = "
Anomaly Annotator

Runs an external visual-anomaly detection CLI over every image in a folder,
saves each raw detection payload as JSON, and renders the detections back onto
the source image as an annotated overlay JPEG.

The run is resumable: images that already have a JSON result are never sent to
the detector again, and a missing overlay is regenerated from the stored JSON
without re-running detection. Interrupt and restart at any point; each image
costs at most one detector call total.

Example Usage:
  # Analyze and annotate a folder of test images
  anomaly-annotator -i ./dataset/test -o ./dataset/test_output -p prompt.json

  # Custom detector command and model, no pacing between calls
  anomaly-annotator -i ./images -o ./out -p prompt.json \\
    --oracle-cmd gemini --model gemini-3-pro-preview --pace-ms 0

  # Only consider jpg and png files, with verbose per-image logging
  anomaly-annotator -i ./images -o ./out -p prompt.json \\
    --extensions jpg,png --verbose"
)]
pub struct Args {
    /// Input directory containing the source images
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    pub input_dir: PathBuf,

    /// Output directory for JSON results and annotated images
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Prompt file whose contents are sent verbatim with every image
    #[arg(short = 'p', long = "prompt", value_name = "FILE")]
    pub prompt_file: PathBuf,

    /// External detector command to invoke
    #[arg(long = "oracle-cmd", default_value = "gemini", value_name = "CMD")]
    pub oracle_cmd: String,

    /// Model name passed to the detector command
    #[arg(
        short = 'm',
        long = "model",
        default_value = "gemini-3-pro-preview",
        value_name = "MODEL"
    )]
    pub model: String,

    /// Comma-separated list of image extensions to process (case-insensitive)
    #[arg(long = "extensions", default_value = "jpg,jpeg,png,webp")]
    pub extensions_str: String,

    /// Minimum interval between detector calls in milliseconds (0 disables pacing)
    #[arg(long = "pace-ms", default_value = "1000", value_name = "MS")]
    pub pace_ms: u64,

    /// Enable verbose output with detailed per-image information
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Args {
    /// Parse the extensions string into a lowercase vector
    pub fn parse_extensions(&self) -> Vec<String> {
        self.extensions_str
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Minimum inter-call interval for the detector
    pub fn pace_interval(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }
}


// Default implementation for tests
#[cfg(test)]
impl Default for Args {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            prompt_file: PathBuf::new(),
            oracle_cmd: "gemini".to_string(),
            model: "gemini-3-pro-preview".to_string(),
            extensions_str: "jpg,jpeg,png,webp".to_string(),
            pace_ms: 1000,
            verbose: false,
        }
    }
}
