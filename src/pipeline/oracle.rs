use anyhow::Result;
use std::path::Path;
use std::process::Command;
use std::time::{Duration, Instant};

/// The external visual-anomaly detector, reduced to the one call the pipeline
/// needs. Swapping the detector implementation must not touch rendering or
/// orchestration, so everything downstream depends on this trait only.
///
/// On success the raw stdout text is returned as-is; whether it is valid JSON
/// is the caller's problem. On failure the error carries the collaborator's
/// diagnostic text.
pub trait Oracle {
    fn analyze(&self, image: &Path, instruction: &str) -> Result<String>;
}

/// Detector invoked as an external CLI process.
///
/// The image path is appended to the instruction as an `@path` reference,
/// matching the detector CLI's prompt syntax.
pub struct CliOracle {
    command: String,
    model: String,
}

impl CliOracle {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
        }
    }
}

impl Oracle for CliOracle {
    fn analyze(&self, image: &Path, instruction: &str) -> Result<String> {
        let full_instruction = format!("{} @{}", instruction, image.display());

        let output = Command::new(&self.command)
            .arg("-m")
            .arg(&self.model)
            .arg("-s")
            .arg(&full_instruction)
            .output()
            .map_err(|e| anyhow::anyhow!("Failed to execute '{}': {}", self.command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Minimum-interval rate limiter for detector calls.
///
/// The external service is quota-limited, so consecutive calls are spaced at
/// least `min_interval` apart. This is a courtesy toward the shared quota,
/// not a correctness requirement; a zero interval disables it entirely.
pub struct Pacer {
    min_interval: Duration,
    last_call: Option<Instant>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: None,
        }
    }

    /// Block until at least `min_interval` has passed since the previous call
    pub fn wait(&mut self) {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        self.last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacer_first_call_does_not_block() {
        let mut pacer = Pacer::new(Duration::from_secs(60));
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pacer_enforces_min_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(50));
        pacer.wait();
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_pacer_zero_interval_is_free() {
        let mut pacer = Pacer::new(Duration::ZERO);
        pacer.wait();
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_cli_oracle_missing_command() {
        let oracle = CliOracle::new("definitely-not-a-real-command-xyz", "some-model");
        let err = oracle
            .analyze(Path::new("img.jpg"), "find anomalies")
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute"));
    }
}
