//! Ghostscript compression
//!
//! Re-encodes a PDF through `gs -sDEVICE=pdfwrite` with image downsampling.
//! The child process runs under a wall-clock watchdog and is killed if it
//! overruns.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::ProcessingError;

/// Default downsampling resolution
pub const DEFAULT_DPI: u32 = 150;

/// Ghostscript `-dPDFSETTINGS` preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    /// Light compression (`low`)
    Prepress,
    /// Balanced (`medium`)
    #[default]
    Printer,
    /// Strongest compression (`high`)
    Screen,
}

impl Quality {
    /// Map the client's compression level; unknown values fall back to `Printer`
    pub fn from_level(level: &str) -> Self {
        match level {
            "low" => Self::Prepress,
            "high" => Self::Screen,
            _ => Self::Printer,
        }
    }

    pub fn preset(&self) -> &'static str {
        match self {
            Self::Prepress => "prepress",
            Self::Printer => "printer",
            Self::Screen => "screen",
        }
    }
}

/// Options for one compression run
#[derive(Debug, Clone)]
pub struct CompressOptions {
    pub quality: Quality,
    pub dpi: u32,
    pub remove_metadata: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            dpi: DEFAULT_DPI,
            remove_metadata: false,
        }
    }
}

impl CompressOptions {
    /// Build from raw form values, tolerating junk
    pub fn from_form(compression: Option<&str>, dpi: Option<&str>, remove_metadata: Option<&str>) -> Self {
        Self {
            quality: compression.map(Quality::from_level).unwrap_or_default(),
            dpi: dpi
                .and_then(|d| d.trim().parse().ok())
                .unwrap_or(DEFAULT_DPI),
            remove_metadata: remove_metadata == Some("true"),
        }
    }
}

/// Build the Ghostscript argument list
pub fn ghostscript_args(input: &Path, output: &Path, options: &CompressOptions) -> Vec<String> {
    let dpi = options.dpi;
    let mut args = Vec::with_capacity(16);

    args.push("-q".to_string());
    if options.remove_metadata {
        args.push("-dDiscardDocInfo=true".to_string());
    }
    args.extend([
        "-sDEVICE=pdfwrite".to_string(),
        format!("-dPDFSETTINGS=/{}", options.quality.preset()),
        "-dDetectDuplicateImages=true".to_string(),
        "-dCompressFonts=true".to_string(),
        "-dDownsampleColorImages=true".to_string(),
        format!("-dColorImageResolution={}", dpi),
        "-dDownsampleGrayImages=true".to_string(),
        format!("-dGrayImageResolution={}", dpi),
        "-dDownsampleMonoImages=true".to_string(),
        format!("-dMonoImageResolution={}", dpi),
        "-dNOPAUSE".to_string(),
        "-dBATCH".to_string(),
        "-dSAFER".to_string(),
        format!("-sOutputFile={}", output.display()),
        input.display().to_string(),
    ]);

    args
}

/// Ghostscript runner
#[derive(Debug, Clone)]
pub struct Ghostscript {
    binary: String,
    timeout: Duration,
}

impl Ghostscript {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Compress `input` into `output`, returning the output size in bytes
    pub async fn compress(
        &self,
        input: &Path,
        output: &Path,
        options: &CompressOptions,
    ) -> Result<u64, ProcessingError> {
        let child = Command::new(&self.binary)
            .args(ghostscript_args(input, output, options))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessingError::Ghostscript(format!("failed to start {}: {}", self.binary, e)))?;

        // Dropping the child on timeout kills it
        let finished = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::error!(input = %input.display(), timeout_secs = self.timeout.as_secs(), "Ghostscript watchdog fired");
                ProcessingError::TimedOut(self.timeout.as_secs())
            })?
            .map_err(|e| ProcessingError::Ghostscript(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&finished.stderr);
        if !stderr.trim().is_empty() {
            tracing::warn!(gs = %stderr.trim(), "Ghostscript diagnostics");
        }

        if !finished.status.success() {
            return Err(ProcessingError::Ghostscript(format!(
                "exited with {}",
                finished.status
            )));
        }

        let size = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .map_err(|_| ProcessingError::Ghostscript("no output produced".to_string()))?;

        Ok(size)
    }
}

/// Fraction of the input size saved, rounded to two decimals
pub fn compression_ratio(input_bytes: u64, output_bytes: u64) -> f64 {
    if input_bytes == 0 {
        return 0.0;
    }
    let ratio = 1.0 - (output_bytes as f64 / input_bytes as f64);
    (ratio * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_quality_mapping() {
        assert_eq!(Quality::from_level("low"), Quality::Prepress);
        assert_eq!(Quality::from_level("medium"), Quality::Printer);
        assert_eq!(Quality::from_level("high"), Quality::Screen);
        assert_eq!(Quality::from_level("extreme"), Quality::Printer);
    }

    #[test]
    fn test_options_from_form() {
        let options = CompressOptions::from_form(Some("high"), Some("abc"), Some("true"));
        assert_eq!(options.quality, Quality::Screen);
        assert_eq!(options.dpi, DEFAULT_DPI);
        assert!(options.remove_metadata);

        let options = CompressOptions::from_form(None, Some("72"), Some("yes"));
        assert_eq!(options.quality, Quality::Printer);
        assert_eq!(options.dpi, 72);
        assert!(!options.remove_metadata);
    }

    #[test]
    fn test_ghostscript_args() {
        let options = CompressOptions {
            quality: Quality::Screen,
            dpi: 96,
            remove_metadata: true,
        };
        let args = ghostscript_args(&PathBuf::from("in.pdf"), &PathBuf::from("out.pdf"), &options);

        assert_eq!(args[0], "-q");
        assert_eq!(args[1], "-dDiscardDocInfo=true");
        assert!(args.contains(&"-dPDFSETTINGS=/screen".to_string()));
        assert!(args.contains(&"-dColorImageResolution=96".to_string()));
        assert!(args.contains(&"-sOutputFile=out.pdf".to_string()));
        assert_eq!(args.last().unwrap(), "in.pdf");

        let plain = ghostscript_args(&PathBuf::from("in.pdf"), &PathBuf::from("out.pdf"), &CompressOptions::default());
        assert!(!plain.iter().any(|a| a.contains("DiscardDocInfo")));
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(1000, 250), 0.75);
        assert_eq!(compression_ratio(0, 10), 0.0);
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let gs = Ghostscript::new("definitely-not-ghostscript-binary", Duration::from_secs(5));
        let result = gs
            .compress(Path::new("in.pdf"), Path::new("out.pdf"), &CompressOptions::default())
            .await;
        assert!(matches!(result, Err(ProcessingError::Ghostscript(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_binary_is_reported() {
        let gs = Ghostscript::new("false", Duration::from_secs(5));
        let result = gs
            .compress(Path::new("in.pdf"), Path::new("out.pdf"), &CompressOptions::default())
            .await;
        assert!(matches!(result, Err(ProcessingError::Ghostscript(_))));
    }
}
