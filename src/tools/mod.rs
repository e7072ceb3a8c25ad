//! PDF Tools
//!
//! Artifact producers whose output is registered as download jobs:
//! - `compress`: Ghostscript `pdfwrite` re-encoding under a watchdog
//! - `merge`: in-process page concatenation with lopdf

pub mod compress;
pub mod merge;

pub use compress::{CompressOptions, Ghostscript, Quality};
pub use merge::{merge_pdfs, MergedPdf};

/// Producer errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Only .pdf files are allowed.")]
    InvalidFileType(String),

    #[error("Only PDF files are supported")]
    UnsupportedMediaType(String),

    #[error("This PDF exceeds the maximum upload size.")]
    FileTooLarge { max_bytes: u64 },

    #[error("Need at least {0} PDFs")]
    TooFewInputs(usize),

    #[error("Too many files (max: {0})")]
    TooManyInputs(usize),

    #[error("Invalid PDF (file {index}): {reason}")]
    InvalidPdf { index: usize, reason: String },

    #[error("Ghostscript failed: {0}")]
    Ghostscript(String),

    #[error("Ghostscript timed out after {0}s")]
    TimedOut(u64),

    #[error("Invalid upload: {0}")]
    Upload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::MissingFile => StatusCode::BAD_REQUEST,
            Self::InvalidFileType(_) => StatusCode::BAD_REQUEST,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TooFewInputs(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyInputs(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidPdf { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Ghostscript(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TimedOut(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upload(_) => StatusCode::BAD_REQUEST,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile | Self::Upload(_) => "invalid_request",
            Self::InvalidFileType(_) | Self::UnsupportedMediaType(_) => "invalid_file_type",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::TooFewInputs(_) | Self::TooManyInputs(_) => "invalid_request",
            Self::InvalidPdf { .. } | Self::Ghostscript(_) | Self::TimedOut(_) => "processing_failed",
            Self::Io(_) => "internal_error",
        }
    }
}

/// Accept an upload as PDF by declared type or by extension
pub fn is_pdf_upload(content_type: Option<&str>, file_name: &str) -> bool {
    content_type.is_some_and(|ct| ct.contains("pdf")) || file_name.to_lowercase().ends_with(".pdf")
}

/// Reduce a client-supplied name to a safe final path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == '"' { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "file.pdf".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_pdf_upload() {
        assert!(is_pdf_upload(Some("application/pdf"), "x.bin"));
        assert!(is_pdf_upload(None, "Report.PDF"));
        assert!(is_pdf_upload(Some("application/octet-stream"), "a.pdf"));
        assert!(!is_pdf_upload(Some("image/png"), "a.png"));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a.pdf"), "a.pdf");
        assert_eq!(sanitize_file_name("say \"hi\".pdf"), "say _hi_.pdf");
        assert_eq!(sanitize_file_name(".."), "file.pdf");
        assert_eq!(sanitize_file_name(""), "file.pdf");
    }
}
