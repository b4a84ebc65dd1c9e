use serde::Serialize;
use thiserror::Error;

/// Main error type for the BOQ extraction pipeline
///
/// Only document-level failures surface as `BoqError`. A single page or sheet that
/// cannot be read is reported as a [`SectionWarning`] and processing continues.
#[derive(Error, Debug)]
pub enum BoqError {
    #[error("Source could not be read: {message}")]
    SourceUnreadable { message: String },

    #[error("File I/O error: {path}")]
    FileIO {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Spreadsheet error in {path}")]
    Spreadsheet {
        path: String,
        #[source]
        source: calamine::Error,
    },

    #[error("CSV error in {path}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error: {context}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid document format: {format}")]
    InvalidFormat { format: String },

    #[error("No usable data in {source_name} ({warnings} section warnings)")]
    NoUsableData { source_name: String, warnings: usize },

    #[error("General error: {0}")]
    General(#[from] anyhow::Error),
}

impl BoqError {
    pub fn source_unreadable(message: impl Into<String>) -> Self {
        Self::SourceUnreadable {
            message: message.into(),
        }
    }

    pub fn file_io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileIO {
            path: path.into(),
            source,
        }
    }

    pub fn spreadsheet(path: impl Into<String>, source: calamine::Error) -> Self {
        Self::Spreadsheet {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if another document in the same batch can still be processed
    pub fn is_recoverable(&self) -> bool {
        match self {
            BoqError::Configuration { .. } => false,
            _ => true,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            BoqError::SourceUnreadable { .. } => {
                "🐹 CHONKER couldn't read this document. It might be encrypted or corrupted.".to_string()
            }
            BoqError::FileIO { path, .. } => {
                format!("📁 Could not access {}. Check the path and file permissions.", path)
            }
            BoqError::Spreadsheet { path, .. } => {
                format!("📊 {} is not a readable workbook.", path)
            }
            BoqError::Csv { path, .. } => format!("📄 {} is not valid CSV.", path),
            BoqError::InvalidFormat { format } => {
                format!("📄 Unsupported format: {}. Use PDF fragments, xlsx, xls, ods or csv.", format)
            }
            BoqError::NoUsableData { source_name, .. } => {
                format!("🔍 No table data could be recovered from {}.", source_name)
            }
            BoqError::Configuration { message } => format!("⚙️  Configuration problem: {}", message),
            _ => "🐹 Something went wrong. Check the logs for details.".to_string(),
        }
    }
}

/// Result type alias for convenience
pub type BoqResult<T> = Result<T, BoqError>;

/// A page or sheet that failed and was skipped without aborting the document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionWarning {
    /// Human-readable section label, e.g. `page 3` or `sheet "Civil"`.
    pub section: String,
    pub message: String,
}

impl SectionWarning {
    pub fn new(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SectionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.section, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_stop_the_batch() {
        let err = BoqError::configuration("bad synonym table");
        assert!(!err.is_recoverable());
        assert!(err.user_message().contains("bad synonym table"));
    }

    #[test]
    fn test_document_errors_keep_the_batch_going() {
        let err = BoqError::source_unreadable("every sheet failed");
        assert!(err.is_recoverable());
        assert!(err.user_message().contains("couldn't read"));
    }

    #[test]
    fn test_section_warning_display() {
        let w = SectionWarning::new("sheet \"Civil\"", "no strategy produced rows");
        assert_eq!(w.to_string(), "sheet \"Civil\": no strategy produced rows");
    }
}
