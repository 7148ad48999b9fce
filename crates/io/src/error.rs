use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum IoError {
    /// File or directory could not be read.
    Read { path: PathBuf, message: String },
    /// Malformed CSV.
    Csv(String),
    /// Workbook could not be opened or has no sheet.
    Xlsx(String),
    /// Malformed XML document.
    Xml(String),
    /// Archive could not be opened.
    Zip(String),
    /// A required column (or an explicitly named one) is not in the header.
    MissingColumn { column: String, origin: String },
    /// Extension not handled by any loader.
    UnsupportedFormat(PathBuf),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => write!(f, "cannot read {}: {message}", path.display()),
            Self::Csv(msg) => write!(f, "CSV error: {msg}"),
            Self::Xlsx(msg) => write!(f, "Excel error: {msg}"),
            Self::Xml(msg) => write!(f, "XML error: {msg}"),
            Self::Zip(msg) => write!(f, "zip error: {msg}"),
            Self::MissingColumn { column, origin } => {
                write!(f, "{origin}: no column for '{column}'")
            }
            Self::UnsupportedFormat(path) => {
                write!(f, "unsupported file type: {}", path.display())
            }
        }
    }
}

impl std::error::Error for IoError {}

impl IoError {
    pub(crate) fn read(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        Self::Read {
            path: path.into(),
            message: err.to_string(),
        }
    }
}
