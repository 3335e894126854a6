use std::path::PathBuf;
use thiserror::Error;

/// Faults raised by the pipeline stages.
///
/// `MissingInput` and `MalformedPage` abort a run. `MalformedRow` and
/// `MissingGraphNode` are logged by the stage that hits them and the stage
/// carries on.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Input file not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Malformed row {row}: {reason}")]
    MalformedRow { row: u64, reason: String },

    #[error("Category '{0}' has no adjacency entry")]
    MissingGraphNode(String),

    #[error("Malformed page at byte {position}: {reason}")]
    MalformedPage { position: u64, reason: String },
}

impl ExtractError {
    pub fn malformed_row(row: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            row,
            reason: reason.into(),
        }
    }

    pub fn malformed_page(position: u64, reason: impl Into<String>) -> Self {
        Self::MalformedPage {
            position,
            reason: reason.into(),
        }
    }
}

/// Fails with `MissingInput` unless `path` is an existing file.
pub fn ensure_input(path: impl Into<PathBuf>) -> Result<(), ExtractError> {
    let path = path.into();
    if path.is_file() {
        Ok(())
    } else {
        Err(ExtractError::MissingInput(path))
    }
}
