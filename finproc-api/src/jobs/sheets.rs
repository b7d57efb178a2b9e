//! Workbook inspection
//!
//! The classifier sniffs worksheet names to recognise structured exports
//! (a GST portal file carries a `B2B` sheet), and the `get-sheets`
//! endpoints list them for the UI. Both go through `SheetInspector` so
//! tests can substitute a fixed table.

use calamine::{open_workbook_auto, Reader};
use std::path::Path;
use thiserror::Error;

/// Extensions that can hold worksheets
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Not a workbook: {0}")]
    Unsupported(String),

    #[error("Failed to read workbook {path}: {message}")]
    Read { path: String, message: String },
}

/// Source of worksheet names for a staged file
pub trait SheetInspector: Send + Sync {
    fn sheet_names(&self, path: &Path) -> Result<Vec<String>, SheetError>;
}

/// Reads workbooks from disk with calamine
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkbookInspector;

impl SheetInspector for WorkbookInspector {
    fn sheet_names(&self, path: &Path) -> Result<Vec<String>, SheetError> {
        let extension = crate::jobs::workspace::extension_of(&path.to_string_lossy());
        if !is_workbook_extension(&extension) {
            return Err(SheetError::Unsupported(path.display().to_string()));
        }

        let workbook = open_workbook_auto(path).map_err(|e| SheetError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(workbook.sheet_names().to_vec())
    }
}

pub fn is_workbook_extension(extension: &str) -> bool {
    WORKBOOK_EXTENSIONS
        .iter()
        .any(|ext| ext.eq_ignore_ascii_case(extension))
}
