//! Job contract validation
//!
//! Two checks guard the computation. `precheck` runs on the raw uploads
//! before anything touches disk: file count, extensions, and whether each
//! required role could be filled at all. `validate` runs on the role
//! assignment. Both report every violation at once.

use serde::Serialize;
use std::fmt;
use tracing::info;

use super::catalog::{ForeignFiles, JobType, SurplusFiles};
use super::classifier::RoleAssignment;
use super::workspace::{sanitize_file_name, UploadSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRole {
    pub role: &'static str,
    pub label: &'static str,
    pub extensions: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    /// `None` for the whole upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub expected: String,
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionMismatch {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub extension: String,
    pub allowed: Vec<&'static str>,
}

/// Every way an upload failed to satisfy a job contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractError {
    pub missing_roles: Vec<MissingRole>,
    pub extra_files: Vec<String>,
    pub count_mismatches: Vec<CountMismatch>,
    pub extension_mismatches: Vec<ExtensionMismatch>,
}

impl ContractError {
    pub fn is_empty(&self) -> bool {
        self.missing_roles.is_empty()
            && self.extra_files.is_empty()
            && self.count_mismatches.is_empty()
            && self.extension_mismatches.is_empty()
    }

    /// Every upload was dropped by `filter_foreign`
    pub fn all_skipped(skipped: &[String], job: &JobType) -> Self {
        let mut error = Self::default();
        error.count_mismatches.push(CountMismatch {
            role: None,
            expected: job.describe_file_count(),
            actual: 0,
        });
        for (index, name) in skipped.iter().enumerate() {
            let file = sanitize_file_name(name, index);
            error.extension_mismatches.push(ExtensionMismatch {
                extension: super::workspace::extension_of(&file),
                file,
                role: None,
                allowed: job.accepted_extensions(),
            });
        }
        error
    }

    fn into_result(self) -> Result<(), ContractError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();

        for count in &self.count_mismatches {
            parts.push(match count.role {
                Some(role) => format!(
                    "role '{}' needs {} file(s), got {}",
                    role, count.expected, count.actual
                ),
                None if count.actual == 0 && self.extension_mismatches.is_empty() => {
                    "No files uploaded".to_string()
                }
                None if count.actual == 0 => "No usable files uploaded".to_string(),
                None => format!(
                    "expected {} file(s), got {}",
                    count.expected, count.actual
                ),
            });
        }
        for missing in &self.missing_roles {
            parts.push(format!(
                "missing {} for role '{}' ({})",
                missing.label,
                missing.role,
                dotted(&missing.extensions)
            ));
        }
        for ext in &self.extension_mismatches {
            let got = if ext.extension.is_empty() {
                "no extension".to_string()
            } else {
                format!(".{}", ext.extension)
            };
            parts.push(match ext.role {
                Some(role) => format!(
                    "file '{}' has {} but role '{}' needs {}",
                    ext.file,
                    got,
                    role,
                    dotted(&ext.allowed)
                ),
                None => format!(
                    "file '{}' has {}; accepted: {}",
                    ext.file,
                    got,
                    dotted(&ext.allowed)
                ),
            });
        }
        if !self.extra_files.is_empty() {
            parts.push(format!(
                "could not match file(s) to a role: {}",
                self.extra_files.join(", ")
            ));
        }

        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ContractError {}

fn dotted(extensions: &[&str]) -> String {
    extensions
        .iter()
        .map(|e| format!(".{}", e))
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop uploads no role accepts, for jobs that tolerate them
///
/// Returns the kept uploads and the names of the skipped ones.
pub fn filter_foreign(uploads: UploadSet, job: &JobType) -> (UploadSet, Vec<String>) {
    if job.foreign_files != ForeignFiles::Skip {
        return (uploads, Vec::new());
    }

    let (kept, skipped): (Vec<_>, Vec<_>) = uploads
        .uploads
        .into_iter()
        .partition(|u| job.accepts_extension(&u.extension()));
    let skipped: Vec<String> = skipped.into_iter().map(|u| u.original_name).collect();
    if !skipped.is_empty() {
        info!(
            "{}: skipping {} unsupported file(s): {}",
            job.slug(),
            skipped.len(),
            skipped.join(", ")
        );
    }
    (UploadSet::new(kept), skipped)
}

/// Check counts and extensions before staging
pub fn precheck(uploads: &UploadSet, job: &JobType) -> Result<(), ContractError> {
    let mut error = ContractError::default();
    let count = uploads.len();

    let too_few = count < job.min_files;
    let too_many = job.max_files.map_or(false, |max| count > max);
    if too_few || too_many {
        error.count_mismatches.push(CountMismatch {
            role: None,
            expected: job.describe_file_count(),
            actual: count,
        });
    }

    let extensions: Vec<String> = uploads.uploads.iter().map(|u| u.extension()).collect();

    if job.foreign_files == ForeignFiles::Reject {
        for (index, (upload, extension)) in uploads.uploads.iter().zip(&extensions).enumerate() {
            if !job.accepts_extension(extension) {
                error.extension_mismatches.push(ExtensionMismatch {
                    file: sanitize_file_name(&upload.original_name, index),
                    role: None,
                    extension: extension.clone(),
                    allowed: job.accepted_extensions(),
                });
            }
        }
    }

    // A role no upload could ever satisfy is missing regardless of names
    if count > 0 {
        for role in job.roles {
            let compatible = extensions
                .iter()
                .filter(|e| role.accepts_extension(e))
                .count();
            if role.min > 0 && compatible < role.min {
                error.missing_roles.push(MissingRole {
                    role: role.name,
                    label: role.label,
                    extensions: role.extensions.to_vec(),
                });
            }
        }
    }

    error.into_result()
}

/// Check that the assignment fills every role correctly
pub fn validate(assignment: &RoleAssignment, job: &JobType) -> Result<(), ContractError> {
    let mut error = ContractError::default();

    for role in job.roles {
        let count = assignment.count_for(role.name);
        if count == 0 && role.min > 0 {
            error.missing_roles.push(MissingRole {
                role: role.name,
                label: role.label,
                extensions: role.extensions.to_vec(),
            });
        } else if count < role.min || role.max.map_or(false, |max| count > max) {
            error.count_mismatches.push(CountMismatch {
                role: Some(role.name),
                expected: role.describe_count(),
                actual: count,
            });
        }
    }

    for binding in &assignment.bindings {
        let role = match job.role(binding.role) {
            Some(role) => role,
            None => continue,
        };
        if !role.accepts_extension(&binding.file.extension) {
            error.extension_mismatches.push(ExtensionMismatch {
                file: binding.file.sanitized_name.clone(),
                role: Some(role.name),
                extension: binding.file.extension.clone(),
                allowed: role.extensions.to_vec(),
            });
        }
    }

    let leftovers: Vec<String> = assignment
        .unassigned
        .iter()
        .map(|f| f.sanitized_name.clone())
        .collect();
    match job.surplus_files {
        SurplusFiles::Reject => error.extra_files = leftovers,
        SurplusFiles::Ignore if !leftovers.is_empty() => info!(
            "{}: ignoring {} surplus file(s): {}",
            job.slug(),
            leftovers.len(),
            leftovers.join(", ")
        ),
        SurplusFiles::Ignore => {}
    }

    error.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::catalog;
    use crate::jobs::classifier::tests::{staged, TableInspector};
    use crate::jobs::classifier::{classify, ClassifyHints, Evidence, RoleBinding};
    use crate::jobs::workspace::Upload;

    fn uploads(names: &[&str]) -> UploadSet {
        UploadSet::new(names.iter().map(|n| Upload::new(*n, b"x".to_vec())).collect())
    }

    #[test]
    fn test_precheck_count_mismatch() {
        let job = catalog::lookup("amazon-shipping-queue", None).unwrap();
        let err = precheck(&uploads(&["main_data.csv"]), job).unwrap_err();

        assert_eq!(err.count_mismatches.len(), 1);
        assert_eq!(err.count_mismatches[0].expected, "exactly 2");
        assert_eq!(err.count_mismatches[0].actual, 1);
        // The country workbook is missing as well
        assert_eq!(err.missing_roles[0].role, "country");
    }

    #[test]
    fn test_precheck_two_spreadsheets_without_csv() {
        let job = catalog::lookup("amazon-missing-shipment", None).unwrap();
        let err = precheck(&uploads(&["a.xlsx", "b.xlsx"]), job).unwrap_err();

        assert!(err.count_mismatches.is_empty());
        assert_eq!(err.missing_roles.len(), 1);
        assert_eq!(err.missing_roles[0].role, "main_data");
        assert_eq!(err.missing_roles[0].extensions, vec!["csv"]);
        assert!(err.to_string().contains("main_data"));
    }

    #[test]
    fn test_precheck_rejects_foreign_extension() {
        let job = catalog::lookup("books-vs-gst-reconciliation", None).unwrap();
        let err = precheck(&uploads(&["gst.xlsx", "books.txt"]), job).unwrap_err();

        assert_eq!(err.extension_mismatches.len(), 1);
        assert_eq!(err.extension_mismatches[0].file, "books.txt");
        assert_eq!(err.extension_mismatches[0].extension, "txt");
    }

    #[test]
    fn test_precheck_empty_upload() {
        let job = catalog::lookup("amazon-gst-process", None).unwrap();
        let err = precheck(&UploadSet::default(), job).unwrap_err();
        assert_eq!(err.count_mismatches[0].actual, 0);
        assert_eq!(err.to_string(), "No files uploaded");
    }

    #[test]
    fn test_precheck_accepts_valid_upload() {
        let job = catalog::lookup("gst-reconcile", Some("amazon")).unwrap();
        assert!(precheck(&uploads(&["mtr.csv", "b2c.csv", "stock.xlsx"]), job).is_ok());
    }

    #[test]
    fn test_filter_foreign_skips_non_pdfs() {
        let job = catalog::lookup("amazon-tax-invoice", None).unwrap();
        let (kept, skipped) = filter_foreign(uploads(&["a.pdf", "notes.txt", "B.PDF"]), job);
        assert_eq!(kept.names(), vec!["a.pdf", "B.PDF"]);
        assert_eq!(skipped, vec!["notes.txt"]);
    }

    #[test]
    fn test_all_skipped_explains_each_file() {
        let job = catalog::lookup("amazon-credit-note", None).unwrap();
        let err = ContractError::all_skipped(&["notes.txt".to_string()], job);
        assert_eq!(
            err.to_string(),
            "No usable files uploaded; file 'notes.txt' has .txt; accepted: .pdf"
        );
    }

    #[test]
    fn test_filter_foreign_keeps_everything_for_strict_jobs() {
        let job = catalog::lookup("meir", None).unwrap();
        let (kept, skipped) = filter_foreign(uploads(&["a.xlsx", "notes.txt"]), job);
        assert_eq!(kept.len(), 2);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_validate_complete_assignment() {
        let job = catalog::lookup("gst-reconcile", Some("retail")).unwrap();
        let files = staged(&["invoice.csv", "credit.csv"]);
        let assignment = classify(&files, job, &ClassifyHints::default(), &TableInspector::default());
        assert!(validate(&assignment, job).is_ok());
    }

    #[test]
    fn test_validate_reports_everything() {
        let job = catalog::lookup("amazon-shipping-queue", None).unwrap();
        let files = staged(&["a.xlsx", "b.txt"]);
        let assignment = RoleAssignment {
            bindings: vec![RoleBinding {
                role: "country",
                file: files[1].clone(),
                evidence: Evidence::Hint,
            }],
            unassigned: vec![files[0].clone()],
        };

        let err = validate(&assignment, job).unwrap_err();
        assert_eq!(err.missing_roles.len(), 1);
        assert_eq!(err.missing_roles[0].role, "main_data");
        assert_eq!(err.extension_mismatches.len(), 1);
        assert_eq!(err.extension_mismatches[0].role, Some("country"));
        assert_eq!(err.extra_files, vec!["a.xlsx"]);
    }

    #[test]
    fn test_validate_ignores_surplus_for_missing_shipment() {
        let job = catalog::lookup("amazon-missing-shipment", None).unwrap();
        let files = staged(&["main_data.csv", "country.xlsx", "main_data_old.csv"]);
        let assignment = classify(&files, job, &ClassifyHints::default(), &TableInspector::default());

        assert_eq!(assignment.unassigned.len(), 1);
        assert!(validate(&assignment, job).is_ok());
    }

    #[test]
    fn test_validate_role_count_mismatch() {
        let job = catalog::lookup("gst-reconcile", Some("merge")).unwrap();
        let files = staged(&["only.csv"]);
        let assignment = classify(&files, job, &ClassifyHints::default(), &TableInspector::default());

        let err = validate(&assignment, job).unwrap_err();
        assert_eq!(err.count_mismatches.len(), 1);
        assert_eq!(err.count_mismatches[0].role, Some("files"));
        assert_eq!(err.count_mismatches[0].expected, "at least 2");
    }
}
