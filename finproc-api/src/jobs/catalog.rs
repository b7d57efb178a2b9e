//! Static job-type descriptors
//!
//! Each finance endpoint is one `JobType` (or, for `gst-reconcile`, one
//! `JobType` per mode). A descriptor fixes the role vocabulary the
//! classifier works with, the counts and extensions the contract validator
//! enforces, and the argument template the invoker expands.

use serde::Serialize;

const SPREADSHEET: &[&str] = &["xlsx", "xls"];
const CSV_OR_SPREADSHEET: &[&str] = &["csv", "xlsx", "xls"];
const CSV_ONLY: &[&str] = &["csv"];
const PDF_ONLY: &[&str] = &["pdf"];

/// Form field carrying a worksheet selection
pub const SHEET_PARAM: &str = "sheetName";

/// Form field selecting a `gst-reconcile` variant
pub const MODE_PARAM: &str = "mode";

/// Format of the artifact written by the computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Csv,
    Xlsx,
}

impl ArtifactFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Csv => "text/csv",
            ArtifactFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Csv => "csv",
            ArtifactFormat::Xlsx => "xlsx",
        }
    }
}

/// Structural evidence that identifies a role from file content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Signature {
    /// Workbook contains a worksheet with exactly this name
    SheetNamed(&'static str),
}

/// One semantic slot in a job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleSpec {
    pub name: &'static str,
    /// Human description used in error messages
    pub label: &'static str,
    pub min: usize,
    /// `None` means unbounded
    pub max: Option<usize>,
    /// Accepted extensions, lowercase, without the dot
    pub extensions: &'static [&'static str],
    /// Case-insensitive filename substrings
    pub keywords: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl RoleSpec {
    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// Single-file roles are resolved by elimination; the rest collect files
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    pub fn describe_count(&self) -> String {
        describe_range(self.min, self.max)
    }
}

/// Render a count range the way error messages spell it
pub fn describe_range(min: usize, max: Option<usize>) -> String {
    match max {
        Some(max) if max == min => format!("exactly {}", min),
        Some(max) => format!("between {} and {}", min, max),
        None => format!("at least {}", min),
    }
}

/// Policy for uploads whose extension no role accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignFiles {
    /// Reject the request
    Reject,
    /// Drop the file before staging
    Skip,
}

/// Policy for compatible uploads left over once every role is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurplusFiles {
    /// Report them as extra files
    Reject,
    /// Fill single roles with the first compatible upload and ignore the rest
    Ignore,
}

/// How a missing optional parameter is filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamDefault {
    None,
    /// First worksheet of the file bound to `role`, else `fallback`
    FirstSheetOf {
        role: &'static str,
        fallback: &'static str,
    },
}

/// Scalar form field the job understands
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub default: ParamDefault,
}

/// One element of the argument template
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArgPart {
    Literal(&'static str),
    /// Every path bound to the role, in upload order
    Role(&'static str),
    /// The single bound file, or a directory holding copies of all of them
    InputPath(&'static str),
    /// Value of a resolved parameter
    Param(&'static str),
    /// `flag value` only when the parameter has a value
    OptionalParam {
        flag: &'static str,
        param: &'static str,
    },
    /// Absolute path of the output artifact
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InvocationTemplate {
    /// Script file name inside the configured scripts directory
    pub script: &'static str,
    pub args: &'static [ArgPart],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OutputSpec {
    /// File name inside the workspace
    pub file_name: &'static str,
    pub format: ArtifactFormat,
    /// Download name prefix; `{sheetName}` is replaced by the parameter
    pub download_prefix: &'static str,
}

/// Phrases the computation prints when there is nothing to report
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoFindingsSpec {
    pub markers: &'static [&'static str],
    pub message: &'static str,
}

/// Phrases that mean the computation refused every input
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RejectionSpec {
    pub markers: &'static [&'static str],
    pub message: &'static str,
}

/// Static descriptor of one finance job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobType {
    pub id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    pub title: &'static str,
    pub min_files: usize,
    pub max_files: Option<usize>,
    pub roles: &'static [RoleSpec],
    pub foreign_files: ForeignFiles,
    /// Allow binding leftover files by upload order
    pub positional_fallback: bool,
    pub surplus_files: SurplusFiles,
    pub params: &'static [ParamSpec],
    pub invocation: InvocationTemplate,
    pub output: OutputSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_findings: Option<NoFindingsSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionSpec>,
    /// Exposes `get-sheets` for worksheet selection
    pub sheet_listing: bool,
}

impl JobType {
    /// Stable label used in workspace names and logs
    pub fn slug(&self) -> String {
        match self.mode {
            Some(mode) => format!("{}-{}", self.id, mode),
            None => self.id.to_string(),
        }
    }

    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Every extension accepted by at least one role
    pub fn accepted_extensions(&self) -> Vec<&'static str> {
        let mut all: Vec<&'static str> = Vec::new();
        for role in self.roles {
            for ext in role.extensions {
                if !all.contains(ext) {
                    all.push(ext);
                }
            }
        }
        all
    }

    pub fn accepts_extension(&self, extension: &str) -> bool {
        self.roles.iter().any(|r| r.accepts_extension(extension))
    }

    pub fn describe_file_count(&self) -> String {
        describe_range(self.min_files, self.max_files)
    }
}

/// Lookup failures for an endpoint / mode pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    UnknownJob(String),
    InvalidMode {
        job: &'static str,
        valid: Vec<&'static str>,
    },
}

/// Every job known to the service
pub fn all() -> &'static [JobType] {
    CATALOG
}

/// First descriptor registered under `id`, whatever its mode
pub fn find(id: &str) -> Option<&'static JobType> {
    CATALOG.iter().find(|j| j.id == id)
}

/// Find the descriptor for an endpoint, using `mode` when the endpoint has variants
pub fn lookup(id: &str, mode: Option<&str>) -> Result<&'static JobType, LookupError> {
    let first = find(id).ok_or_else(|| LookupError::UnknownJob(id.to_string()))?;

    if first.mode.is_none() {
        return Ok(first);
    }

    let wanted = mode.map(|m| m.trim().to_ascii_lowercase()).unwrap_or_default();
    let variants = || CATALOG.iter().filter(move |j| j.id == id);
    variants()
        .find(|j| j.mode == Some(wanted.as_str()))
        .ok_or_else(|| LookupError::InvalidMode {
            job: first.id,
            valid: variants().filter_map(|j| j.mode).collect(),
        })
}

const OPTIONAL_SHEET: ParamSpec = ParamSpec {
    name: SHEET_PARAM,
    required: false,
    default: ParamDefault::None,
};

static CATALOG: &[JobType] = &[
    JobType {
        id: "gst-file-processing",
        mode: None,
        title: "GST file processing",
        min_files: 1,
        max_files: None,
        roles: &[RoleSpec {
            name: "inputs",
            label: "GST portal export",
            min: 1,
            max: None,
            extensions: CSV_OR_SPREADSHEET,
            keywords: &[],
            signature: None,
        }],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: false,
        surplus_files: SurplusFiles::Reject,
        params: &[OPTIONAL_SHEET],
        invocation: InvocationTemplate {
            script: "gst_file_processing.py",
            args: &[
                ArgPart::Literal("-i"),
                ArgPart::InputPath("inputs"),
                ArgPart::Literal("-o"),
                ArgPart::Output,
                ArgPart::OptionalParam {
                    flag: "-s",
                    param: SHEET_PARAM,
                },
            ],
        },
        output: OutputSpec {
            file_name: "cleaned_gst.csv",
            format: ArtifactFormat::Csv,
            download_prefix: "cleaned_gst",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "books-vs-gst-reconciliation",
        mode: None,
        title: "Books vs GST reconciliation",
        min_files: 2,
        max_files: Some(2),
        roles: &[
            RoleSpec {
                name: "gst",
                label: "GST portal Excel export (B2B sheet)",
                min: 1,
                max: Some(1),
                extensions: SPREADSHEET,
                keywords: &["gst", "gstr", "b2b"],
                signature: Some(Signature::SheetNamed("B2B")),
            },
            RoleSpec {
                name: "books",
                label: "bookkeeping export",
                min: 1,
                max: Some(1),
                extensions: CSV_OR_SPREADSHEET,
                keywords: &["book", "tally", "ledger"],
                signature: None,
            },
        ],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: true,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "combined_gst_book_reconcile.py",
            args: &[
                ArgPart::Literal("--gst-input"),
                ArgPart::Role("gst"),
                ArgPart::Literal("--books-input"),
                ArgPart::Role("books"),
                ArgPart::Literal("--output"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "books_vs_gst_reconciliation_output.csv",
            format: ArtifactFormat::Csv,
            download_prefix: "books_vs_gst_reconciliation",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "gst-reconcile",
        mode: Some("amazon"),
        title: "Amazon GST reconcile",
        min_files: 3,
        max_files: Some(3),
        roles: &[
            RoleSpec {
                name: "mtr",
                label: "MTR B2B report",
                min: 1,
                max: Some(1),
                extensions: CSV_OR_SPREADSHEET,
                keywords: &["mtr"],
                signature: None,
            },
            RoleSpec {
                name: "b2c",
                label: "B2C report",
                min: 1,
                max: Some(1),
                extensions: CSV_OR_SPREADSHEET,
                keywords: &["b2c"],
                signature: None,
            },
            RoleSpec {
                name: "stock",
                label: "stock transfer report",
                min: 1,
                max: Some(1),
                extensions: CSV_OR_SPREADSHEET,
                keywords: &["stock"],
                signature: None,
            },
        ],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: true,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "gst_reconcile.py",
            args: &[
                ArgPart::Literal("--mode"),
                ArgPart::Literal("amazon"),
                ArgPart::Literal("--output"),
                ArgPart::Output,
                ArgPart::Literal("--mtr"),
                ArgPart::Role("mtr"),
                ArgPart::Literal("--b2c"),
                ArgPart::Role("b2c"),
                ArgPart::Literal("--stock"),
                ArgPart::Role("stock"),
            ],
        },
        output: OutputSpec {
            file_name: "gst_amazon_output.csv",
            format: ArtifactFormat::Csv,
            download_prefix: "gst_amazon",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "gst-reconcile",
        mode: Some("retail"),
        title: "Retail GST reconcile",
        min_files: 2,
        max_files: Some(2),
        roles: &[
            RoleSpec {
                name: "invoice",
                label: "invoice register",
                min: 1,
                max: Some(1),
                extensions: CSV_OR_SPREADSHEET,
                keywords: &["invoice"],
                signature: None,
            },
            RoleSpec {
                name: "credit",
                label: "credit note register",
                min: 1,
                max: Some(1),
                extensions: CSV_OR_SPREADSHEET,
                keywords: &["credit"],
                signature: None,
            },
        ],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: true,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "gst_reconcile.py",
            args: &[
                ArgPart::Literal("--mode"),
                ArgPart::Literal("retail"),
                ArgPart::Literal("--output"),
                ArgPart::Output,
                ArgPart::Literal("--invoice"),
                ArgPart::Role("invoice"),
                ArgPart::Literal("--credit"),
                ArgPart::Role("credit"),
            ],
        },
        output: OutputSpec {
            file_name: "gst_retail_output.csv",
            format: ArtifactFormat::Csv,
            download_prefix: "gst_retail",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "gst-reconcile",
        mode: Some("jio"),
        title: "Jio GST reconcile",
        min_files: 1,
        max_files: Some(1),
        roles: &[RoleSpec {
            name: "jio",
            label: "Jio sales report",
            min: 1,
            max: Some(1),
            extensions: CSV_OR_SPREADSHEET,
            keywords: &["jio"],
            signature: None,
        }],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: true,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "gst_reconcile.py",
            args: &[
                ArgPart::Literal("--mode"),
                ArgPart::Literal("jio"),
                ArgPart::Literal("--output"),
                ArgPart::Output,
                ArgPart::Literal("--jio"),
                ArgPart::Role("jio"),
            ],
        },
        output: OutputSpec {
            file_name: "gst_jio_output.csv",
            format: ArtifactFormat::Csv,
            download_prefix: "gst_jio",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "gst-reconcile",
        mode: Some("merge"),
        title: "GST multi-file merge",
        min_files: 2,
        max_files: None,
        roles: &[RoleSpec {
            name: "files",
            label: "file to merge",
            min: 2,
            max: None,
            extensions: CSV_OR_SPREADSHEET,
            keywords: &[],
            signature: None,
        }],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: false,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "gst_reconcile.py",
            args: &[
                ArgPart::Literal("--mode"),
                ArgPart::Literal("merge"),
                ArgPart::Literal("--output"),
                ArgPart::Output,
                ArgPart::Literal("--files"),
                ArgPart::Role("files"),
            ],
        },
        output: OutputSpec {
            file_name: "gst_merge_output.csv",
            format: ArtifactFormat::Csv,
            download_prefix: "gst_merge",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "amazon-gst-process",
        mode: None,
        title: "GST file processing & merging",
        min_files: 1,
        max_files: None,
        roles: &[RoleSpec {
            name: "inputs",
            label: "GST return file",
            min: 1,
            max: None,
            extensions: CSV_OR_SPREADSHEET,
            keywords: &[],
            signature: None,
        }],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: false,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "process_gst_files.py",
            args: &[
                ArgPart::Literal("-i"),
                ArgPart::InputPath("inputs"),
                ArgPart::Literal("-o"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "GST_Combined.xlsx",
            format: ArtifactFormat::Xlsx,
            download_prefix: "amazon_gst_processed",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
    JobType {
        id: "amazon-missing-shipment",
        mode: None,
        title: "Amazon missing shipment",
        min_files: 2,
        max_files: None,
        roles: &[
            RoleSpec {
                name: "main_data",
                label: "main_data CSV export",
                min: 1,
                max: Some(1),
                extensions: CSV_ONLY,
                keywords: &["main_data", "main data", "maindata"],
                signature: None,
            },
            RoleSpec {
                name: "country",
                label: "country-specific Excel file",
                min: 1,
                max: Some(1),
                extensions: SPREADSHEET,
                keywords: &["country"],
                signature: None,
            },
        ],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: false,
        surplus_files: SurplusFiles::Ignore,
        params: &[ParamSpec {
            name: SHEET_PARAM,
            required: false,
            default: ParamDefault::FirstSheetOf {
                role: "country",
                fallback: "Sheet1",
            },
        }],
        invocation: InvocationTemplate {
            script: "find_missing_shipments.py",
            args: &[
                ArgPart::Literal("-m"),
                ArgPart::Role("main_data"),
                ArgPart::Literal("-c"),
                ArgPart::Role("country"),
                ArgPart::Literal("-s"),
                ArgPart::Param(SHEET_PARAM),
                ArgPart::Literal("-o"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "missing_shipments.xlsx",
            format: ArtifactFormat::Xlsx,
            download_prefix: "amazon_missing_shipments",
        },
        no_findings: Some(MISSING_SHIPMENT_NO_FINDINGS),
        rejection: None,
        sheet_listing: true,
    },
    JobType {
        id: "amazon-shipping-queue",
        mode: None,
        title: "Amazon shipping queue",
        min_files: 2,
        max_files: Some(2),
        roles: &[
            RoleSpec {
                name: "main_data",
                label: "main_data CSV export",
                min: 1,
                max: Some(1),
                extensions: CSV_ONLY,
                keywords: &["main_data", "main data", "maindata"],
                signature: None,
            },
            RoleSpec {
                name: "country",
                label: "country-specific Excel file",
                min: 1,
                max: Some(1),
                extensions: SPREADSHEET,
                keywords: &["country"],
                signature: None,
            },
        ],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: false,
        surplus_files: SurplusFiles::Reject,
        params: &[ParamSpec {
            name: SHEET_PARAM,
            required: true,
            default: ParamDefault::None,
        }],
        invocation: InvocationTemplate {
            script: "find_missing_shipments.py",
            args: &[
                ArgPart::Literal("-m"),
                ArgPart::Role("main_data"),
                ArgPart::Literal("-c"),
                ArgPart::Role("country"),
                ArgPart::Literal("-s"),
                ArgPart::Param(SHEET_PARAM),
                ArgPart::Literal("-o"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "missing_shipments.xlsx",
            format: ArtifactFormat::Xlsx,
            download_prefix: "missing_shipments_{sheetName}",
        },
        no_findings: Some(MISSING_SHIPMENT_NO_FINDINGS),
        rejection: None,
        sheet_listing: true,
    },
    JobType {
        id: "amazon-tax-invoice",
        mode: None,
        title: "Amazon tax invoice extraction",
        min_files: 1,
        max_files: None,
        roles: &[RoleSpec {
            name: "invoices",
            label: "tax invoice PDF",
            min: 1,
            max: None,
            extensions: PDF_ONLY,
            keywords: &[],
            signature: None,
        }],
        foreign_files: ForeignFiles::Skip,
        positional_fallback: false,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "amazon_tax_invoice_extractor.py",
            args: &[
                ArgPart::Literal("-i"),
                ArgPart::InputPath("invoices"),
                ArgPart::Literal("-o"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "output.xlsx",
            format: ArtifactFormat::Xlsx,
            download_prefix: "amazon_tax_invoices",
        },
        no_findings: None,
        rejection: Some(ALL_EXCLUDED),
        sheet_listing: false,
    },
    JobType {
        id: "amazon-credit-note",
        mode: None,
        title: "Amazon credit note extraction",
        min_files: 1,
        max_files: None,
        roles: &[RoleSpec {
            name: "credit_notes",
            label: "credit note PDF",
            min: 1,
            max: None,
            extensions: PDF_ONLY,
            keywords: &[],
            signature: None,
        }],
        foreign_files: ForeignFiles::Skip,
        positional_fallback: false,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "amazon_credit_note_extractor.py",
            args: &[
                ArgPart::Literal("-i"),
                ArgPart::InputPath("credit_notes"),
                ArgPart::Literal("-o"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "output.xlsx",
            format: ArtifactFormat::Xlsx,
            download_prefix: "amazon_credit_notes",
        },
        no_findings: None,
        rejection: Some(ALL_EXCLUDED),
        sheet_listing: false,
    },
    JobType {
        id: "meir",
        mode: None,
        title: "Month end inventory reconciliation",
        min_files: 7,
        max_files: Some(7),
        roles: &[
            meir_role("india_platform", "India platform inventory", &["india"]),
            meir_role("usa_platform", "USA platform inventory", &["usa"]),
            meir_role("three_g", "3G warehouse inventory", &["3g", "three_g", "threeg"]),
            meir_role("shipcube", "Shipcube inventory", &["shipcube"]),
            meir_role("updike", "Updike inventory", &["updike"]),
            meir_role("amazon", "Amazon inventory", &["amazon"]),
            meir_role("container", "container data", &["container"]),
        ],
        foreign_files: ForeignFiles::Reject,
        positional_fallback: true,
        surplus_files: SurplusFiles::Reject,
        params: &[],
        invocation: InvocationTemplate {
            script: "MEIR.py",
            args: &[
                ArgPart::Literal("--india-platform"),
                ArgPart::Role("india_platform"),
                ArgPart::Literal("--usa-platform"),
                ArgPart::Role("usa_platform"),
                ArgPart::Literal("--three-g"),
                ArgPart::Role("three_g"),
                ArgPart::Literal("--shipcube"),
                ArgPart::Role("shipcube"),
                ArgPart::Literal("--updike"),
                ArgPart::Role("updike"),
                ArgPart::Literal("--amazon"),
                ArgPart::Role("amazon"),
                ArgPart::Literal("--container"),
                ArgPart::Role("container"),
                ArgPart::Literal("--output"),
                ArgPart::Output,
            ],
        },
        output: OutputSpec {
            file_name: "MEIR_Output.xlsx",
            format: ArtifactFormat::Xlsx,
            download_prefix: "MEIR_Output",
        },
        no_findings: None,
        rejection: None,
        sheet_listing: false,
    },
];

const fn meir_role(
    name: &'static str,
    label: &'static str,
    keywords: &'static [&'static str],
) -> RoleSpec {
    RoleSpec {
        name,
        label,
        min: 1,
        max: Some(1),
        extensions: SPREADSHEET,
        keywords,
        signature: None,
    }
}

const MISSING_SHIPMENT_NO_FINDINGS: NoFindingsSpec = NoFindingsSpec {
    markers: &[
        "No missing Shipment IDs found",
        "No missing shipments found",
        "No missing Shipment IDs or status changes found",
        "All Shipment IDs from main_data are present",
    ],
    message: "No missing Shipment IDs found. All Shipment IDs from main_data exist in country file.",
};

const ALL_EXCLUDED: RejectionSpec = RejectionSpec {
    markers: &["excluded"],
    message: "All files were excluded. Please check the files and try again.",
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_plain_job_ignores_mode() {
        let job = lookup("meir", Some("whatever")).unwrap();
        assert_eq!(job.id, "meir");
        assert_eq!(job.roles.len(), 7);
    }

    #[test]
    fn test_lookup_mode_is_case_insensitive() {
        let job = lookup("gst-reconcile", Some(" Amazon ")).unwrap();
        assert_eq!(job.mode, Some("amazon"));
        assert_eq!(job.slug(), "gst-reconcile-amazon");
    }

    #[test]
    fn test_lookup_missing_mode_lists_valid_modes() {
        match lookup("gst-reconcile", None) {
            Err(LookupError::InvalidMode { job, valid }) => {
                assert_eq!(job, "gst-reconcile");
                assert_eq!(valid, vec!["amazon", "retail", "jio", "merge"]);
            }
            other => panic!("expected InvalidMode, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_unknown_job() {
        assert_eq!(
            lookup("payroll", None),
            Err(LookupError::UnknownJob("payroll".to_string()))
        );
    }

    #[test]
    fn test_every_template_role_exists() {
        for job in all() {
            for part in job.invocation.args {
                let role = match part {
                    ArgPart::Role(role) | ArgPart::InputPath(role) => role,
                    _ => continue,
                };
                assert!(job.role(role).is_some(), "{}: unknown role {}", job.slug(), role);
            }
            for param in job.params {
                if let ParamDefault::FirstSheetOf { role, .. } = param.default {
                    assert!(job.role(role).is_some(), "{}: unknown role {}", job.slug(), role);
                }
            }
        }
    }

    #[test]
    fn test_role_counts_fit_file_counts() {
        for job in all() {
            let role_min: usize = job.roles.iter().map(|r| r.min).sum();
            assert!(role_min >= job.min_files, "{}: file minimum unreachable", job.slug());
            if let Some(max) = job.max_files {
                assert!(role_min <= max, "{}: roles need more files than allowed", job.slug());
            }
        }
    }

    #[test]
    fn test_every_path_follows_a_flag() {
        for job in all() {
            let args = job.invocation.args;
            for (i, part) in args.iter().enumerate() {
                let needs_flag = matches!(
                    part,
                    ArgPart::Role(_) | ArgPart::InputPath(_) | ArgPart::Param(_) | ArgPart::Output
                );
                if needs_flag {
                    assert!(
                        i > 0 && matches!(args[i - 1], ArgPart::Literal(_)),
                        "{}: argument {} has no flag",
                        job.slug(),
                        i
                    );
                }
            }
        }
    }

    #[test]
    fn test_missing_shipment_ignores_surplus_files() {
        let job = lookup("amazon-missing-shipment", None).unwrap();
        assert_eq!(job.surplus_files, SurplusFiles::Ignore);
        assert_eq!(job.max_files, None);
        let queue = lookup("amazon-shipping-queue", None).unwrap();
        assert_eq!(queue.surplus_files, SurplusFiles::Reject);
    }

    #[test]
    fn test_describe_range() {
        assert_eq!(describe_range(2, Some(2)), "exactly 2");
        assert_eq!(describe_range(1, None), "at least 1");
        assert_eq!(describe_range(1, Some(3)), "between 1 and 3");
    }

    #[test]
    fn test_artifact_format_types() {
        assert_eq!(ArtifactFormat::Csv.mime_type(), "text/csv");
        assert_eq!(ArtifactFormat::Xlsx.extension(), "xlsx");
    }
}
