//! # Format Adapters
//!
//! Per-format metadata for the awk and sort backends: the `-F` field
//! separator, the header preamble executed on the first record, and the
//! translation from a [`ColumnRef`] to an awk field reference.
//!
//! JSON never reaches an adapter — the jq backend owns that format
//! end to end.

use crate::codegen::quote::escape_awk_string;
use crate::error::{SparkError, SparkResult};
use crate::plan::{ColumnRef, Format, PlanNode};

/// awk code that indexes header names on the first row and skips it.
const CSV_HEADER_PREAMBLE: &str = "NR==1{for(i=1;i<=NF;i++)h[$i]=i; next}";

/// Format-specific code generation hooks.
pub trait FormatAdapter {
    /// The awk `-F` value; `None` means default whitespace splitting.
    fn field_separator(&self) -> Option<&str>;

    /// awk code run once for the header row, if the format has one.
    fn header_preamble(&self) -> Option<&'static str>;

    /// Translate a column reference into an awk field expression.
    fn field_ref(&self, column: &ColumnRef) -> SparkResult<String>;

    /// Whether the input carries a header row.
    fn has_header(&self) -> bool;
}

/// Plain text: whitespace fields, positional access only.
pub struct TextFormat;

impl FormatAdapter for TextFormat {
    fn field_separator(&self) -> Option<&str> {
        None
    }

    fn header_preamble(&self) -> Option<&'static str> {
        None
    }

    fn field_ref(&self, column: &ColumnRef) -> SparkResult<String> {
        match column {
            ColumnRef::Index(i) => Ok(format!("${i}")),
            ColumnRef::Name(name) => Err(SparkError::ColumnResolution {
                column: name.clone(),
                reason: "text input has no headers; use a 1-based column index".to_string(),
            }),
        }
    }

    fn has_header(&self) -> bool {
        false
    }
}

/// Delimited records, optionally with a header row mapping names to
/// positions.
pub struct CsvFormat {
    delimiter: String,
    header: bool,
}

impl CsvFormat {
    pub fn new(delimiter: &str, header: bool) -> Self {
        CsvFormat {
            delimiter: delimiter.to_string(),
            header,
        }
    }
}

impl FormatAdapter for CsvFormat {
    fn field_separator(&self) -> Option<&str> {
        Some(&self.delimiter)
    }

    fn header_preamble(&self) -> Option<&'static str> {
        self.header.then_some(CSV_HEADER_PREAMBLE)
    }

    fn field_ref(&self, column: &ColumnRef) -> SparkResult<String> {
        match column {
            ColumnRef::Index(i) => Ok(format!("${i}")),
            ColumnRef::Name(name) => {
                if !self.header {
                    return Err(SparkError::ColumnResolution {
                        column: name.clone(),
                        reason: "input has no header row; use a 1-based column index"
                            .to_string(),
                    });
                }
                Ok(format!("$h[\"{}\"]", escape_awk_string(name)))
            }
        }
    }

    fn has_header(&self) -> bool {
        self.header
    }
}

/// Pick the adapter for a fused subtree from its `Parse` node, if any;
/// a parse-less subtree falls back to plain text.
pub fn adapter_for(plan: &PlanNode) -> Box<dyn FormatAdapter> {
    match plan.find_parse() {
        Some(PlanNode::Parse {
            format: Format::Csv,
            delimiter,
            has_header,
            ..
        }) => Box::new(CsvFormat::new(delimiter, *has_header)),
        _ => Box::new(TextFormat),
    }
}

/// The delimiter a fused subtree's output records use: the parse
/// delimiter for delimited input, a single space otherwise.
pub fn output_delimiter(plan: &PlanNode) -> String {
    match plan.find_parse() {
        Some(PlanNode::Parse {
            format: Format::Csv,
            delimiter,
            ..
        }) => delimiter.clone(),
        _ => " ".to_string(),
    }
}
