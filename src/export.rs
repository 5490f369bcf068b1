//! Shared export support: JSON and CSV, with stable field order and RFC 4180
//! quoting. Used by ConversationLog, ImmutableStore, VectorIndex and
//! FactStore.
//!
//! CSV quoting is implemented directly here rather than pulled in as a
//! dependency.

/// The two supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// A JSON array with stable per-entity field order (via `serde`'s
    /// struct field declaration order).
    Json,
    /// RFC 4180 CSV with a mandatory header row.
    Csv,
}

/// Quote a CSV field per RFC 4180: wrap in double quotes and escape
/// embedded quotes if the field contains a comma, quote, or newline.
pub fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_commas_and_quotes() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }
}
