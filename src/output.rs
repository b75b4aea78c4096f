//! CSV value formatting for the batch output.

/// Renders a number with `decimal` in place of the decimal point.
/// Missing values become empty cells.
pub fn format_decimal(value: Option<f64>, decimal: &str) -> String {
    match value {
        Some(v) => v.to_string().replace('.', decimal),
        None => String::new(),
    }
}

/// True when `value` is already wrapped in double quotes.
pub fn is_quoted(value: &str) -> bool {
    value.len() >= 2 && value.starts_with('"') && value.ends_with('"')
}

/// Wraps `value` in double quotes unless it already is.
pub fn quote(value: &str) -> String {
    if is_quoted(value) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "\"\""))
    }
}

/// Formats rows for one output stream.
#[derive(Debug, Clone)]
pub struct RowFormatter {
    pub separator: String,
    pub decimal: String,
    /// Quote every non-empty value, not only the ones that need it.
    pub quote_all: bool,
}

impl RowFormatter {
    pub fn new(separator: impl Into<String>, decimal: impl Into<String>, quote_all: bool) -> Self {
        Self {
            separator: separator.into(),
            decimal: decimal.into(),
            quote_all,
        }
    }

    pub fn decimal(&self, value: Option<f64>) -> String {
        format_decimal(value, &self.decimal)
    }

    pub fn header(&self, columns: &[&str]) -> String {
        columns.join(&self.separator)
    }

    pub fn row<S: AsRef<str>>(&self, values: &[S]) -> String {
        values
            .iter()
            .map(|v| self.cell(v.as_ref()))
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    fn cell(&self, value: &str) -> String {
        if value.is_empty() {
            return String::new();
        }
        let needs_quotes = (!self.separator.is_empty() && value.contains(self.separator.as_str()))
            || value.contains('\n');
        if self.quote_all || (needs_quotes && !is_quoted(value)) {
            quote(value)
        } else {
            value.to_string()
        }
    }
}
