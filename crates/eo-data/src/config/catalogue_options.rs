//! Parsing options for catalogue CSV files

use serde::{Deserialize, Serialize};

/// How catalogue CSV cells are read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogueCsvOptions {
    /// Field delimiter
    pub delimiter: char,

    /// Cell contents treated as missing
    pub missing_patterns: Vec<String>,

    /// Whether to trim whitespace before checking
    pub trim_whitespace: bool,

    /// Case sensitive matching of missing patterns
    pub case_sensitive: bool,
}

impl Default for CatalogueCsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            missing_patterns: vec![
                String::new(),
                "-".to_string(),
                "N/A".to_string(),
                "null".to_string(),
                "None".to_string(),
            ],
            trim_whitespace: true,
            case_sensitive: false,
        }
    }
}

impl CatalogueCsvOptions {
    /// Check if a cell holds no value
    pub fn is_missing(&self, value: &str) -> bool {
        let value = if self.trim_whitespace { value.trim() } else { value };

        self.missing_patterns.iter().any(|pattern| {
            if self.case_sensitive {
                value == pattern
            } else {
                value.eq_ignore_ascii_case(pattern)
            }
        })
    }

    /// Cell content, `None` when missing
    pub fn cell<'a>(&self, value: &'a str) -> Option<&'a str> {
        if self.is_missing(value) {
            None
        } else if self.trim_whitespace {
            Some(value.trim())
        } else {
            Some(value)
        }
    }

    pub(crate) fn delimiter_byte(&self) -> u8 {
        if self.delimiter.is_ascii() {
            self.delimiter as u8
        } else {
            b','
        }
    }
}
