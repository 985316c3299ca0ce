//! Loading product catalogues from CSV files
//!
//! The header must start with `start`; `end` and `count` columns are
//! optional and every other column becomes an entry attribute.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use eo_core::domain::parse_instant;
use tracing::info;

use super::catalogue::{CatalogueEntry, ProductCatalogue};
use crate::config::CatalogueCsvOptions;
use crate::DataError;

const START_COLUMN: &str = "start";
const END_COLUMN: &str = "end";
const COUNT_COLUMN: &str = "count";

impl ProductCatalogue {
    /// Load a catalogue from a CSV file
    pub fn from_csv(path: impl AsRef<Path>, options: &CatalogueCsvOptions) -> Result<Self, DataError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let catalogue = Self::from_reader(BufReader::new(file), options)?;
        info!("Loaded {} catalogue entries from {}", catalogue.len(), path.display());
        Ok(catalogue)
    }

    /// Load a catalogue on the blocking pool
    pub async fn open(path: PathBuf, options: CatalogueCsvOptions) -> Result<Self, DataError> {
        tokio::task::spawn_blocking(move || Self::from_csv(&path, &options)).await?
    }

    pub fn from_reader<R: Read>(reader: R, options: &CatalogueCsvOptions) -> Result<Self, DataError> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(options.delimiter_byte())
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

        let start_idx = column(START_COLUMN)
            .ok_or_else(|| DataError::Csv(format!("missing '{}' column", START_COLUMN)))?;
        let end_idx = column(END_COLUMN);
        let count_idx = column(COUNT_COLUMN);

        let attribute_columns: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != start_idx && Some(*idx) != end_idx && Some(*idx) != count_idx)
            .map(|(idx, name)| (idx, name.to_string()))
            .collect();

        let mut entries = Vec::new();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let row = row + 2;
            let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).and_then(|v| options.cell(v));

            let start = cell(Some(start_idx))
                .ok_or_else(|| DataError::InvalidRow {
                    row,
                    message: "missing start".to_string(),
                })
                .and_then(|s| {
                    parse_instant(s).map_err(|e| DataError::InvalidRow {
                        row,
                        message: e.to_string(),
                    })
                })?;

            let mut entry = CatalogueEntry::new(start);

            if let Some(end) = cell(end_idx) {
                let end = parse_instant(end).map_err(|e| DataError::InvalidRow {
                    row,
                    message: e.to_string(),
                })?;
                if end < start {
                    return Err(DataError::InvalidRow {
                        row,
                        message: "end before start".to_string(),
                    });
                }
                entry = entry.with_end(end);
            }

            if let Some(count) = cell(count_idx) {
                let count = count.parse::<u64>().map_err(|e| DataError::InvalidRow {
                    row,
                    message: format!("invalid count '{}': {}", count, e),
                })?;
                entry = entry.with_count(count);
            }

            for (idx, name) in &attribute_columns {
                if let Some(value) = cell(Some(*idx)) {
                    entry = entry.with_attribute(name.clone(), value);
                }
            }

            entries.push(entry);
        }

        Ok(Self::new(entries))
    }
}
