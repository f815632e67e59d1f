use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::Serialize;

use crate::error::MasstError;
use crate::fs_util::ensure_parent;

/// `.tsv` files are tab separated, everything else is read as CSV.
pub fn delimiter_for(path: &Utf8Path) -> u8 {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    }
}

/// A string table with trimmed cells, loaded whole into memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub path: Utf8PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Utf8Path) -> Result<Self, MasstError> {
        Self::read_with_delimiter(path, delimiter_for(path))
    }

    pub fn read_with_delimiter(path: &Utf8Path, delimiter: u8) -> Result<Self, MasstError> {
        let table_err = |message: String| MasstError::TableRead {
            path: path.to_string(),
            message,
        };
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_path(path.as_std_path())
            .map_err(|err| table_err(err.to_string()))?;
        let headers = reader
            .headers()
            .map_err(|err| table_err(err.to_string()))?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| table_err(err.to_string()))?;
            let mut row = record.iter().map(str::to_string).collect::<Vec<_>>();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, MasstError> {
        self.column(name).ok_or_else(|| MasstError::MissingColumn {
            path: self.path.to_string(),
            column: name.to_string(),
        })
    }
}

pub fn write_rows<H, R, C>(path: &Utf8Path, headers: &[H], rows: R) -> Result<(), MasstError>
where
    H: AsRef<str>,
    R: IntoIterator,
    R::Item: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    let table_err = |message: String| MasstError::TableWrite {
        path: path.to_string(),
        message,
    };
    ensure_parent(path)?;
    let file = File::create(path.as_std_path()).map_err(|err| table_err(err.to_string()))?;
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_writer(file);
    writer
        .write_record(headers.iter().map(|header| header.as_ref()))
        .map_err(|err| table_err(err.to_string()))?;
    for row in rows {
        writer
            .write_record(row.into_iter().map(|cell| cell.as_ref().to_string()))
            .map_err(|err| table_err(err.to_string()))?;
    }
    writer.flush().map_err(|err| table_err(err.to_string()))?;
    Ok(())
}

/// Serialize records with their serde field names as header. An empty slice
/// still produces the header line from `headers`.
pub fn write_records<T: Serialize>(
    path: &Utf8Path,
    headers: &[&str],
    records: &[T],
) -> Result<(), MasstError> {
    if records.is_empty() {
        return write_rows(path, headers, std::iter::empty::<Vec<String>>());
    }
    let table_err = |message: String| MasstError::TableWrite {
        path: path.to_string(),
        message,
    };
    ensure_parent(path)?;
    let file = File::create(path.as_std_path()).map_err(|err| table_err(err.to_string()))?;
    let mut writer = WriterBuilder::new()
        .delimiter(delimiter_for(path))
        .from_writer(file);
    for record in records {
        writer
            .serialize(record)
            .map_err(|err| table_err(err.to_string()))?;
    }
    writer.flush().map_err(|err| table_err(err.to_string()))?;
    Ok(())
}
