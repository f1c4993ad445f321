//! Parquet row decoding by column name
//!
//! Datasets are written by pandas, so integer widths and list encodings vary
//! between files. Columns are looked up by name and coerced here; columns a
//! decoder does not ask for (e.g. `__index_level_0__`) are ignored.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row};
use tracing::info;

use crate::error::{ExplorerError, Result};
use crate::records::parse_letter;

/// Column-name view over one parquet record.
pub struct ColumnarRow<'a> {
    dataset: &'a str,
    fields: HashMap<&'a str, &'a Field>,
}

impl<'a> ColumnarRow<'a> {
    pub fn new(dataset: &'a str, row: &'a Row) -> Self {
        let fields = row
            .get_column_iter()
            .map(|(name, field)| (name.as_str(), field))
            .collect();
        Self { dataset, fields }
    }

    fn field(&self, column: &str) -> Result<&'a Field> {
        self.fields
            .get(column)
            .copied()
            .ok_or_else(|| ExplorerError::schema(self.dataset, column, "missing column"))
    }

    fn mismatch(&self, column: &str, expected: &str, field: &Field) -> ExplorerError {
        ExplorerError::schema(
            self.dataset,
            column,
            format!("expected {expected}, found {field}"),
        )
    }

    pub fn int(&self, column: &str) -> Result<i64> {
        let field = self.field(column)?;
        field_as_int(field).ok_or_else(|| self.mismatch(column, "integer", field))
    }

    pub fn u32(&self, column: &str) -> Result<u32> {
        let value = self.int(column)?;
        u32::try_from(value).map_err(|_| {
            ExplorerError::schema(self.dataset, column, format!("{value} out of range"))
        })
    }

    pub fn u64(&self, column: &str) -> Result<u64> {
        let value = self.int(column)?;
        u64::try_from(value).map_err(|_| {
            ExplorerError::schema(self.dataset, column, format!("{value} is negative"))
        })
    }

    pub fn float(&self, column: &str) -> Result<f64> {
        let field = self.field(column)?;
        match field {
            Field::Float(v) => Ok(f64::from(*v)),
            Field::Double(v) => Ok(*v),
            Field::Null => Ok(f64::NAN),
            other => field_as_int(other)
                .map(|v| v as f64)
                .ok_or_else(|| self.mismatch(column, "float", field)),
        }
    }

    pub fn bool(&self, column: &str) -> Result<bool> {
        let field = self.field(column)?;
        match field {
            Field::Bool(v) => Ok(*v),
            other => field_as_int(other)
                .map(|v| v != 0)
                .ok_or_else(|| self.mismatch(column, "bool", field)),
        }
    }

    pub fn string(&self, column: &str) -> Result<String> {
        let field = self.field(column)?;
        match field {
            Field::Str(s) => Ok(s.clone()),
            Field::Bytes(b) => Ok(String::from_utf8_lossy(b.data()).into_owned()),
            other => Err(self.mismatch(column, "string", other)),
        }
    }

    pub fn letter(&self, column: &str) -> Result<char> {
        let raw = self.string(column)?;
        parse_letter(&raw).ok_or_else(|| {
            ExplorerError::schema(
                self.dataset,
                column,
                format!("expected a single letter, found {raw:?}"),
            )
        })
    }

    /// Integer list column. Also accepts the `"[1 2 3]"` text form numpy
    /// arrays take when stringified.
    pub fn u32_list(&self, column: &str) -> Result<Vec<u32>> {
        let field = self.field(column)?;
        match field {
            Field::ListInternal(list) => list
                .elements()
                .iter()
                .map(|el| {
                    field_as_int(el)
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| self.mismatch(column, "list of latent ids", el))
                })
                .collect(),
            Field::Str(s) => parse_int_list(s)
                .ok_or_else(|| self.mismatch(column, "list of latent ids", field)),
            Field::Null => Ok(Vec::new()),
            other => Err(self.mismatch(column, "list", other)),
        }
    }
}

fn field_as_int(field: &Field) -> Option<i64> {
    match field {
        Field::Byte(v) => Some(i64::from(*v)),
        Field::Short(v) => Some(i64::from(*v)),
        Field::Int(v) => Some(i64::from(*v)),
        Field::Long(v) => Some(*v),
        Field::UByte(v) => Some(i64::from(*v)),
        Field::UShort(v) => Some(i64::from(*v)),
        Field::UInt(v) => Some(i64::from(*v)),
        Field::ULong(v) => i64::try_from(*v).ok(),
        _ => None,
    }
}

fn parse_int_list(text: &str) -> Option<Vec<u32>> {
    text.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

/// Read every row of a parquet file and decode it with `decode`.
pub fn read_rows<T>(
    path: &Path,
    dataset: &str,
    decode: impl Fn(&ColumnarRow<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ExplorerError::not_found(dataset, path));
        }
        Err(e) => return Err(e.into()),
    };
    let reader = SerializedFileReader::new(file)?;
    let n_rows = reader.metadata().file_metadata().num_rows();
    let mut out = Vec::with_capacity(usize::try_from(n_rows).unwrap_or(0));

    for row in reader.get_row_iter(None)? {
        let row = row?;
        out.push(decode(&ColumnarRow::new(dataset, &row))?);
    }

    info!("Loaded {} rows of {} from {}", out.len(), dataset, path.display());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_list_numpy_form() {
        assert_eq!(parse_int_list("[12 345  6]"), Some(vec![12, 345, 6]));
        assert_eq!(parse_int_list("[1, 2]"), Some(vec![1, 2]));
        assert_eq!(parse_int_list("[]"), Some(vec![]));
        assert_eq!(parse_int_list("[a b]"), None);
    }

    #[test]
    fn test_field_as_int_widths() {
        assert_eq!(field_as_int(&Field::Int(7)), Some(7));
        assert_eq!(field_as_int(&Field::Long(-3)), Some(-3));
        assert_eq!(field_as_int(&Field::UShort(9)), Some(9));
        assert_eq!(field_as_int(&Field::Bool(true)), None);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = read_rows(Path::new("/nonexistent/x.parquet"), "tokens", |_| Ok(()))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
