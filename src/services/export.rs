use crate::models::{FieldSelection, PoiRecord};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use thiserror::Error;

/// UTF-8 byte-order mark so spreadsheet tools detect the encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No export fields selected")]
    NoFieldsSelected,

    #[error("Cannot write {path} (file locked or no permission): {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error writing {path}: {source}")]
    Csv {
        path: Utf8PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Counts from one export call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows_written: usize,
    pub rows_skipped: usize,
    pub header_written: bool,
}

/// Appends POI records to a CSV file.
///
/// The header row (selected display names) and BOM are written only when the
/// file is empty, so repeated appends accumulate rows under a single header.
/// Records whose selected fields are all empty are skipped.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    path: Utf8PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Append records in selection order.
    pub fn append_records(
        &self,
        records: &[PoiRecord],
        fields: &FieldSelection,
    ) -> Result<ExportSummary, ExportError> {
        if !fields.has_selection() {
            return Err(ExportError::NoFieldsSelected);
        }

        ensure_parent_dir(&self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let is_empty = file.metadata().map_err(|e| self.io_error(e))?.len() == 0;

        let summary = write_rows(&self.path, file, records, fields, is_empty)?;
        tracing::debug!(
            "Appended {} rows to {} ({} skipped)",
            summary.rows_written,
            self.path,
            summary.rows_skipped
        );
        Ok(summary)
    }

    fn io_error(&self, source: io::Error) -> ExportError {
        ExportError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Write all records to `path`, replacing any existing content.
///
/// Used for the manual end-of-run export; applies the same skip rule as
/// [`CsvExporter::append_records`].
pub fn export_all(
    path: &Utf8Path,
    records: &[PoiRecord],
    fields: &FieldSelection,
) -> Result<ExportSummary, ExportError> {
    if !fields.has_selection() {
        return Err(ExportError::NoFieldsSelected);
    }

    ensure_parent_dir(path)?;
    let file = File::create(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let summary = write_rows(path, file, records, fields, true)?;
    tracing::info!(
        "Exported {} rows to {} ({} skipped)",
        summary.rows_written,
        path,
        summary.rows_skipped
    );
    Ok(summary)
}

fn ensure_parent_dir(path: &Utf8Path) -> Result<(), ExportError> {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() && !parent.exists() => {
            fs::create_dir_all(parent).map_err(|source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn write_rows(
    path: &Utf8Path,
    mut file: File,
    records: &[PoiRecord],
    fields: &FieldSelection,
    write_header: bool,
) -> Result<ExportSummary, ExportError> {
    let io_err = |source: io::Error| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source: csv::Error| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if write_header {
        file.write_all(UTF8_BOM).map_err(io_err)?;
    }

    let mut writer = csv::WriterBuilder::new().from_writer(file);
    let mut summary = ExportSummary::default();

    if write_header {
        writer.write_record(fields.headers()).map_err(csv_err)?;
        summary.header_written = true;
    }

    let keys = fields.keys();
    for record in records {
        if record.all_empty(keys.iter().copied()) {
            summary.rows_skipped += 1;
            continue;
        }
        writer
            .write_record(keys.iter().map(|k| record.text(k)))
            .map_err(csv_err)?;
        summary.rows_written += 1;
    }

    writer.flush().map_err(io_err)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn poi(value: Value) -> PoiRecord {
        match value {
            Value::Object(map) => PoiRecord::new(map),
            _ => unreachable!(),
        }
    }

    fn temp_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().join(name)).unwrap()
    }

    fn read_lines(path: &Utf8Path) -> Vec<String> {
        let bytes = fs::read(path).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        text.trim_start_matches('\u{feff}')
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_header_and_bom_on_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "out.csv");
        let exporter = CsvExporter::new(path.clone());
        let fields = FieldSelection::from_pairs([("name", "name"), ("address", "address")]);

        let summary = exporter
            .append_records(&[poi(json!({"name": "A", "address": "1 Main"}))], &fields)
            .unwrap();

        assert!(summary.header_written);
        assert_eq!(summary.rows_written, 1);
        assert!(fs::read(&path).unwrap().starts_with(UTF8_BOM));
        assert_eq!(read_lines(&path), vec!["name,address", "A,1 Main"]);
    }

    #[test]
    fn test_second_append_has_no_duplicate_header() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "out.csv");
        let exporter = CsvExporter::new(path.clone());
        let fields = FieldSelection::from_pairs([("name", "name")]);

        exporter.append_records(&[poi(json!({"name": "A"}))], &fields).unwrap();
        let second = exporter.append_records(&[poi(json!({"name": "B"}))], &fields).unwrap();

        assert!(!second.header_written);
        assert_eq!(read_lines(&path), vec!["name", "A", "B"]);

        let bytes = fs::read(&path).unwrap();
        let bom_count = bytes.windows(3).filter(|w| *w == UTF8_BOM).count();
        assert_eq!(bom_count, 1);
    }

    #[test]
    fn test_all_empty_rows_skipped() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "out.csv");
        let exporter = CsvExporter::new(path.clone());
        let fields = FieldSelection::from_pairs([("name", "name"), ("tel", "tel")]);

        let records = vec![
            poi(json!({"name": "", "tel": []})),
            poi(json!({"name": "[]", "other": "x"})),
            poi(json!({"name": "", "tel": "555-0100"})),
        ];
        let summary = exporter.append_records(&records, &fields).unwrap();

        assert_eq!(summary.rows_written, 1);
        assert_eq!(summary.rows_skipped, 2);
        assert_eq!(read_lines(&path), vec!["name,tel", ",555-0100"]);
    }

    #[test]
    fn test_empty_list_normalized_and_quoting() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "out.csv");
        let fields = FieldSelection::from_pairs([("name", "name"), ("tel", "tel")]);

        export_all(&path, &[poi(json!({"name": "Smith, Jones", "tel": []}))], &fields).unwrap();

        assert_eq!(read_lines(&path), vec!["name,tel", "\"Smith, Jones\","]);
    }

    #[test]
    fn test_export_all_truncates() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "nested/dir/out.csv");
        let fields = FieldSelection::from_pairs([("name", "name")]);

        export_all(&path, &[poi(json!({"name": "A"}))], &fields).unwrap();
        export_all(&path, &[poi(json!({"name": "B"}))], &fields).unwrap();

        assert_eq!(read_lines(&path), vec!["name", "B"]);
    }

    #[test]
    fn test_no_fields_selected() {
        let dir = TempDir::new().unwrap();
        let exporter = CsvExporter::new(temp_path(&dir, "out.csv"));
        let mut fields = FieldSelection::from_pairs([("name", "name")]);
        fields.set_included("name", false);

        let err = exporter.append_records(&[], &fields).unwrap_err();
        assert!(matches!(err, ExportError::NoFieldsSelected));
    }

    #[test]
    fn test_unwritable_path_reports_io_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened as the export file
        let exporter = CsvExporter::new(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap());
        let fields = FieldSelection::from_pairs([("name", "name")]);

        let err = exporter
            .append_records(&[poi(json!({"name": "A"}))], &fields)
            .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
