use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::WriteError;
use crate::record::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Delimited(u8),
    Json,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Delimited(_) => "csv",
            Format::Json => "json",
        }
    }
}

/// Persists tables and aggregate maps below one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    format: Format,
}

impl ArtifactWriter {
    pub fn delimited(dir: impl Into<PathBuf>, delimiter: char) -> Result<Self, WriteError> {
        if !delimiter.is_ascii() {
            return Err(WriteError::Delimiter(delimiter));
        }
        Ok(ArtifactWriter {
            dir: dir.into(),
            format: Format::Delimited(delimiter as u8),
        })
    }

    pub fn json(dir: impl Into<PathBuf>) -> Self {
        ArtifactWriter {
            dir: dir.into(),
            format: Format::Json,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<identity>.<ext>`; same identity, same path.
    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", identity, self.format.extension()))
    }

    pub fn write_table(&self, table: &Table, path: &Path) -> Result<(), WriteError> {
        match self.format {
            Format::Delimited(delimiter) => {
                let bytes = delimited_bytes(table, delimiter).map_err(|source| WriteError::Csv {
                    path: path.to_path_buf(),
                    source,
                })?;
                self.write_bytes(&bytes, path)
            }
            Format::Json => self.write_json(table, path),
        }
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, value: &T, path: &Path) -> Result<(), WriteError> {
        let bytes = serde_json::to_vec(value).map_err(|source| WriteError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_bytes(&bytes, path)
    }

    pub fn write_bytes(&self, bytes: &[u8], path: &Path) -> Result<(), WriteError> {
        let io_err = |source| WriteError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = fs::File::create(path).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
        Ok(())
    }
}

/// Header row plus one line per row, `\n` terminated, quoting only when needed.
pub fn delimited_bytes(table: &Table, delimiter: u8) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(table.column_names())?;
    for row in table.rows() {
        wtr.write_record(&row)?;
    }
    wtr.into_inner().map_err(|e| e.into_error().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{normalize, Record};

    fn table(rows: &[&[(&str, &str)]]) -> Table {
        let records: Vec<Record> = rows.iter().map(|r| r.iter().copied().collect()).collect();
        normalize(&records).unwrap()
    }

    #[test]
    fn delimited_output_is_exact() {
        let t = table(&[&[("A", "1"), ("B", "x")], &[("A", "2"), ("B", "y")]]);
        let out = delimited_bytes(&t, b';').unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A;B\n1;x\n2;y\n");
    }

    #[test]
    fn delimiter_inside_value_is_quoted() {
        let t = table(&[&[("Dozent", "Meyer; Schulz"), ("Raum", "S 101")]]);
        let out = String::from_utf8(delimited_bytes(&t, b';').unwrap()).unwrap();
        assert_eq!(out, "Dozent;Raum\n\"Meyer; Schulz\";S 101\n");
    }

    #[test]
    fn paths_derive_from_identity() {
        let w = ArtifactWriter::delimited("out", ';').unwrap();
        assert_eq!(w.path_for("WI_B3_42"), PathBuf::from("out/WI_B3_42.csv"));
        assert_eq!(w.path_for("WI_B3_42"), w.path_for("WI_B3_42"));
        assert_eq!(ArtifactWriter::json("out").path_for("route_data"), PathBuf::from("out/route_data.json"));
    }

    #[test]
    fn non_ascii_delimiter_rejected() {
        assert!(matches!(
            ArtifactWriter::delimited("out", '§'),
            Err(WriteError::Delimiter('§'))
        ));
    }

    #[test]
    fn writes_files_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let w = ArtifactWriter::json(dir.path().join("nested"));
        let t = table(&[&[("day", "Montag"), ("offer1", "Grünkohl")]]);
        let path = w.path_for("mensadata");
        w.write_table(&t, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, r#"{"day":["Montag"],"offer1":["Grünkohl"]}"#);
    }

    #[test]
    fn unwritable_path_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let w = ArtifactWriter::json(dir.path());
        let err = w.write_bytes(b"{}", &blocker.join("child.json")).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
