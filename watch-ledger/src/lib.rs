use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use watch_error::{Result, WatchError};

/// Bump on any change to [`LEDGER_COLUMNS`]. Readers key on the column
/// set staying fixed for the life of a file.
pub const LEDGER_SCHEMA_VERSION: i32 = 1;

/// Canonical column order. Every appended row carries exactly these
/// fields; absent observations serialize as empty cells rather than
/// shifting their neighbors.
pub const LEDGER_COLUMNS: [&str; 6] = [
    "timestamp",
    "subject",
    "followers",
    "following",
    "posts",
    "picture_updated",
];

const LEDGER_LABEL: &str = "ledger";

/// One observation of a profile, as appended to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSnapshot {
    pub taken_at: DateTime<Local>,
    pub subject: String,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub posts: Option<u64>,
    pub picture_updated: bool,
}

impl ProfileSnapshot {
    fn to_row(&self) -> [String; 6] {
        [
            self.taken_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
            self.subject.clone(),
            cell(self.followers),
            cell(self.following),
            cell(self.posts),
            if self.picture_updated { "1" } else { "0" }.to_string(),
        ]
    }
}

fn cell(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Append-only CSV history. The header is written once, when the file
/// is created; existing rows are never rewritten or reordered.
pub struct Ledger {
    label: String,
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: &Path) -> Self {
        Ledger {
            label: LEDGER_LABEL.to_string(),
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, snapshot: &ProfileSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let header_needed = !self.path.exists();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| WatchError::Storage(self.label.clone(), err.to_string()))?;
        let mut writer = BufWriter::new(file);
        if header_needed {
            write_row(&mut writer, &LEDGER_COLUMNS)?;
        }
        write_row(&mut writer, &snapshot.to_row())?;
        writer.flush()?;
        log::info!(
            "{} row for {} appended to {}",
            self.label,
            snapshot.subject,
            self.path.display()
        );
        Ok(())
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write, S: AsRef<str>>(writer: &mut W, fields: &[S]) -> Result<()> {
    let mut first = true;
    for field in fields {
        if !first {
            write!(writer, ",")?;
        }
        first = false;
        let field = field.as_ref();
        if needs_quotes(field) {
            write!(writer, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            write!(writer, "{field}")?;
        }
    }
    writeln!(writer)?;
    Ok(())
}
