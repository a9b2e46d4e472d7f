use std::collections::HashMap;
use std::path::Path;
use crate::config::Config;
use crate::utils::normalize_bssid;
use crate::{Result, DetectorError};

pub const STATION_MARKER: &str = "Station MAC";
pub const BSSID_HEADER: &str = "BSSID";
pub const ESSID_HEADER: &str = "ESSID";
pub const UNKNOWN_SSID: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeSummary {
    pub retained: usize,
    pub dropped: usize,
    pub marker_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DetectorError::NotFound(path.to_path_buf()));
        }

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut records = rdr.records();
        let mut headers = None;
        for result in records.by_ref() {
            let record = result?;
            // Airodump opens the file with a blank line.
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            headers = Some(record.iter().map(|h| h.trim().to_string()).collect::<Vec<_>>());
            break;
        }

        let headers = headers.ok_or_else(|| {
            DetectorError::Parse(format!("'{}' has no header row", path.display()))
        })?;

        let mut rows = Vec::new();
        for result in records {
            let record = result?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require_column(&self, name: &str, path: &Path) -> Result<usize> {
        self.column(name).ok_or_else(|| DetectorError::MissingColumn {
            file: path.to_path_buf(),
            column: name.to_string(),
        })
    }

    pub fn marker_position(&self, bssid_column: usize) -> Option<usize> {
        self.rows.iter().position(|row| {
            row.get(bssid_column)
                .map_or(false, |cell| cell.trim() == STATION_MARKER)
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let width = self.headers.len();
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            let mut cells: Vec<&str> = row.iter().take(width).map(String::as_str).collect();
            cells.resize(width, "");
            wtr.write_record(&cells)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Cuts the station section off the export at `path` and rewrites it in place
/// with trimmed column names. Without a marker row every row is kept.
pub fn normalize_export(path: &Path) -> Result<NormalizeSummary> {
    let mut table = ExportTable::read(path)?;
    let bssid_column = table.require_column(BSSID_HEADER, path)?;

    let total = table.rows.len();
    let marker = table.marker_position(bssid_column);
    match marker {
        Some(idx) => table.rows.truncate(idx),
        None => log::warn!(
            "No '{}' row in {}, keeping all {} rows",
            STATION_MARKER,
            path.display(),
            total
        ),
    }

    let tmp_path = path.with_extension("csv.tmp");
    table.write(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;

    let summary = NormalizeSummary {
        retained: table.rows.len(),
        dropped: total - table.rows.len(),
        marker_found: marker.is_some(),
    };
    log::info!(
        "Normalized {}: kept {} access points, dropped {} station rows",
        path.display(),
        summary.retained,
        summary.dropped
    );
    Ok(summary)
}

pub fn normalize_session(config: &Config, session: &str) -> Result<NormalizeSummary> {
    let paths = config.session_paths(session)?;
    normalize_export(&paths.directory_csv)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub bssid: String,
    pub ssid: String,
}

/// BSSID to SSID lookup, case-insensitive on the BSSID.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
    by_bssid: HashMap<String, usize>,
}

impl Directory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        let mut by_bssid = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_bssid.entry(normalize_bssid(&entry.bssid)).or_insert(idx);
        }
        Self { entries, by_bssid }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let table = ExportTable::read(path)?;
        let bssid_column = table.require_column(BSSID_HEADER, path)?;
        let essid_column = table.require_column(ESSID_HEADER, path)?;

        let end = table.marker_position(bssid_column).unwrap_or(table.rows.len());
        let entries = table.rows[..end]
            .iter()
            .map(|row| DirectoryEntry {
                bssid: cell(row, bssid_column),
                ssid: cell(row, essid_column),
            })
            .collect();

        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, bssid: &str) -> Option<&DirectoryEntry> {
        self.by_bssid
            .get(&normalize_bssid(bssid))
            .map(|&idx| &self.entries[idx])
    }

    /// SSID for `bssid`, or `"Unknown"` when it is not listed or has no name.
    pub fn resolve_ssid(&self, bssid: &str) -> String {
        match self.lookup(bssid) {
            Some(entry) if !entry.ssid.is_empty() => entry.ssid.clone(),
            _ => UNKNOWN_SSID.to_string(),
        }
    }
}

fn cell(row: &[String], idx: usize) -> String {
    row.get(idx).map(|c| c.trim().to_string()).unwrap_or_default()
}
