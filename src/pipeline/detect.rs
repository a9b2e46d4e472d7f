use std::collections::HashSet;
use crate::config::{Config, DetectionConfig};
use crate::model::{Classifier, FeatureRow, RandomForest, FEATURE_COUNT};
use crate::utils::{parse_hex_field, parse_numeric_field, MISSING_VALUE};
use crate::{Result, DetectorError};
use super::directory::Directory;
use super::flatten::{FlattenedFrame, FrameTable, FRAME_SCHEMA, BSSID_COLUMN, DS_COLUMN, TYPE_SUBTYPE_COLUMN};
use super::report::{Detection, EvilTwinReport, NetworkEntry};

const HEX_COLUMN_COUNT: usize = 2;
const HEX_COLUMNS: [&str; HEX_COLUMN_COUNT] = [TYPE_SUBTYPE_COLUMN, DS_COLUMN];

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub frame_subtypes: Vec<String>,
    pub evil_twin_label: String,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self::from(&Config::default().detection)
    }
}

impl From<&DetectionConfig> for DetectionSettings {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            frame_subtypes: config.frame_subtypes.clone(),
            evil_twin_label: config.evil_twin_label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedFrame {
    pub bssid: String,
    pub features: FeatureRow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub bssid: String,
    pub label: String,
}

pub struct EvilTwinDetector<C> {
    classifier: C,
    settings: DetectionSettings,
}

impl<C: Classifier> EvilTwinDetector<C> {
    pub fn new(classifier: C, settings: DetectionSettings) -> Self {
        Self { classifier, settings }
    }

    fn is_relevant(&self, frame: &FlattenedFrame) -> bool {
        frame
            .get(TYPE_SUBTYPE_COLUMN)
            .map_or(false, |subtype| {
                self.settings.frame_subtypes.iter().any(|s| s == subtype.trim())
            })
    }

    /// Filters by subtype, decodes hex fields and drops frames without a BSSID.
    pub fn prepare(&self, table: &FrameTable) -> Result<Vec<PreparedFrame>> {
        let relevant: Vec<&FlattenedFrame> = table.frames.iter().filter(|f| self.is_relevant(f)).collect();

        // Hex fields are decoded before the BSSID filter so a corrupt cell
        // aborts the run even on frames that would be discarded.
        let mut decoded = Vec::with_capacity(relevant.len());
        for frame in relevant {
            let mut hex_values = [0.0; HEX_COLUMN_COUNT];
            for (slot, column) in hex_values.iter_mut().zip(HEX_COLUMNS) {
                let raw = frame.get(column).unwrap_or(MISSING_VALUE);
                *slot = parse_hex_field(column, raw)? as f64;
            }
            decoded.push((frame, hex_values));
        }

        decoded
            .into_iter()
            .filter(|(frame, _)| frame.bssid().trim() != MISSING_VALUE)
            .map(|(frame, hex_values)| -> Result<PreparedFrame> {
                Ok(PreparedFrame {
                    bssid: frame.bssid().trim().to_string(),
                    features: feature_row(frame, &hex_values)?,
                })
            })
            .collect()
    }

    pub fn classify(&self, table: &FrameTable) -> Result<Vec<ClassificationResult>> {
        let prepared = self.prepare(table)?;
        let rows: Vec<FeatureRow> = prepared.iter().map(|p| p.features.clone()).collect();
        let labels = self.classifier.predict_all(&rows)?;

        if labels.len() != prepared.len() {
            return Err(DetectorError::Model(format!(
                "classifier returned {} labels for {} frames",
                labels.len(),
                prepared.len()
            )));
        }

        Ok(prepared
            .into_iter()
            .zip(labels)
            .map(|(frame, label)| ClassificationResult { bssid: frame.bssid, label })
            .collect())
    }

    pub fn detect(&self, table: &FrameTable, directory: &Directory) -> Result<Detection> {
        let results = self.classify(table)?;
        let (evil, normal) = partition(&results, &self.settings.evil_twin_label);
        log::debug!(
            "Classified {} frames: {} evil twin BSSIDs, {} normal BSSIDs",
            results.len(),
            evil.len(),
            normal.len()
        );

        let resolve = |bssids: Vec<String>| -> Vec<NetworkEntry> {
            bssids
                .into_iter()
                .map(|bssid| {
                    let ssid = directory.resolve_ssid(&bssid);
                    NetworkEntry { bssid, ssid }
                })
                .collect()
        };

        let evil_twins = resolve(evil);
        for entry in &evil_twins {
            log::warn!("Evil twin detected: BSSID {} | SSID {}", entry.bssid, entry.ssid);
        }
        let normal = resolve(normal);
        if evil_twins.is_empty() {
            log::info!("No evil twin among {} BSSIDs", normal.len());
        }

        Ok(Detection::new(evil_twins, normal))
    }
}

fn feature_row(frame: &FlattenedFrame, hex_values: &[f64; HEX_COLUMN_COUNT]) -> Result<FeatureRow> {
    let mut values = [0.0; FEATURE_COUNT];
    let features = FRAME_SCHEMA
        .iter()
        .zip(frame.cells())
        .filter(|(spec, _)| spec.column != BSSID_COLUMN);

    for (slot, (spec, cell)) in values.iter_mut().zip(features) {
        *slot = match HEX_COLUMNS.iter().position(|c| *c == spec.column) {
            Some(hex_idx) => hex_values[hex_idx],
            None => parse_numeric_field(spec.column, cell)?,
        };
    }

    Ok(FeatureRow::new(values))
}

/// Splits distinct BSSIDs into (evil twin, normal), both in discovery order.
/// Any single frame carrying `evil_label` marks its BSSID as an evil twin.
pub fn partition(results: &[ClassificationResult], evil_label: &str) -> (Vec<String>, Vec<String>) {
    let mut evil = Vec::new();
    let mut evil_seen = HashSet::new();
    for result in results.iter().filter(|r| r.label == evil_label) {
        if evil_seen.insert(result.bssid.as_str()) {
            evil.push(result.bssid.clone());
        }
    }

    let mut normal = Vec::new();
    let mut normal_seen = HashSet::new();
    for result in results {
        if !evil_seen.contains(result.bssid.as_str()) && normal_seen.insert(result.bssid.as_str()) {
            normal.push(result.bssid.clone());
        }
    }

    (evil, normal)
}

pub fn detect_session<C: Classifier>(config: &Config, session: &str, classifier: C) -> Result<Detection> {
    let paths = config.session_paths(session)?;
    for path in [&paths.frames_csv, &paths.directory_csv] {
        if !path.is_file() {
            return Err(DetectorError::NotFound(path.clone()));
        }
    }

    let table = FrameTable::read_csv(&paths.frames_csv)?;
    let directory = Directory::load(&paths.directory_csv)?;
    log::info!(
        "Session {}: {} frames, {} directory entries",
        session,
        table.len(),
        directory.len()
    );

    let detector = EvilTwinDetector::new(classifier, DetectionSettings::from(&config.detection));
    detector.detect(&table, &directory)
}

pub fn run_detection<C: Classifier>(config: &Config, session: &str, classifier: C) -> EvilTwinReport {
    match detect_session(config, session, classifier) {
        Ok(detection) => detection.into(),
        Err(err) => {
            log::error!("Detection for session {} failed: {}", session, err);
            EvilTwinReport::failed(err)
        }
    }
}

pub fn run_session(config: &Config, session: &str) -> EvilTwinReport {
    match RandomForest::from_file(&config.paths.model_path) {
        Ok(model) => run_detection(config, session, model),
        Err(err) => {
            log::error!("Unable to load model: {}", err);
            EvilTwinReport::failed(err)
        }
    }
}
