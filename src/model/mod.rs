pub mod forest;

pub use forest::RandomForest;

use crate::pipeline::flatten::{column_names, BSSID_COLUMN, FRAME_COLUMN_COUNT};
use crate::Result;

/// The only label the detection pipeline attaches meaning to.
pub const EVIL_TWIN_LABEL: &str = "evil_twin";

pub const FEATURE_COUNT: usize = FRAME_COLUMN_COUNT - 1;

pub fn feature_columns() -> impl Iterator<Item = &'static str> {
    column_names().filter(|column| *column != BSSID_COLUMN)
}

pub fn feature_index(column: &str) -> Option<usize> {
    feature_columns().position(|name| name == column)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    values: [f64; FEATURE_COUNT],
}

impl FeatureRow {
    pub fn new(values: [f64; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        feature_index(column).map(|idx| self.values[idx])
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }
}

/// A trained model mapping one feature row to a label.
pub trait Classifier: Send + Sync {
    fn predict(&self, row: &FeatureRow) -> Result<String>;

    fn predict_all(&self, rows: &[FeatureRow]) -> Result<Vec<String>> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

impl<F> Classifier for F
where
    F: Fn(&FeatureRow) -> Result<String> + Send + Sync,
{
    fn predict(&self, row: &FeatureRow) -> Result<String> {
        self(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DetectorError;

    #[test]
    fn test_feature_columns_exclude_bssid() {
        let columns: Vec<&str> = feature_columns().collect();
        assert_eq!(columns.len(), FEATURE_COUNT);
        assert!(!columns.contains(&"bssid"));
        assert_eq!(columns[0], "frame.time_delta");
        assert_eq!(feature_index("wlan.fc.type_subtype"), Some(12));
    }

    #[test]
    fn test_feature_row_lookup() {
        let mut values = [0.0; FEATURE_COUNT];
        values[3] = 148.0;
        let row = FeatureRow::new(values);

        assert_eq!(row.get("frame.len"), Some(148.0));
        assert_eq!(row.get("bssid"), None);
    }

    #[test]
    fn test_closure_classifier() {
        let classifier = |row: &FeatureRow| -> Result<String> {
            match row.get("frame.len") {
                Some(len) if len > 100.0 => Ok(EVIL_TWIN_LABEL.to_string()),
                Some(_) => Ok("normal".to_string()),
                None => Err(DetectorError::Model("frame.len missing".to_string())),
            }
        };

        let mut big = [0.0; FEATURE_COUNT];
        big[3] = 200.0;
        let rows = vec![FeatureRow::new(big), FeatureRow::new([0.0; FEATURE_COUNT])];

        let labels = classifier.predict_all(&rows).unwrap();
        assert_eq!(labels, vec!["evil_twin".to_string(), "normal".to_string()]);
    }
}
