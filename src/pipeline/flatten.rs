use std::io::{Read, Write};
use std::path::Path;
use serde_json::Value;
use crate::config::Config;
use crate::utils::MISSING_VALUE;
use crate::{Result, DetectorError};

pub const FRAME_COLUMN_COUNT: usize = 24;
pub const BSSID_COLUMN: &str = "bssid";
pub const TYPE_SUBTYPE_COLUMN: &str = "wlan.fc.type_subtype";
pub const DS_COLUMN: &str = "wlan.fc.ds";

const FRAME: &[&str] = &["frame"];
const RADIOTAP: &[&str] = &["radiotap"];
const RADIOTAP_PRESENT: &[&str] = &["radiotap", "radiotap.present", "radiotap.present.word_tree"];
const WLAN: &[&str] = &["wlan"];
const WLAN_FC: &[&str] = &["wlan", "wlan.fc_tree"];
const WLAN_FLAGS: &[&str] = &["wlan", "wlan.fc_tree", "wlan.flags_tree"];
const WLAN_BLOCK_ACK: &[&str] = &["wlan", "Compressed BlockAck Response", "wlan.ba.control_tree"];
const WLAN_QOS: &[&str] = &["wlan", "wlan.qos_tree"];
const DATA: &[&str] = &["data"];

/// Sections a record must carry to be considered a complete 802.11 frame.
pub const REQUIRED_SECTIONS: &[&[&str]] = &[FRAME, RADIOTAP_PRESENT, WLAN_FLAGS];

/// Where one output column lives inside `_source.layers`.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub column: &'static str,
    pub section: &'static [&'static str],
    pub key: &'static str,
}

const fn field(column: &'static str, section: &'static [&'static str], key: &'static str) -> FieldSpec {
    FieldSpec { column, section, key }
}

const fn same(column: &'static str, section: &'static [&'static str]) -> FieldSpec {
    field(column, section, column)
}

pub const FRAME_SCHEMA: [FieldSpec; FRAME_COLUMN_COUNT] = [
    field(BSSID_COLUMN, WLAN, "wlan.bssid"),
    same("frame.time_delta", FRAME),
    same("frame.time_delta_displayed", FRAME),
    same("frame.time_relative", FRAME),
    same("frame.len", FRAME),
    same("frame.cap_len", FRAME),
    same("radiotap.present.rate", RADIOTAP_PRESENT),
    same("radiotap.present.dbm_antsignal", RADIOTAP_PRESENT),
    same("radiotap.present.antenna", RADIOTAP_PRESENT),
    same("radiotap.present.rtap_ns", RADIOTAP_PRESENT),
    same("radiotap.present.ext", RADIOTAP_PRESENT),
    same("radiotap.datarate", RADIOTAP),
    same("radiotap.dbm_antsignal", RADIOTAP),
    same(TYPE_SUBTYPE_COLUMN, WLAN),
    same("wlan.fc.type", WLAN_FC),
    same("wlan.fc.subtype", WLAN_FC),
    same(DS_COLUMN, WLAN_FLAGS),
    same("wlan.duration", WLAN),
    same("wlan.frag", WLAN),
    same("wlan.seq", WLAN),
    same("wlan.ba.control.ackpolicy", WLAN_BLOCK_ACK),
    same("wlan.qos.tid", WLAN_QOS),
    same("wlan.qos.priority", WLAN_QOS),
    same("data.len", DATA),
];

pub fn column_index(column: &str) -> Option<usize> {
    FRAME_SCHEMA.iter().position(|spec| spec.column == column)
}

pub fn column_names() -> impl Iterator<Item = &'static str> {
    FRAME_SCHEMA.iter().map(|spec| spec.column)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedFrame {
    cells: Vec<String>,
}

impl Default for FlattenedFrame {
    fn default() -> Self {
        Self {
            cells: vec![MISSING_VALUE.to_string(); FRAME_COLUMN_COUNT],
        }
    }
}

impl FlattenedFrame {
    pub fn get(&self, column: &str) -> Option<&str> {
        column_index(column).map(|idx| self.cells[idx].as_str())
    }

    pub fn bssid(&self) -> &str {
        &self.cells[0]
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    #[cfg(test)]
    pub(crate) fn with(mut self, column: &str, value: impl Into<String>) -> Result<Self> {
        let idx = column_index(column)
            .ok_or_else(|| DetectorError::Parse(format!("Unknown frame column: {}", column)))?;
        self.cells[idx] = value.into();
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenSummary {
    pub records: usize,
    pub frames: usize,
    pub dropped: usize,
}

fn lookup_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, segment| node.get(*segment))
}

fn layers(record: &Value) -> Option<&Value> {
    lookup_path(record, &["_source", "layers"])
}

fn cell_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        // Repeated fields come out as arrays; the first occurrence wins.
        Value::Array(items) => items.first().and_then(cell_value),
        Value::Null | Value::Object(_) => None,
    }
}

fn resolve(layers: &Value, spec: &FieldSpec) -> Option<String> {
    let section = lookup_path(layers, spec.section)?;
    section.get(spec.key).and_then(cell_value)
}

/// Flattens a single record. Never fails: absent paths produce `"0"`.
pub fn flatten_record(record: &Value) -> FlattenedFrame {
    let mut frame = FlattenedFrame::default();

    if let Some(layers) = layers(record) {
        for (idx, spec) in FRAME_SCHEMA.iter().enumerate() {
            if let Some(value) = resolve(layers, spec) {
                frame.cells[idx] = value;
            }
        }
    }

    frame
}

pub fn missing_section(record: &Value) -> Option<String> {
    let Some(layers) = layers(record) else {
        return Some("_source.layers".to_string());
    };

    REQUIRED_SECTIONS
        .iter()
        .find(|section| !lookup_path(layers, section).map_or(false, Value::is_object))
        .map(|section| section.join(" / "))
}

pub fn flatten_records(records: &[Value], drop_incomplete: bool) -> (Vec<FlattenedFrame>, FlattenSummary) {
    let mut frames = Vec::with_capacity(records.len());
    let mut dropped = 0;

    for (idx, record) in records.iter().enumerate() {
        if drop_incomplete {
            if let Some(section) = missing_section(record) {
                log::warn!("Dropping capture record {}: missing section '{}'", idx, section);
                dropped += 1;
                continue;
            }
        }
        frames.push(flatten_record(record));
    }

    let summary = FlattenSummary {
        records: records.len(),
        frames: frames.len(),
        dropped,
    };
    (frames, summary)
}

pub fn parse_capture_export(content: &str) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(content)? {
        Value::Array(records) => Ok(records),
        other => Err(DetectorError::Parse(format!(
            "Capture export must be a JSON array of packets, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameTable {
    pub frames: Vec<FlattenedFrame>,
}

impl FrameTable {
    pub fn new(frames: Vec<FlattenedFrame>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(column_names())?;
        for frame in &self.frames {
            wtr.write_record(frame.cells())?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_to(file)
    }

    pub fn read_from<R: Read>(reader: R, source: &Path) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();

        let mut positions = Vec::with_capacity(FRAME_COLUMN_COUNT);
        for column in column_names() {
            let pos = headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| DetectorError::MissingColumn {
                    file: source.to_path_buf(),
                    column: column.to_string(),
                })?;
            positions.push(pos);
        }

        let mut frames = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let cells = positions
                .iter()
                .map(|&pos| record.get(pos).unwrap_or(MISSING_VALUE).to_string())
                .collect();
            frames.push(FlattenedFrame { cells });
        }

        Ok(Self { frames })
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DetectorError::NotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        Self::read_from(file, path)
    }
}

pub fn flatten_session(config: &Config, session: &str) -> Result<FlattenSummary> {
    let paths = config.session_paths(session)?;
    if !paths.capture_json.is_file() {
        return Err(DetectorError::NotFound(paths.capture_json));
    }

    let content = std::fs::read_to_string(&paths.capture_json)?;
    let records = parse_capture_export(&content)?;
    let (frames, summary) = flatten_records(&records, config.flatten.drop_incomplete);

    std::fs::create_dir_all(&config.paths.captures_dir)?;
    FrameTable::new(frames).write_csv(&paths.frames_csv)?;

    log::info!(
        "Flattened {} of {} capture records into {}",
        summary.frames,
        summary.records,
        paths.frames_csv.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_record() -> Value {
        json!({
            "_source": {
                "layers": {
                    "frame": {
                        "frame.time_delta": "0.000102000",
                        "frame.time_delta_displayed": "0.000102000",
                        "frame.time_relative": "1.204511000",
                        "frame.len": "148",
                        "frame.cap_len": "148"
                    },
                    "radiotap": {
                        "radiotap.present": {
                            "radiotap.present.word_tree": {
                                "radiotap.present.rate": "1",
                                "radiotap.present.dbm_antsignal": "1",
                                "radiotap.present.antenna": "1",
                                "radiotap.present.rtap_ns": "0",
                                "radiotap.present.ext": "0"
                            }
                        },
                        "radiotap.datarate": "24",
                        "radiotap.dbm_antsignal": "-47"
                    },
                    "wlan": {
                        "wlan.fc.type_subtype": "0x0028",
                        "wlan.fc_tree": {
                            "wlan.fc.type": "2",
                            "wlan.fc.subtype": "8",
                            "wlan.flags_tree": {
                                "wlan.fc.ds": "0x00000002"
                            }
                        },
                        "wlan.duration": "44",
                        "wlan.bssid": "aa:bb:cc:dd:ee:ff",
                        "wlan.frag": "0",
                        "wlan.seq": "1337",
                        "wlan.qos_tree": {
                            "wlan.qos.tid": "6",
                            "wlan.qos.priority": "6"
                        },
                        "Compressed BlockAck Response": {
                            "wlan.ba.control_tree": {
                                "wlan.ba.control.ackpolicy": "1"
                            }
                        }
                    },
                    "data": {
                        "data.len": "96"
                    }
                }
            }
        })
    }

    #[test]
    fn test_schema_is_fixed() {
        let columns: Vec<&str> = column_names().collect();
        assert_eq!(columns.len(), FRAME_COLUMN_COUNT);
        assert_eq!(columns[0], "bssid");
        assert_eq!(columns[FRAME_COLUMN_COUNT - 1], "data.len");

        let mut unique = columns.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), FRAME_COLUMN_COUNT);
    }

    #[test]
    fn test_flatten_full_record() {
        let frame = flatten_record(&full_record());

        assert_eq!(frame.bssid(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(frame.get("frame.len"), Some("148"));
        assert_eq!(frame.get("radiotap.dbm_antsignal"), Some("-47"));
        assert_eq!(frame.get("radiotap.present.antenna"), Some("1"));
        assert_eq!(frame.get("wlan.fc.type_subtype"), Some("0x0028"));
        assert_eq!(frame.get("wlan.fc.subtype"), Some("8"));
        assert_eq!(frame.get("wlan.fc.ds"), Some("0x00000002"));
        assert_eq!(frame.get("wlan.ba.control.ackpolicy"), Some("1"));
        assert_eq!(frame.get("wlan.qos.tid"), Some("6"));
        assert_eq!(frame.get("data.len"), Some("96"));
    }

    #[test]
    fn test_flatten_is_total_for_sparse_records() {
        let sparse = vec![
            json!({}),
            json!(null),
            json!(42),
            json!({"_source": "not an object"}),
            json!({"_source": {"layers": {"wlan": {"wlan.fc_tree": 7}}}}),
            json!({"_source": {"layers": {"radiotap": {"radiotap.present": {}}}}}),
        ];

        for record in &sparse {
            let frame = flatten_record(record);
            assert_eq!(frame.cells().len(), FRAME_COLUMN_COUNT);
            assert!(frame.cells().iter().all(|cell| cell == "0"));
        }
    }

    #[test]
    fn test_bssid_defaults_without_wlan_layer() {
        let mut record = full_record();
        record["_source"]["layers"]["wlan"]
            .as_object_mut()
            .unwrap()
            .remove("wlan.bssid");

        let frame = flatten_record(&record);
        assert_eq!(frame.bssid(), "0");
        assert_eq!(frame.get("wlan.seq"), Some("1337"));
    }

    #[test]
    fn test_optional_substructures_default_to_zero() {
        let mut record = full_record();
        let wlan = record["_source"]["layers"]["wlan"].as_object_mut().unwrap();
        wlan.remove("Compressed BlockAck Response");
        wlan.remove("wlan.qos_tree");
        record["_source"]["layers"].as_object_mut().unwrap().remove("data");

        let frame = flatten_record(&record);
        assert_eq!(frame.get("wlan.ba.control.ackpolicy"), Some("0"));
        assert_eq!(frame.get("wlan.qos.tid"), Some("0"));
        assert_eq!(frame.get("wlan.qos.priority"), Some("0"));
        assert_eq!(frame.get("data.len"), Some("0"));
        assert_eq!(missing_section(&record), None);
    }

    #[test]
    fn test_leaf_conversion() {
        let record = json!({
            "_source": {"layers": {"frame": {
                "frame.len": 60,
                "frame.cap_len": true,
                "frame.time_delta": ["0.5", "0.7"],
                "frame.time_relative": {"nested": "1"},
                "frame.time_delta_displayed": null
            }}}
        });

        let frame = flatten_record(&record);
        assert_eq!(frame.get("frame.len"), Some("60"));
        assert_eq!(frame.get("frame.cap_len"), Some("1"));
        assert_eq!(frame.get("frame.time_delta"), Some("0.5"));
        assert_eq!(frame.get("frame.time_relative"), Some("0"));
        assert_eq!(frame.get("frame.time_delta_displayed"), Some("0"));
    }

    #[test]
    fn test_incomplete_records_are_dropped() {
        let mut no_radiotap = full_record();
        no_radiotap["_source"]["layers"]
            .as_object_mut()
            .unwrap()
            .remove("radiotap");

        let records = vec![full_record(), no_radiotap.clone(), json!({}), full_record()];

        let (frames, summary) = flatten_records(&records, true);
        assert_eq!(frames.len(), 2);
        assert_eq!(summary, FlattenSummary { records: 4, frames: 2, dropped: 2 });
        assert_eq!(
            missing_section(&no_radiotap).as_deref(),
            Some("radiotap / radiotap.present / radiotap.present.word_tree")
        );

        let (frames, summary) = flatten_records(&records, false);
        assert_eq!(frames.len(), 4);
        assert_eq!(summary.dropped, 0);
    }

    #[test]
    fn test_capture_export_must_be_array() {
        assert_eq!(parse_capture_export("[{}, {}]").unwrap().len(), 2);
        assert!(matches!(
            parse_capture_export("{\"_source\": {}}"),
            Err(DetectorError::Parse(_))
        ));
        assert!(matches!(parse_capture_export("[{"), Err(DetectorError::Json(_))));
    }

    #[test]
    fn test_frame_table_csv_layout() {
        let table = FrameTable::new(vec![flatten_record(&full_record()), FlattenedFrame::default()]);

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("bssid,frame.time_delta,frame.time_delta_displayed,"));
        assert!(header.ends_with(",wlan.qos.tid,wlan.qos.priority,data.len"));
        assert!(lines.next().unwrap().starts_with("aa:bb:cc:dd:ee:ff,0.000102000,"));
        assert_eq!(lines.next().unwrap(), vec!["0"; FRAME_COLUMN_COUNT].join(","));
    }

    #[test]
    fn test_frame_table_reads_reordered_columns() {
        let mut columns: Vec<&str> = column_names().collect();
        columns.reverse();
        let mut values = vec!["0"; FRAME_COLUMN_COUNT];
        values[0] = "96";
        values[FRAME_COLUMN_COUNT - 1] = "aa:aa:aa:aa:aa:aa";
        let csv_text = format!("{}\n{}\n", columns.join(","), values.join(","));

        let table = FrameTable::read_from(csv_text.as_bytes(), Path::new("frames.csv")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.frames[0].bssid(), "aa:aa:aa:aa:aa:aa");
        assert_eq!(table.frames[0].get("data.len"), Some("96"));
    }

    #[test]
    fn test_frame_table_missing_column() {
        let csv_text = "bssid,frame.len\naa:aa:aa:aa:aa:aa,60\n";
        let err = FrameTable::read_from(csv_text.as_bytes(), Path::new("frames.csv")).unwrap_err();
        match err {
            DetectorError::MissingColumn { column, .. } => assert_eq!(column, "frame.time_delta"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_flatten_session_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_captures_dir(dir.path());
        let export = serde_json::to_string(&vec![full_record(), json!({})]).unwrap();
        std::fs::write(dir.path().join("s1.json"), export).unwrap();

        let summary = flatten_session(&config, "s1").unwrap();
        assert_eq!(summary.frames, 1);
        assert_eq!(summary.dropped, 1);

        let table = FrameTable::read_csv(&dir.path().join("s1.csv")).unwrap();
        assert_eq!(table.frames, vec![flatten_record(&full_record())]);
    }

    #[test]
    fn test_flatten_session_missing_export() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_captures_dir(dir.path());

        let err = flatten_session(&config, "absent").unwrap_err();
        assert!(err.is_not_found());
    }
}
