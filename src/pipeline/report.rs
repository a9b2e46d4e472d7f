use std::collections::BTreeMap;
use std::path::Path;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use crate::Result;

pub const STATUS_EVIL_TWINS_FOUND: u8 = 0;
pub const STATUS_CLEAR: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    #[serde(rename = "BSSID")]
    pub bssid: String,
    #[serde(rename = "SSID")]
    pub ssid: String,
}

impl NetworkEntry {
    pub fn new(bssid: impl Into<String>, ssid: impl Into<String>) -> Self {
        Self {
            bssid: bssid.into(),
            ssid: ssid.into(),
        }
    }
}

/// Outcome of a completed classification run, entries in discovery order.
///
/// On the wire each list becomes an object keyed `"1"`, `"2"`, ... and the
/// status is derived from whether any evil twin was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "DetectionWire")]
pub struct Detection {
    evil_twins: Vec<NetworkEntry>,
    normal: Vec<NetworkEntry>,
}

impl Detection {
    pub fn new(evil_twins: Vec<NetworkEntry>, normal: Vec<NetworkEntry>) -> Self {
        Self { evil_twins, normal }
    }

    pub fn status(&self) -> u8 {
        if self.evil_twins.is_empty() {
            STATUS_CLEAR
        } else {
            STATUS_EVIL_TWINS_FOUND
        }
    }

    pub fn has_evil_twins(&self) -> bool {
        !self.evil_twins.is_empty()
    }

    pub fn evil_twins(&self) -> &[NetworkEntry] {
        &self.evil_twins
    }

    pub fn normal(&self) -> &[NetworkEntry] {
        &self.normal
    }
}

struct Indexed<'a>(&'a [NetworkEntry]);

impl Serialize for Indexed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (idx, entry) in self.0.iter().enumerate() {
            map.serialize_entry(&(idx + 1).to_string(), entry)?;
        }
        map.end()
    }
}

impl Serialize for Detection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Detection", 3)?;
        state.serialize_field("status", &self.status())?;
        state.serialize_field("evil_twins", &Indexed(&self.evil_twins))?;
        state.serialize_field("normal", &Indexed(&self.normal))?;
        state.end()
    }
}

#[derive(Deserialize)]
struct DetectionWire {
    status: u8,
    evil_twins: BTreeMap<String, NetworkEntry>,
    normal: BTreeMap<String, NetworkEntry>,
}

fn ordered(map: BTreeMap<String, NetworkEntry>) -> std::result::Result<Vec<NetworkEntry>, String> {
    let mut keyed = map
        .into_iter()
        .map(|(key, entry)| {
            key.parse::<usize>()
                .map(|idx| (idx, entry))
                .map_err(|_| format!("report index '{}' is not a number", key))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    keyed.sort_by_key(|(idx, _)| *idx);
    Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
}

impl TryFrom<DetectionWire> for Detection {
    type Error = String;

    fn try_from(wire: DetectionWire) -> std::result::Result<Self, Self::Error> {
        let detection = Detection::new(ordered(wire.evil_twins)?, ordered(wire.normal)?);
        if detection.status() != wire.status {
            return Err(format!(
                "status {} contradicts {} evil twin entries",
                wire.status,
                detection.evil_twins.len()
            ));
        }
        Ok(detection)
    }
}

/// The persisted result of the classification stage. A failed run carries
/// only the error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EvilTwinReport {
    Completed(Detection),
    Failed { error: String },
}

impl EvilTwinReport {
    pub fn failed(error: impl ToString) -> Self {
        EvilTwinReport::Failed {
            error: error.to_string(),
        }
    }

    pub fn status(&self) -> Option<u8> {
        match self {
            EvilTwinReport::Completed(detection) => Some(detection.status()),
            EvilTwinReport::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            EvilTwinReport::Completed(_) => None,
            EvilTwinReport::Failed { error } => Some(error),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        log::info!("Report written to {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl From<Detection> for EvilTwinReport {
    fn from(detection: Detection) -> Self {
        EvilTwinReport::Completed(detection)
    }
}
