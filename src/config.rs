use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::Result;
use crate::utils::validate_session_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub flatten: FlattenConfig,
    pub detection: DetectionConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub captures_dir: PathBuf,
    pub model_path: PathBuf,
    pub report_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlattenConfig {
    pub drop_incomplete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub frame_subtypes: Vec<String>,
    pub evil_twin_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Files belonging to one capture session, all under the captures directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub capture_json: PathBuf,
    pub frames_csv: PathBuf,
    pub directory_csv: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig {
                captures_dir: PathBuf::from("./Captures"),
                model_path: PathBuf::from("./Model/random_forest_model.json"),
                report_file: PathBuf::from("flask_api.json"),
            },
            flatten: FlattenConfig {
                drop_incomplete: true,
            },
            detection: DetectionConfig {
                frame_subtypes: vec!["0x0008".to_string(), "0x0005".to_string()],
                evil_twin_label: crate::model::EVIL_TWIN_LABEL.to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn with_captures_dir(captures_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.captures_dir = captures_dir.into();
        config
    }

    pub fn session_paths(&self, session: &str) -> Result<SessionPaths> {
        validate_session_id(session)?;
        let dir = &self.paths.captures_dir;

        Ok(SessionPaths {
            capture_json: dir.join(format!("{}.json", session)),
            frames_csv: dir.join(format!("{}.csv", session)),
            directory_csv: dir.join(format!("{}_airodump.csv", session)),
        })
    }

    pub fn report_path(&self) -> PathBuf {
        resolve_under(&self.paths.captures_dir, &self.paths.report_file)
    }
}

fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
