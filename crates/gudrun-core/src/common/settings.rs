use crate::domain::{GudrunError, GudrunResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSettings {
    pub engine: PathBuf,
    pub engine_args: Vec<String>,
    pub output_root: PathBuf,
    pub output_name: String,
    pub input_file_name: String,
    pub overwrite: bool,
    pub barrier_timeout_ms: u64,
    pub barrier_poll_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            engine: PathBuf::from("gudrun_dcs"),
            engine_args: Vec::new(),
            output_root: PathBuf::from("."),
            output_name: "Gudrun".to_string(),
            input_file_name: "gudpy.txt".to_string(),
            overwrite: true,
            barrier_timeout_ms: 10_000,
            barrier_poll_ms: 25,
        }
    }
}

impl RunSettings {
    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    pub fn barrier_poll(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_ms.max(1))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(&self.output_name)
    }
}

pub fn load_run_settings(path: impl AsRef<Path>) -> GudrunResult<RunSettings> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|source| GudrunError::Settings {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;
    serde_json::from_str(&source).map_err(|source| GudrunError::Settings {
        path: path.to_path_buf(),
        message: source.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{RunSettings, load_run_settings};
    use crate::domain::GudrunError;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "engine": "/opt/gudrun/bin/gudrun_dcs", "overwrite": false, "barrierTimeoutMs": 500 }"#,
        )
        .expect("settings should be written");

        let settings = load_run_settings(&path).expect("settings should load");
        assert_eq!(settings.engine, PathBuf::from("/opt/gudrun/bin/gudrun_dcs"));
        assert!(!settings.overwrite);
        assert_eq!(settings.barrier_timeout_ms, 500);
        assert_eq!(settings.input_file_name, RunSettings::default().input_file_name);
        assert_eq!(settings.output_dir(), PathBuf::from("./Gudrun"));
    }

    #[test]
    fn malformed_settings_report_the_path() {
        let temp = TempDir::new().expect("tempdir should be created");
        let path = temp.path().join("settings.json");
        fs::write(&path, "{ engine: ").expect("settings should be written");

        let error = load_run_settings(&path).expect_err("malformed settings should fail");
        assert!(matches!(error, GudrunError::Settings { .. }));
        assert_eq!(error.exit_code(), 2);
    }
}
