// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_DETERMINISM_ITERATIONS, DEFAULT_FUEL_LEVEL, DEFAULT_MAX_DIFF_CELLS,
    DEFAULT_MODULE_PATH, MAX_DETERMINISM_ITERATIONS, MAX_FUEL_LEVEL, MAX_MODULE_BYTES,
    MIN_FUEL_LEVEL,
};
use crate::errors::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration for contract-lab.
///
/// Every section is optional; missing values fall back to the constants in
/// [`crate::config::consts`].
///
/// # Example
/// ```yaml
/// engine:
///   module_path: dist/icl_runtime_bg.wasm
///   fuel: 100000000
/// determinism:
///   default_iterations: 25
/// diff:
///   max_cells: 1000000
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub determinism: DeterminismConfig,
    #[serde(default)]
    pub diff: DiffConfig,
}

/// Where the engine binary lives and how much each call may spend.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub module_path: Option<PathBuf>,
    pub fuel: Option<u64>,
    pub max_module_bytes: Option<usize>,
}

impl EngineConfig {
    pub fn module_path(&self) -> PathBuf {
        self.module_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODULE_PATH))
    }

    /// Fuel per bridge call, clamped to `[MIN_FUEL_LEVEL, MAX_FUEL_LEVEL]`.
    ///
    /// # Example
    /// ```
    /// use contract_lab::config::EngineConfig;
    ///
    /// let config = EngineConfig {
    ///     fuel: Some(1_000_000_000),
    ///     ..Default::default()
    /// };
    /// assert_eq!(config.fuel(), 500_000_000);
    /// ```
    pub fn fuel(&self) -> u64 {
        let requested = self.fuel.unwrap_or(DEFAULT_FUEL_LEVEL);
        let clamped = requested.clamp(MIN_FUEL_LEVEL, MAX_FUEL_LEVEL);
        if clamped != requested {
            tracing::warn!(requested, clamped, "Configured fuel level out of bounds; clamped");
        }
        clamped
    }

    pub fn max_module_bytes(&self) -> usize {
        self.max_module_bytes.unwrap_or(MAX_MODULE_BYTES)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeterminismConfig {
    pub default_iterations: Option<usize>,
    pub max_iterations: Option<usize>,
}

impl DeterminismConfig {
    pub fn default_iterations(&self) -> usize {
        self.default_iterations
            .unwrap_or(DEFAULT_DETERMINISM_ITERATIONS)
    }

    /// Configured ceiling, never above [`MAX_DETERMINISM_ITERATIONS`].
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
            .map_or(MAX_DETERMINISM_ITERATIONS, |max| max.min(MAX_DETERMINISM_ITERATIONS))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiffConfig {
    pub max_cells: Option<usize>,
}

impl DiffConfig {
    pub fn max_cells(&self) -> usize {
        self.max_cells.unwrap_or(DEFAULT_MAX_DIFF_CELLS)
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(max) = self.determinism.max_iterations {
            if max == 0 || max > MAX_DETERMINISM_ITERATIONS {
                return Err(ConfigError::Invalid(format!(
                    "determinism.max_iterations must be within 1..={}, got {}",
                    MAX_DETERMINISM_ITERATIONS, max
                )));
            }
        }
        let max = self.determinism.max_iterations();
        let default = self.determinism.default_iterations();
        if default == 0 || default > max {
            return Err(ConfigError::Invalid(format!(
                "determinism.default_iterations must be within 1..={}, got {}",
                max, default
            )));
        }
        if self.diff.max_cells() == 0 {
            return Err(ConfigError::Invalid(
                "diff.max_cells must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate a config from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: Config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_full_config() {
        let file = write_config(
            r#"
engine:
  module_path: dist/engine.wasm
  fuel: 2000000
determinism:
  default_iterations: 25
  max_iterations: 100
diff:
  max_cells: 5000
"#,
        );

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.engine.module_path(), PathBuf::from("dist/engine.wasm"));
        assert_eq!(cfg.engine.fuel(), 2_000_000);
        assert_eq!(cfg.determinism.default_iterations(), 25);
        assert_eq!(cfg.determinism.max_iterations(), 100);
        assert_eq!(cfg.diff.max_cells(), 5000);
    }

    #[test]
    fn empty_sections_use_defaults() {
        let file = write_config("engine: {}\n");

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.engine.module_path(), PathBuf::from(DEFAULT_MODULE_PATH));
        assert_eq!(cfg.engine.fuel(), DEFAULT_FUEL_LEVEL);
        assert_eq!(cfg.determinism.default_iterations(), DEFAULT_DETERMINISM_ITERATIONS);
        assert_eq!(cfg.diff.max_cells(), DEFAULT_MAX_DIFF_CELLS);
    }

    #[test]
    fn fuel_is_clamped_to_bounds() {
        let low = EngineConfig {
            fuel: Some(10),
            ..Default::default()
        };
        assert_eq!(low.fuel(), MIN_FUEL_LEVEL);

        let high = EngineConfig {
            fuel: Some(u64::MAX),
            ..Default::default()
        };
        assert_eq!(high.fuel(), MAX_FUEL_LEVEL);
    }

    #[test]
    fn default_iterations_above_max_is_rejected() {
        let file = write_config(
            r#"
determinism:
  default_iterations: 50
  max_iterations: 10
"#,
        );

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("default_iterations"));
    }

    #[test]
    fn iteration_ceiling_cannot_be_lifted() {
        let file = write_config("determinism:\n  max_iterations: 1000000000\n");

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("max_iterations must be within 1..=1000"));

        let built = DeterminismConfig {
            max_iterations: Some(1_000_000_000),
            ..Default::default()
        };
        assert_eq!(built.max_iterations(), MAX_DETERMINISM_ITERATIONS);
    }

    #[test]
    fn zero_iteration_ceiling_is_rejected() {
        let file = write_config("determinism:\n  max_iterations: 0\n");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config("engine:\n  modul_path: typo.wasm\n");

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config("/nonexistent/contract-lab.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/contract-lab.yaml"));
    }
}
