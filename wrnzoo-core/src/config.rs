//! Configuration system for wrnzoo.
//!
//! Uses `figment` for layered configuration: defaults -> user file -> workspace
//! file -> environment -> explicit overrides. Files are read from
//! `~/.config/wrnzoo/config.toml` and `<workspace>/.wrnzoo/config.toml`.

use crate::profile::ParameterSpace;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-workspace configuration directory.
pub const WORKSPACE_CONFIG_DIR: &str = ".wrnzoo";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZooConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub profiling: ProfilingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Project directories. Relative paths resolve against the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,
    #[serde(default = "default_evaluations_dir")]
    pub evaluations_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            datasets_dir: default_datasets_dir(),
            evaluations_dir: default_evaluations_dir(),
        }
    }
}

impl PathsConfig {
    /// Copy with every relative path joined onto `workspace`.
    pub fn resolve(&self, workspace: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                workspace.join(p)
            }
        };
        Self {
            models_dir: join(&self.models_dir),
            datasets_dir: join(&self.datasets_dir),
            evaluations_dir: join(&self.evaluations_dir),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_datasets_dir() -> PathBuf {
    PathBuf::from("datasets")
}

fn default_evaluations_dir() -> PathBuf {
    PathBuf::from("evaluations")
}

/// Batch evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Data-loading workers handed to the inference backend.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Maximum number of models evaluated per run.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// GPU index handed to the inference backend.
    #[serde(default = "default_gpu")]
    pub gpu: u32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            num_workers: default_num_workers(),
            limit: default_limit(),
            gpu: default_gpu(),
        }
    }
}

fn default_batch_size() -> usize {
    1024
}

fn default_num_workers() -> usize {
    10
}

fn default_limit() -> usize {
    5
}

fn default_gpu() -> u32 {
    6
}

/// Architecture profiling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    /// CSV file stem written under the evaluations directory.
    #[serde(default = "default_profile_filename")]
    pub filename: String,
    #[serde(default)]
    pub space: ParameterSpace,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            filename: default_profile_filename(),
            space: ParameterSpace::default(),
        }
    }
}

fn default_profile_filename() -> String {
    "model_profiles_crop32".to_string()
}

/// Validation split sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Samples drawn from each fine class.
    #[serde(default = "default_per_class")]
    pub per_class: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            per_class: default_per_class(),
            seed: default_seed(),
        }
    }
}

fn default_per_class() -> usize {
    200
}

fn default_seed() -> u64 {
    42
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "wrnzoo", "wrnzoo")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides
/// 2. Environment variables (`WRNZOO_EVALUATION__BATCH_SIZE`, ...)
/// 3. Workspace config (`.wrnzoo/config.toml`)
/// 4. User config (`~/.config/wrnzoo/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ZooConfig>,
) -> Result<ZooConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ZooConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("WRNZOO_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Granularity;

    #[test]
    fn test_default_config() {
        let config = ZooConfig::default();
        assert_eq!(config.evaluation.batch_size, 1024);
        assert_eq!(config.evaluation.limit, 5);
        assert_eq!(config.validation.per_class, 200);
        assert_eq!(config.validation.seed, 42);
        assert_eq!(config.profiling.filename, "model_profiles_crop32");
        assert_eq!(config.profiling.space.widths, vec![2, 4, 6, 8, 10]);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = ZooConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: ZooConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ZooConfig = toml::from_str("[evaluation]\nlimit = 50\n").unwrap();
        assert_eq!(config.evaluation.limit, 50);
        assert_eq!(config.evaluation.batch_size, 1024);
        assert_eq!(config.paths.models_dir, PathBuf::from("models"));
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = ZooConfig::default();
        overrides.evaluation.gpu = 0;
        overrides.profiling.filename = "profiles_fine".into();

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.evaluation.gpu, 0);
        assert_eq!(config.profiling.filename, "profiles_fine");
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(WORKSPACE_CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            r#"
[paths]
models_dir = "/srv/wrn/models"

[profiling]
filename = "model_profiles_crop24"

[profiling.space]
granularities = ["coarse", "fine"]
crop_kernel = [[24, 6]]
widths = [8]
depths = [16, 28]
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.paths.models_dir, PathBuf::from("/srv/wrn/models"));
        assert_eq!(config.profiling.space.crop_kernel, vec![(24, 6)]);
        assert_eq!(
            config.profiling.space.granularities,
            vec![Granularity::Coarse, Granularity::Fine]
        );
        assert_eq!(config.profiling.space.len(), 4);
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let mut paths = PathsConfig::default();
        paths.datasets_dir = PathBuf::from("/data/cifar");
        let resolved = paths.resolve(Path::new("/work"));
        assert_eq!(resolved.models_dir, PathBuf::from("/work/models"));
        assert_eq!(resolved.datasets_dir, PathBuf::from("/data/cifar"));
    }
}
