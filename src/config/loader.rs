use miette::{IntoDiagnostic, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for a shrinker run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program class directories, shrunk and rewritten
    pub program: Vec<PathBuf>,

    /// Library class directories, read only
    pub libraries: Vec<PathBuf>,

    /// Output directory for the shrunk classes
    pub output: PathBuf,

    /// Directory holding the graph snapshot for incremental runs
    pub state_dir: Option<PathBuf>,

    /// ProGuard configuration files
    pub keep_rules: Vec<PathBuf>,

    /// Inline ProGuard rules
    pub rules: Vec<String>,

    /// ProGuard configuration files for the main-dex list
    pub main_dex_rules: Vec<PathBuf>,

    /// Wildcard patterns on class-file paths to skip
    pub exclude: Vec<String>,

    /// Report configuration
    pub report: ReportConfig,

    /// Shrinker options
    pub shrinker: ShrinkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Output format: terminal, json
    pub format: String,

    /// Write a ProGuard usage.txt listing removed code
    pub usage: Option<PathBuf>,

    /// Write the main-dex class list
    pub main_dex_list: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShrinkerConfig {
    /// Reuse the previous graph when only method bodies changed
    pub incremental: bool,

    /// Never record `java/` and platform `android/` classes as dependencies
    pub ignore_sdk_packages: bool,

    /// Worker threads; 0 uses one per core
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: vec![],
            libraries: vec![],
            output: PathBuf::from("shrunk"),
            state_dir: None,
            keep_rules: vec![],
            rules: vec![],
            main_dex_rules: vec![],
            exclude: vec![],
            report: ReportConfig::default(),
            shrinker: ShrinkerConfig::default(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: "terminal".to_string(),
            usage: None,
            main_dex_list: None,
        }
    }
}

impl Default for ShrinkerConfig {
    fn default() -> Self {
        Self {
            incremental: false,
            ignore_sdk_packages: true,
            threads: 0,
        }
    }
}

impl Config {
    /// Load configuration from a file (YAML or TOML)
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match extension {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse YAML config"),
            "toml" => toml::from_str(&contents)
                .into_diagnostic()
                .wrap_err("Failed to parse TOML config"),
            _ => {
                // Try YAML first, then TOML
                if let Ok(config) = serde_yaml::from_str(&contents) {
                    Ok(config)
                } else {
                    toml::from_str(&contents)
                        .into_diagnostic()
                        .wrap_err("Failed to parse config file")
                }
            }
        }
    }

    /// Try to load configuration from default locations
    pub fn from_default_locations(project_root: &Path) -> Result<Self> {
        let default_names = [
            ".shrinker.yml",
            ".shrinker.yaml",
            ".shrinker.toml",
            "shrinker.yml",
            "shrinker.yaml",
            "shrinker.toml",
        ];

        for name in &default_names {
            let path = project_root.join(name);
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// State directory, defaulting to a hidden directory next to the output
    pub fn state_directory(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            let name = self
                .output
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "shrunk".to_string());
            self.output.with_file_name(format!(".{}-state", name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.shrinker.ignore_sdk_packages);
        assert!(!config.shrinker.incremental);
        assert_eq!(config.report.format, "terminal");
    }

    #[test]
    fn test_yaml_config_keeps_defaults_for_missing_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shrinker.yml");
        std::fs::write(
            &path,
            "program: [build/classes]\nrules:\n  - \"-keep class com.example.Main\"\nshrinker:\n  incremental: true\n",
        )
        .unwrap();

        let config = Config::from_default_locations(temp.path()).unwrap();
        assert_eq!(config.program, vec![PathBuf::from("build/classes")]);
        assert_eq!(config.rules.len(), 1);
        assert!(config.shrinker.incremental);
        assert!(config.shrinker.ignore_sdk_packages);
        assert_eq!(config.output, PathBuf::from("shrunk"));
    }

    #[test]
    fn test_toml_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shrinker.toml");
        std::fs::write(
            &path,
            "output = \"out\"\nlibraries = [\"sdk\"]\n\n[shrinker]\nthreads = 4\nignore_sdk_packages = false\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.output, PathBuf::from("out"));
        assert_eq!(config.libraries, vec![PathBuf::from("sdk")]);
        assert_eq!(config.shrinker.threads, 4);
        assert!(!config.shrinker.ignore_sdk_packages);
    }

    #[test]
    fn test_state_dir_defaults_next_to_output() {
        let config = Config {
            output: PathBuf::from("build/shrunk"),
            ..Config::default()
        };
        assert_eq!(config.state_directory(), PathBuf::from("build/.shrunk-state"));
    }
}
