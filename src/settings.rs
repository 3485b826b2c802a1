use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::mapping::{DuplicatePolicy, MappingConfig};

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Settings {
        Settings {
            setup: PathBuf::from("config/setup.toml"),
            top_model: "world".to_string(),
            mapping: MappingConfig::default(),
            output: None,
            format: OutputFormat::Text,
            parallel: false,
            log_level: "info".to_string(),
            source: None,
        }
    }

    #[test]
    fn default_config_file_loads() {
        let settings = load_default_config().unwrap();
        assert_eq!(settings.top_model, "world");
        assert_eq!(settings.mapping.max_depth, 1000);
        assert!(settings.mapping.world_mapping);
        assert_eq!(settings.mapping.duplicates, DuplicatePolicy::Strict);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(validate_config(&base()).is_ok());

        let mut empty_top = base();
        empty_top.top_model = "  ".to_string();
        assert!(validate_config(&empty_top).is_err());

        let mut unlimited = base();
        unlimited.mapping.max_depth = 0;
        assert!(validate_config(&unlimited).is_ok());

        let mut both_lists = base();
        both_lists.mapping.only_categories = vec!["a".to_string()];
        both_lists.mapping.excluded_categories = vec!["b".to_string()];
        assert!(validate_config(&both_lists).is_err());
    }

    #[test]
    fn chosen_configuration_file_is_recorded() {
        let root = retrieve_project_root().unwrap();
        let path = root.join("config/default.toml");
        let args = CliArgs::parse_from(["geomap", "--config", path.to_str().unwrap()]);
        let settings = load_config_with_args(args).unwrap();
        assert_eq!(settings.source, Some(path));
        assert!(settings.to_string().contains("default.toml"));
        assert!(load_default_config().unwrap().source.is_none());
    }

    #[test]
    fn cli_overrides() {
        let args = CliArgs::parse_from([
            "geomap",
            "--top",
            "detector",
            "--max-depth",
            "3",
            "--no-world",
            "--overwrite",
            "--format",
            "json",
            "--parallel",
            "--only",
            "module",
            "column",
        ]);
        let mut settings = base();
        apply_overrides(&mut settings, args);
        assert_eq!(settings.top_model, "detector");
        assert_eq!(settings.mapping.max_depth, 3);
        assert!(!settings.mapping.world_mapping);
        assert_eq!(settings.mapping.duplicates, DuplicatePolicy::Overwrite);
        assert_eq!(settings.format, OutputFormat::Json);
        assert!(settings.parallel);
        assert_eq!(settings.mapping.only_categories, vec!["module", "column"]);
    }
}

/// Output format of the geometry map dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    /// Setup file holding the category schema and the volumes. Relative paths
    /// are resolved against the project root.
    pub setup: PathBuf,
    #[serde(default = "default_top_model")]
    pub top_model: String,
    #[serde(default)]
    pub mapping: MappingConfig,
    /// Dump destination, standard output when unset.
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
    /// Walk the top level branches on the rayon pool.
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Configuration file the settings were read from.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

fn default_top_model() -> String {
    "world".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// The setup path, resolved against the project root when relative.
    pub fn setup_path(&self) -> Result<PathBuf> {
        if self.setup.is_absolute() {
            Ok(self.setup.clone())
        } else {
            Ok(retrieve_project_root()?.join(&self.setup))
        }
    }
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let default_config_file = root.join("config/default.toml");

    let settings: Config = Config::builder()
        .add_source(File::from(default_config_file).required(true))
        .build()
        .context("error loading configuration")?;

    let config: Settings = settings
        .try_deserialize()
        .context("error deserializing configuration")?;

    validate_config(&config)?;

    Ok(config)
}

pub fn load_config() -> Result<Settings> {
    load_config_with_args(CliArgs::parse())
}

pub fn load_config_with_args(args: CliArgs) -> Result<Settings> {
    let root = retrieve_project_root()?;

    let default_config_file = root.join("config/default.toml");
    let local_config = root.join("config/local.toml");

    // Check if local config exists, if not use default
    let config_file = if let Some(path) = &args.config {
        path.clone()
    } else if local_config.exists() {
        local_config
    } else {
        default_config_file
    };
    let settings: Config = Config::builder()
        .add_source(File::from(config_file.clone()).required(true))
        .add_source(Environment::with_prefix("geomap").separator("__"))
        .build()
        .context("error loading configuration")?;

    let mut config: Settings = settings
        .try_deserialize()
        .context("error deserializing configuration")?;

    config.source = Some(config_file);
    apply_overrides(&mut config, args);

    validate_config(&config)?;

    Ok(config)
}

/// Command line values take precedence over the configuration files.
fn apply_overrides(config: &mut Settings, args: CliArgs) {
    if let Some(setup) = args.setup {
        config.setup = setup;
    }
    if let Some(top) = args.top {
        config.top_model = top;
    }
    if let Some(depth) = args.max_depth {
        config.mapping.max_depth = depth;
    }
    if args.no_world {
        config.mapping.world_mapping = false;
    }
    if let Some(only) = args.only {
        config.mapping.only_categories = only;
    }
    if let Some(excluded) = args.exclude {
        config.mapping.excluded_categories = excluded;
    }
    if args.overwrite {
        config.mapping.duplicates = DuplicatePolicy::Overwrite;
    }
    if let Some(output) = args.output {
        config.output = Some(output);
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if args.parallel {
        config.parallel = true;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the GEOMAP_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
pub fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        // When running through cargo (e.g. cargo run, cargo test)
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("GEOMAP_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }
    let exe_path = env::current_exe().context("failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("could not find project root directory"))
}

pub fn validate_config(config: &Settings) -> Result<()> {
    if config.top_model.trim().is_empty() {
        bail!("top model name must not be empty");
    }
    config
        .mapping
        .validate()
        .context("invalid mapping configuration")?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about = "geomap - geometry ID mapping")]
pub struct CliArgs {
    /// Configuration file to use instead of config/local.toml or config/default.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Setup file with the category schema and the volumes.
    #[arg(short, long)]
    setup: Option<PathBuf>,

    /// Name of the model the mapping starts from.
    #[arg(short, long)]
    top: Option<String>,

    /// Deepest level whose daughters are still mapped, 0 for no limit.
    #[arg(long)]
    max_depth: Option<usize>,

    /// Do not insert the world entry in the map.
    #[arg(long)]
    no_world: bool,

    /// Only map these categories, separated by spaces.
    #[arg(long, num_args = 1.., value_delimiter = ' ', group = "categories")]
    only: Option<Vec<String>>,

    /// Map every category except these, separated by spaces.
    #[arg(long, num_args = 1.., value_delimiter = ' ', group = "categories")]
    exclude: Option<Vec<String>>,

    /// Replace duplicate IDs instead of failing.
    #[arg(long)]
    overwrite: bool,

    /// File the map is written to. Defaults to standard output.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Walk top level branches in parallel.
    #[arg(short, long)]
    parallel: bool,

    /// Log filter, e.g. `info` or `geomap=debug`. RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<String>,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Configuration: {:?}
  - Setup: {:?}
  - Top Model: {}
  - Max Depth: {}
  - World Mapping: {}
  - Only Categories: {:?}
  - Excluded Categories: {:?}
  - Duplicates: {:?}
  - Output: {:?}
  - Format: {:?}
  - Parallel: {}
  ",
            self.source,
            self.setup,
            self.top_model,
            self.mapping.max_depth,
            self.mapping.world_mapping,
            self.mapping.only_categories,
            self.mapping.excluded_categories,
            self.mapping.duplicates,
            self.output,
            self.format,
            self.parallel,
        )
    }
}
