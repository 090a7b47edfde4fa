use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};
use crate::models::{DiscoveryOptions, PipelineOptions, DEFAULT_TABLE};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Load CSV batches into a store and reconcile running statistics against it
#[derive(Parser, Debug, Clone)]
#[command(
    name = "batch-ingest",
    about = "Load CSV batches into a store and reconcile running statistics against it",
    version
)]
pub struct Settings {
    /// Directory holding the regular input files
    #[arg(long, default_value = "/input-process")]
    pub directory: PathBuf,

    /// Validation file, loaded last within the batch
    #[arg(long, default_value = "/input-process/validation.csv")]
    pub validation_file: PathBuf,

    /// SQLite database path (defaults to ~/.batch-ingest/ingest.db)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Table rows are appended to
    #[arg(long, default_value = DEFAULT_TABLE)]
    pub table: String,

    /// Extension of eligible input files
    #[arg(long, default_value = "csv")]
    pub extension: String,

    /// Regular expression; matching file names are not treated as regular inputs
    #[arg(long, default_value = "validation")]
    pub exclude_pattern: String,

    /// Wrap the whole run in one transaction
    #[arg(long)]
    pub atomic: bool,

    /// Exit with an error when reconciliation finds discrepancies
    #[arg(long)]
    pub strict: bool,

    /// Relative tolerance for average/sum comparisons (absolute below 1.0)
    #[arg(long, default_value = "1e-9")]
    pub tolerance: f64,

    /// Report format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// JSON config file (defaults to ~/.batch-ingest/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

// ── ConfigFile ─────────────────────────────────────────────────────────────────

/// Optional JSON config file. Values only apply to flags not given on the
/// command line.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

impl ConfigFile {
    /// `~/.batch-ingest/config.json`.
    pub fn default_path() -> PathBuf {
        app_dir().join("config.json")
    }

    /// Load the config file at `path`.
    ///
    /// A missing file yields the default (empty) config; a file that exists
    /// but does not parse is a configuration error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| IngestError::Config(format!("{}: {}", path.display(), e)))
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments and merge the config file underneath them.
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args_os().collect())
    }

    /// Same as [`Settings::load`] with an explicit argument list.
    pub fn load_from_args(args: Vec<std::ffi::OsString>) -> Result<Self> {
        // Raw ArgMatches are needed to tell CLI values from defaults.
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        let config_path = settings
            .config
            .clone()
            .unwrap_or_else(ConfigFile::default_path);
        let file = ConfigFile::load_from(&config_path)?;
        settings.merge_config(file, &matches);

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Fill every field not set explicitly on the command line from `file`.
    fn merge_config(&mut self, file: ConfigFile, matches: &clap::ArgMatches) {
        // NOTE: clap stores the arg id using the field name (underscores).
        if !is_arg_explicitly_set(matches, "directory") {
            if let Some(v) = file.directory {
                self.directory = v;
            }
        }
        if !is_arg_explicitly_set(matches, "validation_file") {
            if let Some(v) = file.validation_file {
                self.validation_file = v;
            }
        }
        if !is_arg_explicitly_set(matches, "database") && file.database.is_some() {
            self.database = file.database;
        }
        if !is_arg_explicitly_set(matches, "table") {
            if let Some(v) = file.table {
                self.table = v;
            }
        }
        if !is_arg_explicitly_set(matches, "extension") {
            if let Some(v) = file.extension {
                self.extension = v;
            }
        }
        if !is_arg_explicitly_set(matches, "exclude_pattern") {
            if let Some(v) = file.exclude_pattern {
                self.exclude_pattern = v;
            }
        }
        if !is_arg_explicitly_set(matches, "tolerance") {
            if let Some(v) = file.tolerance {
                self.tolerance = v;
            }
        }
    }

    /// Reject values clap cannot check on its own.
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(IngestError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.table.is_empty()
            || !self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(IngestError::Config(format!(
                "table name must be non-empty and contain only [A-Za-z0-9_], got {:?}",
                self.table
            )));
        }
        regex::Regex::new(&self.exclude_pattern).map_err(|e| {
            IngestError::Config(format!(
                "invalid exclude pattern {:?}: {}",
                self.exclude_pattern, e
            ))
        })?;
        Ok(())
    }

    /// Database path, falling back to `~/.batch-ingest/ingest.db`.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| app_dir().join("ingest.db"))
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            extension: self.extension.trim_start_matches('.').to_string(),
            exclude_pattern: self.exclude_pattern.clone(),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            table: self.table.clone(),
            atomic: self.atomic,
            discovery: self.discovery_options(),
        }
    }
}

/// `~/.batch-ingest`, the home for the default database, config and logs.
pub fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".batch-ingest")
}

// ── Helper: check if an arg was explicitly set on the command line ─────────────

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn args(list: &[&str]) -> Vec<std::ffi::OsString> {
        list.iter().map(|s| s.into()).collect()
    }

    /// Args pointing `--config` into `tmp` so the real home is never read.
    fn args_with_config(tmp: &TempDir, extra: &[&str]) -> Vec<std::ffi::OsString> {
        let config = tmp.path().join("config.json");
        let mut all = vec![
            "batch-ingest".to_string(),
            "--config".to_string(),
            config.to_string_lossy().to_string(),
        ];
        all.extend(extra.iter().map(|s| s.to_string()));
        all.into_iter().map(Into::into).collect()
    }

    fn write_config(path: &Path, file: &ConfigFile) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("config dir");
        std::fs::write(path, serde_json::to_string_pretty(file).expect("json")).expect("write");
    }

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["batch-ingest"]);

        assert_eq!(settings.directory, PathBuf::from("/input-process"));
        assert_eq!(
            settings.validation_file,
            PathBuf::from("/input-process/validation.csv")
        );
        assert!(settings.database.is_none());
        assert_eq!(settings.table, "transaction_data");
        assert_eq!(settings.extension, "csv");
        assert_eq!(settings.exclude_pattern, "validation");
        assert!(!settings.atomic);
        assert!(!settings.strict);
        assert!((settings.tolerance - 1e-9).abs() < f64::EPSILON);
        assert_eq!(settings.format, "text");
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.log_file.is_none());
        assert!(!settings.debug);
    }

    #[test]
    fn test_settings_cli_paths() {
        let settings = Settings::parse_from(args(&[
            "batch-ingest",
            "--directory",
            "/data/in",
            "--validation-file",
            "/data/check.csv",
            "--database",
            "/tmp/x.db",
        ]));
        assert_eq!(settings.directory, PathBuf::from("/data/in"));
        assert_eq!(settings.validation_file, PathBuf::from("/data/check.csv"));
        assert_eq!(settings.database_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_database_path_default_under_app_dir() {
        let settings = Settings::parse_from(["batch-ingest"]);
        let path = settings.database_path();
        assert!(path.ends_with(".batch-ingest/ingest.db"));
    }

    // ── ConfigFile ────────────────────────────────────────────────────────────

    #[test]
    fn test_config_file_missing_is_default() {
        let tmp = TempDir::new().expect("tempdir");
        let loaded = ConfigFile::load_from(&tmp.path().join("none.json")).expect("load");
        assert_eq!(loaded, ConfigFile::default());
    }

    #[test]
    fn test_config_file_round_trips_through_json() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("nested").join("config.json");
        let file = ConfigFile {
            directory: Some(PathBuf::from("/srv/in")),
            table: Some("prices".to_string()),
            tolerance: Some(0.5),
            ..Default::default()
        };
        write_config(&path, &file);
        assert_eq!(ConfigFile::load_from(&path).expect("load"), file);
    }

    #[test]
    fn test_config_file_garbage_is_config_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_config_file_unknown_key_is_config_error() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("config.json");
        std::fs::write(&path, r#"{"directroy": "/typo"}"#).unwrap();
        assert!(ConfigFile::load_from(&path).is_err());
    }

    // ── load_from_args ────────────────────────────────────────────────────────

    #[test]
    fn test_load_merges_config_file() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(
            &tmp.path().join("config.json"),
            &ConfigFile {
                directory: Some(PathBuf::from("/from/config")),
                exclude_pattern: Some("^check_".to_string()),
                ..Default::default()
            },
        );

        let settings = Settings::load_from_args(args_with_config(&tmp, &[])).expect("load");
        assert_eq!(settings.directory, PathBuf::from("/from/config"));
        assert_eq!(settings.exclude_pattern, "^check_");
        // Untouched by the file.
        assert_eq!(settings.table, "transaction_data");
    }

    #[test]
    fn test_load_cli_overrides_config_file() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(
            &tmp.path().join("config.json"),
            &ConfigFile {
                directory: Some(PathBuf::from("/from/config")),
                table: Some("from_config".to_string()),
                ..Default::default()
            },
        );

        let settings = Settings::load_from_args(args_with_config(
            &tmp,
            &["--directory", "/from/cli", "--table", "from_cli"],
        ))
        .expect("load");
        assert_eq!(settings.directory, PathBuf::from("/from/cli"));
        assert_eq!(settings.table, "from_cli");
    }

    #[test]
    fn test_load_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings =
            Settings::load_from_args(args_with_config(&tmp, &["--debug"])).expect("load");
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_rejects_bad_exclude_pattern() {
        let tmp = TempDir::new().expect("tempdir");
        let err = Settings::load_from_args(args_with_config(&tmp, &["--exclude-pattern", "("]))
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_load_rejects_negative_tolerance() {
        let tmp = TempDir::new().expect("tempdir");
        write_config(
            &tmp.path().join("config.json"),
            &ConfigFile {
                tolerance: Some(-1.0),
                ..Default::default()
            },
        );
        let err = Settings::load_from_args(args_with_config(&tmp, &[])).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_tolerance_help_describes_relative_scaling() {
        let cmd = Settings::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "tolerance")
            .expect("tolerance arg");
        let help = arg.get_help().expect("help").to_string();
        assert!(help.starts_with("Relative tolerance"), "{help}");
        assert!(help.contains("absolute below 1.0"), "{help}");
    }

    #[test]
    fn test_validate_rejects_unsafe_table_name() {
        let mut settings = Settings::parse_from(["batch-ingest"]);
        settings.table = "data; DROP TABLE x".to_string();
        assert!(matches!(settings.validate(), Err(IngestError::Config(_))));
    }

    // ── option projections ────────────────────────────────────────────────────

    #[test]
    fn test_pipeline_options_projection() {
        let settings = Settings::parse_from(args(&[
            "batch-ingest",
            "--atomic",
            "--extension",
            ".tsv",
            "--table",
            "prices",
        ]));
        let opts = settings.pipeline_options();
        assert!(opts.atomic);
        assert_eq!(opts.table, "prices");
        assert_eq!(opts.discovery.extension, "tsv");
        assert_eq!(opts.discovery.exclude_pattern, "validation");
    }
}
