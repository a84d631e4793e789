use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, Result, schema::VesperConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["vesper.toml", "vesper.yaml", "vesper.yml", "vesper.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<VesperConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./vesper.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/vesper/vesper.{toml,yaml,yml,json}` (user-global)
///
/// Returns `VesperConfig::default()` if no config file is found or the one
/// found cannot be parsed.
pub fn discover_and_load() -> VesperConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    VesperConfig::default()
}

/// Returns the user-global config directory (`~/.config/vesper/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "vesper").map(|d| d.config_dir().to_path_buf())
}

/// Render `config` as pretty TOML.
pub fn to_toml_string(config: &VesperConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> Result<VesperConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::unsupported_format(ext)),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::LogFormat, rstest::rstest};

    #[rstest]
    #[case(
        "vesper.toml",
        "[directives]\nhandle_failure_description = \"nope\"\n[logging]\nformat = \"json\"\n"
    )]
    #[case(
        "vesper.yaml",
        "directives:\n  handle_failure_description: nope\nlogging:\n  format: json\n"
    )]
    #[case(
        "vesper.json",
        r#"{"directives":{"handle_failure_description":"nope"},"logging":{"format":"json"}}"#
    )]
    fn loads_each_supported_format(#[case] file_name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(file_name);
        std::fs::write(&path, contents).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.directives.handle_failure_description, "nope");
        assert!(cfg.directives.scrub_turn_on_handle_failure);
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vesper.ini");
        std::fs::write(&path, "").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat { ref extension } if extension == "ini"));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }

    #[test]
    fn toml_output_parses_back() {
        let mut cfg = VesperConfig::default();
        cfg.directives.event_buffer = 8;
        let rendered = to_toml_string(&cfg).unwrap();
        assert!(rendered.contains("event_buffer = 8"));
        let parsed: VesperConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, cfg);
    }
}
