// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of RoomClimate.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use roomclimate_types::{ConfigError, WidgetConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Searched in order when no `--config` is given
const DEFAULT_LOCATIONS: [&str; 3] = ["/data/options.json", "config.toml", "config.json"];

/// Load, apply environment overrides and validate
pub fn load_config(explicit: Option<&Path>) -> Result<WidgetConfig> {
    let mut config = match explicit {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config = parse_config(path, &contents)?;
            info!("✅ Loaded configuration from {}", path.display());
            config
        }
        None => {
            let candidates: Vec<PathBuf> = DEFAULT_LOCATIONS.iter().map(PathBuf::from).collect();
            load_first(&candidates)?
        }
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// First readable file of `candidates`
fn load_first(candidates: &[PathBuf]) -> Result<WidgetConfig> {
    for path in candidates {
        if let Ok(contents) = std::fs::read_to_string(path) {
            let config = parse_config(path, &contents)?;
            info!("✅ Loaded configuration from {}", path.display());
            return Ok(config);
        }
    }
    let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    bail!("No configuration found (tried {})", tried.join(", "))
}

/// TOML for `.toml` files, JSON otherwise
fn parse_config(path: &Path, contents: &str) -> Result<WidgetConfig> {
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        toml::from_str(contents).with_context(|| format!("Failed to parse {}", path.display()))
    } else {
        serde_json::from_str(contents).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn apply_env_overrides(config: &mut WidgetConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env("HA_BASE_URL") {
        config.home_assistant.base_url = Some(url);
    }
    if let Some(token) = env("HA_TOKEN") {
        config.home_assistant.token = Some(token);
    }
    if let Some(tz) = env("ROOMCLIMATE_TIMEZONE") {
        config.timezone = Some(tz);
    }
}

fn validate(config: &WidgetConfig) -> Result<()> {
    let result = config.validate_detailed();
    for warning in &result.warnings {
        warn!("⚠️ Config: {}", warning);
    }
    if result.has_errors() {
        return Err(ConfigError::Invalid(result).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const TOML_CONFIG: &str = r#"
timezone = "Europe/Prague"

[[rooms]]
id = "living"
name = "Living room"

[entities.living]
temperature = "sensor.living_temperature"
humidity = "sensor.living_humidity"
"#;

    const JSON_CONFIG: &str = r#"{
        "rooms": [{"id": "bedroom", "room-data_font_size_round": "12, 2"}],
        "entities": {"bedroom": {"temperature": "sensor.bedroom_temperature"}},
        "prefetch_on_day_change": false
    }"#;

    #[test]
    fn test_first_existing_candidate_wins() {
        let dir = TempDir::new().unwrap();
        let toml_path = dir.path().join("config.toml");
        let json_path = dir.path().join("config.json");
        std::fs::write(&toml_path, TOML_CONFIG).unwrap();
        std::fs::write(&json_path, JSON_CONFIG).unwrap();

        let candidates = vec![dir.path().join("options.json"), toml_path, json_path.clone()];
        let config = load_first(&candidates).unwrap();
        assert_eq!(config.rooms[0].display_name(), "Living room");
        assert_eq!(config.timezone.as_deref(), Some("Europe/Prague"));

        let config = load_first(&[json_path]).unwrap();
        assert_eq!(config.rooms[0].id.as_str(), "bedroom");
        assert!(!config.prefetch_on_day_change);
        assert_eq!(config.rooms[0].display_precision().decimal_places, 2);
    }

    #[test]
    fn test_missing_everywhere_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_first(&[dir.path().join("config.toml")]).unwrap_err();
        assert!(err.to_string().contains("No configuration found"));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "rooms = 3").unwrap();

        let err = load_first(std::slice::from_ref(&path)).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_explicit_path_is_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("widget.json");
        std::fs::write(&path, r#"{"rooms": []}"#).unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_env_overrides() {
        let mut config: WidgetConfig = toml::from_str(TOML_CONFIG).unwrap();
        let env: HashMap<&str, &str> = [
            ("HA_BASE_URL", "http://ha.local:8123"),
            ("HA_TOKEN", "secret"),
            ("ROOMCLIMATE_TIMEZONE", "UTC"),
        ]
        .into_iter()
        .collect();

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| (*v).to_owned()));

        assert_eq!(
            config.home_assistant.base_url.as_deref(),
            Some("http://ha.local:8123")
        );
        assert_eq!(config.home_assistant.token.as_deref(), Some("secret"));
        assert_eq!(config.timezone.as_deref(), Some("UTC"));
        assert!(validate(&config).is_ok());
    }
}
