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

//! Widget configuration, normalized into strong types at load time.
//!
//! The card configuration historically accepted several shapes for the same
//! option (a bare number, a `"40, 2"` string or a `[40, 2]` list for the room
//! data size/precision). Those are accepted by serde here and collapsed into
//! [`DisplayPrecision`] once, so the engine never sniffs types.

use crate::sensor::{Quantity, ResolvedValue, RoomId, SensorBinding};
use crate::validation::ValidationResult;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Configuration load errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(ValidationResult),
}

const DEFAULT_DECIMAL_PLACES: u8 = 1;
const MAX_DECIMAL_PLACES: u8 = 3;

fn default_true() -> bool {
    true
}

fn default_chart_days() -> u32 {
    1
}

fn default_live_poll_secs() -> u64 {
    5
}

/// Top-level widget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    /// Rooms drawn on the floor plan
    pub rooms: Vec<RoomConfig>,

    /// Sensor entities per room id
    #[serde(default)]
    pub entities: BTreeMap<RoomId, SensorBinding>,

    /// IANA timezone used for the day grid; falls back to the HA timezone, then UTC
    #[serde(default)]
    pub timezone: Option<String>,

    /// Start a full-day prefetch whenever the selected day changes
    #[serde(default = "default_true")]
    pub prefetch_on_day_change: bool,

    /// Days of history returned by room series queries
    #[serde(default = "default_chart_days")]
    pub chart_history_days: u32,

    #[serde(default)]
    pub home_assistant: HaConnectionConfig,
}

/// One room of the floor plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub id: RoomId,

    #[serde(default)]
    pub name: Option<String>,

    /// Accepts the card's `room-data_font_size_round` key as well
    #[serde(default, alias = "room-data_font_size_round")]
    pub precision: Option<PrecisionSetting>,
}

impl RoomConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn display_precision(&self) -> DisplayPrecision {
        self.precision
            .as_ref()
            .map(DisplayPrecision::from)
            .unwrap_or_default()
    }
}

/// Home Assistant connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaConnectionConfig {
    /// Base URL, e.g. http://homeassistant.local:8123
    #[serde(default)]
    pub base_url: Option<String>,

    /// Long-lived access token (prefer HA_TOKEN / SUPERVISOR_TOKEN)
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// How often the live state snapshot is refreshed from HA
    #[serde(default = "default_live_poll_secs")]
    pub live_poll_secs: u64,
}

impl Default for HaConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            live_poll_secs: default_live_poll_secs(),
        }
    }
}

/// Raw shapes accepted for the room size/precision option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrecisionSetting {
    /// Bare number: font size only, precision stays at the default
    Number(f64),
    /// `"40, 2"` or `"40 2"`
    Text(String),
    /// `[40, 2]`
    List(Vec<PrecisionPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrecisionPart {
    Number(f64),
    Text(String),
}

impl PrecisionPart {
    fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            Self::Number(_) => None,
            Self::Text(s) => leading_integer(s),
        }
    }
}

/// Decimal places used when rendering a room value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayPrecision {
    pub decimal_places: u8,
}

impl Default for DisplayPrecision {
    fn default() -> Self {
        Self {
            decimal_places: DEFAULT_DECIMAL_PLACES,
        }
    }
}

impl DisplayPrecision {
    fn from_places(places: Option<i64>) -> Self {
        let decimal_places = places
            .map(|p| p.clamp(0, i64::from(MAX_DECIMAL_PLACES)) as u8)
            .unwrap_or(DEFAULT_DECIMAL_PLACES);
        Self { decimal_places }
    }

    /// Render a value with unit, `--` for missing data
    pub fn format(&self, value: ResolvedValue, quantity: Quantity) -> String {
        match value {
            Some(v) if self.decimal_places == 0 => format!("{}{}", v.round(), quantity.unit()),
            Some(v) => format!(
                "{:.*}{}",
                usize::from(self.decimal_places),
                v,
                quantity.unit()
            ),
            None => format!("--{}", quantity.unit()),
        }
    }
}

impl From<&PrecisionSetting> for DisplayPrecision {
    fn from(setting: &PrecisionSetting) -> Self {
        match setting {
            PrecisionSetting::Number(_) => Self::default(),
            PrecisionSetting::Text(text) => {
                let parts: Vec<&str> = text
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|p| !p.is_empty())
                    .collect();
                Self::from_places(parts.get(1).and_then(|p| leading_integer(p)))
            }
            PrecisionSetting::List(parts) => {
                Self::from_places(parts.get(1).and_then(PrecisionPart::as_integer))
            }
        }
    }
}

/// Integer prefix of a string ("2px" -> 2), None when there is none
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text.get(..end).and_then(|s| s.parse().ok())
}

impl WidgetConfig {
    /// Sensor binding for a room (empty binding when the room has none)
    pub fn binding(&self, room: &RoomId) -> SensorBinding {
        self.entities.get(room).cloned().unwrap_or_default()
    }

    /// Rooms with their bindings, in configuration order
    pub fn room_bindings(&self) -> Vec<(RoomId, SensorBinding)> {
        self.rooms
            .iter()
            .map(|room| (room.id.clone(), self.binding(&room.id)))
            .collect()
    }

    pub fn room(&self, id: &RoomId) -> Option<&RoomConfig> {
        self.rooms.iter().find(|r| &r.id == id)
    }

    /// Parsed configured timezone, if any
    pub fn parsed_timezone(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|tz| tz.parse().ok())
    }

    /// Validate configuration with detailed error reporting
    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        if self.rooms.is_empty() {
            result.add_error("rooms", "Configuration must include at least one room");
            return result;
        }

        let mut seen = HashSet::new();
        for (idx, room) in self.rooms.iter().enumerate() {
            let prefix = format!("rooms[{idx}]");
            if room.id.as_str().trim().is_empty() {
                result.add_error(format!("{prefix}.id"), "Room ID cannot be empty");
            } else if !seen.insert(room.id.clone()) {
                result.add_error(
                    format!("{prefix}.id"),
                    format!("Duplicate room ID '{}'", room.id),
                );
            }

            if self.binding(&room.id).is_empty() {
                result.add_warning(
                    format!("entities.{}", room.id),
                    "Room has no temperature or humidity sensor bound",
                );
            }
        }

        for (room_id, binding) in &self.entities {
            if self.room(room_id).is_none() {
                result.add_warning(
                    format!("entities.{room_id}"),
                    "Entities configured for a room that is not on the floor plan",
                );
            }
            for (quantity, entity) in binding.bound() {
                if !entity.contains('.') {
                    result.add_error(
                        format!("entities.{room_id}.{quantity}"),
                        format!("'{entity}' is not a valid entity id (expected domain.object_id)"),
                    );
                }
            }
        }

        if let Some(tz) = &self.timezone {
            if tz.parse::<Tz>().is_err() {
                result.add_error("timezone", format!("Unknown timezone '{tz}'"));
            }
        }

        if self.chart_history_days == 0 {
            result.add_error("chart_history_days", "Must be at least 1 day");
        }

        if self.home_assistant.live_poll_secs == 0 {
            result.add_error("home_assistant.live_poll_secs", "Must be at least 1 second");
        }

        result
    }

    /// Validate and turn the result into an error if anything blocks usage
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.validate_detailed();
        if result.has_errors() {
            return Err(ConfigError::Invalid(result));
        }
        Ok(())
    }
}
