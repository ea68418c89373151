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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved reading for one instant. `None` means "no usable data", never NaN.
pub type ResolvedValue = Option<f64>;

/// Measured quantity per room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantity {
    Temperature,
    Humidity,
}

impl Quantity {
    /// List all quantities in display order
    pub fn all() -> &'static [Quantity] {
        &[Self::Temperature, Self::Humidity]
    }

    /// Unit suffix used when rendering a value
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature"),
            Self::Humidity => write!(f, "humidity"),
        }
    }
}

/// Room identifier as used in the floor plan (e.g. "living", "bedroom")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Entity ids bound to one room. Either side may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorBinding {
    #[serde(default)]
    pub temperature: Option<String>,
    #[serde(default)]
    pub humidity: Option<String>,
}

impl SensorBinding {
    /// Entity id for a quantity, if bound
    pub fn entity(&self, quantity: Quantity) -> Option<&str> {
        match quantity {
            Quantity::Temperature => self.temperature.as_deref(),
            Quantity::Humidity => self.humidity.as_deref(),
        }
    }

    /// Bound (quantity, entity) pairs
    pub fn bound(&self) -> impl Iterator<Item = (Quantity, &str)> {
        Quantity::all()
            .iter()
            .filter_map(|q| self.entity(*q).map(|e| (*q, e)))
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none()
    }
}

/// One raw history entry as returned by the host, state not yet parsed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    pub state: String,
}

impl RawSample {
    pub fn new(timestamp: DateTime<Utc>, state: impl Into<String>) -> Self {
        Self {
            timestamp,
            state: state.into(),
        }
    }

    /// Numeric value of the state, or None for sentinels and unparsable input
    pub fn numeric_value(&self) -> Option<f64> {
        parse_numeric_state(&self.state)
    }
}

/// Parse a host state string into a finite number.
///
/// Home Assistant reports "unknown" / "unavailable" / "" for sensors without a
/// reading; those and any non-finite parse map to None.
pub fn parse_numeric_state(state: &str) -> Option<f64> {
    let trimmed = state.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("unknown")
        || trimmed.eq_ignore_ascii_case("unavailable")
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Temperature and humidity for one room at one slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotReading {
    pub temperature: ResolvedValue,
    pub humidity: ResolvedValue,
}

impl SlotReading {
    pub fn get(&self, quantity: Quantity) -> ResolvedValue {
        match quantity {
            Quantity::Temperature => self.temperature,
            Quantity::Humidity => self.humidity,
        }
    }

    pub fn set(&mut self, quantity: Quantity, value: ResolvedValue) {
        match quantity {
            Quantity::Temperature => self.temperature = value,
            Quantity::Humidity => self.humidity = value,
        }
    }
}
