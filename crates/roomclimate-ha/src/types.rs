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
use roomclimate_types::RawSample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaEntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
    pub last_changed: String,
    pub last_updated: String,
}

/// Historical state point from HA history API.
///
/// With `minimal_response` only the first entry of a series carries
/// `entity_id` and `last_updated`; the rest have `state` and `last_changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaHistoryState {
    #[serde(default)]
    pub entity_id: Option<String>,
    pub state: String,
    #[serde(default)]
    pub attributes: Option<serde_json::Value>,
    #[serde(default)]
    pub last_changed: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl HaHistoryState {
    /// `last_updated`, falling back to `last_changed`
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_updated
            .as_deref()
            .or(self.last_changed.as_deref())
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    pub fn to_sample(&self) -> Option<RawSample> {
        self.timestamp()
            .map(|timestamp| RawSample::new(timestamp, self.state.clone()))
    }
}
