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

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use roomclimate_core::{HistoryError, HistoryProvider, HistoryResult, LiveStateSource};
use roomclimate_types::RawSample;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::client::HomeAssistantClient;
use crate::errors::HaResult;

/// Latest known state of the tracked entities, refreshed from HA on a timer.
///
/// Reads never touch the network; an entity absent from the last refresh
/// reads as `None`.
#[derive(Debug, Default)]
pub struct HaStateSnapshot {
    states: RwLock<HashMap<String, String>>,
    refreshed: AtomicBool,
}

impl HaStateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with the current state of `entity_ids`.
    ///
    /// One `/api/states` request; returns how many tracked entities exist.
    pub async fn refresh(
        &self,
        client: &HomeAssistantClient,
        entity_ids: &[String],
    ) -> HaResult<usize> {
        let wanted: HashSet<&str> = entity_ids.iter().map(String::as_str).collect();
        let all = client.get_all_states().await?;
        let states: HashMap<String, String> = all
            .into_iter()
            .filter(|s| wanted.contains(s.entity_id.as_str()))
            .map(|s| (s.entity_id, s.state))
            .collect();

        let found = states.len();
        if found < wanted.len() {
            debug!(
                "🔄 [HA LIVE] {}/{} tracked entities present",
                found,
                wanted.len()
            );
        }
        *self.states.write() = states;
        self.refreshed.store(true, Ordering::Release);
        Ok(found)
    }

    /// False until the first successful refresh
    pub fn is_populated(&self) -> bool {
        self.refreshed.load(Ordering::Acquire)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.states.read().contains_key(entity_id)
    }
}

impl LiveStateSource for HaStateSnapshot {
    fn read(&self, entity_id: &str) -> Option<String> {
        self.states.read().get(entity_id).cloned()
    }
}

/// History backed by the HA recorder
#[derive(Debug)]
pub struct HaHistoryProvider {
    client: Arc<HomeAssistantClient>,
    known: Option<Arc<HaStateSnapshot>>,
}

impl HaHistoryProvider {
    pub fn new(client: Arc<HomeAssistantClient>) -> Self {
        Self {
            client,
            known: None,
        }
    }

    /// Report entities missing from a populated snapshot as not found.
    ///
    /// The history endpoint answers unknown entities with an empty list, so
    /// the live snapshot is the only place absence shows up.
    pub fn with_known_entities(mut self, snapshot: Arc<HaStateSnapshot>) -> Self {
        self.known = Some(snapshot);
        self
    }}

#[async_trait]
impl HistoryProvider for HaHistoryProvider {
    async fn query(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<RawSample>> {
        if let Some(known) = &self.known
            && known.is_populated()
            && !known.contains(entity_id)
        {
            warn!("⚠️ [HA HISTORY] {} is not a known entity", entity_id);
            return Err(HistoryError::EntityNotFound(entity_id.to_owned()));
        }

        let samples = self
            .client
            .get_history_raw(entity_id, start, end)
            .await
            .map_err(HistoryError::from)?;
        debug!("📊 [HA HISTORY] {} samples for {}", samples.len(), entity_id);
        Ok(samples)
    }

    fn name(&self) -> &str {
        "HomeAssistant"
    }
}

/// Log which configured entities HA does not know
pub async fn check_entities(client: &HomeAssistantClient, entity_ids: &[String]) -> Vec<String> {
    let states = match client.get_all_states().await {
        Ok(states) => states,
        Err(e) => {
            warn!("⚠️ [HA] Could not list entities: {}", e);
            return Vec::new();
        }
    };
    let known: HashSet<&str> = states.iter().map(|s| s.entity_id.as_str()).collect();
    let missing: Vec<String> = entity_ids
        .iter()
        .filter(|id| !known.contains(id.as_str()))
        .cloned()
        .collect();
    if missing.is_empty() {
        info!("✅ [HA] All {} configured entities exist", entity_ids.len());
    }
    missing
}
