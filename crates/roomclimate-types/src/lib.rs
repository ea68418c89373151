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

//! Shared value types for the RoomClimate timeline engine.

pub mod config;
pub mod sensor;
pub mod slot;
pub mod validation;

pub use config::{
    ConfigError, DisplayPrecision, HaConnectionConfig, PrecisionPart, PrecisionSetting, RoomConfig,
    WidgetConfig,
};
pub use sensor::{
    Quantity, RawSample, ResolvedValue, RoomId, SensorBinding, SlotReading, parse_numeric_state,
};
pub use slot::{SLOT_MINUTES, SLOTS_PER_DAY, TimeSlot};
pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};
