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

use thiserror::Error;

/// Failure of a history query, as seen by the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistoryError {
    /// The host has no such series; surfaced as an inline message, never retried
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// Transport or host failure; treated as zero samples
    #[error("History unavailable: {0}")]
    Unavailable(String),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Errors returned by engine entry points
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    #[error("Room {room} has no {quantity} sensor bound")]
    Unbound { room: String, quantity: String },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("Engine has been shut down")]
    ShutDown,
}

pub type EngineResult<T> = Result<T, EngineError>;
