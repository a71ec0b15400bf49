// SPDX-License-Identifier: GPL-3.0-or-later

use lingocast_audio::AudioError;
use lingocast_domain::DatabaseError;
use lingocast_matching::MatchingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApplicationError>;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Matching error: {0}")]
    Matching(#[from] MatchingError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Background task failed: {0}")]
    Task(String),
}
