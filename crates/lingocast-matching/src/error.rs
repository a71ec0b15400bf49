// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MatchingError>;

#[derive(Debug, Error, PartialEq)]
pub enum MatchingError {
    #[error("invalid {name} threshold {value}: must be a finite value in [0.0, 1.0]")]
    InvalidThreshold { name: &'static str, value: f32 },
}
