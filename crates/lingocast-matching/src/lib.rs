// SPDX-License-Identifier: GPL-3.0-or-later

//! Text resolution: normalization, line grouping and fuzzy lookup of
//! recognized text against the localized text database.

pub mod error;
pub mod grouping;
pub mod index;
pub mod layout;
pub mod normalize;
pub mod resolver;
pub mod similarity;

pub use error::{MatchingError, Result};
pub use grouping::{group_lines, is_title_candidate, LineGrouper};
pub use index::{FuzzyIndex, MatchStrategy, Query, Thresholds};
pub use layout::assemble_rows;
pub use normalize::{clean_line, compact, normalize};
pub use resolver::{MatchResolver, SegmentResolution};
