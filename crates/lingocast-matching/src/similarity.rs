// SPDX-License-Identifier: GPL-3.0-or-later

//! Indel-based similarity ratios.
//!
//! `ratio` is `1 - indel_distance / (len(a) + len(b))`, where the indel
//! distance counts insertions and deletions only. `token_set_ratio` compares
//! the shared and unshared token sets so word order and extra words matter
//! less than in a plain ratio.

use std::collections::BTreeSet;

/// Length of the longest common subsequence, in characters.
fn lcs_len(left: &[char], right: &[char]) -> usize {
    if left.is_empty() || right.is_empty() {
        return 0;
    }

    let mut previous_row = vec![0usize; right.len() + 1];
    let mut current_row = vec![0usize; right.len() + 1];

    for left_char in left {
        for (right_index, right_char) in right.iter().enumerate() {
            current_row[right_index + 1] = if left_char == right_char {
                previous_row[right_index] + 1
            } else {
                current_row[right_index].max(previous_row[right_index + 1])
            };
        }
        std::mem::swap(&mut previous_row, &mut current_row);
    }

    previous_row[right.len()]
}

pub fn indel_distance(left: &str, right: &str) -> usize {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    left.len() + right.len() - 2 * lcs_len(&left, &right)
}

/// Normalized indel similarity in [0, 1]. Two empty strings are identical.
pub fn ratio(left: &str, right: &str) -> f32 {
    let total = left.chars().count() + right.chars().count();
    if total == 0 {
        return 1.0;
    }
    1.0 - indel_distance(left, right) as f32 / total as f32
}

/// Token-set similarity in [0, 1].
///
/// If one token set is a subset of the other the score is 1.0. An empty side
/// scores 0.0.
pub fn token_set_ratio(left: &str, right: &str) -> f32 {
    let left_tokens: BTreeSet<&str> = left.split_whitespace().collect();
    let right_tokens: BTreeSet<&str> = right.split_whitespace().collect();
    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0.0;
    }

    let intersection: Vec<&str> = left_tokens.intersection(&right_tokens).copied().collect();
    let only_left: Vec<&str> = left_tokens.difference(&right_tokens).copied().collect();
    let only_right: Vec<&str> = right_tokens.difference(&left_tokens).copied().collect();

    if !intersection.is_empty() && (only_left.is_empty() || only_right.is_empty()) {
        return 1.0;
    }

    let sect = intersection.join(" ");
    let diff_left = only_left.join(" ");
    let diff_right = only_right.join(" ");

    let sect_len = sect.chars().count();
    let separator = usize::from(sect_len != 0);
    let sect_left_len = sect_len + separator + diff_left.chars().count();
    let sect_right_len = sect_len + separator + diff_right.chars().count();

    let total = sect_left_len + sect_right_len;
    let distance = indel_distance(&diff_left, &diff_right);
    let mut best = 1.0 - distance as f32 / total as f32;

    if sect_len > 0 {
        let left_vs_sect =
            1.0 - (separator + diff_left.chars().count()) as f32 / (sect_len + sect_left_len) as f32;
        let right_vs_sect = 1.0
            - (separator + diff_right.chars().count()) as f32 / (sect_len + sect_right_len) as f32;
        best = best.max(left_vs_sect).max(right_vs_sect);
    }

    best.clamp(0.0, 1.0)
}

// ============================================================================
// Upper bounds
// ============================================================================
//
// Both bounds replace the indel distance with the length difference of the
// compared strings, which the distance can never be below. They cost no
// LCS table and let a search skip candidates that cannot win.

/// Sorted, deduplicated whitespace tokens, in the order `token_set_ratio` uses.
pub fn unique_tokens(text: &str) -> Vec<String> {
    let tokens: BTreeSet<&str> = text.split_whitespace().collect();
    tokens.into_iter().map(str::to_string).collect()
}

/// Upper bound on [`ratio`] for strings of the given character counts.
pub fn ratio_upper_bound(left_len: usize, right_len: usize) -> f32 {
    let total = left_len + right_len;
    if total == 0 {
        return 1.0;
    }
    1.0 - left_len.abs_diff(right_len) as f32 / total as f32
}

#[derive(Debug, Default, Clone, Copy)]
struct Joined {
    count: usize,
    chars: usize,
}

impl Joined {
    fn push(&mut self, token: &str) {
        self.count += 1;
        self.chars += token.chars().count();
    }

    /// Character count of the tokens joined with single spaces.
    fn len(self) -> usize {
        self.chars + self.count.saturating_sub(1)
    }
}

/// Upper bound on [`token_set_ratio`] from two outputs of [`unique_tokens`].
pub fn token_set_upper_bound(left: &[String], right: &[String]) -> f32 {
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let (mut sect, mut only_left, mut only_right) = (Joined::default(), Joined::default(), Joined::default());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].cmp(&right[j]) {
            std::cmp::Ordering::Equal => {
                sect.push(&left[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                only_left.push(&left[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                only_right.push(&right[j]);
                j += 1;
            }
        }
    }
    left[i..].iter().for_each(|token| only_left.push(token));
    right[j..].iter().for_each(|token| only_right.push(token));

    if sect.count > 0 && (only_left.count == 0 || only_right.count == 0) {
        return 1.0;
    }

    let sect_len = sect.len();
    let separator = usize::from(sect_len != 0);
    let diff_left = only_left.len();
    let diff_right = only_right.len();
    let sect_left_len = sect_len + separator + diff_left;
    let sect_right_len = sect_len + separator + diff_right;

    let total = sect_left_len + sect_right_len;
    let mut best = 1.0 - diff_left.abs_diff(diff_right) as f32 / total as f32;

    if sect_len > 0 {
        let left_vs_sect = 1.0 - (separator + diff_left) as f32 / (sect_len + sect_left_len) as f32;
        let right_vs_sect = 1.0 - (separator + diff_right) as f32 / (sect_len + sect_right_len) as f32;
        best = best.max(left_vs_sect).max(right_vs_sect);
    }

    best.clamp(0.0, 1.0)
}
