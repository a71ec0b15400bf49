// SPDX-License-Identifier: GPL-3.0-or-later

//! Row assembly for raw recognition fragments.
//!
//! Some recognizers return one fragment per word cluster rather than per
//! visual line. Fragments whose vertical centres are closer than half the
//! smaller fragment height belong to the same row.

use lazy_static::lazy_static;
use lingocast_domain::RecognizedLine;
use regex::Regex;

lazy_static! {
    static ref SPACE_BEFORE_PUNCTUATION: Regex =
        Regex::new(r"\s+([,.!?;:])").expect("punctuation spacing regex is valid");
}

fn same_row(a: &RecognizedLine, b: &RecognizedLine) -> bool {
    let distance = (a.quad.center_y() - b.quad.center_y()).abs();
    distance < a.quad.height().min(b.quad.height()) * 0.5
}

/// Merge fragments into visual lines, top to bottom and left to right.
pub fn assemble_rows(mut fragments: Vec<RecognizedLine>) -> Vec<RecognizedLine> {
    fragments.retain(|f| !f.text.trim().is_empty());
    fragments.sort_by(|a, b| {
        a.quad
            .top()
            .total_cmp(&b.quad.top())
            .then(a.quad.left().total_cmp(&b.quad.left()))
    });

    let mut rows: Vec<Vec<RecognizedLine>> = Vec::new();
    for fragment in fragments {
        match rows.last_mut() {
            Some(row) if row.last().is_some_and(|last| same_row(last, &fragment)) => {
                row.push(fragment);
                row.sort_by(|a, b| a.quad.left().total_cmp(&b.quad.left()));
            }
            _ => rows.push(vec![fragment]),
        }
    }

    rows.into_iter().filter_map(merge_row).collect()
}

fn merge_row(row: Vec<RecognizedLine>) -> Option<RecognizedLine> {
    let first = row.first()?;
    let quad = row.iter().skip(1).fold(first.quad, |acc, f| acc.union(&f.quad));
    let confidence = row.iter().map(|f| f.confidence).sum::<f32>() / row.len() as f32;
    let text = row
        .iter()
        .map(|f| f.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let text = SPACE_BEFORE_PUNCTUATION.replace_all(&text, "$1").to_string();

    Some(RecognizedLine::new(text, confidence).with_quad(quad))
}
