// SPDX-License-Identifier: GPL-3.0-or-later

//! Grouping recognized lines into title/body segments.
//!
//! A dialogue box usually shows a speaker name above one or more wrapped
//! lines of speech. Short, unpunctuated lines are treated as titles; every
//! other line is body text and attaches to the closest title above it.

use lingocast_domain::{RecognizedLine, Segment};

use crate::normalize::clean_line;

const TITLE_MAX_WORDS: usize = 3;
const TITLE_MAX_CHARS: usize = 30;
const SENTENCE_PUNCTUATION: [char; 6] = [',', '.', '?', '!', ':', ';'];
const ABBREVIATIONS: [&str; 6] = ["Mrs.", "Ms.", "Mr.", "Dr.", "Prof.", "St."];

/// Whether a line looks like a title or speaker name.
pub fn is_title_candidate(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if text.split_whitespace().count() > TITLE_MAX_WORDS || text.chars().count() > TITLE_MAX_CHARS {
        return false;
    }

    let mut stripped = text.to_string();
    for abbreviation in ABBREVIATIONS {
        stripped = stripped.replace(abbreviation, &abbreviation[..abbreviation.len() - 1]);
    }
    !stripped.contains(&SENTENCE_PUNCTUATION[..])
}

/// Restartable iterator over the segments of an ordered run of lines.
///
/// Cloning the grouper yields an independent iterator starting from the
/// same position.
#[derive(Debug, Clone)]
pub struct LineGrouper<'a> {
    lines: &'a [RecognizedLine],
    position: usize,
}

impl<'a> LineGrouper<'a> {
    pub fn new(lines: &'a [RecognizedLine]) -> Self {
        Self { lines, position: 0 }
    }

    /// Next non-empty cleaned line, without consuming it.
    fn peek(&mut self) -> Option<String> {
        while let Some(line) = self.lines.get(self.position) {
            let text = clean_line(&line.text);
            if !text.is_empty() {
                return Some(text);
            }
            self.position += 1;
        }
        None
    }

    fn take_body(&mut self) -> Option<String> {
        let mut body = Vec::new();
        while let Some(text) = self.peek() {
            if is_title_candidate(&text) {
                break;
            }
            body.push(text);
            self.position += 1;
        }
        if body.is_empty() {
            None
        } else {
            Some(body.join("\n"))
        }
    }
}

impl Iterator for LineGrouper<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        let first = self.peek()?;

        if is_title_candidate(&first) {
            self.position += 1;
            let body = self.take_body();
            return Some(Segment {
                title: Some(first),
                body,
            });
        }

        // Leading body lines with no title above them.
        let body = self.take_body();
        Some(Segment { title: None, body })
    }
}

/// Convenience wrapper returning all segments at once.
pub fn group_lines(lines: &[RecognizedLine]) -> Vec<Segment> {
    LineGrouper::new(lines).collect()
}
