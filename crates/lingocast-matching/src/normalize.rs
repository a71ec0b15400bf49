// SPDX-License-Identifier: GPL-3.0-or-later

//! Text normalization shared by indexing and lookup.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref LINE_BREAK_MARKUP: Regex =
        Regex::new(r"(?i)<br\s*/?>|&lt;br\s*/?&gt;").expect("line break regex is valid");
}

/// Strip inline line-break markup left over from the game's rich text.
pub fn clean_line(text: &str) -> String {
    LINE_BREAK_MARKUP.replace_all(text, " ").trim().to_string()
}

/// Lowercase, punctuation-stripped, whitespace-collapsed key.
///
/// Input is NFKC-folded first so full-width recognizer output compares equal
/// to ASCII. Apostrophes survive only between two alphanumeric characters.
pub fn normalize(text: &str) -> String {
    let folded: Vec<char> = text
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c == '\u{2019}' || c == '\u{2018}' { '\'' } else { c })
        .collect();

    let mut kept = String::with_capacity(folded.len());
    for (i, &c) in folded.iter().enumerate() {
        if c.is_alphanumeric() {
            kept.push(c);
        } else if c == '\'' {
            let before = i > 0 && folded[i - 1].is_alphanumeric();
            let after = folded.get(i + 1).is_some_and(|n| n.is_alphanumeric());
            kept.push(if before && after { '\'' } else { ' ' });
        } else {
            kept.push(' ');
        }
    }

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A normalized key without spaces or apostrophes.
pub fn compact(normalized: &str) -> String {
    normalized
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect()
}

pub fn word_count(normalized: &str) -> usize {
    normalized.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_and_punctuation_insensitive() {
        assert_eq!(normalize("Stop Right There!"), normalize("stop right there"));
        assert_eq!(normalize("Stop Right There!"), "stop right there");
    }

    #[test]
    fn idempotent() {
        for input in [
            "Stop Right There!",
            "  With training and fine-tuning, you'll boost your output. ",
            "'Quoted' words — and ＦＵＬＬ－ＷＩＤＴＨ text",
            "",
            "!!!",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "input: {input:?}");
        }
    }

    #[test]
    fn keeps_inner_apostrophes_only() {
        assert_eq!(normalize("You\u{2019}ll see. 'Maybe'"), "you'll see maybe");
    }

    #[test]
    fn full_width_folds_to_ascii() {
        assert_eq!(normalize("ＨＥＬＬＯ１２"), "hello12");
    }

    #[test]
    fn compact_drops_spaces_and_apostrophes() {
        assert_eq!(compact(&normalize("Stop right there!")), "stoprightthere");
        assert_eq!(compact("you'll see"), "youllsee");
    }

    #[test]
    fn clean_line_strips_markup() {
        assert_eq!(clean_line("Hello<br>World"), "Hello World");
        assert_eq!(clean_line("Hello&lt;br&gt;World<BR/>"), "Hello World");
    }
}
