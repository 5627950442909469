//! Unicode folding for transcript tokens.
//!
//! Source pages mix curly quotes, non-breaking spaces, dashes and the odd
//! stray symbol. Folding every token the same way keeps speaker strings
//! stable across episodes: a character survives as-is when its ASCII
//! transliteration starts with a Latin letter (so `é` stays `é`), anything
//! else is replaced by its transliteration (`’` becomes `'`, `—` becomes `--`).

use unicode_normalization::UnicodeNormalization;

/// Fold a string through NFC normalization and per-character transliteration.
pub fn clean_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.nfc() {
        match deunicode::deunicode_char(c) {
            Some(t) if t.starts_with(|t: char| t.is_ascii_alphabetic()) => out.push(c),
            Some(t) => out.push_str(t),
            // No transliteration known: drop it
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passthrough() {
        assert_eq!(clean_string("Jim|Hi, Dwight."), "Jim|Hi, Dwight.");
    }

    #[test]
    fn test_latin_accents_kept() {
        assert_eq!(clean_string("Café Désirée"), "Café Désirée");
    }

    #[test]
    fn test_punctuation_transliterated() {
        assert_eq!(clean_string("Michael’s"), "Michael's");
        assert_eq!(clean_string("“Hi”"), "\"Hi\"");
    }

    #[test]
    fn test_decomposed_input_is_composed() {
        // "e" + combining acute accent
        assert_eq!(clean_string("Re\u{301}sume\u{301}"), "Résumé");
    }

    #[test]
    fn test_non_breaking_space() {
        assert_eq!(clean_string("Woman\u{a0}#4"), "Woman #4");
    }
}
