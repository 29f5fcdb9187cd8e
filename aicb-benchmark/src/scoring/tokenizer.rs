//! Word tokenization

use std::sync::OnceLock;

use regex::Regex;

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\p{L}\p{N}]+(?:['’][\p{L}\p{N}]+)*").expect("token pattern is valid")
    })
}

/// Split text into lower-cased word tokens.
///
/// Words are runs of letters and digits; inner apostrophes stay attached
/// (`don't`). Text made only of punctuation falls back to its
/// whitespace-separated chunks, so non-blank input never yields zero tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let words: Vec<String> = word_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect();

    if words.is_empty() {
        lower.split_whitespace().map(String::from).collect()
    } else {
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_words() {
        assert_eq!(
            tokenize("Try relaxation techniques."),
            vec!["try", "relaxation", "techniques"]
        );
        assert_eq!(tokenize("Don't panic, it's 3am"), vec!["don't", "panic", "it's", "3am"]);
    }

    #[test]
    fn test_tokenize_non_ascii() {
        assert_eq!(
            tokenize("Praat met Awel, één keer"),
            vec!["praat", "met", "awel", "één", "keer"]
        );
    }

    #[test]
    fn test_punctuation_only_falls_back() {
        assert_eq!(tokenize("?! ..."), vec!["?!", "..."]);
        assert!(tokenize("   ").is_empty());
    }
}
