use std::sync::LazyLock;

use regex::Regex;

use crate::settings::ProcessMode;

static LINK_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:https?://|www\.|pic\.twitter\.com/|\bt\.co/)\S*")
        .expect("link token pattern is valid")
});

/// Removes URL-like and media-link tokens, collapses whitespace and trims.
pub fn strip_links(text: &str) -> String {
    collapse_whitespace(&LINK_TOKEN.replace_all(text, " "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Applies the processing variant selected in settings.
pub fn transform(mode: ProcessMode, text: &str) -> String {
    match mode {
        ProcessMode::RemoveVowelWords => remove_vowel_words(text),
    }
}

/// Drops every word that starts with a vowel unless it is a hashtag.
///
/// Links are stripped line by line first and empty lines discarded, so the
/// filter only ever sees prose tokens.
pub fn remove_vowel_words(text: &str) -> String {
    let cleaned = text
        .lines()
        .map(strip_links)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    cleaned
        .split_whitespace()
        .filter(|token| keeps_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn keeps_token(token: &str) -> bool {
    if token.starts_with('#') {
        return true;
    }
    match token.chars().next() {
        Some(first) => !matches!(first.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(remove_vowel_words(""), "");
        assert_eq!(remove_vowel_words("   \n\n  "), "");
    }

    #[test]
    fn strips_links_then_drops_vowel_words() {
        assert_eq!(
            remove_vowel_words("Hello https://t.co/xyz world #Great amazing"),
            "Hello world #Great"
        );
        assert_eq!(
            remove_vowel_words("Hello https://x.co/y world #Great amazing"),
            "Hello world #Great"
        );
    }

    #[test]
    fn hashtags_survive_regardless_of_first_letter() {
        assert_eq!(remove_vowel_words("#Apple #Orange umbrella"), "#Apple #Orange");
    }

    #[test]
    fn vowel_check_is_case_insensitive() {
        assert_eq!(remove_vowel_words("Every Ox Ate Under Ice but Not Me"), "but Not Me");
    }

    #[test]
    fn media_links_and_link_only_lines_disappear() {
        let input = "Look at this\npic.twitter.com/abc123\nwww.example.com\nsunny day";
        assert_eq!(remove_vowel_words(input), "Look this sunny day");
    }

    #[test]
    fn non_letter_tokens_are_kept() {
        assert_eq!(remove_vowel_words("42 @user ... ok"), "42 @user ...");
    }

    #[test]
    fn output_never_holds_vowel_words() {
        let samples = [
            "An apple a day keeps #everyone away",
            "in order to understand recursion",
            "Ünder 🎉 éclair Oops #oops",
        ];
        for sample in samples {
            let output = remove_vowel_words(sample);
            for token in output.split_whitespace() {
                let first = token.chars().next().unwrap().to_ascii_lowercase();
                assert!(token.starts_with('#') || !"aeiou".contains(first), "{token}");
            }
        }
    }

    #[test]
    fn strip_links_collapses_whitespace() {
        assert_eq!(strip_links("  see   https://a.b/c  now "), "see now");
    }

    #[test]
    fn transform_dispatches_on_mode() {
        assert_eq!(transform(ProcessMode::RemoveVowelWords, "Only bold"), "bold");
    }
}
