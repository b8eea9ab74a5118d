//! Marker-word language detection.

use crate::types::ANY_LANGUAGE;

struct Profile {
    code: &'static str,
    markers: &'static [&'static str],
    letters: &'static [char],
}

const PROFILES: &[Profile] = &[
    Profile {
        code: "en",
        markers: &[
            "the", "is", "are", "what", "how", "please", "can", "you", "me", "my", "and", "of",
            "to", "in", "for", "with", "weather", "today", "tomorrow", "show", "find", "get",
        ],
        letters: &[],
    },
    Profile {
        code: "tr",
        markers: &[
            "ve", "bir", "bu", "ne", "nasıl", "nedir", "mi", "mı", "mu", "mü", "için", "ile",
            "da", "de", "lütfen", "bana", "hava", "bugün", "yarın", "göster", "bul", "var",
        ],
        letters: &['ç', 'ğ', 'ı', 'ö', 'ş', 'ü', 'Ç', 'Ğ', 'İ', 'Ö', 'Ş', 'Ü'],
    },
];

/// Detects the language of `text` from marker words and letters.
///
/// Returns [`ANY_LANGUAGE`] when no profile scores or the best scores tie.
#[must_use]
pub fn detect_language(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    let mut best: Option<(&'static str, usize)> = None;
    let mut tied = false;
    for profile in PROFILES {
        let marker_hits = words
            .iter()
            .filter(|word| profile.markers.contains(*word))
            .count();
        let letter_hits = text
            .chars()
            .filter(|c| profile.letters.contains(c))
            .count();
        let score = marker_hits + letter_hits;
        if score == 0 {
            continue;
        }
        match best {
            Some((_, top)) if score == top => tied = true,
            Some((_, top)) if score < top => {}
            _ => {
                best = Some((profile.code, score));
                tied = false;
            }
        }
    }

    match best {
        Some((code, _)) if !tied => code,
        _ => ANY_LANGUAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_english_and_turkish() {
        assert_eq!(detect_language("What's the weather in Istanbul?"), "en");
        assert_eq!(detect_language("İstanbul'da hava nasıl?"), "tr");
    }

    #[test]
    fn unknown_or_tied_is_any() {
        assert_eq!(detect_language("12345 ???"), ANY_LANGUAGE);
        assert_eq!(detect_language(""), ANY_LANGUAGE);
        // One English marker, one Turkish marker.
        assert_eq!(detect_language("the ve"), ANY_LANGUAGE);
    }
}
