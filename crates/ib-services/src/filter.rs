//! Word-list profanity filter.
//!
//! Whole words are matched case-insensitively and masked character for
//! character, so `"Damn!"` becomes `"****!"`. Punctuation, spacing and the
//! surrounding text are left exactly as written.

use std::collections::HashSet;

use ib_core::ContentFilter;

const DEFAULT_WORDS: &[&str] = &[
    "arse", "arsehole", "ass", "asshole", "bastard", "bitch", "bollocks", "bullshit", "crap",
    "cunt", "damn", "dick", "dickhead", "fuck", "fucked", "fucker", "fucking", "goddamn",
    "motherfucker", "piss", "pissed", "prick", "shit", "shitty", "slut", "twat", "wanker",
    "whore",
];

const MASK: char = '*';

pub struct WordListFilter {
    words: HashSet<String>,
}

impl Default for WordListFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS.iter().copied())
    }
}

impl WordListFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }

    fn is_profane(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    fn flush(&self, word: &mut String, out: &mut String) {
        if word.is_empty() {
            return;
        }
        if self.is_profane(word) {
            out.extend(std::iter::repeat(MASK).take(word.chars().count()));
        } else {
            out.push_str(word);
        }
        word.clear();
    }
}

impl ContentFilter for WordListFilter {
    fn clean(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut word = String::new();

        for ch in text.chars() {
            if ch.is_alphanumeric() || (ch == '\'' && !word.is_empty()) {
                word.push(ch);
            } else {
                self.flush(&mut word, &mut out);
                out.push(ch);
            }
        }
        self.flush(&mut word, &mut out);

        out
    }
}

/// Runs `filter` over an optional field; absent values pass through untouched.
pub fn sanitize(filter: &dyn ContentFilter, text: Option<&str>) -> Option<String> {
    text.map(|t| filter.clean(t))
}
