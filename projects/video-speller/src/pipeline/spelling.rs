// Spell checking of reconstructed frame text.

use crate::config::SpellingPolicy;
use crate::dictionary::{DictionaryStore, Language};
use crate::run_artifacts::SpellError;
use std::sync::Arc;

/// Script of a candidate word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Cyrillic,
    Latin,
    /// Both scripts in one token: treated as an OCR artifact.
    Mixed,
}

impl Script {
    fn language(self) -> Option<Language> {
        match self {
            Script::Cyrillic => Some(Language::Russian),
            Script::Latin => Some(Language::English),
            Script::Mixed => None,
        }
    }
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

fn is_latin(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_word_char(c: char) -> bool {
    is_cyrillic(c) || is_latin(c)
}

/// Maximal runs of Cyrillic/Latin letters; everything else separates words.
pub fn tokenize_line(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| !is_word_char(c))
        .filter(|token| !token.is_empty())
}

pub fn classify(word: &str) -> Script {
    let cyrillic = word.chars().filter(|c| is_cyrillic(*c)).count();
    let latin = word.chars().filter(|c| is_latin(*c)).count();
    match (cyrillic > 0, latin > 0) {
        (true, true) => Script::Mixed,
        (true, false) => Script::Cyrillic,
        _ => Script::Latin,
    }
}

pub struct SpellChecker {
    dictionaries: Arc<DictionaryStore>,
    policy: SpellingPolicy,
}

impl SpellChecker {
    pub fn new(dictionaries: Arc<DictionaryStore>, policy: SpellingPolicy) -> Self {
        Self {
            dictionaries,
            policy,
        }
    }

    /// Check every word of `text`. Each occurrence of a misspelled word is
    /// reported, in the order it appears.
    pub fn check(&self, text: &str) -> Vec<SpellError> {
        let whitelist = self.dictionaries.whitelist();
        let mut errors = Vec::new();

        for word in text.lines().flat_map(tokenize_line) {
            if word.chars().count() < self.policy.min_word_len {
                continue;
            }
            let Some(language) = classify(word).language() else {
                continue;
            };
            // Reported once per run by the orchestrator.
            let Some(lexicon) = self.dictionaries.lexicon(language) else {
                continue;
            };

            let lower = word.to_lowercase();
            if whitelist.contains(&lower) {
                continue;
            }
            if lexicon.lookup(word) || lexicon.lookup(&lower) {
                continue;
            }

            let mut suggestions = lexicon.suggest(word);
            suggestions.truncate(self.policy.max_suggestions);
            errors.push(SpellError {
                word: word.to_string(),
                suggestions,
            });
        }

        errors
    }
}
