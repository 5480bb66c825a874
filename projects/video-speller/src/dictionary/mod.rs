//! Language lexicons and the user whitelist.
//!
//! Everything here is loaded once before a run and is read-only afterwards,
//! so the store is shared with the pipeline worker behind an `Arc`.

pub mod hunspell;

use crate::config::SpellerConfig;
use crate::error::SpellerError;
use hunspell::HunspellLexicon;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Membership and correction queries for one language.
pub trait Lexicon: Send + Sync {
    fn lookup(&self, word: &str) -> bool;
    /// Ranked corrections, best first. May be empty.
    fn suggest(&self, word: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Russian,
    English,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Russian, Language::English];

    /// Hunspell file stem.
    pub fn code(self) -> &'static str {
        match self {
            Language::Russian => "ru_RU",
            Language::English => "en_US",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Russian => "Russian",
            Language::English => "English",
        }
    }
}

/// Lower-cased words that are always accepted.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    words: HashSet<String>,
}

impl Whitelist {
    /// Parse one word per line; blank lines and `#` comments are skipped.
    pub fn parse(content: &str) -> Self {
        let words = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_lowercase)
            .collect();
        Self { words }
    }

    /// A missing file is an empty whitelist, not an error.
    pub fn load(path: &Path) -> Result<Self, SpellerError> {
        if !path.exists() {
            tracing::info!(
                "Custom dictionary not found at {:?}; create it to whitelist words",
                path
            );
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| SpellerError::io(format!("reading whitelist {:?}", path), e))?;
        let whitelist = Self::parse(&content);
        tracing::info!("Loaded {} whitelisted words from {:?}", whitelist.len(), path);
        Ok(whitelist)
    }

    pub fn contains(&self, lowercase_word: &str) -> bool {
        self.words.contains(lowercase_word)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for Whitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }
}

/// Why a language is unavailable.
#[derive(Debug, Clone, Serialize)]
pub struct MissingLexicon {
    pub language: Language,
    pub reason: String,
}

impl MissingLexicon {
    /// The one-line advisory shown before a run.
    pub fn advisory(&self) -> String {
        format!(
            "{} dictionary unavailable ({}); {} words will not be checked",
            self.language.display_name(),
            self.reason,
            self.language.display_name()
        )
    }
}

pub struct DictionaryStore {
    russian: Option<Box<dyn Lexicon>>,
    english: Option<Box<dyn Lexicon>>,
    whitelist: Whitelist,
    missing: Vec<MissingLexicon>,
}

impl DictionaryStore {
    /// Load both lexicons and the whitelist from the configured locations.
    /// A lexicon that fails to load is recorded as missing; only an unreadable
    /// whitelist file is an error.
    pub fn load(config: &SpellerConfig) -> Result<Self, SpellerError> {
        let whitelist = Whitelist::load(&config.whitelist_path)?;
        let mut missing = Vec::new();
        let mut load = |language: Language| -> Option<Box<dyn Lexicon>> {
            match HunspellLexicon::load(&config.dictionary_dir, language) {
                Ok(lexicon) => {
                    tracing::info!("{} dictionary loaded", language.display_name());
                    Some(Box::new(lexicon))
                }
                Err(e) => {
                    tracing::debug!("{}", e);
                    missing.push(MissingLexicon {
                        language,
                        reason: match e {
                            SpellerError::ResourceMissing { reason, .. } => reason,
                            other => other.to_string(),
                        },
                    });
                    None
                }
            }
        };
        let russian = load(Language::Russian);
        let english = load(Language::English);

        Ok(Self {
            russian,
            english,
            whitelist,
            missing,
        })
    }

    /// Assemble a store from already-built parts.
    #[cfg(test)]
    pub fn from_parts(
        russian: Option<Box<dyn Lexicon>>,
        english: Option<Box<dyn Lexicon>>,
        whitelist: Whitelist,
    ) -> Self {
        let missing = [(Language::Russian, &russian), (Language::English, &english)]
            .into_iter()
            .filter(|(_, lexicon)| lexicon.is_none())
            .map(|(language, _)| MissingLexicon {
                language,
                reason: "not loaded".to_string(),
            })
            .collect();
        Self {
            russian,
            english,
            whitelist,
            missing,
        }
    }

    pub fn lexicon(&self, language: Language) -> Option<&dyn Lexicon> {
        match language {
            Language::Russian => self.russian.as_deref(),
            Language::English => self.english.as_deref(),
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn missing(&self) -> &[MissingLexicon] {
        &self.missing
    }
}

/// Presence of the on-disk files, for the `dictionaries` command.
#[derive(Debug, Serialize)]
pub struct DictionaryStatus {
    pub language: Language,
    pub aff_path: PathBuf,
    pub dic_path: PathBuf,
    pub available: bool,
}

pub fn dictionary_status(dictionary_dir: &Path) -> Vec<DictionaryStatus> {
    Language::ALL
        .into_iter()
        .map(|language| {
            let (aff_path, dic_path) = hunspell::dictionary_paths(dictionary_dir, language);
            let available = aff_path.is_file() && dic_path.is_file();
            DictionaryStatus {
                language,
                aff_path,
                dic_path,
                available,
            }
        })
        .collect()
}
