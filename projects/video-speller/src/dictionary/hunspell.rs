use super::{Language, Lexicon};
use crate::error::SpellerError;
use std::fs;
use std::path::{Path, PathBuf};

/// Hunspell dictionary (`.aff` affix rules + `.dic` word list) backed by spellbook.
pub struct HunspellLexicon {
    dictionary: spellbook::Dictionary,
}

pub fn dictionary_paths(dir: &Path, language: Language) -> (PathBuf, PathBuf) {
    (
        dir.join(format!("{}.aff", language.code())),
        dir.join(format!("{}.dic", language.code())),
    )
}

impl HunspellLexicon {
    pub fn load(dir: &Path, language: Language) -> Result<Self, SpellerError> {
        let missing = |reason: String| SpellerError::ResourceMissing {
            language: language.display_name().to_string(),
            reason,
        };
        let (aff_path, dic_path) = dictionary_paths(dir, language);

        let aff = fs::read_to_string(&aff_path)
            .map_err(|e| missing(format!("cannot read {}: {}", aff_path.display(), e)))?;
        let dic = fs::read_to_string(&dic_path)
            .map_err(|e| missing(format!("cannot read {}: {}", dic_path.display(), e)))?;

        let dictionary = spellbook::Dictionary::new(&aff, &dic)
            .map_err(|e| missing(format!("cannot parse {}: {}", aff_path.display(), e)))?;

        Ok(Self { dictionary })
    }
}

impl Lexicon for HunspellLexicon {
    fn lookup(&self, word: &str) -> bool {
        self.dictionary.check(word)
    }

    fn suggest(&self, word: &str) -> Vec<String> {
        let mut suggestions = Vec::new();
        self.dictionary.suggest(word, &mut suggestions);
        suggestions
    }
}
