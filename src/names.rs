//! Team and competition name normalization.
//!
//! Names from odds feeds and result files rarely agree byte-for-byte
//! ("Bayern München" vs "Bayern Munchen", "Man Utd" vs "Manchester United").
//! Everything is folded to lowercase ASCII-ish words before comparison.

use std::collections::HashMap;
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

/// Club-type tokens dropped from names ("Arsenal FC" == "Arsenal")
const NOISE_TOKENS: &[&str] = &["fc", "afc", "cf", "sc"];

/// Case-fold, strip diacritics, turn punctuation into spaces, collapse whitespace.
pub fn normalize(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            'ß' => 's',
            'ø' | 'Ø' => 'o',
            'æ' | 'Æ' => 'a',
            'ł' | 'Ł' => 'l',
            c if c.is_alphanumeric() => c,
            '&' => '&',
            _ => ' ',
        })
        .flat_map(char::to_lowercase)
        .collect();

    folded
        .split_whitespace()
        .filter(|token| !NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized alias table: alternate name -> canonical name
#[derive(Debug, Clone, Default)]
pub struct TeamAliases {
    table: HashMap<String, String>,
}

impl TeamAliases {
    pub fn new(aliases: &HashMap<String, String>) -> Self {
        let table = aliases
            .iter()
            .map(|(alias, canonical)| (normalize(alias), normalize(canonical)))
            .filter(|(alias, canonical)| !alias.is_empty() && alias != canonical)
            .collect();
        Self { table }
    }

    /// Normalized canonical form of a team name
    pub fn canonical(&self, name: &str) -> String {
        let normalized = normalize(name);
        match self.table.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Key identifying one fixture across legs of a slip
pub fn match_key(home: &str, away: &str) -> String {
    format!("{}|{}", normalize(home), normalize(away))
}
