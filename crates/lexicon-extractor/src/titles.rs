//! Title rule table
//!
//! Maps token patterns (one or more whitespace-separated words) to a
//! [`TitleCategory`]. The table is loaded once and shared read-only behind an
//! `Arc`; the built-in Indonesian/English rules ship with the crate as TOML.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::tokens::match_key;

const BUILTIN_RULES: &str = include_str!("../rules/title_rules.toml");

/// Category of a leading modifier token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TitleCategory {
    /// Office or role ("Presiden", "Gubernur"); stripped from names
    NonAcademic,
    /// Academic degree or title ("Dr.", "Prof."); retained
    Academic,
    /// Religious honorific ("Haji", "KH"); retained
    Religious,
    /// Lineage marker ("bin", "binti"); joins name segments
    Lineage,
    /// Place name or administrative modifier
    Geographic,
}

impl TitleCategory {
    /// Resolution order when a pattern appears under several categories
    ///
    /// Lower wins: non-academic beats academic so that ambiguous titles are
    /// stripped rather than over-retained.
    pub fn precedence(&self) -> u8 {
        match self {
            Self::NonAcademic => 0,
            Self::Academic => 1,
            Self::Religious => 2,
            Self::Lineage => 3,
            Self::Geographic => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonAcademic => "non-academic",
            Self::Academic => "academic",
            Self::Religious => "religious",
            Self::Lineage => "lineage",
            Self::Geographic => "geographic",
        }
    }
}

/// A single title rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRule {
    /// Whitespace-separated token pattern
    pub pattern: String,
    /// Category of the pattern
    pub category: TitleCategory,
}

impl TitleRule {
    pub fn new(pattern: impl Into<String>, category: TitleCategory) -> Self {
        Self {
            pattern: pattern.into(),
            category,
        }
    }
}

/// Errors raised while loading a rule table
#[derive(Debug, Error)]
pub enum TitleRuleError {
    #[error("Failed to read title rules {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse title rules: {0}")]
    Parse(String),

    #[error("Empty pattern in {0} rules")]
    EmptyPattern(&'static str),
}

/// On-disk layout: one array of patterns per category
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct RuleFile {
    academic: Vec<String>,
    non_academic: Vec<String>,
    religious: Vec<String>,
    lineage: Vec<String>,
    geographic: Vec<String>,
}

/// Immutable pattern table with longest-first matching
#[derive(Debug, Clone)]
pub struct TitleRuleTable {
    rules: Vec<TitleRule>,
    /// Pattern keys -> resolved category
    index: HashMap<Vec<String>, TitleCategory>,
    /// Longest pattern, in tokens
    max_len: usize,
    digest: String,
}

impl TitleRuleTable {
    /// Built-in Indonesian/English table
    pub fn builtin() -> Result<Self, TitleRuleError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    /// Load the table from `path`, or the built-in table when `None`
    pub fn load(path: Option<&Path>) -> Result<Self, TitleRuleError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    /// Load a replacement table from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TitleRuleError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| TitleRuleError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a table from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, TitleRuleError> {
        let file: RuleFile =
            toml::from_str(content).map_err(|e| TitleRuleError::Parse(e.to_string()))?;

        let groups = [
            (file.academic, TitleCategory::Academic),
            (file.non_academic, TitleCategory::NonAcademic),
            (file.religious, TitleCategory::Religious),
            (file.lineage, TitleCategory::Lineage),
            (file.geographic, TitleCategory::Geographic),
        ];

        let mut rules = Vec::new();
        for (patterns, category) in groups {
            for pattern in patterns {
                if pattern.split_whitespace().next().is_none() {
                    return Err(TitleRuleError::EmptyPattern(category.as_str()));
                }
                rules.push(TitleRule::new(pattern, category));
            }
        }

        Ok(Self::from_rules(rules))
    }

    /// Build a table from explicit rules
    pub fn from_rules(rules: Vec<TitleRule>) -> Self {
        let mut index: HashMap<Vec<String>, TitleCategory> = HashMap::new();
        let mut max_len = 0;

        for rule in &rules {
            let keys: Vec<String> = rule.pattern.split_whitespace().map(match_key).collect();
            if keys.is_empty() {
                continue;
            }
            max_len = max_len.max(keys.len());
            index
                .entry(keys)
                .and_modify(|existing| {
                    if rule.category.precedence() < existing.precedence() {
                        *existing = rule.category;
                    }
                })
                .or_insert(rule.category);
        }

        let digest = Self::compute_digest(&index);

        Self {
            rules,
            index,
            max_len,
            digest,
        }
    }

    /// Digest over the resolved patterns, stable across rule order
    fn compute_digest(index: &HashMap<Vec<String>, TitleCategory>) -> String {
        let mut entries: Vec<String> = index
            .iter()
            .map(|(keys, category)| format!("{}={}", keys.join(" "), category.as_str()))
            .collect();
        entries.sort();

        let mut hasher = Sha256::new();
        for entry in entries {
            hasher.update(entry.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Category of an exact pattern, after precedence resolution
    pub fn classify(&self, pattern: &str) -> Option<TitleCategory> {
        let keys: Vec<String> = pattern.split_whitespace().map(match_key).collect();
        self.index.get(&keys).copied()
    }

    /// Longest pattern ending exactly at `keys[end]` (exclusive end)
    ///
    /// Returns the pattern length in tokens and its category.
    pub fn match_ending_at(&self, keys: &[String], end: usize) -> Option<(usize, TitleCategory)> {
        let longest = self.max_len.min(end);
        (1..=longest).rev().find_map(|len| {
            self.index
                .get(&keys[end - len..end])
                .map(|category| (len, *category))
        })
    }

    /// Longest pattern starting exactly at `keys[start]`
    pub fn match_starting_at(
        &self,
        keys: &[String],
        start: usize,
    ) -> Option<(usize, TitleCategory)> {
        let longest = self.max_len.min(keys.len().saturating_sub(start));
        (1..=longest).rev().find_map(|len| {
            self.index
                .get(&keys[start..start + len])
                .map(|category| (len, *category))
        })
    }

    /// Whether any rule with this exact single-token key exists
    pub fn contains_word(&self, word: &str) -> bool {
        self.index.contains_key(&[match_key(word)][..])
    }

    /// Rules in load order
    pub fn rules(&self) -> &[TitleRule] {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Hex SHA-256 over the resolved table, used in request fingerprints
    pub fn digest(&self) -> &str {
        &self.digest
    }
}
