//! # Keyword Matcher
//! Decides whether an item's text is interesting for a monitor.
//!
//! One mode applies per monitor:
//! - `whole-word`: keyword bounded by word boundaries, case-insensitive
//! - `substring`: case-insensitive containment
//! - `pass-through`: everything matches (scrape-all monitors)

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    #[default]
    #[serde(alias = "whole_word", alias = "word")]
    WholeWord,
    Substring,
    #[serde(alias = "pass_through", alias = "all")]
    PassThrough,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::WholeWord => "whole-word",
            MatchMode::Substring => "substring",
            MatchMode::PassThrough => "pass-through",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchRules {
    keywords: Vec<String>,
    lowered: Vec<String>,
    patterns: Vec<Regex>,
    mode: MatchMode,
}

impl MatchRules {
    /// Keywords are trimmed; empty and repeated entries are dropped while
    /// keeping first-seen order.
    pub fn new<I, S>(keywords: I, mode: MatchMode) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kept: Vec<String> = Vec::new();
        for kw in keywords {
            let t = kw.as_ref().trim();
            if t.is_empty() || kept.iter().any(|k| k.eq_ignore_ascii_case(t)) {
                continue;
            }
            kept.push(t.to_string());
        }

        let patterns = if mode == MatchMode::WholeWord {
            kept.iter()
                .map(|kw| {
                    // ASCII boundaries: accented letters do not extend a word.
                    Regex::new(&format!(r"(?i)(?-u:\b){}(?-u:\b)", regex::escape(kw)))
                        .with_context(|| format!("compiling keyword pattern for {kw:?}"))
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };
        let lowered = kept.iter().map(|k| k.to_lowercase()).collect();

        Ok(Self {
            keywords: kept,
            lowered,
            patterns,
            mode,
        })
    }

    pub fn pass_through() -> Self {
        Self {
            keywords: Vec::new(),
            lowered: Vec::new(),
            patterns: Vec::new(),
            mode: MatchMode::PassThrough,
        }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// First keyword that matches `text`, if any. Pass-through yields `None`.
    pub fn matched_keyword(&self, text: &str) -> Option<&str> {
        if text.is_empty() {
            return None;
        }
        match self.mode {
            MatchMode::PassThrough => None,
            MatchMode::WholeWord => self
                .patterns
                .iter()
                .position(|re| re.is_match(text))
                .map(|i| self.keywords[i].as_str()),
            MatchMode::Substring => {
                let lower = text.to_lowercase();
                self.lowered
                    .iter()
                    .position(|kw| lower.contains(kw.as_str()))
                    .map(|i| self.keywords[i].as_str())
            }
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        match self.mode {
            MatchMode::PassThrough => true,
            _ => self.matched_keyword(text).is_some(),
        }
    }
}

/// Free-function form of [`MatchRules::matches`].
pub fn matches(text: &str, rules: &MatchRules) -> bool {
    rules.matches(text)
}
