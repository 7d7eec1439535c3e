/// Process-name pattern compilation and matching.
///
/// Users supply plain lists of executable names such as `"game.exe; Steam*"`.
/// Each token becomes an anchored, case-insensitive regex where `*` matches any
/// run of characters and everything else is literal.
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

use crate::mode::Mode;

/// A single compiled process-name pattern.
#[derive(Debug, Clone)]
pub struct ProcessNameMatcher {
    /// Token as written by the user, before `.exe` stripping.
    source: String,
    regex: Regex,
}

impl ProcessNameMatcher {
    /// Compiles one token. A trailing `.exe` is dropped because processes are
    /// reported by short name without extension.
    pub fn compile(token: &str) -> Result<Self, regex::Error> {
        let name = strip_exe(token);
        let body = name
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = RegexBuilder::new(&format!("^(?:{body})$"))
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()?;
        Ok(Self {
            source: token.to_string(),
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// An ordered collection of matchers built from one raw list.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    matchers: Vec<ProcessNameMatcher>,
}

impl PatternSet {
    /// Builds a set from a newline / comma / semicolon separated list.
    ///
    /// Empty input yields an empty set. Tokens are trimmed and de-duplicated
    /// case-insensitively, keeping the first spelling. A token that fails to
    /// compile is skipped; the rest of the list is still used.
    pub fn compile(raw: &str) -> Self {
        let mut seen = HashSet::new();
        let matchers = raw
            .split(['\r', '\n', ';', ','])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.to_lowercase()))
            .filter_map(|t| match ProcessNameMatcher::compile(t) {
                Ok(m) => Some(m),
                Err(e) => {
                    tracing::debug!(token = t, error = %e, "skipping process pattern");
                    None
                }
            })
            .collect();
        Self { matchers }
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matchers(&self) -> &[ProcessNameMatcher] {
        &self.matchers
    }

    /// Tokens as the user wrote them, in list order.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().map(ProcessNameMatcher::source)
    }

    /// Returns the first name, in iteration order, that any pattern matches.
    pub fn first_match<'a, I>(&self, names: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        if self.matchers.is_empty() {
            return None;
        }
        names
            .into_iter()
            .map(String::as_str)
            .find(|name| self.matchers.iter().any(|m| m.is_match(name)))
    }
}

/// The three per-mode pattern sets.
#[derive(Debug, Clone, Default)]
pub struct PatternBook {
    pub turbo: PatternSet,
    pub performance: PatternSet,
    pub silent: PatternSet,
}

impl PatternBook {
    pub fn compile(turbo: &str, performance: &str, silent: &str) -> Self {
        Self {
            turbo: PatternSet::compile(turbo),
            performance: PatternSet::compile(performance),
            silent: PatternSet::compile(silent),
        }
    }

    /// Resolves the highest-priority class with a live match.
    /// Priority: Turbo, then Performance, then Silent.
    pub fn resolve<'a, I>(&self, names: I) -> Option<(Mode, &'a str)>
    where
        I: IntoIterator<Item = &'a String> + Clone,
    {
        [
            (Mode::Turbo, &self.turbo),
            (Mode::Balanced, &self.performance),
            (Mode::Silent, &self.silent),
        ]
        .into_iter()
        .find_map(|(mode, set)| set.first_match(names.clone()).map(|name| (mode, name)))
    }
}

fn strip_exe(token: &str) -> &str {
    let len = token.len();
    if len >= 4 && token.is_char_boundary(len - 4) && token[len - 4..].eq_ignore_ascii_case(".exe") {
        &token[..len - 4]
    } else {
        token
    }
}
