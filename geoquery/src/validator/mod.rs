use serde::Serialize;
use std::collections::BTreeSet;

pub mod known_tables;
pub mod limit;
pub mod read_only;

/// Result of the static SQL safety check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationVerdict {
    pub fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Candidate SQL prepared once and shared by every check.
pub struct Candidate<'a> {
    pub original: &'a str,
    /// Comments removed; string-literal, quoted-identifier and
    /// dollar-quoted bodies blanked.
    pub stripped: String,
    /// `stripped`, uppercased.
    pub upper: String,
}

impl<'a> Candidate<'a> {
    pub fn new(sql: &'a str) -> Self {
        let stripped = strip_comments_and_literals(sql);
        let upper = stripped.to_uppercase();
        Self {
            original: sql,
            stripped,
            upper,
        }
    }
}

/// SqlCheck is one link of the validation chain.
///
/// Returns `Err(reason)` to reject the candidate; the chain stops at the
/// first rejection.
pub trait SqlCheck: Send + Sync {
    fn check(&self, candidate: &Candidate<'_>) -> Result<(), String>;
}

pub struct SqlValidator {
    checks: Vec<Box<dyn SqlCheck>>,
}

impl SqlValidator {
    /// The default chain: SELECT-first, no mutating keywords, bounded LIMIT.
    pub fn new(max_limit: u64) -> Self {
        Self {
            checks: vec![
                Box::new(read_only::SelectFirst),
                Box::new(read_only::NoMutation),
                Box::new(limit::BoundedLimit::new(max_limit)),
            ],
        }
    }

    /// Opt-in strict mode: reject tables absent from the schema catalog.
    pub fn with_known_tables(mut self, tables: BTreeSet<String>) -> Self {
        self.checks
            .push(Box::new(known_tables::KnownTables::new(tables)));
        self
    }

    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        let candidate = Candidate::new(sql);
        for check in &self.checks {
            if let Err(reason) = check.check(&candidate) {
                tracing::warn!(reason = %reason, "Rejected generated SQL");
                return ValidationVerdict::rejected(reason);
            }
        }
        ValidationVerdict::ok()
    }
}

/// Remove `-- …` and `/* … */` comments and blank the inside of
/// single-quoted literals (`'abc'` → `''`) so keyword scans only see code.
pub fn strip_comments_and_literals(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '-' && next == Some('-') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            out.push(' ');
            continue;
        }

        if c == '/' && next == Some('*') {
            i += 2;
            while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(chars.len());
            out.push(' ');
            continue;
        }

        if c == '\'' {
            out.push('\'');
            i += 1;
            while i < chars.len() {
                if chars[i] == '\'' {
                    // '' is an escaped quote inside the literal
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            out.push('\'');
            i += 1;
            continue;
        }

        // Quoted identifier; "" is an escaped quote.
        if c == '"' {
            i += 1;
            while i < chars.len() {
                if chars[i] == '"' {
                    if chars.get(i + 1) == Some(&'"') {
                        i += 2;
                        continue;
                    }
                    break;
                }
                i += 1;
            }
            out.push_str("\"\"");
            i += 1;
            continue;
        }

        if c == '$'
            && let Some(tag_len) = dollar_tag_len(&chars[i..])
        {
            let delim = &chars[i..i + tag_len];
            i += tag_len;
            while i < chars.len() && !chars[i..].starts_with(delim) {
                i += 1;
            }
            i = (i + tag_len).min(chars.len());
            out.push_str("''");
            continue;
        }

        out.push(c);
        i += 1;
    }
    out
}

/// Length of a `$tag$` / `$$` opener at the start of `s`. Positional
/// parameters like `$1` are not openers.
fn dollar_tag_len(s: &[char]) -> Option<usize> {
    let mut j = 1;
    while let Some(&c) = s.get(j) {
        if c == '$' {
            return Some(j + 1);
        }
        let ok = if j == 1 {
            c.is_alphabetic() || c == '_'
        } else {
            c.is_alphanumeric() || c == '_'
        };
        if !ok {
            return None;
        }
        j += 1;
    }
    None
}
