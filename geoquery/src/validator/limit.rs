use regex::Regex;
use std::sync::OnceLock;

use super::{Candidate, SqlCheck};

static LIMIT_RE: OnceLock<Regex> = OnceLock::new();

fn limit_re() -> &'static Regex {
    LIMIT_RE.get_or_init(|| Regex::new(r"\bLIMIT\b").expect("static regex"))
}

/// Every LIMIT must be followed by a plain integer literal <= `max`, and at
/// least one LIMIT must be present.
pub struct BoundedLimit {
    max: u64,
}

impl BoundedLimit {
    pub fn new(max: u64) -> Self {
        Self { max }
    }

    fn check_operand(&self, rest: &str) -> Result<(), String> {
        let rest = rest.trim_start();
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err("LIMIT must be followed by an integer literal".to_string());
        }

        // `LIMIT 1000 + 1`, `LIMIT 10.5`, `LIMIT 1e9` are not plain literals
        let after = &rest[digits.len()..];
        let tail = after.trim_start();
        if after.starts_with(|c: char| c.is_alphanumeric() || c == '.' || c == '_')
            || tail.starts_with(['+', '-', '*', '/', '%', '^', '|', '.', ','])
        {
            return Err("LIMIT must be a plain integer literal".to_string());
        }

        let n: u64 = digits
            .parse()
            .map_err(|_| format!("LIMIT {digits} exceeds maximum of {}", self.max))?;
        if n > self.max {
            return Err(format!("LIMIT {n} exceeds maximum of {}", self.max));
        }
        Ok(())
    }
}

impl SqlCheck for BoundedLimit {
    fn check(&self, candidate: &Candidate<'_>) -> Result<(), String> {
        let text = candidate.upper.as_str();
        let mut seen = false;
        for m in limit_re().find_iter(text) {
            seen = true;
            self.check_operand(&text[m.end()..])?;
        }
        if seen {
            Ok(())
        } else {
            Err(format!("Missing LIMIT clause (LIMIT n with n <= {} is required)", self.max))
        }
    }
}
