//! Rule-based field validation.
//!
//! # Design
//! A rule is a plain enum value that knows how to test one field and format
//! its violation message. Rules are typed by the value they inspect (text,
//! integer, date) so a rule can never be applied to the wrong kind of field.
//! `ValidationErrors` collects every violation per field, in rule order; a
//! field with no violations has no entry at all.
//!
//! Date rules are relative to a `today` passed in at check time, never to the
//! moment the rule list was built.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::Serialize;

/// Rule for a text field. Lengths count characters, not bytes.
#[derive(Debug, Clone, Copy)]
pub enum TextRule {
    MinLength(usize),
    MaxLength(usize),
    Format(&'static Regex),
}

impl TextRule {
    pub fn check(&self, value: &str) -> Option<String> {
        match *self {
            TextRule::MinLength(n) if value.chars().count() < n => {
                Some(format!("must be at least {n} characters"))
            }
            TextRule::MaxLength(n) if value.chars().count() > n => {
                Some(format!("must be at most {n} characters"))
            }
            TextRule::Format(re) if !re.is_match(value) => Some("invalid format".to_string()),
            _ => None,
        }
    }
}

/// Rule for an integer field. Bounds are inclusive.
#[derive(Debug, Clone, Copy)]
pub enum IntRule {
    Min(i64),
    Max(i64),
}

impl IntRule {
    pub fn check(&self, value: i64) -> Option<String> {
        match *self {
            IntRule::Min(n) if value < n => Some(format!("must be greater than or equal to {n}")),
            IntRule::Max(n) if value > n => Some(format!("must be less than or equal to {n}")),
            _ => None,
        }
    }
}

/// Rule for a date field, expressed as a day offset from "today".
#[derive(Debug, Clone, Copy)]
pub enum DateRule {
    /// The date must fall strictly after `today + n` days.
    After(u64),
    /// The date must fall on or before `today + n` days.
    NotAfter(u64),
}

impl DateRule {
    pub fn check(&self, value: NaiveDate, today: NaiveDate) -> Option<String> {
        match *self {
            DateRule::After(days) => {
                let bound = offset(today, days);
                (value <= bound).then(|| format!("must be after {bound}"))
            }
            DateRule::NotAfter(days) => {
                let bound = offset(today, days);
                (value > bound).then(|| format!("must be on or before {bound}"))
            }
        }
    }
}

fn offset(today: NaiveDate, days: u64) -> NaiveDate {
    today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// Violation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with at least one violation.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &[String])> + '_ {
        self.0.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn check_text(&mut self, field: &'static str, value: &str, rules: &[TextRule]) {
        for rule in rules {
            if let Some(msg) = rule.check(value) {
                self.add(field, msg);
            }
        }
    }

    pub fn check_integer(&mut self, field: &'static str, value: i64, rules: &[IntRule]) {
        for rule in rules {
            if let Some(msg) = rule.check(value) {
                self.add(field, msg);
            }
        }
    }

    pub fn check_date(
        &mut self,
        field: &'static str,
        value: NaiveDate,
        today: NaiveDate,
        rules: &[DateRule],
    ) {
        for rule in rules {
            if let Some(msg) = rule.check(value, today) {
                self.add(field, msg);
            }
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}
