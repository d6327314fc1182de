//! Pattern registry for sensitive-data categories

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Kind of sensitive data the scanner recognises.
///
/// Variant order is the canonical order used for masking and for the
/// comma-joined list stored on file records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitiveCategory {
    Email,
    Phone,
    CreditCard,
    Ssn,
}

impl SensitiveCategory {
    pub const ALL: [SensitiveCategory; 4] = [
        SensitiveCategory::Email,
        SensitiveCategory::Phone,
        SensitiveCategory::CreditCard,
        SensitiveCategory::Ssn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::CreditCard => "credit_card",
            Self::Ssn => "ssn",
        }
    }

    /// Compiled matching rule for this category
    pub fn pattern(&self) -> &'static Regex {
        pattern(*self)
    }
}

impl fmt::Display for SensitiveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensitiveCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "credit_card" => Ok(Self::CreditCard),
            "ssn" => Ok(Self::Ssn),
            other => Err(format!("Unknown sensitive category: {}", other)),
        }
    }
}

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern");
    static ref PHONE: Regex =
        Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("phone pattern");
    static ref CREDIT_CARD: Regex =
        Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b").expect("credit card pattern");
    static ref SSN: Regex = Regex::new(r"\b\d{3}-?\d{2}-?\d{4}\b").expect("ssn pattern");
}

/// Look up the rule for a category
pub fn pattern(category: SensitiveCategory) -> &'static Regex {
    match category {
        SensitiveCategory::Email => &*EMAIL,
        SensitiveCategory::Phone => &*PHONE,
        SensitiveCategory::CreditCard => &*CREDIT_CARD,
        SensitiveCategory::Ssn => &*SSN,
    }
}

/// Ordered set of categories. Iterates in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorySet(BTreeSet<SensitiveCategory>);

impl CategorySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        SensitiveCategory::ALL.into_iter().collect()
    }

    /// Parse a comma-joined list as stored on a file record.
    ///
    /// Empty and unrecognised entries are skipped.
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .filter_map(|entry| match entry.parse::<SensitiveCategory>() {
                Ok(category) => Some(category),
                Err(e) => {
                    tracing::debug!("{}", e);
                    None
                }
            })
            .collect()
    }

    /// Comma-joined list in canonical order
    pub fn to_list_string(&self) -> String {
        self.0
            .iter()
            .map(SensitiveCategory::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn insert(&mut self, category: SensitiveCategory) -> bool {
        self.0.insert(category)
    }

    pub fn contains(&self, category: SensitiveCategory) -> bool {
        self.0.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SensitiveCategory> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<SensitiveCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = SensitiveCategory>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
