use serde::{Deserialize, Serialize};

use crate::detector::MatchSpan;
use crate::patterns::{CategorySet, SensitiveCategory};

/// A single substitution performed by the masker.
///
/// `span` locates the match in the original text; `masked_start` and
/// `masked_end` locate `replacement` in the masked output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redaction {
    pub span: MatchSpan,
    pub masked_start: usize,
    pub masked_end: usize,
    pub replacement: String,
}

impl Redaction {
    /// Whether the match was left as-is (malformed digit count)
    pub fn passed_through(&self) -> bool {
        self.replacement == self.span.raw_text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskResult {
    pub text: String,
    pub redactions: Vec<Redaction>,
}

/// Partial-redaction engine for the sensitive categories
#[derive(Debug, Clone, Copy, Default)]
pub struct Masker;

impl Masker {
    pub fn new() -> Self {
        Self
    }

    /// Mask every match of the requested categories.
    ///
    /// Spans are collected from the unmasked text first, categories in
    /// canonical order; a match overlapping one already claimed by an
    /// earlier category is dropped. Substitution is then a single pass.
    pub fn mask(&self, text: &str, categories: &CategorySet) -> MaskResult {
        let spans = self.find_spans(text, categories);

        let mut masked = String::with_capacity(text.len());
        let mut redactions = Vec::with_capacity(spans.len());
        let mut cursor = 0;

        for span in spans {
            masked.push_str(&text[cursor..span.start]);

            let replacement = redact(span.category, &span.raw_text);
            let masked_start = masked.len();
            masked.push_str(&replacement);

            cursor = span.end;
            redactions.push(Redaction {
                masked_start,
                masked_end: masked.len(),
                replacement,
                span,
            });
        }
        masked.push_str(&text[cursor..]);

        MaskResult {
            text: masked,
            redactions,
        }
    }

    /// Non-overlapping spans for `categories`, ordered by position
    pub fn find_spans(&self, text: &str, categories: &CategorySet) -> Vec<MatchSpan> {
        let mut claimed: Vec<MatchSpan> = Vec::new();

        for category in categories.iter() {
            for m in category.pattern().find_iter(text) {
                if claimed.iter().any(|s| s.overlaps(m.start(), m.end())) {
                    continue;
                }
                claimed.push(MatchSpan::from_match(category, &m));
            }
        }

        claimed.sort_by_key(|s| s.start);
        claimed
    }
}

/// Redacted form of one matched substring
pub fn redact(category: SensitiveCategory, raw: &str) -> String {
    match category {
        SensitiveCategory::Email => mask_email(raw),
        SensitiveCategory::Phone => mask_phone(raw),
        SensitiveCategory::CreditCard => mask_credit_card(raw),
        SensitiveCategory::Ssn => mask_ssn(raw),
    }
}

/// `john.doe@example.com` -> `j***@example.com`
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => match local.chars().next() {
            Some(first) => format!("{}***@{}", first, domain),
            None => email.to_string(),
        },
        None => email.to_string(),
    }
}

/// `555-123-4567` -> `(555)***-4567`
fn mask_phone(phone: &str) -> String {
    let digits = ascii_digits(phone);
    if digits.len() == 10 {
        format!("({})***-{}", &digits[..3], &digits[6..])
    } else {
        phone.to_string()
    }
}

/// `1234-5678-9012-3456` -> `1234****3456`
fn mask_credit_card(card: &str) -> String {
    let digits = ascii_digits(card);
    if digits.len() == 16 {
        format!("{}****{}", &digits[..4], &digits[12..])
    } else {
        card.to_string()
    }
}

/// `123-45-6789` -> `123-**-6789`
fn mask_ssn(ssn: &str) -> String {
    let digits = ascii_digits(ssn);
    if digits.len() == 9 {
        format!("{}-**-{}", &digits[..3], &digits[5..])
    } else {
        ssn.to_string()
    }
}

// Non-ASCII digits are dropped here, so a Unicode-digit match fails the
// length check and passes through unmasked.
fn ascii_digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}
