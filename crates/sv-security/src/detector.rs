//! Sensitive-data detection

use serde::{Deserialize, Serialize};

use crate::patterns::{CategorySet, SensitiveCategory};

/// One occurrence of sensitive data.
///
/// `start`/`end` are UTF-8 byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSpan {
    pub category: SensitiveCategory,
    pub start: usize,
    pub end: usize,
    pub raw_text: String,
}

impl MatchSpan {
    pub(crate) fn from_match(category: SensitiveCategory, m: &regex::Match<'_>) -> Self {
        Self {
            category,
            start: m.start(),
            end: m.end(),
            raw_text: m.as_str().to_string(),
        }
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub has_sensitive_data: bool,
    pub categories: CategorySet,
}

impl DetectionResult {
    pub fn from_categories(categories: CategorySet) -> Self {
        Self {
            has_sensitive_data: !categories.is_empty(),
            categories,
        }
    }
}

/// Anything that can classify text into sensitive categories
pub trait Detector: Send + Sync {
    fn detect(&self, text: &str) -> DetectionResult;

    /// Detect on content that may not have been decodable.
    ///
    /// `None` means the caller could not decode the bytes as text; the
    /// result is then empty rather than an error.
    fn detect_decoded(&self, text: Option<&str>) -> DetectionResult {
        match text {
            Some(text) => self.detect(text),
            None => DetectionResult::default(),
        }
    }
}

/// Detector backed by the fixed pattern registry
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexDetector;

impl RegexDetector {
    pub fn new() -> Self {
        Self
    }

    /// Every match of every category, grouped by category in canonical
    /// order and by position within a category.
    pub fn find_spans(&self, text: &str) -> Vec<MatchSpan> {
        SensitiveCategory::ALL
            .into_iter()
            .flat_map(|category| {
                category
                    .pattern()
                    .find_iter(text)
                    .map(move |m| MatchSpan::from_match(category, &m))
            })
            .collect()
    }
}

impl Detector for RegexDetector {
    fn detect(&self, text: &str) -> DetectionResult {
        let categories: CategorySet = SensitiveCategory::ALL
            .into_iter()
            .filter(|category| category.pattern().is_match(text))
            .collect();

        DetectionResult::from_categories(categories)
    }
}

/// Decode uploaded bytes as UTF-8 text, `None` for binary content
pub fn decode_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_all_categories() {
        let detector = RegexDetector::new();
        let text = "mail jane@corp.io, call 555.123.4567, card 1234 5678 9012 3456, ssn 123-45-6789";

        let result = detector.detect(text);

        assert!(result.has_sensitive_data);
        assert_eq!(result.categories, CategorySet::all());
    }

    #[test]
    fn test_detect_nothing() {
        let detector = RegexDetector::new();
        let result = detector.detect("Quarterly report, nothing to see here.");

        assert!(!result.has_sensitive_data);
        assert!(result.categories.is_empty());
    }

    #[test]
    fn test_flag_matches_categories() {
        let detector = RegexDetector::new();
        let samples = [
            "",
            "plain words",
            "a@b.co",
            "12345",
            "123456789",
            "phone 555-123-4567 and more",
            "1234-5678-9012-3456",
        ];

        for text in samples {
            let result = detector.detect(text);
            assert_eq!(result.has_sensitive_data, !result.categories.is_empty(), "{text}");
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let detector = RegexDetector::new();
        let text = "john.doe@example.com 555-123-4567";
        assert_eq!(detector.detect(text), detector.detect(text));
    }

    #[test]
    fn test_undecodable_content_is_skipped() {
        let detector = RegexDetector::new();
        let bytes = [0xff, 0xfe, 0x00, 0x41];

        let result = detector.detect_decoded(decode_text(&bytes));

        assert_eq!(result, DetectionResult::default());
    }

    #[test]
    fn test_find_spans_offsets() {
        let detector = RegexDetector::new();
        let text = "SSN 123-45-6789 / mail a@b.co";

        let spans = detector.find_spans(text);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].category, SensitiveCategory::Email);
        assert_eq!(&text[spans[0].start..spans[0].end], "a@b.co");
        assert_eq!(spans[1].category, SensitiveCategory::Ssn);
        assert_eq!(spans[1].raw_text, "123-45-6789");
        assert!(spans.iter().all(|s| s.end > s.start));
    }
}
