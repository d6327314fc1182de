//! Sensitive-data scanning and encryption at rest
//!
//! This crate provides:
//! - The fixed pattern registry (email, phone, credit card, SSN)
//! - Detection behind the [`Detector`] trait
//! - Partial-redaction masking with span tracking
//! - The password-derived file codec

pub mod codec;
pub mod detector;
pub mod masker;
pub mod patterns;

pub use codec::{Codec, CodecError, EncryptionKey};
pub use detector::{DetectionResult, Detector, MatchSpan, RegexDetector, decode_text};
pub use masker::{MaskResult, Masker, Redaction};
pub use patterns::{CategorySet, SensitiveCategory};
