//! Input validation for account and file operations
//!
//! Every check runs before anything is persisted and reports all failing
//! fields at once.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern");
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// Single-field failure
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationForm {
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl RegistrationForm {
    /// `admin_key` is the configured registration key; admin sign-up is
    /// refused when none is configured.
    pub fn validate(&self, admin_key: Option<&str>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        check_email(&mut errors, "email", &self.email);

        if self.password.is_empty() {
            errors.add("password", "This field is required.");
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Field must be at least {} characters long.", MIN_PASSWORD_LEN),
            );
        }

        if self.password2.is_empty() {
            errors.add("password2", "This field is required.");
        } else if self.password2 != self.password {
            errors.add("password2", "Field must be equal to password.");
        }

        if self.is_admin {
            let supplied = self.admin_key.as_deref().unwrap_or_default();
            match admin_key {
                Some(expected) if !expected.is_empty() && supplied == expected => {}
                _ => errors.add("admin_key", "Invalid admin registration key."),
            }
        }

        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, "email", &self.email);
        if self.password.is_empty() {
            errors.add("password", "This field is required.");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    pub filename: String,
    pub size: usize,
    pub encrypt: bool,
}

impl UploadForm {
    pub fn validate(
        &self,
        allowed_extensions: &[String],
        max_content_length: usize,
    ) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.filename.trim().is_empty() {
            errors.add("file", "No file selected");
        } else if !allowed_file(&self.filename, allowed_extensions) {
            errors.add("file", "Invalid file type");
        }

        if self.size > max_content_length {
            errors.add(
                "file",
                format!("File exceeds the {} byte limit", max_content_length),
            );
        }

        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareForm {
    pub user_email: String,
    #[serde(default)]
    pub can_edit: bool,
}

impl ShareForm {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        check_email(&mut errors, "user_email", &self.user_email);
        errors.into_result()
    }
}

/// Extension check on the last `.`-separated component, case-insensitive
pub fn allowed_file(filename: &str, allowed_extensions: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

fn check_email(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field is required.");
    } else if !is_valid_email(value) {
        errors.add(field, "Invalid email address.");
    }
}
