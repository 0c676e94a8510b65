//! Form-level validation rules and the error map shown next to form fields.

use std::{collections::BTreeMap, fmt};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const INVALID_USERNAME: &str = "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.";
pub const DUPLICATE_USERNAME: &str = "A user with that username already exists.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";
pub const PASSWORD_TOO_SHORT: &str =
    "This password is too short. It must contain at least 8 characters.";
pub const PASSWORD_NUMERIC: &str = "This password is entirely numeric.";
pub const PASSWORD_SIMILAR: &str = "The password is too similar to the username.";
pub const INVALID_LOGIN: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";
pub const WRONG_OLD_PASSWORD: &str =
    "Your old password was entered incorrectly. Please enter it again.";

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;

/// Validation messages keyed by form field, plus messages for the form as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
    non_field: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn add_non_field(&mut self, message: impl Into<String>) {
        self.non_field.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.non_field.is_empty()
    }

    pub fn field(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, name: &str) -> bool {
        !self.field(name).is_empty()
    }

    pub fn non_field(&self) -> &[String] {
        &self.non_field
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for message in &self.non_field {
            if !first {
                f.write_str("; ")?;
            }
            f.write_str(message)?;
            first = false;
        }
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// Trim a required text field, rejecting blank input.
pub fn required_text(raw: Option<&str>) -> Result<String, &'static str> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(REQUIRED),
    }
}

pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.is_empty() {
        return Err(REQUIRED);
    }
    let allowed = username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '.' | '@' | '+' | '-'));
    if allowed { Ok(()) } else { Err(INVALID_USERNAME) }
}

/// Empty addresses are allowed; anything else needs a local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if email.is_empty() {
        return Ok(());
    }
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(INVALID_EMAIL);
    }

    let Some((local, domain)) = email.rsplit_once('@') else {
        return Err(INVALID_EMAIL);
    };
    let domain_ok = domain
        .split('.')
        .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
        && domain.contains('.');

    if local.is_empty() || local.contains('@') || !domain_ok {
        return Err(INVALID_EMAIL);
    }
    Ok(())
}

/// Check a new password pair, recording messages under `confirm_field`.
pub fn validate_new_password(
    errors: &mut FieldErrors,
    password_field: &'static str,
    confirm_field: &'static str,
    password: &str,
    confirmation: &str,
    username: &str,
) {
    if password.is_empty() {
        errors.add(password_field, REQUIRED);
    }
    if confirmation.is_empty() {
        errors.add(confirm_field, REQUIRED);
    }
    if password.is_empty() || confirmation.is_empty() {
        return;
    }

    if password != confirmation {
        errors.add(confirm_field, PASSWORD_MISMATCH);
        return;
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(confirm_field, PASSWORD_TOO_SHORT);
    }
    if password.chars().all(|ch| ch.is_ascii_digit()) {
        errors.add(confirm_field, PASSWORD_NUMERIC);
    }
    if !username.is_empty() && password.eq_ignore_ascii_case(username) {
        errors.add(confirm_field, PASSWORD_SIMILAR);
    }
}
