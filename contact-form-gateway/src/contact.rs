use crate::ContactFormError;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

static EMAIL_PATTERN: OnceLock<Regex> = OnceLock::new();

/// A contact form submission as it arrives from the website, before validation.
#[derive(Deserialize, Debug, Default)]
pub struct ContactFormMessage {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub message: Option<String>,
}

impl ContactFormMessage {
    pub fn validate(&self) -> Result<ValidatedContactFormMessage<'_>, ContactFormError> {
        let (Some(name), Some(email), Some(message)) = (
            non_empty(&self.name),
            non_empty(&self.email),
            non_empty(&self.message),
        ) else {
            return Err(ContactFormError::MissingFields);
        };

        if !is_valid_email(email) {
            return Err(ContactFormError::InvalidEmail(email.into()));
        }

        Ok(ValidatedContactFormMessage {
            name,
            email,
            phone: non_empty(&self.phone),
            company: non_empty(&self.company),
            message,
        })
    }
}

#[derive(Debug)]
pub struct ValidatedContactFormMessage<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub company: Option<&'a str>,
    pub message: &'a str,
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
        .is_match(email)
}
