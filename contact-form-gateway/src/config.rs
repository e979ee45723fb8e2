use std::{borrow::Cow, fmt::Display};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
const DEFAULT_MAILGUN_API_URL: &str = "https://api.mailgun.net/v3";

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub company_email: Option<String>,
    pub contact_email: Option<String>,
    pub frontend_url: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Mailgun(MailgunConfig),
    Smtp(SmtpConfig),
}

#[derive(Debug, Clone)]
pub struct MailgunConfig {
    pub api_key: Option<String>,
    pub domain: Option<String>,
    pub api_url: Cow<'static, str>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
}

/// The parts of [`Config`] the contact handler needs to address its two emails.
#[derive(Debug, Clone, Default)]
pub struct ContactSettings {
    pub company_email: Option<String>,
    pub contact_email: Option<String>,
    pub sending_domain: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, EnvironmentError> {
        let provider = match optional_var("EMAIL_PROVIDER").as_deref() {
            None | Some("mailgun") => ProviderConfig::Mailgun(MailgunConfig {
                api_key: optional_var("MAILGUN_API_KEY"),
                domain: optional_var("MAILGUN_DOMAIN"),
                api_url: optional_var("MAILGUN_API_URL")
                    .map(Cow::Owned)
                    .unwrap_or(DEFAULT_MAILGUN_API_URL.into()),
            }),
            Some("smtp") => ProviderConfig::Smtp(SmtpConfig {
                url: optional_var("SMTP_URL"),
                username: optional_var("SMTP_USERNAME"),
                password: optional_var("SMTP_PASSWORD"),
                domain: optional_var("MAIL_DOMAIN"),
            }),
            Some(other) => {
                return Err(EnvironmentError::InvalidVariable {
                    key: "EMAIL_PROVIDER",
                    value: other.into(),
                })
            }
        };
        let port = match optional_var("PORT") {
            Some(value) => value
                .parse()
                .map_err(|_| EnvironmentError::InvalidVariable { key: "PORT", value })?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            provider,
            company_email: optional_var("COMPANY_EMAIL"),
            contact_email: optional_var("CONTACT_EMAIL"),
            frontend_url: optional_var("FRONTEND_URL").unwrap_or(DEFAULT_FRONTEND_URL.into()),
            port,
        })
    }

    pub fn contact_settings(&self) -> ContactSettings {
        ContactSettings {
            company_email: self.company_email.clone(),
            contact_email: self.contact_email.clone(),
            sending_domain: self.provider.sending_domain().map(String::from),
        }
    }
}

impl ProviderConfig {
    pub fn sending_domain(&self) -> Option<&str> {
        match self {
            ProviderConfig::Mailgun(config) => config.domain.as_deref(),
            ProviderConfig::Smtp(config) => config.domain.as_deref(),
        }
    }
}

// Unset and empty variables are treated alike.
fn optional_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

#[derive(Debug)]
pub enum EnvironmentError {
    InvalidVariable { key: &'static str, value: String },
}

impl Display for EnvironmentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentError::InvalidVariable { key, value } => {
                write!(f, "Invalid value {value:?} for environment variable {key}")
            }
        }
    }
}

impl std::error::Error for EnvironmentError {}
