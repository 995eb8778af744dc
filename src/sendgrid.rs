use reqwest::{StatusCode, blocking::Client};
use serde::Serialize;
use thiserror::Error;

use crate::{config::SendGridSettings, domain::ensure_trailing_slash};

const USER_AGENT_HEADER: &str = "datahygiene/0.1";

/// A fully rendered message ready for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub body: String,
    pub content_type: String,
    pub cc: Vec<String>,
}

pub trait MailSink {
    fn send(&self, email: &OutgoingEmail) -> Result<(), SendError>;
}

pub struct SendGridClient {
    client: Client,
    endpoint: String,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl SendGridClient {
    pub fn new(settings: &SendGridSettings) -> Result<Self, SendError> {
        let client = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .build()
            .map_err(SendError::Http)?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}v3/mail/send",
                ensure_trailing_slash(settings.api_base_url.trim())
            ),
            api_key: settings.api_key.clone(),
            from_email: settings.from_email.clone(),
            from_name: settings.from_name.clone(),
        })
    }
}

impl MailSink for SendGridClient {
    fn send(&self, email: &OutgoingEmail) -> Result<(), SendError> {
        let payload = MailRequest::new(&self.from_email, &self.from_name, email);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(SendError::Status { status, body })
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("SendGrid request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SendGrid error {status}: {body}")]
    Status { status: StatusCode, body: String },
}

// Request payloads ----------------------------------------------------------

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cc: Vec<Address<'a>>,
    subject: &'a str,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

impl<'a> MailRequest<'a> {
    fn new(from_email: &'a str, from_name: &'a str, email: &'a OutgoingEmail) -> Self {
        let name = |value: &'a str| Some(value).filter(|value| !value.trim().is_empty());
        Self {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &email.to_email,
                    name: name(&email.to_name),
                }],
                cc: email
                    .cc
                    .iter()
                    .map(|cc| Address {
                        email: cc,
                        name: None,
                    })
                    .collect(),
                subject: &email.subject,
            }],
            from: Address {
                email: from_email,
                name: name(from_name),
            },
            content: vec![Content {
                kind: &email.content_type,
                value: &email.body,
            }],
        }
    }
}
