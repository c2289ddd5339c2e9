use async_trait::async_trait;
use serde::Serialize;

use crate::{config::MailConfig, utils::AppError};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError>;
}

#[derive(Debug, Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Delivers mail through a transactional mail HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailer {
    pub fn new(config: MailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        let body = OutgoingMail {
            from: &self.config.from,
            to,
            subject,
            html,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .timeout(std::time::Duration::from_secs(10))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Mail API error: {}",
                response.status()
            )));
        }

        log::info!("📧 Mail sent to {}: {}", to, subject);
        Ok(())
    }
}

/// Development mailer: writes the message to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), AppError> {
        log::info!("📧 [log mailer] to={} subject={}\n{}", to, subject, html);
        Ok(())
    }
}

pub fn activation_url(api_url: &str, link: &str) -> String {
    format!("{}/api/users/activate/{}", api_url.trim_end_matches('/'), link)
}

pub fn activation_email(url: &str) -> String {
    format!(
        "<div>\
            <h1>Welcome!</h1>\
            <p>Follow the link below to activate your account:</p>\
            <a href=\"{url}\">{url}</a>\
        </div>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_url() {
        assert_eq!(
            activation_url("http://localhost:3002/", "abc"),
            "http://localhost:3002/api/users/activate/abc"
        );
    }

    #[test]
    fn test_activation_email_contains_link() {
        let html = activation_email("http://x/api/users/activate/abc");
        assert_eq!(html.matches("http://x/api/users/activate/abc").count(), 2);
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        assert!(LogMailer.send("a@b.co", "hi", "<p>hi</p>").await.is_ok());
    }
}
