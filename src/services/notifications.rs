//! Client for the mail relay that delivers reservation confirmations.
//!
//! The relay is an external collaborator: it is called after a booking has
//! already committed, so every failure here is logged and swallowed by the
//! caller rather than escalated into a booking error.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::NotificationConfig;

#[derive(Debug, Serialize)]
struct ConfirmationMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: String,
}

#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    relay_url: String,
    sender: String,
}

impl Notifier {
    pub fn from_config(config: &NotificationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_default();

        Self {
            client,
            relay_url: config.relay_url.clone(),
            sender: config.sender.clone(),
        }
    }

    /// Posts a confirmation for a committed reservation to the relay.
    pub async fn send_confirmation(
        &self,
        reservation_id: i64,
        user_email: &str,
    ) -> Result<(), reqwest::Error> {
        let message = ConfirmationMessage {
            from: &self.sender,
            to: user_email,
            subject: "Reservation Confirmation",
            body: format!(
                "Your reservation has been confirmed. Reservation ID: {}",
                reservation_id
            ),
        };

        debug!(reservation_id, to = user_email, "sending confirmation");

        let response = self
            .client
            .post(&self.relay_url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;

        info!(
            reservation_id,
            status = %response.status(),
            "confirmation delivered to relay"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String) -> NotificationConfig {
        NotificationConfig {
            relay_url: url,
            sender: "noreply@theatre.example.com".to_string(),
            timeout_seconds: 2,
        }
    }

    #[tokio::test]
    async fn posts_confirmation_payload_to_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/send"))
            .and(body_partial_json(serde_json::json!({
                "to": "visitor@example.com",
                "subject": "Reservation Confirmation",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = Notifier::from_config(&config(format!("{}/api/send", server.uri())));
        notifier
            .send_confirmation(7, "visitor@example.com")
            .await
            .expect("relay accepted the message");
    }

    #[tokio::test]
    async fn relay_error_is_reported_not_panicked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = Notifier::from_config(&config(format!("{}/api/send", server.uri())));
        let result = notifier.send_confirmation(7, "visitor@example.com").await;
        assert!(result.is_err());
    }
}
