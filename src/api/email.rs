//! Verification-code email delivery.
//!
//! Delivery is synchronous at login time; the code is useless after ten
//! minutes so queueing buys nothing here. The default local sender logs the
//! code instead of sending real email.

use crate::cli::globals::GlobalArgs;
use anyhow::{anyhow, Result};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone)]
pub enum EmailSender {
    /// Local dev sender that logs the code and returns `Ok(())`.
    Log,
    /// HTTP email API (Resend-style JSON POST with a bearer key).
    HttpApi {
        http: Client,
        url: String,
        api_key: SecretString,
        from: String,
    },
}

impl EmailSender {
    /// Pick the sender from the runtime configuration: HTTP API when
    /// configured, the logging sender otherwise.
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed or the API
    /// key is missing for a configured API URL.
    pub fn from_globals(globals: &GlobalArgs) -> Result<Self> {
        let Some(url) = &globals.email_api_url else {
            return Ok(Self::Log);
        };

        let api_key = globals
            .email_api_key
            .clone()
            .ok_or_else(|| anyhow!("email API URL configured without an API key"))?;

        Ok(Self::HttpApi {
            http: Client::builder().user_agent(crate::APP_USER_AGENT).build()?,
            url: url.clone(),
            api_key,
            from: globals.email_from.clone(),
        })
    }

    /// Deliver a verification code.
    /// # Errors
    /// Returns an error when the email API rejects the message.
    pub async fn send(&self, to: &str, code: &str) -> Result<()> {
        match self {
            Self::Log => {
                info!(to_email = %to, %code, "verification email send stub");
                Ok(())
            }
            Self::HttpApi {
                http,
                url,
                api_key,
                from,
            } => {
                let response = http
                    .post(url)
                    .bearer_auth(api_key.expose_secret())
                    .json(&json!({
                        "from": from,
                        "to": [to],
                        "subject": "Your CarePlus verification code",
                        "text": format!(
                            "Your verification code is {code}. It expires in 10 minutes."
                        ),
                    }))
                    .send()
                    .await?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    return Err(anyhow!("{} - {}, {}", url, status, body));
                }

                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals() -> GlobalArgs {
        GlobalArgs::new(
            "https://project.supabase.co".to_string(),
            SecretString::from("anon".to_string()),
            SecretString::from("service".to_string()),
        )
    }

    #[test]
    fn test_defaults_to_log_sender() {
        let sender = EmailSender::from_globals(&globals()).unwrap();
        assert!(matches!(sender, EmailSender::Log));
    }

    #[test]
    fn test_api_url_without_key_rejected() {
        let mut globals = globals();
        globals.email_api_url = Some("https://api.resend.com/emails".to_string());

        assert!(EmailSender::from_globals(&globals).is_err());
    }

    #[tokio::test]
    async fn test_log_sender_always_succeeds() {
        let sender = EmailSender::Log;
        assert!(sender.send("doc@careplus.dev", "123456").await.is_ok());
    }
}
