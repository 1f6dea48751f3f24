//! Notification channel dispatch
//!
//! Three channels: email (HTTP email API), chat webhook (block-formatted
//! payload), and generic webhook (plain JSON). Each channel validates its own
//! config and reports per-attempt success/failure; the engine records every
//! attempt as a Notification row.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::core::config::AlertConfig;
use crate::core::constants::{ALERT_EMAIL_FROM, NOTIFICATION_HTTP_TIMEOUT_SECS};
use crate::data::types::{AlertChannel, AlertRuleConfig, AlertRuleType};

/// Everything a channel needs to render a notification
#[derive(Debug, Clone)]
pub struct AlertContext {
    pub rule_type: AlertRuleType,
    pub project_name: String,
    pub message: String,
    pub file: String,
    pub line: i64,
    pub count: i64,
    pub fingerprint: String,
    pub environment: Option<String>,
    pub threshold: Option<i64>,
    pub window_minutes: Option<i64>,
    pub resolved_at: Option<i64>,
    pub dashboard_url: String,
}

impl AlertContext {
    fn issue_url(&self) -> String {
        format!("{}/dashboard/issues/{}", self.dashboard_url, self.fingerprint)
    }
}

/// Channel dispatch error
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("channel not configured: {0}")]
    NotConfigured(&'static str),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Channel dispatch seam (test doubles stand in for outbound HTTP)
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        channel: AlertChannel,
        config: &AlertRuleConfig,
        ctx: &AlertContext,
    ) -> Result<(), DispatchError>;
}

/// Production dispatcher: outbound HTTP per channel
pub struct HttpDispatcher {
    client: reqwest::Client,
    config: AlertConfig,
}

impl HttpDispatcher {
    pub fn new(config: AlertConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(NOTIFICATION_HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    async fn send_email(&self, to: &str, ctx: &AlertContext) -> Result<(), DispatchError> {
        let (Some(api_url), Some(api_key)) = (
            self.config.email_api_url.as_deref(),
            self.config.email_api_key.as_deref(),
        ) else {
            tracing::warn!("Email API not configured, skipping email notification");
            return Err(DispatchError::NotConfigured("email API"));
        };

        let (subject, html) = build_email(ctx);

        let response = self
            .client
            .post(api_url)
            .bearer_auth(api_key)
            .json(&json!({
                "from": ALERT_EMAIL_FROM,
                "to": [to],
                "subject": subject,
                "html": html,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status().as_u16()));
        }

        tracing::info!(fingerprint = %ctx.fingerprint, "Alert email sent");
        Ok(())
    }

    async fn send_chat(&self, webhook_url: &str, ctx: &AlertContext) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(webhook_url)
            .json(&build_chat_payload(ctx))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status().as_u16()));
        }

        tracing::info!(fingerprint = %ctx.fingerprint, "Chat notification sent");
        Ok(())
    }

    async fn send_webhook(&self, url: &str, ctx: &AlertContext) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(url)
            .json(&build_webhook_payload(ctx))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status().as_u16()));
        }

        tracing::info!(url, "Webhook sent");
        Ok(())
    }
}

#[async_trait]
impl AlertDispatcher for HttpDispatcher {
    async fn dispatch(
        &self,
        channel: AlertChannel,
        config: &AlertRuleConfig,
        ctx: &AlertContext,
    ) -> Result<(), DispatchError> {
        match channel {
            AlertChannel::Email => {
                let to = config
                    .email
                    .as_deref()
                    .ok_or(DispatchError::NotConfigured("email address"))?;
                self.send_email(to, ctx).await
            }
            AlertChannel::Chat => {
                let url = config
                    .chat_webhook
                    .as_deref()
                    .ok_or(DispatchError::NotConfigured("chat webhook URL"))?;
                self.send_chat(url, ctx).await
            }
            AlertChannel::Webhook => {
                let url = config
                    .webhook_url
                    .as_deref()
                    .ok_or(DispatchError::NotConfigured("webhook URL"))?;
                self.send_webhook(url, ctx).await
            }
        }
    }
}

/// Subject and HTML body for the email channel, per rule type
fn build_email(ctx: &AlertContext) -> (String, String) {
    match ctx.rule_type {
        AlertRuleType::Threshold => (
            format!(
                "[{}] Error volume threshold reached ({} events)",
                ctx.project_name, ctx.count
            ),
            format!(
                "<h2>Error volume alert for {}</h2>\
                 <p>{} events in the last {} minutes (threshold: {}).</p>\
                 <p><a href=\"{}/dashboard\">Open dashboard</a></p>",
                escape_html(&ctx.project_name),
                ctx.count,
                ctx.window_minutes.unwrap_or(0),
                ctx.threshold.unwrap_or(0),
                ctx.dashboard_url,
            ),
        ),
        AlertRuleType::Regression => (
            format!("[{}] Regression: {}", ctx.project_name, ctx.message),
            format!(
                "<h2>Resolved issue is back in {}</h2>\
                 <p><code>{}</code></p>\
                 <p>Location: <code>{}:{}</code> &middot; {} events</p>\
                 <p><a href=\"{}\">View issue</a></p>",
                escape_html(&ctx.project_name),
                escape_html(&ctx.message),
                escape_html(&ctx.file),
                ctx.line,
                ctx.count,
                ctx.issue_url(),
            ),
        ),
        AlertRuleType::NewError => (
            format!("[{}] New error: {}", ctx.project_name, ctx.message),
            format!(
                "<h2>New error in {}</h2>\
                 <p><code>{}</code></p>\
                 <p>Location: <code>{}:{}</code>{}</p>\
                 <p><a href=\"{}\">View issue</a></p>",
                escape_html(&ctx.project_name),
                escape_html(&ctx.message),
                escape_html(&ctx.file),
                ctx.line,
                ctx.environment
                    .as_deref()
                    .map(|env| format!(" &middot; {}", escape_html(env)))
                    .unwrap_or_default(),
                ctx.issue_url(),
            ),
        ),
    }
}

/// Block-formatted payload for the chat webhook channel
fn build_chat_payload(ctx: &AlertContext) -> serde_json::Value {
    let header = match ctx.rule_type {
        AlertRuleType::NewError => format!("New Error in {}", ctx.project_name),
        AlertRuleType::Threshold => format!("Error volume alert in {}", ctx.project_name),
        AlertRuleType::Regression => format!("Regression in {}", ctx.project_name),
    };

    json!({
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": header, "emoji": true }
            },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!(
                        "*Error:* `{}`\n*Location:* `{}:{}`\n*Events:* {}",
                        ctx.message, ctx.file, ctx.line, ctx.count
                    )
                }
            },
            {
                "type": "actions",
                "elements": [
                    {
                        "type": "button",
                        "text": { "type": "plain_text", "text": "View Details", "emoji": true },
                        "url": ctx.issue_url(),
                        "style": "primary"
                    }
                ]
            }
        ]
    })
}

/// Plain JSON payload for the generic webhook channel
fn build_webhook_payload(ctx: &AlertContext) -> serde_json::Value {
    json!({
        "type": ctx.rule_type.as_str(),
        "projectName": ctx.project_name,
        "error": {
            "message": ctx.message,
            "file": ctx.file,
            "line": ctx.line,
            "count": ctx.count,
            "fingerprint": ctx.fingerprint,
            "environment": ctx.environment,
        }
    })
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(rule_type: AlertRuleType) -> AlertContext {
        AlertContext {
            rule_type,
            project_name: "Checkout".to_string(),
            message: "TypeError: x is undefined".to_string(),
            file: "app.js".to_string(),
            line: 42,
            count: 7,
            fingerprint: "fp1".to_string(),
            environment: Some("production".to_string()),
            threshold: Some(5),
            window_minutes: Some(10),
            resolved_at: None,
            dashboard_url: "https://dash.example.com".to_string(),
        }
    }

    #[test]
    fn test_email_subject_per_rule_type() {
        let (subject, _) = build_email(&ctx(AlertRuleType::NewError));
        assert!(subject.contains("New error"));

        let (subject, _) = build_email(&ctx(AlertRuleType::Threshold));
        assert!(subject.contains("threshold"));

        let (subject, _) = build_email(&ctx(AlertRuleType::Regression));
        assert!(subject.contains("Regression"));
    }

    #[test]
    fn test_email_body_escapes_html() {
        let mut context = ctx(AlertRuleType::NewError);
        context.message = "Error: <script>alert(1)</script>".to_string();
        let (_, html) = build_email(&context);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_chat_payload_has_blocks_and_link() {
        let payload = build_chat_payload(&ctx(AlertRuleType::NewError));
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[2]["elements"][0]["url"],
            "https://dash.example.com/dashboard/issues/fp1"
        );
    }

    #[test]
    fn test_webhook_payload_shape() {
        let payload = build_webhook_payload(&ctx(AlertRuleType::Regression));
        assert_eq!(payload["type"], "regression");
        assert_eq!(payload["error"]["fingerprint"], "fp1");
        assert_eq!(payload["error"]["count"], 7);
    }

    #[tokio::test]
    async fn test_missing_channel_config_is_not_configured_error() {
        let dispatcher = HttpDispatcher::new(AlertConfig {
            email_api_url: None,
            email_api_key: None,
            dashboard_url: "http://localhost".to_string(),
        });

        let result = dispatcher
            .dispatch(
                AlertChannel::Email,
                &AlertRuleConfig::default(),
                &ctx(AlertRuleType::NewError),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::NotConfigured(_))));

        let result = dispatcher
            .dispatch(
                AlertChannel::Webhook,
                &AlertRuleConfig::default(),
                &ctx(AlertRuleType::NewError),
            )
            .await;
        assert!(matches!(result, Err(DispatchError::NotConfigured(_))));
    }
}
