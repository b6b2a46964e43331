//! Static HTML rendering for outbox rows.
//!
//! Each template takes the JSON payload stored with the row and produces a
//! subject plus an HTML body in a shared layout. Unknown templates and
//! missing required fields are render errors; the worker treats those like
//! delivery failures.

use anyhow::{anyhow, Result};
use serde_json::Value;

/// A rendered email ready for a transport.
#[derive(Clone, Debug)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Render a stored outbox row into a deliverable email.
pub fn render(template: &str, payload: &Value) -> Result<RenderedEmail> {
    match template {
        "welcome" => render_welcome(payload),
        "verify-email" => render_verify_email(payload),
        "forgot-password" => render_forgot_password(payload),
        "otp" => render_otp(payload),
        "notification" => render_notification(payload),
        other => Err(anyhow!("unknown email template: {other}")),
    }
}

fn required<'a>(payload: &'a Value, field: &str) -> Result<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("email payload missing field: {field}"))
}

fn optional<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
</head>
<body style="margin: 0; padding: 0; background: #f7fafc; font-family: -apple-system, 'Segoe UI', sans-serif; color: #2d3748;">
  <div style="max-width: 600px; margin: 0 auto; padding: 32px 16px;">
    <div style="background: #ffffff; border-radius: 8px; padding: 32px;">
{body}
    </div>
    <p style="text-align: center; color: #a0aec0; font-size: 12px; margin-top: 24px;">
      You are receiving this email because of your Kompaso account.
    </p>
  </div>
</body>
</html>
"#,
        title = escape_html(title),
    )
}

fn button(url: &str, label: &str) -> String {
    format!(
        r#"<div style="text-align: center; margin: 30px 0;">
  <a href="{url}" style="display: inline-block; background: #2b6cb0; color: #ffffff; text-decoration: none; padding: 12px 28px; border-radius: 6px; font-weight: 600;">{label}</a>
</div>"#,
        url = escape_html(url),
        label = escape_html(label),
    )
}

fn render_welcome(payload: &Value) -> Result<RenderedEmail> {
    let name = required(payload, "name")?;
    let dashboard_url = required(payload, "dashboard_url")?;
    let body = format!(
        r#"<h2 style="margin-top: 0;">Welcome, {name}!</h2>
<p>Your account is ready. We're glad to have you on board.</p>
<p>Head to your dashboard to get started.</p>
{button}"#,
        name = escape_html(name),
        button = button(dashboard_url, "Go to Dashboard"),
    );
    Ok(RenderedEmail {
        subject: "Welcome to Kompaso".to_string(),
        html: layout("Welcome to Kompaso", &body),
    })
}

fn render_verify_email(payload: &Value) -> Result<RenderedEmail> {
    let name = required(payload, "name")?;
    let verify_url = required(payload, "verify_url")?;
    let body = format!(
        r#"<h2 style="margin-top: 0;">Hello, {name}</h2>
<p>Please confirm your email address to activate your account.</p>
{button}
<p style="color: #718096; font-size: 13px;">This verification link expires in 60 minutes. If you did not create an account, no further action is required.</p>"#,
        name = escape_html(name),
        button = button(verify_url, "Verify Email Address"),
    );
    Ok(RenderedEmail {
        subject: "Verify Your Email Address".to_string(),
        html: layout("Verify Your Email Address", &body),
    })
}

fn render_forgot_password(payload: &Value) -> Result<RenderedEmail> {
    let name = required(payload, "name")?;
    let reset_url = required(payload, "reset_url")?;
    let body = format!(
        r#"<h2 style="margin-top: 0;">Hello, {name}</h2>
<p>You are receiving this email because we received a password reset request for your account.</p>
{button}
<p style="color: #718096; font-size: 13px;">This password reset link expires in 60 minutes. If you did not request a password reset, no further action is required.</p>"#,
        name = escape_html(name),
        button = button(reset_url, "Reset Password"),
    );
    Ok(RenderedEmail {
        subject: "Reset Your Password".to_string(),
        html: layout("Reset Your Password", &body),
    })
}

fn render_otp(payload: &Value) -> Result<RenderedEmail> {
    let code = required(payload, "code")?;
    let expiry_minutes = payload
        .get("expiry_minutes")
        .and_then(Value::as_i64)
        .unwrap_or(10);
    let purpose = optional(payload, "purpose").unwrap_or("verify your identity");
    let mut body = format!(
        r#"<h2 style="margin-top: 0;">Your verification code</h2>
<p>Use this code to {purpose}:</p>
<div style="text-align: center; margin: 30px 0;">
  <span style="display: inline-block; background: #edf2f7; border-radius: 6px; padding: 16px 32px; font-size: 28px; letter-spacing: 8px; font-weight: 700;">{code}</span>
</div>
<p style="color: #718096; font-size: 13px;">This code expires in {expiry_minutes} minutes. Never share it with anyone.</p>"#,
        purpose = escape_html(purpose),
        code = escape_html(code),
    );
    if let Some(ip) = optional(payload, "ip_address") {
        body.push_str(&format!(
            r#"
<p style="color: #718096; font-size: 13px;">Requested from IP address {ip}.</p>"#,
            ip = escape_html(ip),
        ));
    }
    Ok(RenderedEmail {
        subject: "Your Verification Code".to_string(),
        html: layout("Your Verification Code", &body),
    })
}

fn render_notification(payload: &Value) -> Result<RenderedEmail> {
    let title = required(payload, "title")?;
    let message = required(payload, "message")?;
    let severity = optional(payload, "severity").unwrap_or("info");

    let mut body = String::new();
    if severity == "urgent" {
        body.push_str(
            r#"<div style="background: #fff5f5; border-left: 4px solid #c53030; padding: 8px 12px; margin-bottom: 16px; color: #c53030; font-weight: 600;">Urgent</div>
"#,
        );
    }
    body.push_str(&format!(
        "<h2 style=\"margin-top: 0;\">{title}</h2>\n<p>{message}</p>",
        title = escape_html(title),
        message = escape_html(message),
    ));
    if let Some(description) = optional(payload, "description") {
        body.push_str(&format!(
            "\n<p>{description}</p>",
            description = escape_html(description)
        ));
    }
    if let Some(highlight) = optional(payload, "highlight") {
        body.push_str(&format!(
            r#"
<div style="background: #ebf8ff; border-radius: 6px; padding: 16px; margin: 20px 0;">
  <p style="margin: 0; color: #4a5568;">{highlight}</p>
</div>"#,
            highlight = escape_html(highlight),
        ));
    }
    if let Some(action) = payload.get("action").filter(|value| !value.is_null()) {
        let label = action
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("Take Action");
        let url = action
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("email payload action missing url"))?;
        body.push_str("\n");
        body.push_str(&button(url, label));
    }
    if let Some(rows) = payload.get("data").and_then(Value::as_array) {
        if !rows.is_empty() {
            body.push_str(
                r#"
<table style="width: 100%; border-collapse: collapse; margin: 20px 0;">"#,
            );
            for row in rows {
                let key = row.get(0).and_then(Value::as_str).unwrap_or_default();
                let value = row.get(1).and_then(Value::as_str).unwrap_or_default();
                body.push_str(&format!(
                    r#"
  <tr>
    <td style="padding: 8px 12px; border-bottom: 1px solid #e2e8f0; font-weight: 600; width: 40%;">{key}</td>
    <td style="padding: 8px 12px; border-bottom: 1px solid #e2e8f0; color: #4a5568;">{value}</td>
  </tr>"#,
                    key = escape_html(key),
                    value = escape_html(value),
                ));
            }
            body.push_str("\n</table>");
        }
    }

    Ok(RenderedEmail {
        subject: title.to_string(),
        html: layout(title, &body),
    })
}
