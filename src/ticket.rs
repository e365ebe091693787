use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::db;
use crate::models::Priority;

#[derive(Debug, Clone)]
pub struct TicketForm {
    pub name: String,
    pub email: String,
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub email_sent: bool,
    pub webhook_delivered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TicketEndpoints {
    pub webhook_url: Option<String>,
    pub email_endpoint: Option<String>,
}

impl TicketEndpoints {
    pub fn from_env() -> TicketEndpoints {
        TicketEndpoints {
            webhook_url: std::env::var("RADASSIST_WEBHOOK_URL").ok(),
            email_endpoint: std::env::var("RADASSIST_EMAIL_ENDPOINT").ok(),
        }
    }
}

pub fn new_ticket_id() -> String {
    format!("TKT-{}", Utc::now().timestamp_millis())
}

async fn post_json(client: &reqwest::Client, url: &str, body: serde_json::Value) -> bool {
    match client.post(url).json(&body).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            tracing::warn!(url = %url, status = %response.status(), "ticket notification rejected");
            false
        }
        Err(err) => {
            tracing::warn!(url = %url, error = %err, "ticket notification failed");
            false
        }
    }
}

/// Submit a support ticket. Only the database insert can fail the
/// submission; the confirmation email and webhook are best-effort and report
/// their outcome through the returned booleans.
pub async fn submit(
    pool: &PgPool,
    client: &reqwest::Client,
    endpoints: &TicketEndpoints,
    form: &TicketForm,
) -> anyhow::Result<TicketOutcome> {
    let ticket_id = new_ticket_id();
    db::insert_ticket(
        pool,
        &ticket_id,
        &form.name,
        &form.email,
        &form.description,
        form.priority,
    )
    .await?;

    let email_sent = match &endpoints.email_endpoint {
        Some(url) => {
            post_json(
                client,
                url,
                json!({
                    "email": form.email,
                    "name": form.name,
                    "ticket_id": ticket_id,
                }),
            )
            .await
        }
        None => false,
    };

    let webhook_delivered = match &endpoints.webhook_url {
        Some(url) => {
            post_json(
                client,
                url,
                json!({
                    "ticket_id": ticket_id,
                    "name": form.name,
                    "email": form.email,
                    "subject": format!("Help Ticket - {} Priority", form.priority.as_str()),
                    "message": form.description,
                    "created_at": Utc::now().to_rfc3339(),
                    "source": "radassist-worklist",
                }),
            )
            .await
        }
        None => false,
    };

    Ok(TicketOutcome {
        ticket_id,
        email_sent,
        webhook_delivered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_ids_are_prefixed_and_distinct_over_time() {
        let id = new_ticket_id();
        assert!(id.starts_with("TKT-"));
        assert!(id.len() > 4);
    }
}
