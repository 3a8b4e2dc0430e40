use crate::config::toml_config::{credential_present, OrdersConfig, MAX_TIMEOUT_SECONDS};
use crate::domain::model::{orders_from_value, OrderFilter, RemoteOrder};
use crate::domain::ports::OrderSearch;
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

pub const HEADER_ACTION: &str = "NETOAPI_ACTION";
pub const HEADER_USERNAME: &str = "NETOAPI_USERNAME";
pub const HEADER_KEY: &str = "NETOAPI_KEY";

/// 錯誤訊息中保留的回應內容長度
const BODY_EXCERPT_CHARS: usize = 300;

/// HTTP client for the remote order-management API.
///
/// Every call is a `POST` of `{"Filter": {...}}` with the action named in a
/// header. The whole exchange runs under one `tokio::time::timeout`; dropping
/// the future on expiry cancels the request and its timer together.
#[derive(Debug, Clone)]
pub struct OrderClient {
    client: Client,
    endpoint: String,
    api_key: String,
    username: String,
    default_timeout: Duration,
}

impl OrderClient {
    pub fn new(config: &OrdersConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            username: config.username.clone(),
            default_timeout: config.timeout(),
        }
    }

    fn ensure_credentials(&self) -> Result<()> {
        if !credential_present(&self.api_key) {
            return Err(ReconcileError::config(
                "orders.api_key is not set; the order API cannot be called",
            ));
        }
        if !credential_present(&self.username) {
            return Err(ReconcileError::config(
                "orders.username is not set; the order API cannot be called",
            ));
        }
        Ok(())
    }

    fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_timeout)
            .min(Duration::from_secs(MAX_TIMEOUT_SECONDS))
    }
}

#[async_trait]
impl OrderSearch for OrderClient {
    async fn search(
        &self,
        action: &str,
        filter: &OrderFilter,
        timeout: Option<Duration>,
    ) -> Result<Vec<RemoteOrder>> {
        self.ensure_credentials()?;
        let timeout = self.effective_timeout(timeout);

        tracing::debug!(
            "📡 {} -> {} (timeout {:?}, page {:?})",
            action,
            self.endpoint,
            timeout,
            filter.get("Page")
        );

        let request = self
            .client
            .post(&self.endpoint)
            .header(HEADER_ACTION, action)
            .header(HEADER_USERNAME, &self.username)
            .header(HEADER_KEY, &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&filter.to_body());

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, ReconcileError>((status, body))
        };

        let (status, body) = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("⏱️ {} timed out after {:?}", action, timeout);
                return Err(ReconcileError::transport(format!(
                    "{} timed out after {}s",
                    action,
                    timeout.as_secs()
                )));
            }
        };

        tracing::debug!("API response status: {}", status);

        if !status.is_success() {
            return Err(ReconcileError::protocol(format!(
                "{} returned HTTP {}: {}",
                action,
                status,
                excerpt(&body)
            )));
        }

        let orders = parse_search_response(&body)?;
        tracing::debug!("📦 {} returned {} orders", action, orders.len());
        Ok(orders)
    }
}

/// 解析回應：接受 `Order` 或 `Orders`，單一物件或陣列都攤平成清單
pub fn parse_search_response(body: &str) -> Result<Vec<RemoteOrder>> {
    let value: Value = serde_json::from_str(body).map_err(|e| {
        ReconcileError::protocol(format!("unparsable response ({}): {}", e, excerpt(body)))
    })?;

    let ack = value.get("Ack").and_then(Value::as_str).unwrap_or("Success");
    let mut messages = Vec::new();
    for key in ["Errors", "Messages"] {
        if let Some(section) = value.get(key) {
            collect_messages(section, &mut messages);
        }
    }

    if ack.eq_ignore_ascii_case("Error") {
        let message = if messages.is_empty() {
            "remote reported Ack=Error without a message".to_string()
        } else {
            messages.join("; ")
        };
        return Err(ReconcileError::protocol(message));
    }

    if ack.eq_ignore_ascii_case("Warning") && !messages.is_empty() {
        tracing::warn!("⚠️ Order API warning: {}", messages.join("; "));
    }

    let orders = value
        .get("Order")
        .or_else(|| value.get("Orders"))
        .cloned()
        .unwrap_or(Value::Null);

    orders_from_value(orders)
        .map_err(|e| ReconcileError::protocol(format!("unexpected order shape: {}", e)))
}

fn collect_messages(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_messages(item, out)),
        Value::Object(map) => {
            if let Some(Value::String(message)) = map.get("Message") {
                out.push(message.clone());
            } else {
                map.values().for_each(|item| collect_messages(item, out));
            }
        }
        _ => {}
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{}…", cut)
    }
}
