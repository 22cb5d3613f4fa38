use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

/// Transport failure. Never propagated to the user action that triggered the
/// notification; the persisted record stands regardless.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("push request failed: {0}")]
    Request(String),
    #[error("push response malformed: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointStatus {
    Delivered,
    /// Dead registration (unregistered/invalid token); safe to prune.
    Invalid,
    /// Transient failure; the endpoint is kept.
    Failed,
}

#[derive(Debug, Clone)]
pub struct EndpointDelivery {
    pub endpoint: String,
    pub status: EndpointStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PushMessage<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub ticket_id: &'a str,
    pub notification_id: Uuid,
}

/// External delivery transport: multicast to the given endpoints, one result
/// per endpoint.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        endpoints: &[String],
        message: &PushMessage<'_>,
    ) -> Result<Vec<EndpointDelivery>, TransportError>;
}

/// Endpoints whose failure indicates a dead registration.
pub fn invalid_endpoints(report: &[EndpointDelivery]) -> Vec<String> {
    report
        .iter()
        .filter(|d| d.status == EndpointStatus::Invalid)
        .map(|d| d.endpoint.clone())
        .collect()
}

const INVALID_CODES: [&str; 3] = ["NotRegistered", "InvalidRegistration", "MismatchSenderId"];

pub struct FcmClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl FcmClient {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl PushTransport for FcmClient {
    async fn send(
        &self,
        endpoints: &[String],
        message: &PushMessage<'_>,
    ) -> Result<Vec<EndpointDelivery>, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.api_key))
            .json(&serde_json::json!({
                "registration_ids": endpoints,
                "notification": {
                    "title": message.title,
                    "body": message.body,
                },
                "data": {
                    "ticketId": message.ticket_id,
                    "notificationId": message.notification_id.to_string(),
                },
            }))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "status {}",
                response.status()
            )));
        }

        let parsed: FcmResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Response(e.to_string()))?;
        if parsed.results.len() != endpoints.len() {
            return Err(TransportError::Response(format!(
                "expected {} results, got {}",
                endpoints.len(),
                parsed.results.len()
            )));
        }

        Ok(endpoints
            .iter()
            .zip(parsed.results)
            .map(|(endpoint, result)| {
                let status = match &result.error {
                    None => EndpointStatus::Delivered,
                    Some(code) if INVALID_CODES.contains(&code.as_str()) => EndpointStatus::Invalid,
                    Some(_) => EndpointStatus::Failed,
                };
                EndpointDelivery {
                    endpoint: endpoint.clone(),
                    status,
                    detail: result.error,
                }
            })
            .collect())
    }
}

/// Stand-in when no push endpoint is configured: every delivery is a silent
/// skip with an empty report.
pub struct DisabledPush;

#[async_trait]
impl PushTransport for DisabledPush {
    async fn send(
        &self,
        _endpoints: &[String],
        _message: &PushMessage<'_>,
    ) -> Result<Vec<EndpointDelivery>, TransportError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(endpoint: &str, status: EndpointStatus) -> EndpointDelivery {
        EndpointDelivery {
            endpoint: endpoint.to_string(),
            status,
            detail: None,
        }
    }

    #[test]
    fn only_dead_registrations_are_pruned() {
        let report = [
            delivery("tok-a", EndpointStatus::Delivered),
            delivery("tok-b", EndpointStatus::Invalid),
            delivery("tok-c", EndpointStatus::Failed),
            delivery("tok-d", EndpointStatus::Invalid),
        ];
        assert_eq!(invalid_endpoints(&report), vec!["tok-b", "tok-d"]);
    }

    #[test]
    fn empty_report_prunes_nothing() {
        assert!(invalid_endpoints(&[]).is_empty());
    }
}
