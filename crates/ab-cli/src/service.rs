//! `<sraix>` over HTTP.

use std::time::Duration;

use ab_core::{CoreError, ExternalService, ServiceRequest};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct Query<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    botid: Option<&'a str>,
}

#[derive(Deserialize)]
struct Reply {
    response: String,
}

/// Posts each query as JSON to a single endpoint. A `host` attribute on the
/// tag overrides the endpoint for that call.
pub struct HttpService {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpService {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ExternalService for HttpService {
    fn call(&self, request: &ServiceRequest) -> ab_core::Result<String> {
        let url = request.host.as_deref().unwrap_or(&self.endpoint);
        let body = Query {
            query: &request.query,
            hint: request.hint.as_deref(),
            botid: request.botid.as_deref(),
        };
        let reply: Reply = self
            .client
            .post(url)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| CoreError::Service(format!("{url}: {e}")))?;
        tracing::debug!(url, response = %reply.response, "service replied");
        Ok(reply.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_omits_missing_fields() {
        let body = Query {
            query: "weather",
            hint: None,
            botid: Some("b1"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"query": "weather", "botid": "b1"}));
    }

    #[test]
    fn test_unreachable_endpoint_is_a_service_error() {
        let service = HttpService::new("http://127.0.0.1:9/", Duration::from_millis(200)).unwrap();
        let request = ServiceRequest {
            query: "hi".into(),
            hint: None,
            host: None,
            botid: None,
            service: None,
            default: None,
            timeout: Duration::from_millis(200),
        };
        assert!(matches!(service.call(&request), Err(CoreError::Service(_))));
    }
}
