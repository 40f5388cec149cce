use std::time::Duration;

use crate::error::Result;

/// Arguments of one `<sraix>` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    pub query: String,
    pub hint: Option<String>,
    pub host: Option<String>,
    pub botid: Option<String>,
    pub service: Option<String>,
    pub default: Option<String>,
    pub timeout: Duration,
}

/// Blocking call to a third-party conversational service. Implementations
/// must give up after `request.timeout`.
pub trait ExternalService: Send + Sync {
    fn call(&self, request: &ServiceRequest) -> Result<String>;
}
