#![forbid(unsafe_code)]

use std::time::Duration;

use serde_json::Value;

use super::ProviderError;

pub(crate) fn build_agent(timeout_ms: u64, user_agent: &str) -> ureq::Agent {
    let timeout = Duration::from_millis(timeout_ms.max(100));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(user_agent)
        .build()
}

pub(crate) fn read_json(
    provider: &'static str,
    response: ureq::Response,
) -> Result<Value, ProviderError> {
    serde_json::from_reader(response.into_reader())
        .map_err(|e| ProviderError::parse(provider, format!("json: {e}")))
}

pub(crate) fn provider_error_from_ureq(provider: &'static str, err: ureq::Error) -> ProviderError {
    match err {
        ureq::Error::Status(status, _) => ProviderError::HttpStatus { provider, status },
        ureq::Error::Transport(transport) => {
            let combined = format!("{:?} {}", transport.kind(), transport);
            match classify_transport_error_kind(&combined) {
                "timeout" => ProviderError::Timeout { provider },
                kind => ProviderError::Transport { provider, kind },
            }
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

pub(crate) fn trim_base_url(base: &str) -> &str {
    base.trim().trim_end_matches('/')
}
