use std::time::Duration;

use reqwest::{Client, Response, Url};
use secrecy::{ExposeSecret, SecretString};

use crate::{BackendKind, StoreError};

const MAX_ERROR_BODY_CHARS: usize = 240;

pub(crate) fn build_client(timeout_secs: u64) -> Result<Client, StoreError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(StoreError::from)
}

pub(crate) fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}

/// Appends path segments to a base URL, percent-encoding each segment.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = Url::parse(base_url).map_err(|error| {
        StoreError::Configuration(format!("invalid api base url `{base_url}`: {error}"))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            StoreError::Configuration(format!("api base url `{base_url}` cannot be a base"))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turns a non-2xx upstream answer into `BackendUnavailable` carrying the
/// upstream status.
pub(crate) async fn ensure_success(
    backend: BackendKind,
    response: Response,
) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    Err(StoreError::BackendUnavailable {
        backend,
        status: status.as_u16(),
        detail: format!("upstream returned {status}: {snippet}"),
    })
}

#[cfg(test)]
mod tests {
    use super::endpoint;

    #[test]
    fn endpoint_encodes_segments_and_keeps_base_path() {
        let url = endpoint("http://127.0.0.1:9000/proxy/", &["v4", "values", "Issues List!A2:C"])
            .expect("valid url");
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/proxy/v4/values/Issues%20List!A2:C");
    }

    #[test]
    fn endpoint_rejects_unparseable_base() {
        assert!(endpoint("not a url", &["v4"]).is_err());
    }
}
