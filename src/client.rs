use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};

use crate::credential::{Credentials, StaticHeaders};
use crate::error::FetchError;
use crate::signer::{SIGN_METHOD, Signer};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);
/// Bytes beyond this are dropped without error.
pub const MAX_BODY_BYTES: usize = 2 << 20;

const POOL_MAX_IDLE_PER_HOST: usize = 32;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Where the authentication headers of each request come from.
#[derive(Clone)]
pub enum HeaderSource {
    /// Sign every request with HMAC-SHA256.
    Signed(Signer),
    /// Forward fixed values from configuration.
    Static(StaticHeaders),
}

/// Status and (possibly truncated) body of one upstream exchange.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Client for the single device-state resource of the Tuya cloud API.
///
/// Cheap to share behind an `Arc`; the underlying connection pool is reused
/// across calls.
pub struct TuyaClient {
    credentials: Credentials,
    headers: HeaderSource,
    http_client: Client,
}

impl TuyaClient {
    pub fn new(credentials: Credentials) -> Result<Self, FetchError> {
        let headers = HeaderSource::Signed(Signer::new(&credentials));
        Self::with_header_source(credentials, headers)
    }

    pub fn with_header_source(
        credentials: Credentials,
        headers: HeaderSource,
    ) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()?;

        Ok(Self {
            credentials,
            headers,
            http_client,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Authentication headers for a bodiless GET of `path`.
    pub fn auth_headers(&self, path: &str) -> Result<HeaderMap, FetchError> {
        let mut map = HeaderMap::new();
        insert(&mut map, "client_id", &self.credentials.client_id)?;
        if !self.credentials.access_token.is_empty() {
            insert(&mut map, "access_token", &self.credentials.access_token)?;
        }

        match &self.headers {
            HeaderSource::Signed(signer) => {
                let signed = signer.sign(Method::GET.as_str(), path, &[], b"");
                insert(&mut map, "sign", &signed.sign)?;
                insert(&mut map, "t", &signed.t)?;
            }
            HeaderSource::Static(fixed) => {
                insert(&mut map, "sign", &fixed.sign)?;
                insert(&mut map, "t", &fixed.t)?;
                if let Some(nonce) = &fixed.nonce {
                    insert(&mut map, "nonce", nonce)?;
                }
            }
        }

        insert(&mut map, "sign_method", SIGN_METHOD)?;
        Ok(map)
    }

    /// GET the device state.
    ///
    /// Returns whatever status and body the vendor sent, without judging
    /// them. Dropping the future aborts the request.
    pub async fn get_device(&self) -> Result<UpstreamResponse, FetchError> {
        let path = self.credentials.device_path();
        let url = self.credentials.device_url();
        let headers = self.auth_headers(&path)?;

        tracing::debug!(%url, "Requesting device state");

        let mut response = self
            .http_client
            .get(&url)
            .headers(headers)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            let room = MAX_BODY_BYTES - body.len();
            if chunk.len() >= room {
                body.extend_from_slice(&chunk[..room]);
                tracing::warn!(limit = MAX_BODY_BYTES, "Upstream body truncated");
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(UpstreamResponse { status, body })
    }
}

fn insert(map: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), FetchError> {
    let value = HeaderValue::from_str(value).map_err(|_| FetchError::InvalidHeader(name))?;
    map.insert(HeaderName::from_static(name), value);
    Ok(())
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(REQUEST_TIMEOUT)
    } else {
        FetchError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(token: &str) -> Credentials {
        Credentials::new("https://openapi.example.test", "dev1", "cid", "secret", token)
    }

    #[test]
    fn signed_headers_present() {
        let client = TuyaClient::new(credentials("tok")).unwrap();
        let headers = client.auth_headers("/v1.0/devices/dev1").unwrap();

        assert_eq!(headers["client_id"], "cid");
        assert_eq!(headers["access_token"], "tok");
        assert_eq!(headers["sign_method"], "HMAC-SHA256");
        assert_eq!(headers["sign"].len(), 64);
        assert!(headers["t"].to_str().unwrap().parse::<i64>().is_ok());
        assert!(headers.get("nonce").is_none());
    }

    #[test]
    fn empty_access_token_is_omitted() {
        let client = TuyaClient::new(credentials("")).unwrap();
        let headers = client.auth_headers("/v1.0/devices/dev1").unwrap();
        assert!(headers.get("access_token").is_none());
    }

    #[test]
    fn static_headers_are_forwarded() {
        let fixed = StaticHeaders {
            sign: "ABCDEF".to_string(),
            t: "1700000000000".to_string(),
            nonce: Some("n-1".to_string()),
        };
        let client =
            TuyaClient::with_header_source(credentials(""), HeaderSource::Static(fixed)).unwrap();
        let headers = client.auth_headers("/v1.0/devices/dev1").unwrap();

        assert_eq!(headers["sign"], "ABCDEF");
        assert_eq!(headers["t"], "1700000000000");
        assert_eq!(headers["nonce"], "n-1");
        assert_eq!(headers["sign_method"], "HMAC-SHA256");
    }

    #[test]
    fn header_value_with_newline_is_rejected() {
        let client = TuyaClient::new(credentials("bad\ntoken")).unwrap();
        let err = client.auth_headers("/v1.0/devices/dev1").unwrap_err();
        assert!(matches!(err, FetchError::InvalidHeader("access_token")));
    }
}
