//! Vendor API credential types.
//!
//! Defines the identity used for every outbound request to the Tuya cloud API.

/// Credentials loaded once at startup. Immutable afterwards.
#[derive(Clone)]
pub struct Credentials {
    /// API origin without a trailing slash, e.g. `https://openapi.tuyaus.com`.
    pub base_url: String,
    pub device_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Empty when the project does not use a user access token.
    pub access_token: String,
}

impl Credentials {
    pub fn new(
        base_url: impl Into<String>,
        device_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            device_id: device_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: access_token.into(),
        }
    }

    /// Path of the device-state resource, relative to `base_url`.
    pub fn device_path(&self) -> String {
        format!("/v1.0/devices/{}", self.device_id)
    }

    pub fn device_url(&self) -> String {
        format!("{}{}", self.base_url, self.device_path())
    }
}

// Hand-written so the secret never ends up in logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("base_url", &self.base_url)
            .field("device_id", &self.device_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("has_access_token", &!self.access_token.is_empty())
            .finish()
    }
}

/// Pre-computed authentication values forwarded verbatim instead of signing.
///
/// Debug aid only: the vendor rejects a `t` that drifts too far from the
/// server clock, so these values go stale within minutes.
#[derive(Debug, Clone)]
pub struct StaticHeaders {
    pub sign: String,
    pub t: String,
    pub nonce: Option<String>,
}
