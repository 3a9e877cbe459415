//! HMAC-SHA256 request signing for the Tuya cloud "service management" API.
//!
//! Every request carries a signature over
//!
//! ```text
//! client_id + access_token + t + nonce + stringToSign
//! ```
//!
//! where `stringToSign` is the newline-joined
//! `METHOD`, `hex(sha256(body))`, signed headers (always empty here) and the
//! path with its sorted, form-encoded query. The secret itself is never sent.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::credential::Credentials;

type HmacSha256 = Hmac<Sha256>;

pub const SIGN_METHOD: &str = "HMAC-SHA256";

/// `hex(sha256(""))`, the content hash of every bodiless request.
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Signature and the timestamp it was minted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Uppercase hex HMAC.
    pub sign: String,
    /// Milliseconds since the Unix epoch, decimal.
    pub t: String,
}

/// Computes vendor signatures for one client identity.
#[derive(Clone)]
pub struct Signer {
    client_id: String,
    access_token: String,
    client_secret: String,
}

impl Signer {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            client_id: credentials.client_id.clone(),
            access_token: credentials.access_token.clone(),
            client_secret: credentials.client_secret.clone(),
        }
    }

    /// Sign a request with a freshly minted timestamp.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        body: &[u8],
    ) -> SignedHeaders {
        let t = chrono::Utc::now().timestamp_millis();
        self.sign_at(t, method, path, query, body)
    }

    /// Sign a request for a caller-supplied timestamp. Deterministic.
    pub fn sign_at(
        &self,
        t_millis: i64,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        body: &[u8],
    ) -> SignedHeaders {
        let t = t_millis.to_string();
        let nonce = "";
        let string_to_sign = string_to_sign(method, path, query, body);

        let mut mac = HmacSha256::new_from_slice(self.client_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(self.client_id.as_bytes());
        mac.update(self.access_token.as_bytes());
        mac.update(t.as_bytes());
        mac.update(nonce.as_bytes());
        mac.update(string_to_sign.as_bytes());

        SignedHeaders {
            sign: hex::encode_upper(mac.finalize().into_bytes()),
            t,
        }
    }
}

/// Lowercase hex SHA-256 of the request body.
pub fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Builds the canonical `stringToSign` for a request.
pub fn string_to_sign(method: &str, path: &str, query: &[(&str, &str)], body: &[u8]) -> String {
    // No extra headers take part in the signature.
    let signed_headers = "";

    let mut url = path.to_string();
    let encoded = encode_query(query);
    if !encoded.is_empty() {
        url.push('?');
        url.push_str(&encoded);
    }

    [
        method.to_uppercase(),
        content_hash(body),
        signed_headers.to_string(),
        url,
    ]
    .join("\n")
}

/// Form-encodes query parameters in ascending key order.
///
/// Pairs sharing a key keep their relative order.
pub fn encode_query(query: &[(&str, &str)]) -> String {
    let mut pairs = query.to_vec();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", form_escape(k), form_escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn form_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
