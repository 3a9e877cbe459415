#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use tokio::task::JoinHandle;
use tuya_relay::{Credentials, Signer, TuyaClient};

pub const DEVICE_ID: &str = "dev1";
pub const CLIENT_ID: &str = "client-abc";
pub const CLIENT_SECRET: &str = "super-secret";
pub const ACCESS_TOKEN: &str = "token-xyz";

/// Canned reply of the fake vendor.
#[derive(Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: &'static str,
    pub delay: Duration,
}

impl Reply {
    pub fn new(status: StatusCode, body: &'static str) -> Self {
        Self {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone)]
struct VendorState {
    reply: Reply,
    hits: Arc<AtomicUsize>,
    served: Arc<AtomicUsize>,
    signer: Signer,
}

/// Fake Tuya cloud answering the device-state route.
///
/// Requests whose signature does not verify get a 401 with a JSON body.
/// `hits` counts requests received, `served` those answered after the delay.
pub struct MockVendor {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    served: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockVendor {
    pub async fn start(reply: Reply) -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let served = Arc::new(AtomicUsize::new(0));
        let state = VendorState {
            reply,
            hits: Arc::clone(&hits),
            served: Arc::clone(&served),
            signer: Signer::new(&credentials("http://unused")),
        };

        let app = Router::new()
            .route(&format!("/v1.0/devices/{DEVICE_ID}"), get(device))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            hits,
            served,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> Arc<TuyaClient> {
        Arc::new(TuyaClient::new(credentials(&self.base_url())).unwrap())
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn device(State(state): State<VendorState>, headers: HeaderMap) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if !signature_valid(&state.signer, &headers) {
        return (
            StatusCode::UNAUTHORIZED,
            r#"{"success":false,"code":1004,"msg":"sign invalid"}"#,
        )
            .into_response();
    }

    if !state.reply.delay.is_zero() {
        tokio::time::sleep(state.reply.delay).await;
    }
    state.served.fetch_add(1, Ordering::SeqCst);
    (state.reply.status, state.reply.body).into_response()
}

fn signature_valid(signer: &Signer, headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let (Some(client_id), Some(token), Some(method), Some(t), Some(sign)) = (
        header("client_id"),
        header("access_token"),
        header("sign_method"),
        header("t"),
        header("sign"),
    ) else {
        return false;
    };
    let Ok(t) = t.parse::<i64>() else {
        return false;
    };

    let expected = signer.sign_at(t, "GET", &format!("/v1.0/devices/{DEVICE_ID}"), &[], b"");
    client_id == CLIENT_ID && token == ACCESS_TOKEN && method == "HMAC-SHA256" && sign == expected.sign
}

pub fn credentials(base_url: &str) -> Credentials {
    Credentials::new(base_url, DEVICE_ID, CLIENT_ID, CLIENT_SECRET, ACCESS_TOKEN)
}

/// A client pointed at a port nothing listens on.
pub async fn unreachable_client() -> Arc<TuyaClient> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Arc::new(TuyaClient::new(credentials(&format!("http://{addr}"))).unwrap())
}
