mod common;

use axum::http::StatusCode;
use tuya_relay::FetchError;
use tuya_relay::client::MAX_BODY_BYTES;

use common::{MockVendor, Reply, unreachable_client};

#[tokio::test]
async fn signed_request_is_accepted_by_vendor() {
    let vendor = MockVendor::start(Reply::new(StatusCode::OK, r#"{"result":{"online":true}}"#)).await;
    let response = vendor.client().get_device().await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, br#"{"result":{"online":true}}"#);
}

#[tokio::test]
async fn client_reports_transport_error_without_status() {
    let err = unreachable_client().await.get_device().await.unwrap_err();
    assert!(matches!(err, FetchError::Transport(_)));
}

#[tokio::test]
async fn client_returns_raw_status_and_body() {
    let vendor = MockVendor::start(Reply::new(StatusCode::NOT_FOUND, "gone")).await;
    let response = vendor.client().get_device().await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, b"gone");
}

#[tokio::test]
async fn client_truncates_oversized_body() {
    let big: &'static str = Box::leak("x".repeat(3 << 20).into_boxed_str());
    let vendor = MockVendor::start(Reply::new(StatusCode::OK, big)).await;

    let response = vendor.client().get_device().await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.len(), MAX_BODY_BYTES);
}
