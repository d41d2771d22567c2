mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{body_string, build_context, expect_text, get, post};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tower::ServiceExt;
use vitals_crypto::{keys, signature, Encryptor};
use vitals_server::config::ServerConfig;

fn gzip_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn counter_path_updates_accumulate() {
    let ctx = build_context(&ServerConfig::testing()).await;

    for _ in 0..2 {
        let resp = post(&ctx.app, "/update/counter/PollCount/5", Body::empty()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = get(&ctx.app, "/value/counter/PollCount").await;
    assert_eq!(expect_text(resp, StatusCode::OK).await, "10");
}

#[tokio::test]
async fn gauge_path_updates_take_last_writer() {
    let ctx = build_context(&ServerConfig::testing()).await;

    post(&ctx.app, "/update/gauge/Alloc/42.5", Body::empty()).await;
    post(&ctx.app, "/update/gauge/Alloc/1.0", Body::empty()).await;

    let resp = get(&ctx.app, "/value/gauge/Alloc").await;
    assert_eq!(expect_text(resp, StatusCode::OK).await, "1");
}

#[tokio::test]
async fn unknown_metric_type_is_bad_request() {
    let ctx = build_context(&ServerConfig::testing()).await;

    let resp = post(&ctx.app, "/update/histogram/x/5", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = get(&ctx.app, "/value/histogram/x").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_metric_value_is_bad_request() {
    let ctx = build_context(&ServerConfig::testing()).await;

    let resp = post(&ctx.app, "/update/gauge/Alloc/abc", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = post(&ctx.app, "/update/counter/c/1.5", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_metric_name_in_path_is_not_found() {
    let ctx = build_context(&ServerConfig::testing()).await;

    let resp = post(&ctx.app, "/update/counter//3", Body::empty()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn negative_counter_delta_in_batch_is_bad_request() {
    let ctx = build_context(&ServerConfig::testing()).await;

    let resp = post(
        &ctx.app,
        "/updates/",
        r#"[{"id":"a","type":"counter","delta":-1}]"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Nothing was applied.
    let resp = get(&ctx.app, "/value/counter/a").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn json_update_echoes_counter_sum_as_float_value() {
    let ctx = build_context(&ServerConfig::testing()).await;

    post(
        &ctx.app,
        "/update/",
        r#"{"id":"hits","type":"counter","delta":3}"#,
    )
    .await;
    let resp = post(
        &ctx.app,
        "/update/",
        r#"{"id":"hits","type":"counter","delta":4}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let echoed: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(echoed["delta"], 7);
    // Legacy harness compatibility: the sum is mirrored into `value`.
    assert_eq!(echoed["value"], 7.0);
}

#[tokio::test]
async fn json_update_validation_contract() {
    let ctx = build_context(&ServerConfig::testing()).await;

    // Missing name → 404 per the legacy contract.
    let resp = post(&ctx.app, "/update/", r#"{"type":"gauge","value":1.0}"#).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Missing value for the declared type → 404 per the legacy contract.
    let resp = post(&ctx.app, "/update/", r#"{"id":"Alloc","type":"gauge"}"#).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Unknown type → 400.
    let resp = post(&ctx.app, "/update/", r#"{"id":"x","type":"histogram"}"#).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Blank type → 400.
    let resp = post(&ctx.app, "/update/", r#"{"id":"x","type":""}"#).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Negative counter delta → 400.
    let resp = post(
        &ctx.app,
        "/update/",
        r#"{"id":"x","type":"counter","delta":-5}"#,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn json_value_query_returns_metric_or_404() {
    let ctx = build_context(&ServerConfig::testing()).await;

    post(&ctx.app, "/update/gauge/Alloc/42.5", Body::empty()).await;

    let resp = post(&ctx.app, "/value/", r#"{"id":"Alloc","type":"gauge"}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let metric: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(metric["id"], "Alloc");
    assert_eq!(metric["value"], 42.5);

    let resp = post(&ctx.app, "/value/", r#"{"id":"absent","type":"gauge"}"#).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ping_reports_storage_liveness() {
    let ctx = build_context(&ServerConfig::testing()).await;

    let resp = get(&ctx.app, "/ping").await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn index_lists_all_metrics_and_compresses_when_asked() {
    let ctx = build_context(&ServerConfig::testing()).await;

    post(&ctx.app, "/update/gauge/Alloc/42.5", Body::empty()).await;
    post(&ctx.app, "/update/counter/PollCount/2", Body::empty()).await;

    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::get("/")
                .header("Accept-Encoding", "gzip")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-encoding").unwrap(), "gzip");

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let mut plain = Vec::new();
    GzDecoder::new(&body[..]).read_to_end(&mut plain).unwrap();

    let listing: serde_json::Value = serde_json::from_slice(&plain).unwrap();
    assert_eq!(listing["gauges"]["Alloc"], 42.5);
    assert_eq!(listing["counters"]["PollCount"], 2);
}

#[tokio::test]
async fn gzip_compressed_batch_is_accepted() {
    let ctx = build_context(&ServerConfig::testing()).await;

    let payload = br#"[{"id":"G","type":"gauge","value":4.5}]"#;
    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::post("/updates/")
                .header("Content-Type", "application/json")
                .header("Content-Encoding", "gzip")
                .body(Body::from(gzip_bytes(payload)))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = get(&ctx.app, "/value/gauge/G").await;
    assert_eq!(expect_text(resp, StatusCode::OK).await, "4.5");
}

#[tokio::test]
async fn encrypted_signed_batch_round_trips_through_full_chain() {
    let dir = tempfile::tempdir().unwrap();
    let (private_path, public_path) = keys::write_key_pair_pem(dir.path(), 2048).unwrap();

    let cfg = ServerConfig {
        key: "secret".to_string(),
        crypto_key: private_path.to_str().unwrap().to_string(),
        ..ServerConfig::testing()
    };
    let ctx = build_context(&cfg).await;

    // Agent-side pipeline: JSON → sign plaintext → gzip → encrypt.
    let payload =
        br#"[{"id":"G","type":"gauge","value":4.5},{"id":"C","type":"counter","delta":7}]"#;
    let hash = signature::sign(b"secret", payload);
    let encryptor = Encryptor::from_pem_file(&public_path).unwrap();
    let body = encryptor.encrypt(&gzip_bytes(payload)).unwrap();

    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::post("/updates/")
                .header("Content-Type", "application/json")
                .header("Content-Encoding", "gzip")
                .header("Content-Encryption", "1")
                .header("HashSHA256", &hash)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // The response body is signed with the shared key.
    let resp_sig = resp
        .headers()
        .get("hashsha256")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let resp_body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(signature::verify(b"secret", &resp_body, &resp_sig));

    let resp = get(&ctx.app, "/value/gauge/G").await;
    assert_eq!(expect_text(resp, StatusCode::OK).await, "4.5");
    let resp = get(&ctx.app, "/value/counter/C").await;
    assert_eq!(expect_text(resp, StatusCode::OK).await, "7");
}

#[tokio::test]
async fn tampered_signed_body_is_rejected() {
    let cfg = ServerConfig {
        key: "secret".to_string(),
        ..ServerConfig::testing()
    };
    let ctx = build_context(&cfg).await;

    let payload = br#"[{"id":"G","type":"gauge","value":4.5}]"#.to_vec();
    let hash = signature::sign(b"secret", &payload);

    let mut tampered = payload.clone();
    tampered[10] ^= 0x01;

    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::post("/updates/")
                .header("Content-Type", "application/json")
                .header("HashSHA256", &hash)
                .body(Body::from(tampered))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The untouched body passes.
    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::post("/updates/")
                .header("Content-Type", "application/json")
                .header("HashSHA256", &hash)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn trusted_subnet_gates_every_route() {
    let cfg = ServerConfig {
        trusted_subnet: "10.0.0.0/8".to_string(),
        ..ServerConfig::testing()
    };
    let ctx = build_context(&cfg).await;

    let resp = get(&ctx.app, "/ping").await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::post("/update/counter/c/1")
                .header("X-Real-IP", "10.20.30.40")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
