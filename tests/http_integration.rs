mod common;

use std::sync::Arc;

use common::{tx, TestChain, TestServer, BTC};
use node_monitor::scheduler::RefreshScheduler;
use reqwest::StatusCode;
use serde_json::Value;

fn one_btc_per_block(tip: u64) -> Arc<TestChain> {
    Arc::new(TestChain::new(tip, |_| vec![tx(&[BTC])]))
}

#[tokio::test]
async fn chain_status_reports_height() {
    let server = TestServer::start(one_btc_per_block(12345)).await;

    let response = server.get("/chainStatus").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"chain": "OK", "last_block_height": 12345})
    );
}

#[tokio::test]
async fn chain_status_fails_when_node_is_down() {
    let chain = one_btc_per_block(100);
    chain.fail_height(true);
    let server = TestServer::start(chain).await;

    let response = server.get("/chainStatus").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error getting block count:"));

    let metrics = server.get("/metrics").await.text().await.unwrap();
    assert!(metrics.contains("http_requests_total{endpoint=\"/chainStatus\"} 1"));
}

#[tokio::test]
async fn transactions_summary_over_last_25_blocks() {
    let server = TestServer::start(one_btc_per_block(500)).await;

    let response = server.get("/getTransactionsSummary?threshold=0.5").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["total_transactions"], 25);
    assert_eq!(body["total_btc"], 25.0);
}

#[tokio::test]
async fn transactions_summary_threshold_filters_outputs() {
    // Heights 76..=100, each block pays 0.3 and 0.7 BTC in one transaction.
    let chain = Arc::new(TestChain::new(100, |_| {
        vec![tx(&[30_000_000, 70_000_000]), tx(&[10_000_000])]
    }));
    let server = TestServer::start(chain).await;

    let body: Value = server
        .get("/getTransactionsSummary?threshold=0.5")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total_transactions"], 25);
    assert_eq!(body["total_btc"], 17.5);

    let body: Value = server
        .get("/getTransactionsSummary")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total_transactions"], 50);
    assert_eq!(body["total_btc"], 27.5);
}

#[tokio::test]
async fn transactions_summary_is_zero_when_node_is_down() {
    let chain = one_btc_per_block(100);
    chain.fail_height(true);
    let server = TestServer::start(chain).await;

    let response = server.get("/getTransactionsSummary?threshold=0.5").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["total_transactions"], 0);
    assert_eq!(body["total_btc"], 0.0);
}

#[tokio::test]
async fn invalid_threshold_is_rejected_but_counted() {
    let server = TestServer::start(one_btc_per_block(100)).await;

    for threshold in ["-1", "abc"] {
        let response = server
            .get(&format!("/getTransactionsSummary?threshold={threshold}"))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    let metrics = server.get("/metrics").await.text().await.unwrap();
    assert!(metrics.contains("http_requests_total{endpoint=\"/getTransactionsSummary\"} 2"));
    assert!(metrics
        .contains("http_request_duration_seconds_count{endpoint=\"/getTransactionsSummary\"} 2"));
}

#[tokio::test]
async fn summary_and_metrics_serve_published_snapshot() {
    let chain = one_btc_per_block(12345);
    let server = TestServer::start(chain.clone()).await;
    RefreshScheduler::new(server.monitor.clone(), std::time::Duration::from_secs(60))
        .run_cycle()
        .await;

    let response = server.get("/summary").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    let expected = "# Bitcoin Node Status\n\
                    bitcoin_node_block_height 12345\n\
                    bitcoin_node_connection_status 1\n\
                    \n\
                    # Transaction Summary\n\
                    transactions_above_threshold_total 25\n\
                    btc_volume_above_threshold 25\n\
                    \n";
    assert_eq!(response.text().await.unwrap(), expected);

    let metrics = server.get("/metrics").await.text().await.unwrap();
    for line in [
        "bitcoin_node_block_height 12345",
        "bitcoin_node_connection_status 1",
        "transactions_above_threshold_total 25",
        "btc_volume_above_threshold 25",
    ] {
        assert!(metrics.contains(line), "missing {line}");
    }

    // A failed cycle flips the status but keeps the last known height.
    chain.fail_height(true);
    RefreshScheduler::new(server.monitor.clone(), std::time::Duration::from_secs(60))
        .run_cycle()
        .await;
    let summary = server.get("/summary").await.text().await.unwrap();
    assert!(summary.contains("bitcoin_node_block_height 12345\n"));
    assert!(summary.contains("bitcoin_node_connection_status 0\n"));
    assert!(summary.contains("transactions_above_threshold_total 0\n"));
}

#[tokio::test]
async fn snapshot_endpoint_reports_window() {
    let server = TestServer::start(one_btc_per_block(10)).await;

    let before: Value = server.get("/api/v1/snapshot").await.json().await.unwrap();
    assert_eq!(before["status"], "disconnected");
    assert_eq!(before["stale"], true);
    assert!(before["height"].is_null());

    RefreshScheduler::new(server.monitor.clone(), std::time::Duration::from_secs(60))
        .run_cycle()
        .await;

    let after: Value = server.get("/api/v1/snapshot").await.json().await.unwrap();
    assert_eq!(after["status"], "connected");
    assert_eq!(after["height"], 10);
    assert_eq!(after["transaction_count"], 11);
    assert_eq!(after["total_btc"], 11.0);
    assert_eq!(
        after["window"],
        serde_json::json!({"tip": 10, "planned": 11, "scanned": 11})
    );
    assert_eq!(after["stale"], false);
}

#[tokio::test]
async fn health_root_and_openapi() {
    let server = TestServer::start(one_btc_per_block(1)).await;

    let health: Value = server.get("/api/v1/health").await.json().await.unwrap();
    assert_eq!(health["status"], "ok");

    let root: Value = server.get("/").await.json().await.unwrap();
    assert!(root["endpoints"]["/chainStatus"].is_string());

    let doc: Value = server
        .get("/api-docs/openapi.json")
        .await
        .json()
        .await
        .unwrap();
    assert!(doc["paths"]["/getTransactionsSummary"].is_object());
}
