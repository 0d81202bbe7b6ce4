//! Pinecone store against a mock control plane and data plane.
#![cfg(feature = "pinecone")]

use std::collections::HashMap;
use std::time::Duration;

use pdfchat_rag::pinecone::{PineconeConfig, PineconeVectorStore};
use pdfchat_rag::{
    CollectionSpec, DistanceMetric, ErrorKind, MetadataFilter, RagError, RetryPolicy, VectorEntry,
    VectorStore,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer) -> PineconeVectorStore {
    PineconeVectorStore::new(
        PineconeConfig::new("pc-key", "us-east-1")
            .unwrap()
            .with_control_plane_url(server.uri())
            .with_retry(RetryPolicy::new(2, Duration::from_millis(5), Duration::from_millis(20)))
            .with_ready_timeout(Duration::from_secs(2), Duration::from_millis(10))
            .with_upsert_batch_size(2),
    )
}

fn description(server: &MockServer, dimension: usize, ready: bool) -> serde_json::Value {
    json!({
        "name": "collectiondb",
        "dimension": dimension,
        "metric": "cosine",
        "host": server.uri(),
        "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } },
        "status": { "ready": ready, "state": if ready { "Ready" } else { "Initializing" } }
    })
}

async fn existing_index(server: &MockServer, dimension: usize) {
    Mock::given(method("GET"))
        .and(path("/indexes/collectiondb"))
        .and(header("Api-Key", "pc-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(server, dimension, true)))
        .mount(server)
        .await;
}

fn entry(id: &str, vector: Vec<f32>) -> VectorEntry {
    VectorEntry {
        id: id.to_string(),
        vector,
        text: format!("text of {id}"),
        document_id: "doc".to_string(),
        metadata: HashMap::from([("source".to_string(), "a.pdf".to_string())]),
    }
}

#[tokio::test]
async fn missing_index_is_created_and_awaited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/collectiondb"))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/collectiondb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(description(&server, 3, false)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    existing_index(&server, 3).await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .and(header("X-Pinecone-API-Version", "2024-07"))
        .and(body_partial_json(json!({
            "name": "collectiondb",
            "dimension": 3,
            "metric": "cosine",
            "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(description(&server, 3, false)))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server);
    store
        .ensure_collection(&CollectionSpec::new("collectiondb", 3, DistanceMetric::Cosine))
        .await
        .unwrap();
}

#[tokio::test]
async fn existing_index_with_other_dimension_is_a_config_error() {
    let server = MockServer::start().await;
    existing_index(&server, 1536).await;
    Mock::given(method("POST"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = store(&server)
        .ensure_collection(&CollectionSpec::new("collectiondb", 3, DistanceMetric::Cosine))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[tokio::test]
async fn upsert_sends_batches_and_reports_failed_ones() {
    let server = MockServer::start().await;
    existing_index(&server, 3).await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .and(body_partial_json(json!({ "vectors": [{ "id": "c" }] })))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad vector"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 2 })))
        .mount(&server)
        .await;

    let store = store(&server);
    let entries = vec![
        entry("a", vec![1.0, 0.0, 0.0]),
        entry("b", vec![0.0, 1.0, 0.0]),
        entry("c", vec![0.0, 0.0, 1.0]),
        entry("short", vec![1.0]),
    ];
    let report = store.upsert("collectiondb", &entries).await.unwrap();

    assert_eq!(report.succeeded, vec!["a", "b"]);
    let failed: Vec<&str> = report.failed.iter().map(|f| f.id.as_str()).collect();
    assert_eq!(failed, vec!["short", "c"]);

    let requests = server.received_requests().await.unwrap();
    let first_upsert = requests.iter().find(|r| r.url.path() == "/vectors/upsert").unwrap();
    let body: serde_json::Value = serde_json::from_slice(&first_upsert.body).unwrap();
    assert_eq!(body["vectors"][0]["metadata"]["text"], "text of a");
    assert_eq!(body["vectors"][0]["metadata"]["document_id"], "doc");
    assert_eq!(body["vectors"][0]["metadata"]["source"], "a.pdf");
}

#[tokio::test]
async fn query_returns_scored_chunks_with_metadata() {
    let server = MockServer::start().await;
    existing_index(&server, 3).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .and(body_partial_json(json!({
            "topK": 2,
            "includeMetadata": true,
            "filter": { "source": { "$eq": "a.pdf" } }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [
                { "id": "doc_1", "score": 0.71,
                  "metadata": { "text": "second", "document_id": "doc", "source": "a.pdf" } },
                { "id": "doc_0", "score": 0.93,
                  "metadata": { "text": "first", "document_id": "doc", "source": "a.pdf" } }
            ],
            "namespace": ""
        })))
        .mount(&server)
        .await;

    let filter = MetadataFilter::new().equals("source", "a.pdf");
    let results =
        store(&server).query("collectiondb", &[1.0, 0.0, 0.0], 2, Some(&filter)).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].entry.id, "doc_0");
    assert_eq!(results[0].entry.text, "first");
    assert!(results[0].score > results[1].score);
    assert_eq!(results[1].entry.metadata["source"], "a.pdf");
}

#[tokio::test]
async fn query_with_wrong_dimension_never_reaches_the_index() {
    let server = MockServer::start().await;
    existing_index(&server, 3).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = store(&server).query("collectiondb", &[1.0, 0.0], 4, None).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatchError { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn unavailable_index_becomes_a_store_error_after_retries() {
    let server = MockServer::start().await;
    existing_index(&server, 3).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let err = store(&server).query("collectiondb", &[1.0, 0.0, 0.0], 4, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VectorStore);
}

#[tokio::test]
async fn missing_index_on_query_is_a_store_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes/collectiondb"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = store(&server).query("collectiondb", &[1.0, 0.0, 0.0], 4, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VectorStore);
}

#[tokio::test]
async fn slow_queries_time_out_after_retries() {
    let server = MockServer::start().await;
    existing_index(&server, 3).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "matches": [], "namespace": "" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let retry = RetryPolicy::new(2, Duration::from_millis(5), Duration::from_millis(20));
    let store = PineconeVectorStore::new(
        PineconeConfig::new("pc-key", "us-east-1")
            .unwrap()
            .with_control_plane_url(server.uri())
            .with_retry(retry.clone())
            .with_request_timeout(Duration::from_millis(100)),
    );
    let err = store.query("collectiondb", &[1.0, 0.0, 0.0], 4, None).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(err.kind().to_string(), "TimeoutError");
    let queries = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/query")
        .count();
    assert_eq!(queries, retry.max_retries as usize + 1);
}
