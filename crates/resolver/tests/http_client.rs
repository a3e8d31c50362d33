use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::TryStreamExt;
use ipfs_gateway_resolver::{
    CidResolver, IpfsHttpClient, NodeClient, NodeError, ResolveError, ResolverConfig,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;

/// Minimal stand-in for the Kubo RPC API.
#[derive(Clone, Default)]
struct MockNodeState {
    directories: Arc<HashMap<String, Vec<(String, String, u64, i32)>>>,
    files: Arc<HashMap<String, Vec<u8>>>,
}

#[derive(Deserialize)]
struct ArgQuery {
    arg: String,
}

struct MockNode {
    address: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockNode {
    async fn start(state: MockNodeState) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock node listener");
        let addr = listener.local_addr().expect("listener addr lookup");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let app = Router::new()
            .route("/api/v0/ls", post(handle_ls))
            .route("/api/v0/cat", post(handle_cat))
            .with_state(state);

        tokio::spawn(async move {
            let server = axum::serve(listener, app);
            let graceful = server.with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = graceful.await;
        });

        Self {
            address: addr.to_string(),
            shutdown: Some(shutdown_tx),
        }
    }

    fn url(&self) -> String {
        format!("http://{}", self.address)
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn node_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "Message": message, "Code": 0, "Type": "error" })),
    )
        .into_response()
}

/// `ls` and `cat` of this CID never answer.
const HUNG_CID: &str = "bafybeihung";

async fn handle_ls(State(state): State<MockNodeState>, Query(query): Query<ArgQuery>) -> Response {
    if query.arg == HUNG_CID {
        std::future::pending::<()>().await;
    }
    if let Some(links) = state.directories.get(&query.arg) {
        let links: Vec<_> = links
            .iter()
            .map(|(name, hash, size, kind)| {
                json!({ "Name": name, "Hash": hash, "Size": size, "Type": kind, "Target": "" })
            })
            .collect();
        return Json(json!({ "Objects": [{ "Hash": query.arg, "Links": links }] })).into_response();
    }
    if state.files.contains_key(&query.arg) {
        return Json(json!({ "Objects": [{ "Hash": query.arg, "Links": [] }] })).into_response();
    }
    node_error(&format!("invalid path \"{}\"", query.arg))
}

async fn handle_cat(State(state): State<MockNodeState>, Query(query): Query<ArgQuery>) -> Response {
    if query.arg == HUNG_CID {
        std::future::pending::<()>().await;
    }
    if state.directories.contains_key(&query.arg) {
        return node_error("this dag node is a directory");
    }
    match state.files.get(&query.arg) {
        Some(content) => (StatusCode::OK, content.clone()).into_response(),
        None => node_error(&format!("invalid path \"{}\"", query.arg)),
    }
}

fn sample_state() -> MockNodeState {
    let mut directories = HashMap::new();
    directories.insert(
        "bafybeidir".to_string(),
        vec![
            ("hello.txt".to_string(), "bafybeihello".to_string(), 13, 2),
            ("images".to_string(), "bafybeiimages".to_string(), 0, 1),
        ],
    );

    let mut files = HashMap::new();
    files.insert("bafybeihello".to_string(), b"hello, world\n".to_vec());
    files.insert("bafybeilarge".to_string(), vec![0xAB; 256 * 1024]);

    MockNodeState {
        directories: Arc::new(directories),
        files: Arc::new(files),
    }
}

#[tokio::test]
async fn list_returns_directory_links() {
    let node = MockNode::start(sample_state()).await;
    let client = IpfsHttpClient::new(&node.url()).unwrap();

    let entries = client.list("bafybeidir").await.unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].name, "hello.txt");
    assert_eq!(entries[0].hash, "bafybeihello");
    assert_eq!(entries[0].size, 13);
    assert_eq!(entries[1].entry_type, 1);
}

#[tokio::test]
async fn list_of_file_has_no_links() {
    let node = MockNode::start(sample_state()).await;
    let client = IpfsHttpClient::new(&node.url()).unwrap();

    assert!(client.list("bafybeihello").await.unwrap().is_empty());
}

#[tokio::test]
async fn cat_streams_content() {
    let node = MockNode::start(sample_state()).await;
    let client = IpfsHttpClient::new(&node.url()).unwrap();

    let chunks: Vec<_> = client
        .cat("bafybeilarge")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let total: usize = chunks.iter().map(|chunk| chunk.len()).sum();

    assert_eq!(total, 256 * 1024);
}

#[tokio::test]
async fn node_error_message_is_surfaced() {
    let node = MockNode::start(sample_state()).await;
    let client = IpfsHttpClient::new(&node.url()).unwrap();

    let err = match client.cat("bafybeidir").await {
        Ok(_) => panic!("cat of a directory must fail"),
        Err(err) => err,
    };

    match err {
        NodeError::Status { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "this dag node is a directory");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn bare_host_port_is_accepted() {
    let node = MockNode::start(sample_state()).await;
    let client = IpfsHttpClient::new(&node.address).unwrap();

    assert_eq!(client.list("bafybeidir").await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreachable_node_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = IpfsHttpClient::new(&format!("http://{addr}")).unwrap();
    let err = client.list("bafybeidir").await.unwrap_err();

    assert!(matches!(err, NodeError::Transport(_)));
}

#[tokio::test]
async fn unanswered_request_has_no_client_timeout() {
    let node = MockNode::start(sample_state()).await;
    let client = IpfsHttpClient::new(&node.url()).unwrap();

    let list = tokio::time::timeout(Duration::from_millis(500), client.list(HUNG_CID)).await;
    assert!(list.is_err(), "list must still be pending");

    let cat = tokio::time::timeout(Duration::from_millis(500), client.cat(HUNG_CID)).await;
    assert!(cat.is_err(), "cat must still be pending");
}

#[tokio::test]
async fn resolver_over_http_node() {
    let node = MockNode::start(sample_state()).await;
    let client = Arc::new(IpfsHttpClient::new(&node.url()).unwrap());
    let dir = tempfile::tempdir().unwrap();
    let resolver = CidResolver::new(
        client,
        ResolverConfig {
            stage_files: true,
            temp_dir: Some(dir.path().to_path_buf()),
            cleanup_delay: Duration::from_millis(50),
        },
    );

    let file = resolver.resolve("bafybeihello").await.unwrap();
    assert_eq!(&file.payload[..], b"hello, world\n");
    assert_eq!(file.metadata.size, 13);
    assert_eq!(file.metadata.content_type, "text/plain; charset=utf-8");

    let listing = resolver.resolve("bafybeidir").await.unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&listing.payload).unwrap();
    assert_eq!(listing.metadata.content_type, "application/json");
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0]["cid"], "bafybeihello");

    let err = resolver.resolve("bafybeimissing").await.unwrap_err();
    assert!(matches!(err, ResolveError::Retrieval { .. }));
    assert!(err.to_string().contains("invalid path"));
}
