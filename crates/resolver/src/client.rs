//! Node client contract and its Kubo HTTP RPC implementation.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::NodeError;

/// Node address the gateway talks to when nothing else is configured.
pub const DEFAULT_NODE_URL: &str = "http://ipfs:5001";

/// Streamed file content as returned by [`NodeClient::cat`].
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// One link of a directory as reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    /// CID of the linked object.
    pub hash: String,
    pub size: u64,
    /// Unixfs link type: 1 = directory, 2 = file, 0 = unknown.
    #[serde(rename = "type")]
    pub entry_type: i32,
}

/// Capabilities the gateway needs from an IPFS node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// List the links of `cid`. Fails if the node cannot resolve it.
    async fn list(&self, cid: &str) -> Result<Vec<DirectoryEntry>, NodeError>;

    /// Stream the content of `cid`. Fails if the node cannot read it as a byte stream.
    async fn cat(&self, cid: &str) -> Result<ByteStream, NodeError>;
}

#[derive(Debug, Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects", default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Option<Vec<LsLink>>,
}

#[derive(Debug, Deserialize)]
struct LsLink {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Type", default)]
    link_type: i32,
}

impl From<LsLink> for DirectoryEntry {
    fn from(link: LsLink) -> Self {
        Self {
            name: link.name,
            hash: link.hash,
            size: link.size,
            entry_type: link.link_type,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeErrorBody {
    #[serde(rename = "Message")]
    message: String,
}

/// [`NodeClient`] backed by the Kubo HTTP RPC API (`/api/v0/*`).
///
/// No request timeout is set: a node that never answers keeps the caller waiting.
#[derive(Debug, Clone)]
pub struct IpfsHttpClient {
    base_url: Url,
    http: reqwest::Client,
}

impl IpfsHttpClient {
    /// Accepts a full URL or a bare `host:port`.
    pub fn new(node_url: &str) -> Result<Self, NodeError> {
        Self::with_client(node_url, reqwest::Client::new())
    }

    pub fn with_client(node_url: &str, http: reqwest::Client) -> Result<Self, NodeError> {
        let trimmed = node_url.trim();
        let mut base_url = if trimmed.contains("://") {
            Url::parse(trimmed)?
        } else {
            Url::parse(&format!("http://{trimmed}"))?
        };
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, command: &str, cid: &str) -> Result<Url, NodeError> {
        let mut url = self.base_url.join(&format!("api/v0/{command}"))?;
        url.query_pairs_mut().append_pair("arg", cid);
        Ok(url)
    }

    async fn call(&self, command: &str, cid: &str) -> Result<reqwest::Response, NodeError> {
        let url = self.endpoint(command, cid)?;
        debug!("node call {} {}", command, cid);
        let response = self.http.post(url).send().await?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<NodeErrorBody>(&body)
        .map(|parsed| parsed.message)
        .unwrap_or_else(|_| body.trim().to_string());
    Err(NodeError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl NodeClient for IpfsHttpClient {
    async fn list(&self, cid: &str) -> Result<Vec<DirectoryEntry>, NodeError> {
        let response: LsResponse = self.call("ls", cid).await?.json().await?;

        let mut objects = response.objects.into_iter();
        match (objects.next(), objects.next()) {
            (Some(object), None) => Ok(object
                .links
                .unwrap_or_default()
                .into_iter()
                .map(DirectoryEntry::from)
                .collect()),
            _ => Err(NodeError::MalformedResponse(format!(
                "expected exactly one object listing {cid}"
            ))),
        }
    }

    async fn cat(&self, cid: &str) -> Result<ByteStream, NodeError> {
        let response = self.call("cat", cid).await?;
        Ok(response.bytes_stream().map_err(io::Error::other).boxed())
    }
}
