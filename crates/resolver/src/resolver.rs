//! CID resolution: directory listing or full content fetch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tracing::{debug, info};

use crate::client::{ByteStream, NodeClient};
use crate::error::{ResolveError, Result};
use crate::metadata::{encode_listing, Metadata, Resolution, Resolved};
use crate::sniff::detect_content_type;
use crate::staging::{FileStager, TEMP_FILE_PREFIX};

/// How long a staged file is kept before it is removed.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_secs(5);

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Write fetched files to a temp file and report its name and path.
    pub stage_files: bool,
    /// Directory for staged files; the OS temp directory when unset.
    pub temp_dir: Option<PathBuf>,
    pub cleanup_delay: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            stage_files: true,
            temp_dir: None,
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
        }
    }
}

/// Resolves CIDs through a [`NodeClient`]. Holds no per-request state.
#[derive(Clone)]
pub struct CidResolver {
    client: Arc<dyn NodeClient>,
    stager: Option<FileStager>,
}

impl CidResolver {
    pub fn new(client: Arc<dyn NodeClient>, config: ResolverConfig) -> Self {
        let stager = config
            .stage_files
            .then(|| FileStager::new(config.temp_dir, config.cleanup_delay));
        Self { client, stager }
    }

    /// Ask the node what `cid` is.
    ///
    /// A listing with at least one link is a directory. A failed or empty listing
    /// falls through to fetching the content.
    pub async fn classify(&self, cid: &str) -> Result<Resolved> {
        match self.client.list(cid).await {
            Ok(entries) if !entries.is_empty() => {
                debug!("{} is a directory with {} entries", cid, entries.len());
                return Ok(Resolved::Directory { entries });
            }
            Ok(_) => debug!("{} has no links, fetching content", cid),
            Err(err) => debug!("listing {} failed, fetching content: {}", cid, err),
        }

        let stream = self
            .client
            .cat(cid)
            .await
            .map_err(|source| ResolveError::Retrieval {
                cid: cid.to_string(),
                source,
            })?;

        let bytes = drain(stream).await.map_err(|source| ResolveError::Read {
            cid: cid.to_string(),
            source,
        })?;

        Ok(Resolved::File { bytes })
    }

    /// Resolve `cid` into metadata and the payload to return.
    pub async fn resolve(&self, cid: &str) -> Result<Resolution> {
        match self.classify(cid).await? {
            Resolved::Directory { entries } => {
                let payload = encode_listing(&entries).map_err(|source| ResolveError::Encoding {
                    cid: cid.to_string(),
                    source,
                })?;
                Ok(Resolution {
                    metadata: Metadata::directory(cid, payload.len()),
                    payload,
                })
            }
            Resolved::File { bytes } => {
                let content_type = detect_content_type(&bytes);
                let (name, path) = self.stage(cid, &bytes).await?;
                info!(
                    "resolved {} as {} ({} bytes, {})",
                    cid,
                    name,
                    bytes.len(),
                    content_type
                );
                Ok(Resolution {
                    metadata: Metadata::file(cid, name, bytes.len(), content_type, path),
                    payload: bytes,
                })
            }
        }
    }

    /// Remove staged files still waiting for their delayed removal. Returns
    /// how many were removed; always 0 when staging is disabled.
    pub fn purge_staged(&self) -> usize {
        self.stager
            .as_ref()
            .map_or(0, |stager| stager.purge_pending())
    }

    async fn stage(&self, cid: &str, bytes: &Bytes) -> Result<(String, Option<PathBuf>)> {
        let Some(stager) = &self.stager else {
            return Ok((format!("{TEMP_FILE_PREFIX}{cid}"), None));
        };

        let staged = stager
            .stage(bytes.clone())
            .await
            .map_err(|source| ResolveError::Staging {
                cid: cid.to_string(),
                source,
            })?;
        stager.schedule_removal(staged.path.clone());
        Ok((staged.name, Some(staged.path)))
    }
}

async fn drain(mut stream: ByteStream) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.try_next().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
