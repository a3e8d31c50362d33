//! Error types for node access and CID resolution

use thiserror::Error;

/// Failure talking to the IPFS node.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("invalid node URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("node request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed node response: {0}")]
    MalformedResponse(String),
}

/// Failure resolving a CID. Every variant names the CID and the stage it failed in.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("failed to download CID {cid}: {source}")]
    Retrieval {
        cid: String,
        #[source]
        source: NodeError,
    },

    #[error("failed to read content of CID {cid}: {source}")]
    Read {
        cid: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode directory listing of CID {cid}: {source}")]
    Encoding {
        cid: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to stage CID {cid} to a temp file: {source}")]
    Staging {
        cid: String,
        #[source]
        source: std::io::Error,
    },
}

impl ResolveError {
    /// CID the failed resolution was for.
    pub fn cid(&self) -> &str {
        match self {
            ResolveError::Retrieval { cid, .. }
            | ResolveError::Read { cid, .. }
            | ResolveError::Encoding { cid, .. }
            | ResolveError::Staging { cid, .. } => cid,
        }
    }

    /// Short stage label used in logs.
    pub fn stage(&self) -> &'static str {
        match self {
            ResolveError::Retrieval { .. } => "retrieval",
            ResolveError::Read { .. } => "read",
            ResolveError::Encoding { .. } => "encoding",
            ResolveError::Staging { .. } => "staging",
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
