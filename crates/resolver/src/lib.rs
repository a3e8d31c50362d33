//! IPFS gateway CID resolution
//!
//! Resolves a content identifier against an external IPFS node. Directories are
//! rendered as a JSON listing of their links, anything else is fetched in full,
//! MIME-sniffed and optionally staged to a short-lived temp file.

pub mod client;
pub mod error;
pub mod metadata;
pub mod resolver;
pub mod sniff;
pub mod staging;

pub use client::{ByteStream, DirectoryEntry, IpfsHttpClient, NodeClient, DEFAULT_NODE_URL};
pub use error::{NodeError, ResolveError};
pub use metadata::{Metadata, Resolution, Resolved, DIRECTORY_CONTENT_TYPE};
pub use resolver::{CidResolver, ResolverConfig, DEFAULT_CLEANUP_DELAY};
pub use sniff::detect_content_type;
pub use staging::{FileStager, StagedFile, TEMP_FILE_PREFIX};
