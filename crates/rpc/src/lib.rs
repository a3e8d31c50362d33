//! HTTP surface of the IPFS gateway.
//!
//! `GET /:cid` resolves a CID through [`ipfs_gateway_resolver::CidResolver`] and
//! returns the payload with `X-CID`, `X-File-Name`, `X-Size` and `X-Content-Type`
//! metadata headers. Every response carries permissive CORS headers.

pub mod server;

pub use server::{build_router, start_server, ApiError, AppState};
