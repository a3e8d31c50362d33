//! Resolution results and the JSON directory listing format.

use std::io;
use std::path::PathBuf;

use bytes::Bytes;
use serde::Serialize;
use serde_json::ser::Formatter;

use crate::client::DirectoryEntry;

/// Content type of rendered directory listings.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/json";

/// Metadata describing a resolved CID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// CID echoed from the request.
    pub cid: String,

    /// The CID itself for directories, the staged file name for files.
    pub name: String,

    /// Payload length in bytes.
    pub size: usize,

    pub content_type: String,

    /// Location of the staged temp file; only set for staged files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Metadata {
    pub fn directory(cid: &str, size: usize) -> Self {
        Self {
            cid: cid.to_string(),
            name: cid.to_string(),
            size,
            content_type: DIRECTORY_CONTENT_TYPE.to_string(),
            path: None,
        }
    }

    pub fn file(
        cid: &str,
        name: String,
        size: usize,
        content_type: &str,
        path: Option<PathBuf>,
    ) -> Self {
        Self {
            cid: cid.to_string(),
            name,
            size,
            content_type: content_type.to_string(),
            path,
        }
    }
}

/// What the node reported for a CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// At least one link was listed.
    Directory { entries: Vec<DirectoryEntry> },
    /// Full content, drained from the node.
    File { bytes: Bytes },
}

/// Metadata plus the payload to send back.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub metadata: Metadata,
    pub payload: Bytes,
}

/// Listing item. Fields are declared in key order.
#[derive(Serialize)]
struct ListingEntry<'a> {
    cid: &'a str,
    name: &'a str,
    size: u64,
    #[serde(rename = "type")]
    entry_type: i32,
}

impl<'a> From<&'a DirectoryEntry> for ListingEntry<'a> {
    fn from(entry: &'a DirectoryEntry) -> Self {
        Self {
            cid: &entry.hash,
            name: &entry.name,
            size: entry.size,
            entry_type: entry.entry_type,
        }
    }
}

/// Compact JSON that also escapes `<`, `>`, `&`, U+2028 and U+2029 as `\uXXXX`,
/// so listings can be embedded in HTML verbatim.
struct HtmlSafeFormatter;

impl Formatter for HtmlSafeFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(fragment[start..index].as_bytes())?;
            writer.write_all(escaped.as_bytes())?;
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Render directory entries as a JSON array terminated by a newline.
pub fn encode_listing(entries: &[DirectoryEntry]) -> serde_json::Result<Bytes> {
    let listing: Vec<ListingEntry<'_>> = entries.iter().map(ListingEntry::from).collect();
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, HtmlSafeFormatter);
    listing.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}
