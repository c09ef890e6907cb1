#[macro_use]
extern crate scan_fmt;

#[macro_use]
extern crate log;

pub mod parse;
pub mod aggregate;
pub mod render;

use std::collections::BTreeMap;

use thiserror::Error;

/// One virtual memory area as reported by /proc/<pid>/smaps: the header
/// line fields plus the Key: value attribute block that follows it.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
    pub start_address: u64,
    pub end_address: u64,
    pub permissions: String,
    // opaque pass-through fields; nothing here interprets them
    pub offset: String,
    pub device: String,
    pub inode: String,
    /// Mapped file path; empty for an anonymous mapping.
    pub pathname: String,
    /// Attribute name to byte count. kB-suffixed source values are already
    /// multiplied out; see parse::regions.
    pub attributes: BTreeMap<String, u64>,
    /// Space-separated flag tokens from the VmFlags terminator line.
    pub vm_flags: String,
}

impl MemoryRegion {
    /// Virtual size in bytes. The parser rejects regions without a Size
    /// attribute, so 0 here means a hand-built region.
    pub fn size(&self) -> u64 {
        self.attributes.get("Size").copied().unwrap_or(0)
    }

    /// Resident set in bytes.
    pub fn rss(&self) -> u64 {
        self.attributes.get("Rss").copied().unwrap_or(0)
    }
}

/// Derived classification of a region, computed at aggregation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionClass {
    Anonymous,
    FileBacked,
}

/// Named accumulator of Size and Rss over the regions assigned to it.
/// Built fresh by one aggregation pass; never mutated afterward.
#[derive(Debug, Clone)]
pub struct AggregateBucket {
    pub label: String,
    pub size_bytes: u64,
    pub rss_bytes: u64,
}

impl AggregateBucket {
    pub fn new(label: &str) -> AggregateBucket {
        AggregateBucket {
            label: label.to_string(),
            size_bytes: 0,
            rss_bytes: 0,
        }
    }

    pub(crate) fn add(&mut self, size: u64, rss: u64) {
        self.size_bytes += size;
        self.rss_bytes += rss;
    }

    /// Dividend and divisor of the virtual-to-resident ratio. Rounding is
    /// the caller's choice; see render::ratio.
    pub fn ratio_parts(&self) -> (u64, u64) {
        (self.size_bytes, self.rss_bytes)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// The region table could not be read at all (process exited,
    /// permission denied). Fatal, no retry.
    #[error("cannot read region table: {0}")]
    SourceUnavailable(#[from] std::io::Error),

    /// A region block is missing its terminator or a line does not match
    /// the documented shape. Fatal for the whole run; byte accounting with
    /// a silently dropped region is worse than an explicit failure.
    #[error("malformed region table: {0}")]
    MalformedInput(String),

    #[error("render: {0}")]
    Render(#[from] serde_json::Error),
}
