use std::collections::BTreeMap;

use crate::{AggregateBucket, MemoryRegion, RegionClass};

/// Flag tokens summarized when the caller does not supply a filter set.
pub const DEFAULT_FLAG_FILTERS: &[&str] = &["rd", "wr", "ex", "sh"];

// Pseudo-names the kernel uses for mappings with no backing file. The
// bracketed form is what smaps actually prints.
const ANONYMOUS_LABELS: &[&str] = &["stack", "heap", "vvar"];

/// Classify one region. Total and deterministic; a missing or recognized
/// pseudo pathname is Anonymous, everything else is FileBacked.
pub fn classify(region: &MemoryRegion) -> RegionClass {
    let name = region
        .pathname
        .trim_start_matches('[')
        .trim_end_matches(']');
    if name.is_empty() || ANONYMOUS_LABELS.contains(&name) {
        RegionClass::Anonymous
    } else {
        RegionClass::FileBacked
    }
}

/// Fold every region into exactly one of two buckets, "file" or "anon".
/// Both buckets exist even when empty.
pub fn by_category(regions: &[MemoryRegion]) -> BTreeMap<String, AggregateBucket> {
    let mut buckets = new_buckets(&["file", "anon"]);
    for region in regions {
        let label = match classify(region) {
            RegionClass::Anonymous => "anon",
            RegionClass::FileBacked => "file",
        };
        if let Some(bucket) = buckets.get_mut(label) {
            bucket.add(region.size(), region.rss());
        }
    }
    buckets
}

/// One bucket per flag token; a region contributes to every bucket whose
/// token appears in its VmFlags line. Membership overlaps on purpose: a
/// region can be readable, writable and shared at once, and may also match
/// no bucket at all.
pub fn by_flags(regions: &[MemoryRegion], filters: &[String]) -> BTreeMap<String, AggregateBucket> {
    let mut buckets = new_buckets(filters);
    for region in regions {
        for filter in filters {
            if region.vm_flags.contains(filter.as_str()) {
                if let Some(bucket) = buckets.get_mut(filter.as_str()) {
                    bucket.add(region.size(), region.rss());
                }
            }
        }
    }
    buckets
}

/// All regions ordered by descending virtual size, for the full-dump view.
pub fn sorted_by_size(regions: &[MemoryRegion]) -> Vec<&MemoryRegion> {
    let mut sorted: Vec<&MemoryRegion> = regions.iter().collect();
    sorted.sort_by(|a, b| b.size().cmp(&a.size()));
    sorted
}

fn new_buckets<S: AsRef<str>>(labels: &[S]) -> BTreeMap<String, AggregateBucket> {
    labels
        .iter()
        .map(|label| {
            let label = label.as_ref();
            (label.to_string(), AggregateBucket::new(label))
        })
        .collect()
}
