use std::collections::BTreeMap;

use serde::Serialize;

use crate::{AggregateBucket, Error, MemoryRegion};

/// Rounding rule for the virtual-to-resident ratio. The aggregate itself
/// never picks one; the two shipped views use one each.
#[derive(Debug, Clone, Copy)]
pub enum Rounding {
    Ceiling,
    Floor,
}

/// Sentinel reported instead of dividing by a zero resident set.
pub const UNDEFINED_RATIO: i64 = -1;

/// Ratio of virtual size to resident size under the given rounding rule.
pub fn ratio(bucket: &AggregateBucket, rounding: Rounding) -> i64 {
    let (size, rss) = bucket.ratio_parts();
    if rss == 0 {
        return UNDEFINED_RATIO;
    }
    let rounded = match rounding {
        Rounding::Ceiling => size / rss + u64::from(size % rss != 0),
        Rounding::Floor => size / rss,
    };
    rounded as i64
}

/// CSV rows for the category view: label, rss, size, ceiling ratio.
pub fn category_csv(buckets: &BTreeMap<String, AggregateBucket>) -> String {
    let mut out = String::new();
    for (label, bucket) in buckets {
        out.push_str(&format!(
            "{}, {}, {}, {}\n",
            label,
            bucket.rss_bytes,
            bucket.size_bytes,
            ratio(bucket, Rounding::Ceiling)
        ));
    }
    out
}

/// Plain-text lines for the flag view, floor ratio. Buckets with nothing
/// resident print without a ratio rather than the sentinel.
pub fn flag_lines(buckets: &BTreeMap<String, AggregateBucket>) -> String {
    let mut out = String::new();
    for (label, bucket) in buckets {
        if bucket.rss_bytes > 0 {
            out.push_str(&format!(
                "{}: vsize={} rss={} ({})\n",
                label,
                bucket.size_bytes,
                bucket.rss_bytes,
                ratio(bucket, Rounding::Floor)
            ));
        } else {
            out.push_str(&format!(
                "{}: vsize={} rss={}\n",
                label, bucket.size_bytes, bucket.rss_bytes
            ));
        }
    }
    out
}

#[derive(Serialize)]
struct RegionRecord<'a> {
    start_address: String,
    end_address: String,
    permissions: &'a str,
    offset: &'a str,
    device: &'a str,
    inode: &'a str,
    pathname: &'a str,
    attributes: &'a BTreeMap<String, u64>,
    vm_flags: &'a str,
}

impl<'a> RegionRecord<'a> {
    fn from_region(region: &'a MemoryRegion) -> RegionRecord<'a> {
        RegionRecord {
            start_address: format!("{:x}", region.start_address),
            end_address: format!("{:x}", region.end_address),
            permissions: &region.permissions,
            offset: &region.offset,
            device: &region.device,
            inode: &region.inode,
            pathname: &region.pathname,
            attributes: &region.attributes,
            vm_flags: &region.vm_flags,
        }
    }
}

/// JSON array of per-region records, addresses rendered as hex strings.
pub fn regions_json(regions: &[&MemoryRegion]) -> Result<String, Error> {
    let records: Vec<RegionRecord> = regions
        .iter()
        .map(|region| RegionRecord::from_region(region))
        .collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use crate::parse;

    fn bucket(size: u64, rss: u64) -> AggregateBucket {
        let mut b = AggregateBucket::new("test");
        b.add(size, rss);
        b
    }

    #[test]
    fn ceiling_and_floor_disagree_between_multiples() {
        let b = bucket(135_168, 16_384); // 8.25x
        assert_eq!(ratio(&b, Rounding::Ceiling), 9);
        assert_eq!(ratio(&b, Rounding::Floor), 8);
    }

    #[test]
    fn exact_multiple_rounds_the_same_both_ways() {
        let b = bucket(4096, 4096);
        assert_eq!(ratio(&b, Rounding::Ceiling), 1);
        assert_eq!(ratio(&b, Rounding::Floor), 1);
    }

    #[test]
    fn zero_rss_reports_sentinel_not_a_fault() {
        let b = bucket(4096, 0);
        assert_eq!(ratio(&b, Rounding::Ceiling), UNDEFINED_RATIO);
        assert_eq!(ratio(&b, Rounding::Floor), UNDEFINED_RATIO);
    }

    #[test]
    fn category_csv_rows() {
        let text = "\
00400000-00401000 r-xp 00000000 08:01 123 /bin/foo
Size:                  4 kB
Rss:                   4 kB
VmFlags: rd ex
7f0000000000-7f0000021000 rw-p 00000000 00:00 0
Size:                132 kB
Rss:                  16 kB
VmFlags: rd wr
";
        let regions = parse::regions(text).expect("parse failed");
        let csv = category_csv(&aggregate::by_category(&regions));
        assert_eq!(csv, "anon, 16384, 135168, 9\nfile, 4096, 4096, 1\n");
    }

    #[test]
    fn flag_lines_skip_ratio_for_empty_buckets() {
        let text = "\
00400000-00401000 r-xp 00000000 08:01 123 /bin/foo
Size:                  8 kB
Rss:                   4 kB
VmFlags: rd ex
";
        let regions = parse::regions(text).expect("parse failed");
        let filters: Vec<String> = aggregate::DEFAULT_FLAG_FILTERS
            .iter()
            .map(|f| f.to_string())
            .collect();
        let lines = flag_lines(&aggregate::by_flags(&regions, &filters));
        assert!(lines.contains("rd: vsize=8192 rss=4096 (2)\n"));
        assert!(lines.contains("wr: vsize=0 rss=0\n"));
    }

    #[test]
    fn json_dump_carries_hex_addresses_and_attributes() {
        let text = "\
00400000-00401000 r-xp 00000000 08:01 123 /bin/foo
Size:                  4 kB
Rss:                   4 kB
VmFlags: rd ex
";
        let regions = parse::regions(text).expect("parse failed");
        let refs = aggregate::sorted_by_size(&regions);
        let json = regions_json(&refs).expect("render failed");
        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid json");
        assert_eq!(value[0]["start_address"], "400000");
        assert_eq!(value[0]["attributes"]["Size"], 4096);
        assert_eq!(value[0]["pathname"], "/bin/foo");
    }
}
