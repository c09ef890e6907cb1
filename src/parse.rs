use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;

use crate::{Error, MemoryRegion};

// Attribute keys the kernel prints without a kB suffix.
const UNITLESS_KEYS: &[&str] = &["THPeligible", "ProtectionKey"];

/// Read and parse /proc/<pid>/smaps. `pid` may be a numeric pid or "self".
/// A read failure (process gone, permission denied) aborts the whole run;
/// there is no partial result.
pub fn regions_from_pid(pid: &str) -> Result<Vec<MemoryRegion>, Error> {
    let text = read_proc_file(pid, "smaps")?;
    regions(&text)
}

/// Parse the complete text of an smaps region table, preserving file order.
///
/// Each region is a header line
///   7fffa9f39000-7fffa9f3b000 r-xp 00000000 00:00 0   [vdso]
/// followed by `Key: value` attribute lines, terminated by a VmFlags line.
pub fn regions(text: &str) -> Result<Vec<MemoryRegion>, Error> {
    let mut regions: Vec<MemoryRegion> = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if is_header(line) {
            if !block.is_empty() {
                regions.push(parse_block(&block)?);
                block.clear();
            }
        } else if block.is_empty() {
            return Err(Error::MalformedInput(format!(
                "expected a region header, got {:?}",
                line
            )));
        }
        block.push(line);
    }
    if !block.is_empty() {
        regions.push(parse_block(&block)?);
    }
    debug!("Parsed {} regions", regions.len());
    Ok(regions)
}

/// Read the pre-aggregated resident set from /proc/<pid>/smaps_rollup,
/// in bytes.
pub fn rollup_rss_from_pid(pid: &str) -> Result<u64, Error> {
    let text = read_proc_file(pid, "smaps_rollup")?;
    rollup_rss(&text)
}

/// Scan rollup text for the Rss line. A line without the kB suffix is
/// warned about and skipped rather than guessed at.
pub fn rollup_rss(text: &str) -> Result<u64, Error> {
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("Rss:") {
            let fields: Vec<&str> = value.split_whitespace().collect();
            if fields.len() != 2 || fields[1] != "kB" {
                warn!("No kB suffix in rollup line: {:?}", line);
                continue;
            }
            let kib = fields[0].parse::<u64>().map_err(|_| {
                Error::MalformedInput(format!("unreadable Rss value in {:?}", line))
            })?;
            return Ok(kib * 1024);
        }
    }
    Err(Error::MalformedInput(
        "no usable Rss line in smaps_rollup".to_string(),
    ))
}

fn read_proc_file(pid: &str, name: &str) -> Result<String, Error> {
    let mut text = String::new();
    File::open(format!("/proc/{}/{}", pid, name))?.read_to_string(&mut text)?;
    Ok(text)
}

fn is_header(line: &str) -> bool {
    // Cheap probe; parse_block validates the rest of the line. Attribute
    // keys never form a <hex>-<hex> pair so this cannot misfire on them.
    scan_fmt!(line, "{x}-{x}", [hex u64], [hex u64]).is_ok()
}

fn parse_block(lines: &[&str]) -> Result<MemoryRegion, Error> {
    let header = lines[0];
    let (start_address, end_address) = scan_fmt!(header, "{x}-{x}", [hex u64], [hex u64])
        .map_err(|_| Error::MalformedInput(format!("bad header line {:?}", header)))?;
    if start_address >= end_address {
        return Err(Error::MalformedInput(format!(
            "empty address range in {:?}",
            header
        )));
    }

    let mut fields = header.split_whitespace();
    fields.next(); // address pair, parsed above
    let (permissions, offset, device, inode) =
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(p), Some(o), Some(d), Some(i)) => (p, o, d, i),
            _ => {
                return Err(Error::MalformedInput(format!(
                    "short header line {:?}",
                    header
                )))
            }
        };
    // The pathname field is optional and may itself contain spaces
    // ("[anon: glibc: loader malloc]").
    let pathname = fields.collect::<Vec<&str>>().join(" ");

    let mut attributes = BTreeMap::new();
    let mut vm_flags: Option<String> = None;
    for line in &lines[1..] {
        let (key, value) = line.split_once(':').ok_or_else(|| {
            Error::MalformedInput(format!("attribute line {:?} has no colon", line))
        })?;
        let key = key.trim();
        let value = value.trim();
        if key == "VmFlags" {
            vm_flags = Some(value.to_string());
            continue;
        }
        attributes.insert(key.to_string(), parse_attribute(key, value, header)?);
    }

    let vm_flags = vm_flags.ok_or_else(|| {
        Error::MalformedInput(format!(
            "region {:x}-{:x} has no VmFlags terminator",
            start_address, end_address
        ))
    })?;
    if !attributes.contains_key("Size") || !attributes.contains_key("Rss") {
        return Err(Error::MalformedInput(format!(
            "region {:x}-{:x} is missing Size or Rss",
            start_address, end_address
        )));
    }

    Ok(MemoryRegion {
        start_address,
        end_address,
        permissions: permissions.to_string(),
        offset: offset.to_string(),
        device: device.to_string(),
        inode: inode.to_string(),
        pathname,
        attributes,
        vm_flags,
    })
}

/// Normalize one attribute value to a byte count. "N kB" becomes N * 1024;
/// a bare integer is stored as-is, with a warning unless the key is one
/// the kernel documents as unit-less.
fn parse_attribute(key: &str, value: &str, header: &str) -> Result<u64, Error> {
    if let Some(count) = value.strip_suffix("kB") {
        let kib = count.trim().parse::<u64>().map_err(|_| {
            Error::MalformedInput(format!(
                "unreadable value {:?} for {} in block {:?}",
                value, key, header
            ))
        })?;
        return Ok(kib * 1024);
    }
    let number = value.split_whitespace().next().unwrap_or("");
    let raw = number.parse::<u64>().map_err(|_| {
        Error::MalformedInput(format!(
            "unreadable value {:?} for {} in block {:?}",
            value, key, header
        ))
    })?;
    if !UNITLESS_KEYS.contains(&key) {
        warn!("No kB suffix on {}: {:?}; storing the raw value", key, value);
    }
    Ok(raw)
}
