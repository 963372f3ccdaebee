//! Pure, stateless signature scanning: wildcard pattern parsing, exact and
//! wildcard search, and Shannon entropy.

use crate::byte_source::ByteSource;
use crate::structure::{DataRegion, PatternByte, RegionKind, SignatureMatch};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("invalid hex byte {0:?} at token {1}")]
    InvalidHex(String, usize),
}

/// Pure functions over byte ranges: pattern parsing, search, and entropy.
pub struct SignatureScanner;

impl SignatureScanner {
    /// Tokens are whitespace-separated; `??` or `?` is a wildcard, otherwise
    /// a two-digit hex byte. Empty input yields an empty sequence.
    pub fn parse_pattern(text: &str) -> Result<Vec<PatternByte>, PatternError> {
        text.split_whitespace()
            .enumerate()
            .map(|(i, token)| match token {
                "??" | "?" => Ok(PatternByte::Wildcard),
                hex => u8::from_str_radix(hex, 16)
                    .map(PatternByte::Byte)
                    .map_err(|_| PatternError::InvalidHex(hex.to_string(), i)),
            })
            .collect()
    }

    /// Every position where `pattern` matches `data`; overlapping matches are
    /// reported.
    pub fn find_all(data: &[u8], pattern: &[PatternByte], name: &str) -> Vec<SignatureMatch> {
        Self::find_in_range(data, 0, data.len() as u64, pattern, name)
    }

    /// The first match, or `None`.
    pub fn find_first(data: &[u8], pattern: &[PatternByte]) -> Option<u64> {
        find_positions(data, pattern).next().map(|p| p as u64)
    }

    /// Search `data[off..off+size]` and return matches with offsets adjusted
    /// to absolute file coordinates.
    pub fn find_in_range(
        data: &[u8],
        off: u64,
        size: u64,
        pattern: &[PatternByte],
        name: &str,
    ) -> Vec<SignatureMatch> {
        let start = off as usize;
        let end = ((off + size) as usize).min(data.len());
        if start >= end {
            return Vec::new();
        }
        let slice = &data[start..end];
        let pattern_text = render_pattern(pattern);
        find_positions(slice, pattern)
            .map(|pos| SignatureMatch {
                offset: off + pos as u64,
                name: name.to_string(),
                pattern: pattern_text.clone(),
                length: pattern.len(),
            })
            .collect()
    }

    /// Search a [`ByteSource`] larger than memory, chunk by chunk, with a
    /// `pattern.len() - 1` overlap between chunks so matches that straddle a
    /// boundary are not missed.
    pub fn find_all_in_source(
        source: &dyn ByteSource,
        pattern: &[PatternByte],
        name: &str,
        chunk_size: usize,
    ) -> Vec<SignatureMatch> {
        if pattern.is_empty() {
            return Vec::new();
        }
        let len = source.len();
        let overlap = (pattern.len() - 1) as u64;
        let mut matches = Vec::new();
        let mut base = 0u64;
        while base < len {
            let remaining = len - base;
            let window = (chunk_size as u64 + overlap).min(remaining);
            let mut buf = vec![0u8; window as usize];
            source.read_into(base, &mut buf);
            matches.extend(Self::find_in_range(&buf, base, window, pattern, name));
            if remaining <= chunk_size as u64 {
                break;
            }
            base += chunk_size as u64;
        }
        matches.sort_by_key(|m| m.offset);
        matches.dedup_by_key(|m| m.offset);
        matches
    }

    /// Shannon entropy in bits per byte, base 2. Empty input yields 0.0.
    pub fn entropy(data: &[u8]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        let mut counts = [0u64; 256];
        for &byte in data {
            counts[byte as usize] += 1;
        }
        let len = data.len() as f64;
        counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / len;
                -p * p.log2()
            })
            .sum()
    }

    /// Entropy for every `Code`/`Data` region whose interval lies inside
    /// `data`, keyed by the region's attached structure name (or a
    /// `kind@offset` fallback when no structure is linked).
    pub fn entropy_by_region(data: &[u8], regions: &[DataRegion]) -> HashMap<String, f64> {
        regions
            .iter()
            .filter(|r| matches!(r.kind, RegionKind::Code | RegionKind::Data))
            .filter(|r| r.offset + r.size <= data.len() as u64)
            .map(|r| {
                let start = r.offset as usize;
                let end = (r.offset + r.size) as usize;
                let name = r
                    .structure
                    .as_ref()
                    .and_then(|w| w.upgrade())
                    .map(|s| s.name())
                    .unwrap_or_else(|| format!("{:?}@{:#x}", r.kind, r.offset));
                (name, Self::entropy(&data[start..end]))
            })
            .collect()
    }
}

fn render_pattern(pattern: &[PatternByte]) -> String {
    pattern
        .iter()
        .map(|b| match b {
            PatternByte::Byte(v) => format!("{:02X}", v),
            PatternByte::Wildcard => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_positions<'a>(data: &'a [u8], pattern: &'a [PatternByte]) -> Box<dyn Iterator<Item = usize> + 'a> {
    if pattern.is_empty() || pattern.len() > data.len() {
        return Box::new(std::iter::empty());
    }
    if pattern.iter().any(|b| matches!(b, PatternByte::Wildcard)) {
        Box::new(bmh_search(data, pattern))
    } else {
        Box::new(exact_search(data, pattern))
    }
}

fn exact_search<'a>(data: &'a [u8], pattern: &'a [PatternByte]) -> impl Iterator<Item = usize> + 'a {
    let needle: Vec<u8> = pattern
        .iter()
        .map(|b| match b {
            PatternByte::Byte(v) => *v,
            PatternByte::Wildcard => unreachable!("exact_search called with a wildcard pattern"),
        })
        .collect();
    (0..=data.len() - needle.len()).filter(move |&i| data[i..i + needle.len()] == needle[..])
}

/// Boyer-Moore-Horspool with a 256-entry shift table; wildcard positions
/// contribute no skip.
///
/// A wildcard near the end of the pattern can make the text byte under the
/// window's last slot match regardless of content, so every shift is capped
/// by the distance from the end of the pattern to the rightmost wildcard —
/// otherwise the bad-character skip can jump clean over a valid match.
fn bmh_search<'a>(data: &'a [u8], pattern: &'a [PatternByte]) -> impl Iterator<Item = usize> + 'a {
    let len = pattern.len();
    let rightmost_wildcard = pattern.iter().rposition(|b| matches!(b, PatternByte::Wildcard));
    let max_shift = match rightmost_wildcard {
        Some(idx) => (len - 1 - idx).max(1),
        None => len,
    };
    let mut shift = [max_shift; 256];
    for (i, b) in pattern[..len - 1].iter().enumerate() {
        if let PatternByte::Byte(value) = b {
            shift[*value as usize] = (len - 1 - i).min(max_shift);
        }
    }

    let matches_at = move |pos: usize| -> bool {
        pattern
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(b, PatternByte::Wildcard) || matches!(b, PatternByte::Byte(v) if data[pos + i] == *v))
    };

    std::iter::from_fn({
        let mut pos = 0usize;
        move || {
            while pos + len <= data.len() {
                let last = data[pos + len - 1];
                if matches_at(pos) {
                    let found = pos;
                    pos += 1;
                    return Some(found);
                }
                pos += shift[last as usize].max(1);
            }
            None
        }
    })
}
