//! UPX packer detection: entry-stub signatures, section naming, and entropy.

use crate::{section_names, Detector};
use async_trait::async_trait;
use binrecon_core::{BinaryStructure, DetectionResult, DetectorKind, SignatureScanner};

const SIG_UPX0: &str = "55 50 58 30";
const SIG_UPX1: &str = "55 50 58 31";
const SIG_UPX21: &str = "55 50 58 21";
const SIG_ENTRY_STUB: &str = "60 BE ?? ?? ?? 00 8D BE 00 ?? FF FF";
const SIG_DECOMPRESSOR: &str = "8B 1E 83 EE FC 11 DB 72";

fn signatures() -> [(&'static str, &'static str); 5] {
    [
        ("UPX0 marker", SIG_UPX0),
        ("UPX1 marker", SIG_UPX1),
        ("UPX! marker", SIG_UPX21),
        ("UPX entry stub", SIG_ENTRY_STUB),
        ("UPX decompressor", SIG_DECOMPRESSOR),
    ]
}

/// Detects the UPX packer by its marker bytes, canonical section names, and
/// the entropy bump compression leaves behind.
pub struct UpxDetector;

impl UpxDetector {
    pub fn new() -> Self {
        UpxDetector
    }
}

impl Default for UpxDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Detector for UpxDetector {
    fn name(&self) -> &str {
        "UPX"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn can_analyze(&self, _structure: &BinaryStructure) -> bool {
        true
    }

    async fn detect(&self, data: &[u8], structure: &BinaryStructure) -> Option<DetectionResult> {
        let mut result = DetectionResult::new("UPX", DetectorKind::Packer, "upx");

        let mut any_signature = false;
        let mut stub21_present = false;
        for (label, pattern) in signatures() {
            let Ok(parsed) = SignatureScanner::parse_pattern(pattern) else { continue };
            let matches = SignatureScanner::find_all(data, &parsed, label);
            if !matches.is_empty() {
                any_signature = true;
                if pattern == SIG_UPX21 {
                    stub21_present = true;
                }
                result.signatures.extend(matches);
            }
        }
        if any_signature {
            result.add_confidence(0.40);
        }

        let sections = section_names(structure);
        if sections.iter().any(|n| n == "UPX0") && sections.iter().any(|n| n == "UPX1") {
            result.add_confidence(0.40);
        } else if sections.iter().any(|n| n == ".UPX0") && sections.iter().any(|n| n == ".UPX1") {
            result.add_confidence(0.30);
        }

        let entropy = SignatureScanner::entropy(data);
        result.metadata.insert("Entropy".to_string(), format!("{:.2}", entropy));
        if entropy > 7.0 {
            result.add_confidence(0.20);
        }

        if stub21_present {
            result.set_version("3.x+");
        }

        result
            .metadata
            .insert("SignaturesFound".to_string(), result.signatures.len().to_string());

        if result.confidence() > 0.0 {
            Some(result)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure_with_sections(names: &[&str]) -> BinaryStructure {
        let root = BinaryStructure::new("PE File", "Root");
        let sections = BinaryStructure::new("Sections", "Sections");
        root.add_child(sections.clone());
        for name in names {
            sections.add_child(BinaryStructure::new(*name, "IMAGE_SECTION_HEADER"));
        }
        root
    }

    #[tokio::test]
    async fn full_upx_file_reaches_maximum_confidence() {
        let mut data = vec![0u8; 512];
        data[0..4].copy_from_slice(&[0x55, 0x50, 0x58, 0x21]);
        // Force high entropy: fill with a byte sequence spreading the full range.
        for (i, b) in data.iter_mut().enumerate().skip(4) {
            *b = (i % 256) as u8;
        }
        let structure = structure_with_sections(&["UPX0", "UPX1"]);
        let detector = UpxDetector::new();
        let result = detector.detect(&data, &structure).await.unwrap();
        assert_eq!(result.confidence(), 1.0);
        assert_eq!(result.version.as_deref(), Some("3.x+"));
    }

    #[tokio::test]
    async fn file_with_no_markers_yields_no_result() {
        let data = vec![0u8; 64];
        let structure = structure_with_sections(&[]);
        let detector = UpxDetector::new();
        assert!(detector.detect(&data, &structure).await.is_none());
    }
}
