//! FSG (Fast Small Good) packer detection: versioned entry signatures and
//! the small, high-entropy sections FSG characteristically produces.

use crate::{import_rva, section_raw_sizes, Detector};
use async_trait::async_trait;
use binrecon_core::{BinaryStructure, DetectionResult, DetectorKind, SignatureScanner};

const VERSIONED_SIGNATURES: [(&str, &str); 3] = [
    ("1.0", "87 DB B8 ?? ?? ?? ?? EB"),
    ("1.31", "8B 1E 83 EE FC 11 DB ??"),
    ("2.0", "BE ?? ?? ?? ?? AD 93"),
];

/// Detects the FSG packer.
pub struct FsgDetector;

impl FsgDetector {
    pub fn new() -> Self {
        FsgDetector
    }
}

impl Default for FsgDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Detector for FsgDetector {
    fn name(&self) -> &str {
        "FSG"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn can_analyze(&self, _structure: &BinaryStructure) -> bool {
        true
    }

    async fn detect(&self, data: &[u8], structure: &BinaryStructure) -> Option<DetectionResult> {
        let mut result = DetectionResult::new("FSG", DetectorKind::Packer, "fsg");

        for (version, pattern) in VERSIONED_SIGNATURES {
            let Ok(parsed) = SignatureScanner::parse_pattern(pattern) else { continue };
            let matches = SignatureScanner::find_all(data, &parsed, "FSG entry stub");
            if !matches.is_empty() {
                result.add_confidence(0.60);
                result.set_version(version);
                result.signatures.extend(matches);
                break;
            }
        }

        let sizes = section_raw_sizes(structure);
        if sizes.iter().any(|&s| s < 1024) {
            result.add_confidence(0.10);
        }
        if sizes.first().is_some_and(|&s| s < 512) {
            result.add_confidence(0.15);
        }

        let entropy = SignatureScanner::entropy(data);
        result.metadata.insert("Entropy".to_string(), format!("{:.2}", entropy));
        if entropy > 7.0 {
            result.add_confidence(0.15);
        }

        if import_rva(structure) == Some(0) {
            result.add_confidence(0.10);
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
    use binrecon_core::Value;

    fn structure_with_section_sizes(sizes: &[i64]) -> BinaryStructure {
        let root = BinaryStructure::new("PE File", "Root");
        let sections = BinaryStructure::new("Sections", "Sections");
        root.add_child(sections.clone());
        for (i, size) in sizes.iter().enumerate() {
            let section = BinaryStructure::new(format!("sec{i}"), "IMAGE_SECTION_HEADER");
            sections.add_child(section.clone());
            section.add_child(
                BinaryStructure::new("SizeOfRawData", "Field").with_value(Value::Integer(*size)),
            );
        }
        root
    }

    #[tokio::test]
    async fn version_hit_sets_version_string_and_confidence() {
        let mut data = vec![0x87, 0xDB, 0xB8, 0x01, 0x02, 0x03, 0x04, 0xEB];
        data.resize(64, 0);
        let structure = structure_with_section_sizes(&[256]);
        let detector = FsgDetector::new();
        let result = detector.detect(&data, &structure).await.unwrap();
        assert_eq!(result.version.as_deref(), Some("1.0"));
        assert!(result.confidence() >= 0.60);
    }

    #[tokio::test]
    async fn small_first_section_adds_extra_confidence_on_top_of_small_section() {
        let data = vec![0u8; 64];
        let structure = structure_with_section_sizes(&[256, 2048]);
        let detector = FsgDetector::new();
        // No signature hit: only the small-section heuristics contribute.
        let result = detector.detect(&data, &structure).await.unwrap();
        assert!((result.confidence() - 0.25).abs() < 1e-9);
    }
}
