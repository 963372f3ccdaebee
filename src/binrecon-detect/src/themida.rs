//! Themida / WinLicense protector detection: entry-stub signatures, section
//! naming, section-count anomaly, and import-table anomaly.

use crate::{import_rva, section_count, section_names, Detector};
use async_trait::async_trait;
use binrecon_core::{BinaryStructure, DetectionResult, DetectorKind, SignatureScanner};

const ENTRY_STUBS: [&str; 4] = [
    "B8 ?? ?? ?? ?? 60 0B C0 74",
    "EB 06 68 ?? ?? ?? ?? C3",
    "9C 60 E8 00 00 00 00 5D",
    "53 51 52 56 57 55 8B E8",
];

/// Detects Themida/WinLicense virtualizing protectors.
pub struct ThemidaDetector;

impl ThemidaDetector {
    pub fn new() -> Self {
        ThemidaDetector
    }
}

impl Default for ThemidaDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Detector for ThemidaDetector {
    fn name(&self) -> &str {
        "Themida/WinLicense"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn can_analyze(&self, _structure: &BinaryStructure) -> bool {
        true
    }

    async fn detect(&self, data: &[u8], structure: &BinaryStructure) -> Option<DetectionResult> {
        let mut result = DetectionResult::new("Themida/WinLicense", DetectorKind::Protector, "themida");

        let mut any_signature = false;
        for pattern in ENTRY_STUBS {
            let Ok(parsed) = SignatureScanner::parse_pattern(pattern) else { continue };
            let matches = SignatureScanner::find_all(data, &parsed, "Themida entry stub");
            if !matches.is_empty() {
                any_signature = true;
                result.signatures.extend(matches);
            }
        }
        if any_signature {
            result.add_confidence(0.30);
        }

        let sections = section_names(structure);
        if sections.iter().any(|n| n == ".THEMIDA" || n == ".WINLICE") {
            result.add_confidence(0.50);
            result.metadata.insert("Type".to_string(), "Themida/WinLicense".to_string());
        }

        if section_count(structure) > 8 {
            result.add_confidence(0.10);
        }

        if let Some(rva) = import_rva(structure) {
            if rva == 0 || rva > 0x0010_0000 {
                result.add_confidence(0.20);
            }
        }

        let entropy = SignatureScanner::entropy(data);
        result.metadata.insert("Entropy".to_string(), format!("{:.2}", entropy));
        if entropy > 7.5 {
            result.add_confidence(0.30);
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

    fn structure_with(sections: &[&str], section_count_pad: usize, import_rva: Option<i64>) -> BinaryStructure {
        let root = BinaryStructure::new("PE File", "Root");
        let sections_node = BinaryStructure::new("Sections", "Sections");
        root.add_child(sections_node.clone());
        for name in sections {
            sections_node.add_child(BinaryStructure::new(*name, "IMAGE_SECTION_HEADER"));
        }
        for i in 0..section_count_pad {
            sections_node.add_child(BinaryStructure::new(format!("sec{i}"), "IMAGE_SECTION_HEADER"));
        }
        if let Some(rva) = import_rva {
            let dirs = BinaryStructure::new("Data Directories", "DataDirectories");
            root.add_child(dirs.clone());
            let import = BinaryStructure::new("Import", "DataDirectory");
            dirs.add_child(import.clone());
            import.add_child(
                BinaryStructure::new("RVA", "Field").with_value(binrecon_core::Value::Integer(rva)),
            );
        }
        root
    }

    #[tokio::test]
    async fn section_naming_and_anomalous_import_raise_confidence() {
        let structure = structure_with(&[".THEMIDA"], 8, Some(0));
        let detector = ThemidaDetector::new();
        let data = vec![0u8; 64];
        let result = detector.detect(&data, &structure).await.unwrap();
        assert!(result.confidence() >= 0.5 + 0.1 + 0.2 - 1e-9);
        assert_eq!(result.metadata.get("Type"), Some(&"Themida/WinLicense".to_string()));
    }

    #[tokio::test]
    async fn clean_file_yields_no_result() {
        let structure = structure_with(&[], 0, None);
        let data = vec![0u8; 64];
        let detector = ThemidaDetector::new();
        assert!(detector.detect(&data, &structure).await.is_none());
    }
}
