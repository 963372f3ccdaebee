//! A priority-ordered pipeline of packer/protector detectors.
//!
//! A [`Detector`] is a stateless probe over a loaded file's bytes and parsed
//! structure. [`DetectorRegistry`] owns the ordering, filtering, and
//! confidence-descending sort that turn a set of probes into a ranked
//! [`DetectionResult`] list.

pub mod fsg;
pub mod themida;
pub mod upx;

use async_trait::async_trait;
use binrecon_core::{BinaryStructure, DetectionResult};
use tokio::sync::mpsc::Sender;

#[doc(inline)]
pub use fsg::FsgDetector;
#[doc(inline)]
pub use themida::ThemidaDetector;
#[doc(inline)]
pub use upx::UpxDetector;

/// One message per detector invocation, delivered in start order.
#[derive(Debug, Clone)]
pub struct DetectorProgress {
    pub name: String,
    pub index: usize,
    pub total: usize,
}

/// A stateless (or internally synchronized) packer/protector probe.
///
/// `?Send` because a probe commonly borrows the `Rc`-based
/// [`BinaryStructure`] tree; the registry runs detectors sequentially on one
/// task rather than across a thread pool, so the returned future never needs
/// to cross a thread boundary.
#[async_trait(?Send)]
pub trait Detector {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn priority(&self) -> i32;
    fn can_analyze(&self, structure: &BinaryStructure) -> bool;
    async fn detect(&self, data: &[u8], structure: &BinaryStructure) -> Option<DetectionResult>;
}

/// Reads a named child's section-table array under `Sections`, returning
/// `(name, value_of(field))` pairs for every section.
pub(crate) fn section_names(structure: &BinaryStructure) -> Vec<String> {
    structure
        .find_by_path(&["Sections"])
        .map(|sections| sections.children().iter().map(|s| s.name()).collect())
        .unwrap_or_default()
}

pub(crate) fn section_count(structure: &BinaryStructure) -> usize {
    structure
        .find_by_path(&["Sections"])
        .map(|sections| sections.children().len())
        .unwrap_or(0)
}

pub(crate) fn section_raw_sizes(structure: &BinaryStructure) -> Vec<i64> {
    structure
        .find_by_path(&["Sections"])
        .map(|sections| {
            sections
                .children()
                .iter()
                .filter_map(|s| s.find_by_path(&["SizeOfRawData"]))
                .filter_map(|f| match f.value() {
                    Some(binrecon_core::Value::Integer(v)) => Some(v),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn import_rva(structure: &BinaryStructure) -> Option<i64> {
    structure
        .find_by_path(&["Data Directories", "Import", "RVA"])
        .and_then(|f| f.value())
        .and_then(|v| match v {
            binrecon_core::Value::Integer(n) => Some(n),
            _ => None,
        })
}

/// Owns registered detectors and runs them against a loaded file.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn Detector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        DetectorRegistry { detectors: Vec::new() }
    }

    /// Every built-in detector, in their natural priority order.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(UpxDetector::new()));
        registry.register(Box::new(ThemidaDetector::new()));
        registry.register(Box::new(FsgDetector::new()));
        registry
    }

    /// Append a detector, then stable-sort the whole set ascending by
    /// priority.
    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
        self.detectors.sort_by_key(|d| d.priority());
    }

    pub async fn analyze(
        &self,
        data: &[u8],
        structure: &BinaryStructure,
        progress: Option<Sender<DetectorProgress>>,
    ) -> Vec<DetectionResult> {
        let candidates: Vec<&Box<dyn Detector>> =
            self.detectors.iter().filter(|d| d.can_analyze(structure)).collect();
        let total = candidates.len();

        let mut results = Vec::new();
        for (index, detector) in candidates.into_iter().enumerate() {
            if let Some(tx) = &progress {
                let _ = tx
                    .send(DetectorProgress {
                        name: detector.name().to_string(),
                        index,
                        total,
                    })
                    .await;
            }
            tracing::debug!(detector = detector.name(), "running detector");
            if let Some(result) = detector.detect(data, structure).await {
                if result.confidence() > 0.0 {
                    results.push(result);
                }
            }
        }

        results.sort_by(|a, b| b.confidence().partial_cmp(&a.confidence()).unwrap());
        results
    }

    /// The highest-confidence result, or `None` when `results` is empty.
    pub fn best(results: &[DetectionResult]) -> Option<DetectionResult> {
        results
            .iter()
            .max_by(|a, b| a.confidence().partial_cmp(&b.confidence()).unwrap())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrecon_core::DetectorKind;

    struct StubDetector {
        name: &'static str,
        priority: i32,
        confidence: f64,
    }

    #[async_trait(?Send)]
    impl Detector for StubDetector {
        fn name(&self) -> &str {
            self.name
        }
        fn version(&self) -> &str {
            "1.0"
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn can_analyze(&self, _structure: &BinaryStructure) -> bool {
            true
        }
        async fn detect(&self, _data: &[u8], _structure: &BinaryStructure) -> Option<DetectionResult> {
            let mut result = DetectionResult::new(self.name, DetectorKind::Unknown, self.name);
            result.add_confidence(self.confidence);
            Some(result)
        }
    }

    #[tokio::test]
    async fn register_sorts_ascending_by_priority_stably() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(StubDetector { name: "b", priority: 20, confidence: 0.5 }));
        registry.register(Box::new(StubDetector { name: "a", priority: 10, confidence: 0.5 }));
        let structure = BinaryStructure::new("PE File", "Root");
        let results = registry.analyze(&[], &structure, None).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn zero_confidence_results_are_dropped_and_rest_sorted_descending() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(StubDetector { name: "zero", priority: 1, confidence: 0.0 }));
        registry.register(Box::new(StubDetector { name: "low", priority: 2, confidence: 0.3 }));
        registry.register(Box::new(StubDetector { name: "high", priority: 3, confidence: 0.9 }));
        let structure = BinaryStructure::new("PE File", "Root");
        let results = registry.analyze(&[], &structure, None).await;
        assert_eq!(results.iter().map(|r| r.name.clone()).collect::<Vec<_>>(), vec!["high", "low"]);
    }

    #[tokio::test]
    async fn progress_channel_receives_one_message_per_detector_in_start_order() {
        let mut registry = DetectorRegistry::new();
        registry.register(Box::new(StubDetector { name: "a", priority: 1, confidence: 0.5 }));
        registry.register(Box::new(StubDetector { name: "b", priority: 2, confidence: 0.5 }));
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let structure = BinaryStructure::new("PE File", "Root");
        registry.analyze(&[], &structure, Some(tx)).await;

        let first = rx.recv().await.unwrap();
        assert_eq!((first.name, first.index, first.total), ("a".to_string(), 0, 2));
        let second = rx.recv().await.unwrap();
        assert_eq!((second.name, second.index, second.total), ("b".to_string(), 1, 2));
    }

    #[test]
    fn best_picks_the_highest_confidence_result() {
        let mut low = DetectionResult::new("low", DetectorKind::Unknown, "low");
        low.add_confidence(0.2);
        let mut high = DetectionResult::new("high", DetectorKind::Unknown, "high");
        high.add_confidence(0.9);
        let best = DetectorRegistry::best(&[low, high]).unwrap();
        assert_eq!(best.name, "high");
    }
}
