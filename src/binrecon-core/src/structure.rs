//! The shared data model: `BinaryStructure` tree nodes, `DataRegion` byte
//! intervals, and the detector result types that ride on top of them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// A tagged value attached to a [`BinaryStructure`] node.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

struct Inner {
    name: String,
    node_type: String,
    offset: Option<u64>,
    size: Option<u64>,
    value: Option<Value>,
    display_value: Option<String>,
    metadata: HashMap<String, String>,
    children: Vec<BinaryStructure>,
    parent: Option<Weak<RefCell<Inner>>>,
}

/// One node of the PE parse tree.
///
/// A node with an `offset` carries that offset in absolute file coordinates
/// — children always store absolute, not parent-relative, offsets. The tree
/// is built once by [`crate::pe_mapper::PEMapper`] and is immutable
/// thereafter; `BinaryStructure` is a cheap `Rc` clone, so detectors and UI
/// collaborators can hold their own reference to any node without copying
/// the subtree.
#[derive(Clone)]
pub struct BinaryStructure(Rc<RefCell<Inner>>);

impl BinaryStructure {
    /// Construct a fresh, parentless node.
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        BinaryStructure(Rc::new(RefCell::new(Inner {
            name: name.into(),
            node_type: node_type.into(),
            offset: None,
            size: None,
            value: None,
            display_value: None,
            metadata: HashMap::new(),
            children: Vec::new(),
            parent: None,
        })))
    }

    pub fn with_offset(self, offset: u64) -> Self {
        self.0.borrow_mut().offset = Some(offset);
        self
    }

    pub fn with_size(self, size: u64) -> Self {
        self.0.borrow_mut().size = Some(size);
        self
    }

    pub fn with_value(self, value: Value) -> Self {
        self.0.borrow_mut().value = Some(value);
        self
    }

    pub fn with_display(self, display: impl Into<String>) -> Self {
        self.0.borrow_mut().display_value = Some(display.into());
        self
    }

    pub fn with_metadata(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.borrow_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Append a child, wiring up its parent back-reference.
    pub fn add_child(&self, child: BinaryStructure) {
        *child.0.borrow_mut().parent.get_or_insert_with(Weak::new) = Rc::downgrade(&self.0);
        self.0.borrow_mut().children.push(child);
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn node_type(&self) -> String {
        self.0.borrow().node_type.clone()
    }

    pub fn offset(&self) -> Option<u64> {
        self.0.borrow().offset
    }

    pub fn size(&self) -> Option<u64> {
        self.0.borrow().size
    }

    pub fn value(&self) -> Option<Value> {
        self.0.borrow().value.clone()
    }

    pub fn display_value(&self) -> Option<String> {
        self.0.borrow().display_value.clone()
    }

    pub fn metadata(&self) -> HashMap<String, String> {
        self.0.borrow().metadata.clone()
    }

    pub fn children(&self) -> Vec<BinaryStructure> {
        self.0.borrow().children.clone()
    }

    /// The parent node, if any. Upgrades the internal weak reference; returns
    /// `None` for the root or for a node whose owning tree has been dropped.
    pub fn parent(&self) -> Option<BinaryStructure> {
        self.0
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(BinaryStructure)
    }

    /// A weak handle usable from a [`DataRegion`].
    pub fn downgrade(&self) -> WeakStructure {
        WeakStructure(Rc::downgrade(&self.0))
    }

    /// Case-sensitive, name-matched descent: `find_by_path(&["NT Headers",
    /// "File Header"])` walks children named `"NT Headers"` then
    /// `"File Header"`.
    pub fn find_by_path(&self, segments: &[&str]) -> Option<BinaryStructure> {
        let mut current = self.clone();
        for segment in segments {
            let next = current
                .children()
                .into_iter()
                .find(|child| child.name() == *segment)?;
            current = next;
        }
        Some(current)
    }
}

/// A non-owning reference from a [`DataRegion`] into the [`BinaryStructure`]
/// tree. `DataRegion` never participates in the tree's lifetime.
#[derive(Clone)]
pub struct WeakStructure(Weak<RefCell<Inner>>);

impl WeakStructure {
    pub fn upgrade(&self) -> Option<BinaryStructure> {
        self.0.upgrade().map(BinaryStructure)
    }
}

/// The kind of content a [`DataRegion`] covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RegionKind {
    Header,
    Code,
    Data,
    Import,
    Export,
    Resource,
    Relocation,
    Debug,
    Overlay,
    Signature,
    Unknown,
}

/// A byte interval `[offset, offset+size)` tagged for highlighting.
///
/// Regions may overlap; when they do, the renderer (an external collaborator,
/// out of scope here) resolves the tie by picking the region with the
/// highest `layer`.
#[derive(Clone)]
pub struct DataRegion {
    pub offset: u64,
    pub size: u64,
    pub kind: RegionKind,
    pub highlight_color: u32,
    pub layer: i32,
    pub structure: Option<WeakStructure>,
}

impl DataRegion {
    pub fn new(offset: u64, size: u64, kind: RegionKind) -> Self {
        DataRegion {
            offset,
            size,
            kind,
            highlight_color: 0,
            layer: 0,
            structure: None,
        }
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.highlight_color = color;
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_structure(mut self, structure: &BinaryStructure) -> Self {
        self.structure = Some(structure.downgrade());
        self
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset < self.offset + self.size
    }
}

/// A single pattern match produced by [`crate::scanner::SignatureScanner`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SignatureMatch {
    pub offset: u64,
    pub name: String,
    pub pattern: String,
    pub length: usize,
}

/// One token of a parsed signature pattern: either a concrete byte or a
/// wildcard that matches any byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternByte {
    Byte(u8),
    Wildcard,
}

/// The family a [`DetectionResult`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DetectorKind {
    Packer,
    Protector,
    Cryptor,
    Virtualizer,
    Compiler,
    Unknown,
}

/// The outcome of a single detector run against a loaded file.
///
/// An empty result set is represented by the *absence* of a record — a
/// detector that found nothing returns `None` from
/// [`crate::structure`]-adjacent code rather than a zero-confidence record.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DetectionResult {
    pub name: String,
    pub version: Option<String>,
    pub kind: DetectorKind,
    confidence: f64,
    pub signatures: Vec<SignatureMatch>,
    pub metadata: HashMap<String, String>,
    pub detector_id: String,
}

impl DetectionResult {
    pub fn new(name: impl Into<String>, kind: DetectorKind, detector_id: impl Into<String>) -> Self {
        DetectionResult {
            name: name.into(),
            version: None,
            kind,
            confidence: 0.0,
            signatures: Vec::new(),
            metadata: HashMap::new(),
            detector_id: detector_id.into(),
        }
    }

    /// Confidence is always read back clamped to `[0.0, 1.0]`, regardless of
    /// how it was accumulated.
    pub fn confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }

    pub fn add_confidence(&mut self, delta: f64) {
        self.confidence = (self.confidence + delta).clamp(0.0, 1.0);
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = Some(version.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_path_descends_case_sensitively() {
        let root = BinaryStructure::new("PE File", "Root");
        let dos = BinaryStructure::new("DOS Header", "IMAGE_DOS_HEADER").with_offset(0);
        root.add_child(dos.clone());
        let magic = BinaryStructure::new("e_magic", "Field").with_offset(0);
        dos.add_child(magic);

        assert!(root.find_by_path(&["dos header"]).is_none());
        let found = root.find_by_path(&["DOS Header", "e_magic"]).unwrap();
        assert_eq!(found.offset(), Some(0));
    }

    #[test]
    fn children_carry_absolute_offsets_and_parent_backref() {
        let root = BinaryStructure::new("PE File", "Root");
        let section = BinaryStructure::new("Sections", "Sections").with_offset(248);
        root.add_child(section.clone());
        assert_eq!(section.parent().unwrap().name(), "PE File");
    }

    #[test]
    fn confidence_clamps_at_one() {
        let mut result = DetectionResult::new("UPX", DetectorKind::Packer, "upx");
        result.add_confidence(0.6);
        result.add_confidence(0.6);
        assert_eq!(result.confidence(), 1.0);
    }

    #[test]
    fn region_contains_is_half_open() {
        let region = DataRegion::new(10, 4, RegionKind::Code);
        assert!(!region.contains(9));
        assert!(region.contains(10));
        assert!(region.contains(13));
        assert!(!region.contains(14));
    }
}
