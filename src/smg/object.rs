use bytesize::ByteSize;
use std::fmt;

/// Handle of a memory object inside one graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u32);

impl ObjectId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// One abstract memory block: a variable, a heap allocation or the null
/// region. Objects never change after creation; whether they are still
/// valid is tracked by the graph that owns them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemoryObject {
    size: u64,
    label: String,
    null: bool,
}

impl MemoryObject {
    pub fn new(size: u64, label: &str) -> Self {
        Self {
            size,
            label: label.to_owned(),
            null: false,
        }
    }

    pub(crate) fn null() -> Self {
        Self {
            size: 0,
            label: String::from("NULL"),
            null: true,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_null(&self) -> bool {
        self.null
    }
}

impl fmt::Display for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.label, ByteSize::b(self.size))
    }
}
