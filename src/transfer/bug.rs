use std::fmt;

/// Memory safety violations found while computing successor states. They
/// are recorded on the state and do not stop the analysis of the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bug {
    InvalidFree {
        pointer: String,
        reason: &'static str,
    },

    InvalidRead {
        object: String,
        offset: i64,
        size: u64,
        reason: &'static str,
    },

    InvalidWrite {
        object: String,
        offset: i64,
        size: u64,
        reason: &'static str,
    },

    MemoryLeak {
        object: String,
        size: u64,
    },
}

impl Bug {
    pub fn is_invalid_free(&self) -> bool {
        matches!(self, Bug::InvalidFree { .. })
    }

    pub fn is_invalid_read(&self) -> bool {
        matches!(self, Bug::InvalidRead { .. })
    }

    pub fn is_invalid_write(&self) -> bool {
        matches!(self, Bug::InvalidWrite { .. })
    }

    pub fn is_memory_leak(&self) -> bool {
        matches!(self, Bug::MemoryLeak { .. })
    }
}

impl fmt::Display for Bug {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Bug::InvalidFree { pointer, reason } => {
                write!(f, "reason: invalid free\npointer: {}\n{}", pointer, reason)
            }
            Bug::InvalidRead {
                object,
                offset,
                size,
                reason,
            } => write!(
                f,
                "reason: invalid read of {} bytes\nlocation: {}[{}]\n{}",
                size, object, offset, reason
            ),
            Bug::InvalidWrite {
                object,
                offset,
                size,
                reason,
            } => write!(
                f,
                "reason: invalid write of {} bytes\nlocation: {}[{}]\n{}",
                size, object, offset, reason
            ),
            Bug::MemoryLeak { object, size } => write!(
                f,
                "reason: memory leak\nobject: {} ({} bytes) is no longer reachable",
                object, size
            ),
        }
    }
}
