use crate::machine::MachineModel;
use std::path::PathBuf;
use strum::{EnumString, EnumVariantNames, IntoStaticStr};

/// When the transfer relation verifies the invariants of the states it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, EnumVariantNames, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum RuntimeCheck {
    /// Never verify.
    None,
    /// Verify after operations which restructure a graph: popping a frame
    /// and pruning unreachable objects.
    Half,
    /// Verify every successor state.
    Full,
}

/// When the transfer relation writes dot files of the states it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, EnumVariantNames, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum ExportPolicy {
    Never,
    /// Only states in which a memory leak was detected.
    Leaks,
    Every,
}

pub mod defaults {
    use super::*;

    pub const MACHINE_MODEL: MachineModel = MachineModel::Linux64;
    pub const SIMULATE_MALLOC_FAILURE: bool = false;
    pub const RUNTIME_CHECK: RuntimeCheck = RuntimeCheck::None;
    pub const EXPORT_POLICY: ExportPolicy = ExportPolicy::Never;
    pub const FAIL_ON_INCONSISTENCY: bool = cfg!(debug_assertions);
    pub const MEMSET_BYTE_LIMIT: u64 = 4096;

    pub const ALLOCATION_FUNCTIONS: &[&str] = &["malloc"];
    pub const ZEROING_ALLOCATION_FUNCTIONS: &[&str] = &["calloc"];
    pub const DEALLOCATION_FUNCTIONS: &[&str] = &["free"];
    pub const MEMSET_FUNCTIONS: &[&str] = &["memset"];
    pub const STACK_ALLOCATION_FUNCTIONS: &[&str] = &["alloca", "__builtin_alloca"];
}

#[derive(Clone, Debug)]
pub struct SmgOptions {
    /// Data model of the analyzed program
    pub machine_model: MachineModel,
    /// Produce a second successor for every allocation, in which the allocation failed
    pub simulate_malloc_failure: bool,
    pub runtime_check: RuntimeCheck,
    /// Whether a failed invariant check aborts the current path or is only logged
    pub fail_on_inconsistency: bool,
    pub export_policy: ExportPolicy,
    /// Directory dot files are written to. Nothing is exported without one.
    pub export_directory: Option<PathBuf>,
    pub allocation_functions: Vec<String>,
    /// Allocation functions which also zero the allocated block (`calloc`)
    pub zeroing_allocation_functions: Vec<String>,
    pub deallocation_functions: Vec<String>,
    pub memset_functions: Vec<String>,
    pub stack_allocation_functions: Vec<String>,
    /// `memset` with a non-zero byte writes one edge per byte up to this
    /// length. Longer ranges become unknown.
    pub memset_byte_limit: u64,
}

impl Default for SmgOptions {
    fn default() -> Self {
        let names = |names: &[&str]| names.iter().map(|n| String::from(*n)).collect();

        Self {
            machine_model: defaults::MACHINE_MODEL,
            simulate_malloc_failure: defaults::SIMULATE_MALLOC_FAILURE,
            runtime_check: defaults::RUNTIME_CHECK,
            fail_on_inconsistency: defaults::FAIL_ON_INCONSISTENCY,
            export_policy: defaults::EXPORT_POLICY,
            export_directory: None,
            allocation_functions: names(defaults::ALLOCATION_FUNCTIONS),
            zeroing_allocation_functions: names(defaults::ZEROING_ALLOCATION_FUNCTIONS),
            deallocation_functions: names(defaults::DEALLOCATION_FUNCTIONS),
            memset_functions: names(defaults::MEMSET_FUNCTIONS),
            stack_allocation_functions: names(defaults::STACK_ALLOCATION_FUNCTIONS),
            memset_byte_limit: defaults::MEMSET_BYTE_LIMIT,
        }
    }
}

/// The memory function a call is dispatched to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Malloc,
    Calloc,
    Free,
    Memset,
    Alloca,
}

impl SmgOptions {
    pub fn builtin(&self, function: &str) -> Option<Builtin> {
        let is = |names: &[String]| names.iter().any(|n| n == function);

        if is(&self.allocation_functions) {
            Some(Builtin::Malloc)
        } else if is(&self.zeroing_allocation_functions) {
            Some(Builtin::Calloc)
        } else if is(&self.deallocation_functions) {
            Some(Builtin::Free)
        } else if is(&self.memset_functions) {
            Some(Builtin::Memset)
        } else if is(&self.stack_allocation_functions) {
            Some(Builtin::Alloca)
        } else {
            None
        }
    }

    pub fn is_builtin(&self, function: &str) -> bool {
        self.builtin(function).is_some()
    }
}
