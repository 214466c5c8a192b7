use crate::ast::{CType, CompositeType, IntegerKind};
use strum::{EnumString, EnumVariantNames, IntoStaticStr};

/// Data models the analysis can assume for the analyzed program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, EnumVariantNames, IntoStaticStr)]
#[strum(serialize_all = "kebab_case")]
pub enum MachineModel {
    /// ILP32: `int`, `long` and pointers are 4 bytes wide.
    Linux32,
    /// LP64: `long` and pointers are 8 bytes wide.
    Linux64,
}

impl Default for MachineModel {
    fn default() -> Self {
        MachineModel::Linux64
    }
}

impl MachineModel {
    pub fn size_of_pointer(&self) -> u64 {
        match self {
            MachineModel::Linux32 => 4,
            MachineModel::Linux64 => 8,
        }
    }

    fn size_of_integer(&self, kind: IntegerKind) -> u64 {
        match (kind, self) {
            (IntegerKind::Char, _) => 1,
            (IntegerKind::Short, _) => 2,
            (IntegerKind::Int, _) => 4,
            (IntegerKind::Long, MachineModel::Linux32) => 4,
            (IntegerKind::Long, MachineModel::Linux64) => 8,
            (IntegerKind::LongLong, _) => 8,
        }
    }

    /// Size of `ty` in bytes.
    ///
    /// Composites are laid out without padding: a struct is as large as the
    /// sum of its members, a union as its largest member. Incomplete types
    /// (undefined composites, arrays without length) have size zero.
    /// `void` has size one so that arithmetic on `void *` moves bytewise.
    pub fn size_of(&self, ty: &CType) -> u64 {
        match ty {
            CType::Void | CType::Bool => 1,
            CType::Integer { kind, .. } => self.size_of_integer(*kind),
            CType::Float => 4,
            CType::Double => 8,
            CType::LongDouble => match self {
                MachineModel::Linux32 => 12,
                MachineModel::Linux64 => 16,
            },
            CType::Pointer(_) => self.size_of_pointer(),
            CType::Array {
                element,
                length: Some(length),
            } => self.size_of(element) * length,
            CType::Array { length: None, .. } => 0,
            CType::Composite(composite) => self.size_of_composite(composite),
        }
    }

    fn size_of_composite(&self, composite: &CompositeType) -> u64 {
        let sizes = composite.members().iter().map(|m| self.size_of(&m.ty));

        if composite.is_union() {
            sizes.max().unwrap_or(0)
        } else {
            sizes.sum()
        }
    }

    pub fn align_of(&self, ty: &CType) -> u64 {
        match ty {
            CType::Array { element, .. } => self.align_of(element),
            CType::Composite(composite) => composite
                .members()
                .iter()
                .map(|m| self.align_of(&m.ty))
                .max()
                .unwrap_or(1),
            CType::LongDouble if *self == MachineModel::Linux32 => 4,
            CType::Integer {
                kind: IntegerKind::LongLong,
                ..
            }
            | CType::Double
                if *self == MachineModel::Linux32 =>
            {
                4
            }
            other => self.size_of(other),
        }
    }

    /// Byte offset of `field` inside `composite`: the sum of the sizes of
    /// all preceding members for structs, always zero for unions.
    pub fn field_offset(&self, composite: &CompositeType, field: &str) -> Option<u64> {
        let mut offset = 0;

        for member in composite.members() {
            if member.name == field {
                return Some(if composite.is_union() { 0 } else { offset });
            }

            offset += self.size_of(&member.ty);
        }

        None
    }

    /// Integer promotion: `_Bool`, `char` and `short` of either signedness
    /// become `int`. `None` for non-integer types.
    pub fn promote(&self, ty: &CType) -> Option<CType> {
        self.promoted(ty)
            .map(|(kind, signed)| CType::Integer { kind, signed })
    }

    fn promoted(&self, ty: &CType) -> Option<(IntegerKind, bool)> {
        match ty {
            CType::Bool => Some((IntegerKind::Int, true)),
            CType::Integer { kind, .. } if *kind < IntegerKind::Int => Some((IntegerKind::Int, true)),
            CType::Integer { kind, signed } => Some((*kind, *signed)),
            _ => None,
        }
    }

    /// The usual arithmetic conversions for two integer operands: the type
    /// both are converted to before a binary operator combines them.
    pub fn common_type(&self, lhs: &CType, rhs: &CType) -> Option<CType> {
        let (lhs_kind, lhs_signed) = self.promoted(lhs)?;
        let (rhs_kind, rhs_signed) = self.promoted(rhs)?;

        let (kind, signed) = if lhs_signed == rhs_signed {
            (lhs_kind.max(rhs_kind), lhs_signed)
        } else {
            let (unsigned, signed) = if lhs_signed {
                (rhs_kind, lhs_kind)
            } else {
                (lhs_kind, rhs_kind)
            };

            if unsigned >= signed {
                (unsigned, false)
            } else if self.size_of_integer(signed) > self.size_of_integer(unsigned) {
                (signed, true)
            } else {
                (signed, false)
            }
        };

        Some(CType::Integer { kind, signed })
    }

    /// Width in bits of an integer type, used to truncate explicit values on casts.
    pub fn bit_width(&self, ty: &CType) -> Option<u32> {
        match ty {
            CType::Bool | CType::Integer { .. } | CType::Pointer(_) => {
                Some(self.size_of(ty) as u32 * 8)
            }
            _ => None,
        }
    }
}
