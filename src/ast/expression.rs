use super::types::CType;
use crate::machine::MachineModel;
use std::fmt;
use strum::Display;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum UnaryOperator {
    #[strum(to_string = "&")]
    AddressOf,
    #[strum(to_string = "-")]
    Minus,
    #[strum(to_string = "!")]
    Not,
    #[strum(to_string = "~")]
    Tilde,
    #[strum(to_string = "sizeof ")]
    SizeOf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum BinaryOperator {
    #[strum(to_string = "*")]
    Multiply,
    #[strum(to_string = "/")]
    Divide,
    #[strum(to_string = "%")]
    Modulo,
    #[strum(to_string = "+")]
    Plus,
    #[strum(to_string = "-")]
    Minus,
    #[strum(to_string = "<<")]
    ShiftLeft,
    #[strum(to_string = ">>")]
    ShiftRight,
    #[strum(to_string = "<")]
    LessThan,
    #[strum(to_string = ">")]
    GreaterThan,
    #[strum(to_string = "<=")]
    LessEqual,
    #[strum(to_string = ">=")]
    GreaterEqual,
    #[strum(to_string = "&")]
    BinaryAnd,
    #[strum(to_string = "^")]
    BinaryXor,
    #[strum(to_string = "|")]
    BinaryOr,
    #[strum(to_string = "==")]
    Equals,
    #[strum(to_string = "!=")]
    NotEquals,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::LessThan
                | BinaryOperator::GreaterThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterEqual
                | BinaryOperator::Equals
                | BinaryOperator::NotEquals
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum TypeIdOperator {
    #[strum(to_string = "sizeof")]
    SizeOf,
    #[strum(to_string = "_Alignof")]
    AlignOf,
}

/// A side-effect free C expression. Every node carries the type the
/// front end computed for it.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    Id {
        name: String,
        ty: CType,
    },
    IntegerLiteral {
        value: i64,
        ty: CType,
    },
    CharLiteral {
        value: u8,
        ty: CType,
    },
    FloatLiteral {
        value: f64,
        ty: CType,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
        ty: CType,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        ty: CType,
    },
    Cast {
        operand: Box<Expression>,
        ty: CType,
    },
    /// `owner.field`, or `owner->field` if `dereference` is set.
    FieldReference {
        owner: Box<Expression>,
        field: String,
        dereference: bool,
        ty: CType,
    },
    ArraySubscript {
        array: Box<Expression>,
        subscript: Box<Expression>,
        ty: CType,
    },
    PointerDereference {
        operand: Box<Expression>,
        ty: CType,
    },
    FunctionCall {
        function: String,
        arguments: Vec<Expression>,
        ty: CType,
    },
    TypeId {
        op: TypeIdOperator,
        operand: CType,
        ty: CType,
    },
}

impl Expression {
    pub fn ty(&self) -> &CType {
        match self {
            Expression::Id { ty, .. }
            | Expression::IntegerLiteral { ty, .. }
            | Expression::CharLiteral { ty, .. }
            | Expression::FloatLiteral { ty, .. }
            | Expression::Unary { ty, .. }
            | Expression::Binary { ty, .. }
            | Expression::Cast { ty, .. }
            | Expression::FieldReference { ty, .. }
            | Expression::ArraySubscript { ty, .. }
            | Expression::PointerDereference { ty, .. }
            | Expression::FunctionCall { ty, .. }
            | Expression::TypeId { ty, .. } => ty,
        }
    }

    pub fn id(name: &str, ty: CType) -> Self {
        Expression::Id {
            name: name.to_owned(),
            ty,
        }
    }

    pub fn int(value: i64) -> Self {
        Expression::IntegerLiteral {
            value,
            ty: CType::int(),
        }
    }

    pub fn int_of_type(value: i64, ty: CType) -> Self {
        Expression::IntegerLiteral { value, ty }
    }

    pub fn address_of(operand: Expression) -> Self {
        let ty = CType::pointer_to(operand.ty().clone());

        Expression::Unary {
            op: UnaryOperator::AddressOf,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        let ty = match op {
            UnaryOperator::AddressOf => return Self::address_of(operand),
            UnaryOperator::Not => CType::int(),
            UnaryOperator::SizeOf => CType::unsigned_long(),
            UnaryOperator::Minus | UnaryOperator::Tilde => operand.ty().clone(),
        };

        Expression::Unary {
            op,
            operand: Box::new(operand),
            ty,
        }
    }

    /// Binary expression with the usual result type: `int` for comparisons,
    /// the pointer type for pointer arithmetic (arrays decay), the promoted
    /// left operand for shifts, and the common type of two integer operands
    /// (as on LP64). Otherwise the left operand's type.
    pub fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression) -> Self {
        let decay = |ty: &CType| match ty {
            CType::Array { element, .. } => CType::Pointer(element.clone()),
            other => other.clone(),
        };

        let ty = if op.is_comparison() {
            CType::int()
        } else if lhs.ty().is_address() && rhs.ty().is_address() {
            CType::long()
        } else if lhs.ty().is_address() {
            decay(lhs.ty())
        } else if rhs.ty().is_address() {
            decay(rhs.ty())
        } else if matches!(op, BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight) {
            MachineModel::Linux64
                .promote(lhs.ty())
                .unwrap_or_else(|| lhs.ty().clone())
        } else {
            MachineModel::Linux64
                .common_type(lhs.ty(), rhs.ty())
                .unwrap_or_else(|| lhs.ty().clone())
        };

        Expression::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    pub fn cast(operand: Expression, ty: CType) -> Self {
        Expression::Cast {
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn field(owner: Expression, field: &str, ty: CType) -> Self {
        Expression::FieldReference {
            owner: Box::new(owner),
            field: field.to_owned(),
            dereference: false,
            ty,
        }
    }

    pub fn arrow(owner: Expression, field: &str, ty: CType) -> Self {
        Expression::FieldReference {
            owner: Box::new(owner),
            field: field.to_owned(),
            dereference: true,
            ty,
        }
    }

    pub fn subscript(array: Expression, subscript: Expression) -> Self {
        let ty = array.ty().pointee().cloned().unwrap_or(CType::Void);

        Expression::ArraySubscript {
            array: Box::new(array),
            subscript: Box::new(subscript),
            ty,
        }
    }

    pub fn deref(operand: Expression) -> Self {
        let ty = operand.ty().pointee().cloned().unwrap_or(CType::Void);

        Expression::PointerDereference {
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn call(function: &str, arguments: Vec<Expression>, ty: CType) -> Self {
        Expression::FunctionCall {
            function: function.to_owned(),
            arguments,
            ty,
        }
    }

    pub fn size_of_type(operand: CType) -> Self {
        Expression::TypeId {
            op: TypeIdOperator::SizeOf,
            operand,
            ty: CType::unsigned_long(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expression::Id { name, .. } => write!(f, "{}", name),
            Expression::IntegerLiteral { value, .. } => write!(f, "{}", value),
            Expression::CharLiteral { value, .. } => write!(f, "{:?}", *value as char),
            Expression::FloatLiteral { value, .. } => write!(f, "{}", value),
            Expression::Unary { op, operand, .. } => write!(f, "{}({})", op, operand),
            Expression::Binary { op, lhs, rhs, .. } => write!(f, "({} {} {})", lhs, op, rhs),
            Expression::Cast { operand, ty } => write!(f, "({}) {}", ty, operand),
            Expression::FieldReference {
                owner,
                field,
                dereference,
                ..
            } => write!(
                f,
                "{}{}{}",
                owner,
                if *dereference { "->" } else { "." },
                field
            ),
            Expression::ArraySubscript {
                array, subscript, ..
            } => write!(f, "{}[{}]", array, subscript),
            Expression::PointerDereference { operand, .. } => write!(f, "*{}", operand),
            Expression::FunctionCall {
                function,
                arguments,
                ..
            } => {
                let arguments = arguments
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");

                write!(f, "{}({})", function, arguments)
            }
            Expression::TypeId { op, operand, .. } => write!(f, "{}({})", op, operand),
        }
    }
}
