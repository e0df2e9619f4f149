use super::types::{GlslType, ScalarType};

macro_rules! expr_ops {
    ($($arity:literal $name:ident => $text:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ExprOp {
            $($name,)*
        }
        impl ExprOp {
            pub const ALL: &'static [ExprOp] = &[$(Self::$name,)*];

            /// Operand count. `Vector` takes between 2 and 4.
            pub const fn num_operands(self) -> usize {
                match self {
                    $(Self::$name => $arity,)*
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => $text,)*
                }
            }
        }
    };
}

expr_ops! {
    1 BitNot => "~",
    1 LogicNot => "!",
    1 Neg => "neg",
    1 Abs => "abs",
    1 Sign => "sign",
    1 Rcp => "rcp",
    1 Rsq => "rsq",
    1 Sqrt => "sqrt",
    1 Exp => "exp",
    1 Log => "log",
    1 Exp2 => "exp2",
    1 Log2 => "log2",
    1 F2i => "f2i",
    1 F2u => "f2u",
    1 I2f => "i2f",
    1 F2b => "f2b",
    1 B2f => "b2f",
    1 I2b => "i2b",
    1 B2i => "b2i",
    1 U2f => "u2f",
    1 I2u => "i2u",
    1 U2i => "u2i",
    1 D2f => "d2f",
    1 F2d => "f2d",
    1 D2i => "d2i",
    1 I2d => "i2d",
    1 D2u => "d2u",
    1 U2d => "u2d",
    1 D2b => "d2b",
    1 BitcastI2f => "bitcast_i2f",
    1 BitcastF2i => "bitcast_f2i",
    1 BitcastU2f => "bitcast_u2f",
    1 BitcastF2u => "bitcast_f2u",
    1 I642i => "i642i",
    1 I2i64 => "i2i64",
    1 U642u => "u642u",
    1 U2u64 => "u2u64",
    1 I642u64 => "i642u64",
    1 U642i64 => "u642i64",
    1 Trunc => "trunc",
    1 Ceil => "ceil",
    1 Floor => "floor",
    1 Fract => "fract",
    1 RoundEven => "round_even",
    1 Sin => "sin",
    1 Cos => "cos",
    1 Saturate => "saturate",
    1 Dfdx => "dFdx",
    1 Dfdy => "dFdy",
    1 PackSnorm2x16 => "packSnorm2x16",
    1 PackUnorm2x16 => "packUnorm2x16",
    1 PackSnorm4x8 => "packSnorm4x8",
    1 PackUnorm4x8 => "packUnorm4x8",
    1 PackHalf2x16 => "packHalf2x16",
    1 UnpackSnorm2x16 => "unpackSnorm2x16",
    1 UnpackUnorm2x16 => "unpackUnorm2x16",
    1 UnpackSnorm4x8 => "unpackSnorm4x8",
    1 UnpackUnorm4x8 => "unpackUnorm4x8",
    1 UnpackHalf2x16 => "unpackHalf2x16",
    1 PackDouble2x32 => "packDouble2x32",
    1 UnpackDouble2x32 => "unpackDouble2x32",
    1 PackInt2x32 => "packInt2x32",
    1 UnpackInt2x32 => "unpackInt2x32",
    1 PackUint2x32 => "packUint2x32",
    1 UnpackUint2x32 => "unpackUint2x32",
    1 BitfieldReverse => "bitfield_reverse",
    1 BitCount => "bit_count",
    1 FindMsb => "find_msb",
    1 FindLsb => "find_lsb",
    2 Add => "+",
    2 Sub => "-",
    2 Mul => "*",
    2 Div => "/",
    2 Mod => "%",
    2 Less => "<",
    2 Greater => ">",
    2 Lequal => "<=",
    2 Gequal => ">=",
    2 Equal => "==",
    2 Nequal => "!=",
    2 AllEqual => "all_equal",
    2 AnyNequal => "any_nequal",
    2 Lshift => "<<",
    2 Rshift => ">>",
    2 BitAnd => "&",
    2 BitXor => "^",
    2 BitOr => "|",
    2 LogicAnd => "&&",
    2 LogicXor => "^^",
    2 LogicOr => "||",
    2 Dot => "dot",
    2 Min => "min",
    2 Max => "max",
    2 Pow => "pow",
    2 VectorExtract => "vector_extract",
    3 Fma => "fma",
    3 Lrp => "lrp",
    3 Csel => "csel",
    3 BitfieldExtract => "bitfield_extract",
    3 VectorInsert => "vector_insert",
    4 BitfieldInsert => "bitfield_insert",
    4 Vector => "vector",
}

impl ExprOp {
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Ordering comparisons and component-wise equality.
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Less | Self::Greater | Self::Lequal | Self::Gequal | Self::Equal | Self::Nequal
        )
    }

    /// `!(a op b)` rewritten as `a inverse b`.
    pub const fn inverse_comparison(self) -> Option<Self> {
        Some(match self {
            Self::Less => Self::Gequal,
            Self::Greater => Self::Lequal,
            Self::Lequal => Self::Greater,
            Self::Gequal => Self::Less,
            Self::Equal => Self::Nequal,
            Self::Nequal => Self::Equal,
            Self::AllEqual => Self::AnyNequal,
            Self::AnyNequal => Self::AllEqual,
            _ => return None,
        })
    }

    /// Binary operations for which reduction trees may be reshaped freely.
    pub const fn is_associative_commutative(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Mul
                | Self::BitAnd
                | Self::BitXor
                | Self::BitOr
                | Self::LogicAnd
                | Self::LogicXor
                | Self::LogicOr
                | Self::Min
                | Self::Max
        )
    }

    /// Operations whose result components do not correspond one-to-one with
    /// operand components.
    pub const fn is_horizontal(self) -> bool {
        matches!(
            self,
            Self::Dot
                | Self::AllEqual
                | Self::AnyNequal
                | Self::VectorExtract
                | Self::VectorInsert
                | Self::Vector
                | Self::PackSnorm2x16
                | Self::PackUnorm2x16
                | Self::PackSnorm4x8
                | Self::PackUnorm4x8
                | Self::PackHalf2x16
                | Self::UnpackSnorm2x16
                | Self::UnpackUnorm2x16
                | Self::UnpackSnorm4x8
                | Self::UnpackUnorm4x8
                | Self::UnpackHalf2x16
                | Self::PackDouble2x32
                | Self::UnpackDouble2x32
                | Self::PackInt2x32
                | Self::UnpackInt2x32
                | Self::PackUint2x32
                | Self::UnpackUint2x32
                | Self::Dfdx
                | Self::Dfdy
        )
    }

    /// Conversion target for the conversion opcodes.
    pub const fn conversion_target(self) -> Option<ScalarType> {
        Some(match self {
            Self::F2i | Self::D2i | Self::U2i | Self::BitcastF2i | Self::I642i => ScalarType::Int,
            Self::F2u | Self::D2u | Self::I2u | Self::BitcastF2u | Self::U642u => ScalarType::Uint,
            Self::I2f | Self::B2f | Self::U2f | Self::D2f | Self::BitcastI2f | Self::BitcastU2f => {
                ScalarType::Float
            }
            Self::F2b | Self::I2b | Self::D2b => ScalarType::Bool,
            Self::B2i => ScalarType::Int,
            Self::F2d | Self::I2d | Self::U2d => ScalarType::Double,
            Self::I2i64 | Self::U642i64 => ScalarType::Int64,
            Self::U2u64 | Self::I642u64 => ScalarType::Uint64,
            _ => return None,
        })
    }

    /// Result type computed from the operand types.
    pub fn result_type(self, operands: &[&GlslType]) -> GlslType {
        let first = operands[0];
        let widest = || {
            operands
                .iter()
                .copied()
                .max_by_key(|t| t.components())
                .cloned()
                .unwrap_or(GlslType::Void)
        };
        let vector_of = |base: ScalarType, n: u8| GlslType::vec(base, n);

        if let Some(target) = self.conversion_target() {
            return first.with_base(target);
        }
        match self {
            Self::Less
            | Self::Greater
            | Self::Lequal
            | Self::Gequal
            | Self::Equal
            | Self::Nequal => widest().with_base(ScalarType::Bool),
            Self::AllEqual | Self::AnyNequal => GlslType::BOOL,
            Self::Dot | Self::VectorExtract => first.scalar_type(),
            Self::BitCount | Self::FindMsb | Self::FindLsb => first.with_base(ScalarType::Int),
            Self::PackSnorm2x16
            | Self::PackUnorm2x16
            | Self::PackSnorm4x8
            | Self::PackUnorm4x8
            | Self::PackHalf2x16 => GlslType::UINT,
            Self::UnpackSnorm2x16 | Self::UnpackUnorm2x16 | Self::UnpackHalf2x16 => {
                vector_of(ScalarType::Float, 2)
            }
            Self::UnpackSnorm4x8 | Self::UnpackUnorm4x8 => vector_of(ScalarType::Float, 4),
            Self::PackDouble2x32 => GlslType::DOUBLE,
            Self::PackInt2x32 => GlslType::scalar(ScalarType::Int64),
            Self::PackUint2x32 => GlslType::scalar(ScalarType::Uint64),
            Self::UnpackDouble2x32 | Self::UnpackUint2x32 => vector_of(ScalarType::Uint, 2),
            Self::UnpackInt2x32 => vector_of(ScalarType::Int, 2),
            Self::Vector => first.with_vector_elements(operands.len() as u8),
            Self::Csel => operands[1].clone(),
            Self::Lshift
            | Self::Rshift
            | Self::Fma
            | Self::Lrp
            | Self::BitfieldExtract
            | Self::BitfieldInsert
            | Self::VectorInsert => first.clone(),
            Self::Mul => multiply_result_type(first, operands[1]),
            _ if operands.len() == 1 => first.clone(),
            _ => widest(),
        }
    }
}

/// Matrix/vector product shapes; otherwise the component-wise rule.
fn multiply_result_type(a: &GlslType, b: &GlslType) -> GlslType {
    match (a.is_matrix(), b.is_matrix()) {
        (true, true) => GlslType::Basic {
            base: a.base_type().unwrap_or(ScalarType::Float),
            vector_elements: a.vector_elements(),
            matrix_columns: b.matrix_columns(),
        },
        (true, false) if b.is_vector() => a.with_vector_elements(a.vector_elements()),
        (false, true) if a.is_vector() => b.with_vector_elements(b.matrix_columns()),
        _ if a.components() >= b.components() => a.clone(),
        _ => b.clone(),
    }
}
