use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int,
    Uint,
    Float,
    Double,
    Int64,
    Uint64,
}
impl ScalarType {
    #[inline(always)]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Uint | Self::Int64 | Self::Uint64)
    }

    #[inline(always)]
    pub const fn is_integer_32(self) -> bool {
        matches!(self, Self::Int | Self::Uint)
    }

    #[inline(always)]
    pub const fn is_integer_64(self) -> bool {
        matches!(self, Self::Int64 | Self::Uint64)
    }

    #[inline(always)]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    #[inline(always)]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int | Self::Int64 | Self::Float | Self::Double)
    }

    #[inline(always)]
    pub const fn is_64bit(self) -> bool {
        matches!(self, Self::Double | Self::Int64 | Self::Uint64)
    }

    pub const fn bit_size(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::Int | Self::Uint | Self::Float => 32,
            Self::Double | Self::Int64 | Self::Uint64 => 64,
        }
    }

    const fn vector_prefix(self) -> &'static str {
        match self {
            Self::Bool => "b",
            Self::Int => "i",
            Self::Uint => "u",
            Self::Float => "",
            Self::Double => "d",
            Self::Int64 => "i64",
            Self::Uint64 => "u64",
        }
    }

    const fn scalar_name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Int64 => "int64_t",
            Self::Uint64 => "uint64_t",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerDim {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordField {
    pub name: String,
    pub ty: GlslType,
}

/// A struct or an interface block layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<RecordField>,
    pub is_interface: bool,
}
impl RecordType {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GlslType {
    Void,
    Basic {
        base: ScalarType,
        vector_elements: u8,
        matrix_columns: u8,
    },
    Array {
        element: Box<GlslType>,
        length: usize,
    },
    Record(Rc<RecordType>),
    Sampler(SamplerDim),
}
impl GlslType {
    #[inline(always)]
    pub const fn scalar(base: ScalarType) -> Self {
        Self::Basic {
            base,
            vector_elements: 1,
            matrix_columns: 1,
        }
    }

    #[inline(always)]
    pub const fn vec(base: ScalarType, count: u8) -> Self {
        Self::Basic {
            base,
            vector_elements: count,
            matrix_columns: 1,
        }
    }

    #[inline(always)]
    pub const fn mat(columns: u8, rows: u8) -> Self {
        Self::Basic {
            base: ScalarType::Float,
            vector_elements: rows,
            matrix_columns: columns,
        }
    }

    pub const FLOAT: Self = Self::scalar(ScalarType::Float);
    pub const INT: Self = Self::scalar(ScalarType::Int);
    pub const UINT: Self = Self::scalar(ScalarType::Uint);
    pub const BOOL: Self = Self::scalar(ScalarType::Bool);
    pub const DOUBLE: Self = Self::scalar(ScalarType::Double);

    pub fn array(element: GlslType, length: usize) -> Self {
        Self::Array {
            element: Box::new(element),
            length,
        }
    }

    pub const fn base_type(&self) -> Option<ScalarType> {
        match self {
            Self::Basic { base, .. } => Some(*base),
            _ => None,
        }
    }

    pub const fn vector_elements(&self) -> u8 {
        match self {
            Self::Basic {
                vector_elements, ..
            } => *vector_elements,
            _ => 0,
        }
    }

    pub const fn matrix_columns(&self) -> u8 {
        match self {
            Self::Basic { matrix_columns, .. } => *matrix_columns,
            _ => 0,
        }
    }

    /// Number of scalar components of a basic type (0 for anything else).
    pub const fn components(&self) -> usize {
        self.vector_elements() as usize * self.matrix_columns() as usize
    }

    #[inline]
    pub const fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Basic {
                vector_elements: 1,
                matrix_columns: 1,
                ..
            }
        )
    }

    #[inline]
    pub const fn is_vector(&self) -> bool {
        match self {
            Self::Basic {
                vector_elements,
                matrix_columns: 1,
                ..
            } => *vector_elements > 1,
            _ => false,
        }
    }

    #[inline]
    pub const fn is_matrix(&self) -> bool {
        match self {
            Self::Basic { matrix_columns, .. } => *matrix_columns > 1,
            _ => false,
        }
    }

    #[inline]
    pub const fn is_scalar_or_vector(&self) -> bool {
        matches!(
            self,
            Self::Basic {
                matrix_columns: 1,
                ..
            }
        )
    }

    pub const fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub const fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    pub fn is_interface(&self) -> bool {
        matches!(self, Self::Record(r) if r.is_interface)
    }

    pub fn is_boolean(&self) -> bool {
        self.base_type() == Some(ScalarType::Bool)
    }

    pub fn is_float(&self) -> bool {
        self.base_type().is_some_and(ScalarType::is_float)
    }

    pub fn is_integer(&self) -> bool {
        self.base_type().is_some_and(ScalarType::is_integer)
    }

    pub fn is_integer_64(&self) -> bool {
        self.base_type().is_some_and(ScalarType::is_integer_64)
    }

    pub fn is_double(&self) -> bool {
        self.base_type() == Some(ScalarType::Double)
    }

    /// Same base type, with the vector width replaced.
    pub fn with_vector_elements(&self, count: u8) -> Self {
        match self {
            Self::Basic { base, .. } => Self::vec(*base, count),
            other => other.clone(),
        }
    }

    /// Same shape, with the base type replaced.
    pub fn with_base(&self, base: ScalarType) -> Self {
        match self {
            Self::Basic {
                vector_elements,
                matrix_columns,
                ..
            } => Self::Basic {
                base,
                vector_elements: *vector_elements,
                matrix_columns: *matrix_columns,
            },
            other => other.clone(),
        }
    }

    pub fn scalar_type(&self) -> Self {
        match self.base_type() {
            Some(b) => Self::scalar(b),
            None => self.clone(),
        }
    }

    pub fn column_type(&self) -> Option<Self> {
        match self {
            Self::Basic {
                base,
                vector_elements,
                matrix_columns,
            } if *matrix_columns > 1 => Some(Self::vec(*base, *vector_elements)),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Self> {
        match self {
            Self::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    pub const fn array_length(&self) -> Option<usize> {
        match self {
            Self::Array { length, .. } => Some(*length),
            _ => None,
        }
    }

    pub fn field(&self, index: usize) -> Option<&RecordField> {
        match self {
            Self::Record(r) => r.fields.get(index),
            _ => None,
        }
    }

    /// Number of vec4 slots the type occupies as a varying.
    pub fn count_attribute_slots(&self) -> usize {
        match self {
            Self::Void | Self::Sampler(_) => 0,
            Self::Basic {
                base,
                vector_elements,
                matrix_columns,
            } => {
                let per_column = if base.is_64bit() && *vector_elements > 2 {
                    2
                } else {
                    1
                };
                per_column * *matrix_columns as usize
            }
            Self::Array { element, length } => element.count_attribute_slots() * length,
            Self::Record(r) => r.fields.iter().map(|f| f.ty.count_attribute_slots()).sum(),
        }
    }

    /// Name in the textual IR.
    pub fn name(&self) -> String {
        match self {
            Self::Void => String::from("void"),
            Self::Basic {
                base,
                vector_elements: 1,
                matrix_columns: 1,
            } => String::from(base.scalar_name()),
            Self::Basic {
                base,
                vector_elements,
                matrix_columns: 1,
            } => format!("{}vec{vector_elements}", base.vector_prefix()),
            Self::Basic {
                base,
                vector_elements,
                matrix_columns,
            } => {
                if vector_elements == matrix_columns {
                    format!("{}mat{matrix_columns}", base.vector_prefix())
                } else {
                    format!("{}mat{matrix_columns}x{vector_elements}", base.vector_prefix())
                }
            }
            Self::Array { element, length } => format!("(array {} {length})", element.name()),
            Self::Record(r) => r.name.clone(),
            Self::Sampler(SamplerDim::Dim1D) => String::from("sampler1D"),
            Self::Sampler(SamplerDim::Dim2D) => String::from("sampler2D"),
            Self::Sampler(SamplerDim::Dim3D) => String::from("sampler3D"),
            Self::Sampler(SamplerDim::Cube) => String::from("samplerCube"),
        }
    }

    /// Parses a non-aggregate type name from the textual IR.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "void" => return Some(Self::Void),
            "bool" => return Some(Self::BOOL),
            "int" => return Some(Self::INT),
            "uint" => return Some(Self::UINT),
            "float" => return Some(Self::FLOAT),
            "double" => return Some(Self::DOUBLE),
            "int64_t" => return Some(Self::scalar(ScalarType::Int64)),
            "uint64_t" => return Some(Self::scalar(ScalarType::Uint64)),
            "sampler1D" => return Some(Self::Sampler(SamplerDim::Dim1D)),
            "sampler2D" => return Some(Self::Sampler(SamplerDim::Dim2D)),
            "sampler3D" => return Some(Self::Sampler(SamplerDim::Dim3D)),
            "samplerCube" => return Some(Self::Sampler(SamplerDim::Cube)),
            _ => (),
        }

        let (base, rest) = [
            ("i64", ScalarType::Int64),
            ("u64", ScalarType::Uint64),
            ("b", ScalarType::Bool),
            ("i", ScalarType::Int),
            ("u", ScalarType::Uint),
            ("d", ScalarType::Double),
        ]
        .into_iter()
        .find_map(|(p, b)| {
            name.strip_prefix(p)
                .filter(|r| r.starts_with("vec") || r.starts_with("mat"))
                .map(|r| (b, r))
        })
        .unwrap_or((ScalarType::Float, name));

        let digit = |s: &str| match s {
            "2" => Some(2u8),
            "3" => Some(3),
            "4" => Some(4),
            _ => None,
        };
        if let Some(n) = rest.strip_prefix("vec") {
            return digit(n).map(|n| Self::vec(base, n));
        }
        let dims = rest.strip_prefix("mat")?;
        if !matches!(base, ScalarType::Float | ScalarType::Double) {
            return None;
        }
        let (columns, rows) = match dims.split_once('x') {
            Some((c, r)) => (digit(c)?, digit(r)?),
            None => (digit(dims)?, digit(dims)?),
        };
        Some(Self::Basic {
            base,
            vector_elements: rows,
            matrix_columns: columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_roundtrip_for_builtin_types() {
        for name in [
            "float", "vec3", "ivec2", "uvec4", "bvec2", "dvec3", "i64vec2", "u64vec4", "mat4",
            "mat2x3", "dmat3", "int64_t", "sampler2D",
        ] {
            let ty = GlslType::from_name(name).unwrap();
            assert_eq!(ty.name(), name);
        }
        assert_eq!(GlslType::from_name("imat2"), None);
        assert_eq!(GlslType::from_name("vec5"), None);
    }

    #[test]
    fn matrix_shape() {
        let m = GlslType::from_name("mat2x3").unwrap();
        assert_eq!(m.matrix_columns(), 2);
        assert_eq!(m.vector_elements(), 3);
        assert_eq!(m.components(), 6);
        assert_eq!(m.column_type(), Some(GlslType::vec(ScalarType::Float, 3)));
        assert!(m.is_matrix());
        assert!(!m.is_vector());
    }

    #[test]
    fn double_vectors_take_two_slots() {
        assert_eq!(GlslType::vec(ScalarType::Double, 4).count_attribute_slots(), 2);
        assert_eq!(GlslType::vec(ScalarType::Double, 2).count_attribute_slots(), 1);
        assert_eq!(GlslType::vec(ScalarType::Float, 4).count_attribute_slots(), 1);
        assert_eq!(
            GlslType::array(GlslType::vec(ScalarType::Double, 3), 2).count_attribute_slots(),
            4
        );
    }
}
