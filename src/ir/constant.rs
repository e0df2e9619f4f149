use super::{
    types::{GlslType, ScalarType},
    SwizzleMask,
};

/// One component of a constant.
#[derive(Debug, Clone, Copy)]
pub enum ConstScalar {
    Bool(bool),
    Int(i32),
    Uint(u32),
    Float(f32),
    Double(f64),
    Int64(i64),
    Uint64(u64),
}
impl ConstScalar {
    pub const fn zero(base: ScalarType) -> Self {
        match base {
            ScalarType::Bool => Self::Bool(false),
            ScalarType::Int => Self::Int(0),
            ScalarType::Uint => Self::Uint(0),
            ScalarType::Float => Self::Float(0.0),
            ScalarType::Double => Self::Double(0.0),
            ScalarType::Int64 => Self::Int64(0),
            ScalarType::Uint64 => Self::Uint64(0),
        }
    }

    /// Builds a value of `base` from a float/int pair, the way literals
    /// like "one" or "negative one" are spelled for every base type.
    pub fn from_value(base: ScalarType, f: f64, i: i64) -> Self {
        match base {
            ScalarType::Bool => Self::Bool(i != 0),
            ScalarType::Int => Self::Int(i as i32),
            ScalarType::Uint => Self::Uint(i as u32),
            ScalarType::Float => Self::Float(f as f32),
            ScalarType::Double => Self::Double(f),
            ScalarType::Int64 => Self::Int64(i),
            ScalarType::Uint64 => Self::Uint64(i as u64),
        }
    }

    pub const fn base_type(self) -> ScalarType {
        match self {
            Self::Bool(_) => ScalarType::Bool,
            Self::Int(_) => ScalarType::Int,
            Self::Uint(_) => ScalarType::Uint,
            Self::Float(_) => ScalarType::Float,
            Self::Double(_) => ScalarType::Double,
            Self::Int64(_) => ScalarType::Int64,
            Self::Uint64(_) => ScalarType::Uint64,
        }
    }

    /// Raw bit pattern, zero extended.
    pub fn bits(self) -> u64 {
        match self {
            Self::Bool(b) => b as u64,
            Self::Int(v) => v as u32 as u64,
            Self::Uint(v) => v as u64,
            Self::Float(v) => v.to_bits() as u64,
            Self::Double(v) => v.to_bits(),
            Self::Int64(v) => v as u64,
            Self::Uint64(v) => v,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Bool(b) => b as u8 as f64,
            Self::Int(v) => v as f64,
            Self::Uint(v) => v as f64,
            Self::Float(v) => v as f64,
            Self::Double(v) => v,
            Self::Int64(v) => v as f64,
            Self::Uint64(v) => v as f64,
        }
    }

    pub fn as_f32(self) -> f32 {
        match self {
            Self::Float(v) => v,
            other => other.as_f64() as f32,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Self::Bool(b) => b as i64,
            Self::Int(v) => v as i64,
            Self::Uint(v) => v as i64,
            Self::Float(v) => v as i64,
            Self::Double(v) => v as i64,
            Self::Int64(v) => v,
            Self::Uint64(v) => v as i64,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Float(v) => v != 0.0,
            Self::Double(v) => v != 0.0,
            other => other.bits() != 0,
        }
    }

    /// Whether the component equals the float `f` (float kinds) or the
    /// integer `i` (integer and boolean kinds).
    pub fn is_value(self, f: f64, i: i64) -> bool {
        match self {
            Self::Bool(b) => b == (i != 0),
            Self::Int(v) => v as i64 == i,
            Self::Uint(v) => v as i64 == i,
            Self::Float(v) => v as f64 == f,
            Self::Double(v) => v == f,
            Self::Int64(v) => v == i,
            Self::Uint64(v) => v as i64 == i,
        }
    }

    /// Bit-exact equality, which is what folding must preserve (so `-0.0`
    /// and `0.0` differ while a NaN equals the same NaN).
    pub fn bit_eq(self, other: Self) -> bool {
        self.base_type() == other.base_type() && self.bits() == other.bits()
    }
}

#[derive(Debug, Clone)]
pub enum ConstData {
    /// Basic types: one entry per component, column-major for matrices.
    Components(Vec<ConstScalar>),
    /// Arrays and records: one child per element or field.
    Elements(Vec<Constant>),
}

#[derive(Debug, Clone)]
pub struct Constant {
    pub ty: GlslType,
    pub data: ConstData,
}
impl Constant {
    pub fn new(ty: GlslType, components: Vec<ConstScalar>) -> Self {
        debug_assert_eq!(ty.components(), components.len());
        Self {
            ty,
            data: ConstData::Components(components),
        }
    }

    pub fn aggregate(ty: GlslType, elements: Vec<Constant>) -> Self {
        Self {
            ty,
            data: ConstData::Elements(elements),
        }
    }

    pub fn float(v: f32) -> Self {
        Self::new(GlslType::FLOAT, vec![ConstScalar::Float(v)])
    }

    pub fn double(v: f64) -> Self {
        Self::new(GlslType::DOUBLE, vec![ConstScalar::Double(v)])
    }

    pub fn int(v: i32) -> Self {
        Self::new(GlslType::INT, vec![ConstScalar::Int(v)])
    }

    pub fn uint(v: u32) -> Self {
        Self::new(GlslType::UINT, vec![ConstScalar::Uint(v)])
    }

    pub fn bool(v: bool) -> Self {
        Self::new(GlslType::BOOL, vec![ConstScalar::Bool(v)])
    }

    pub fn scalar(v: ConstScalar) -> Self {
        Self::new(GlslType::scalar(v.base_type()), vec![v])
    }

    /// Every component of `ty` set to `v`.
    pub fn splat(ty: &GlslType, v: ConstScalar) -> Self {
        Self::new(ty.clone(), vec![v; ty.components()])
    }

    /// A constant of `ty` with every component equal to `f` / `i`
    /// interpreted for the base type.
    pub fn from_value(ty: &GlslType, f: f64, i: i64) -> Option<Self> {
        let base = ty.base_type()?;
        Some(Self::splat(ty, ConstScalar::from_value(base, f, i)))
    }

    pub fn zero(ty: &GlslType) -> Self {
        match ty {
            GlslType::Basic { base, .. } => Self::splat(ty, ConstScalar::zero(*base)),
            GlslType::Array { element, length } => Self::aggregate(
                ty.clone(),
                (0..*length).map(|_| Self::zero(element)).collect(),
            ),
            GlslType::Record(r) => Self::aggregate(
                ty.clone(),
                r.fields.iter().map(|f| Self::zero(&f.ty)).collect(),
            ),
            GlslType::Void | GlslType::Sampler(_) => Self::aggregate(ty.clone(), Vec::new()),
        }
    }

    pub fn components(&self) -> &[ConstScalar] {
        match &self.data {
            ConstData::Components(c) => c,
            ConstData::Elements(_) => &[],
        }
    }

    pub fn elements(&self) -> &[Constant] {
        match &self.data {
            ConstData::Components(_) => &[],
            ConstData::Elements(e) => e,
        }
    }

    /// Component `i`, broadcasting scalars.
    #[inline]
    pub fn component(&self, i: usize) -> ConstScalar {
        let c = self.components();
        if c.len() == 1 {
            c[0]
        } else {
            c[i]
        }
    }

    pub fn is_value(&self, f: f64, i: i64) -> bool {
        !self.components().is_empty() && self.components().iter().all(|c| c.is_value(f, i))
    }

    pub fn is_zero(&self) -> bool {
        self.is_value(0.0, 0)
    }

    pub fn is_one(&self) -> bool {
        self.is_value(1.0, 1)
    }

    pub fn is_negative_one(&self) -> bool {
        !self.ty.is_boolean() && self.is_value(-1.0, -1)
    }

    /// Whether all components share one value.
    pub fn is_uniform(&self) -> bool {
        let c = self.components();
        !c.is_empty() && c.iter().all(|x| x.bit_eq(c[0]))
    }

    pub fn has_value(&self, other: &Constant) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.data, &other.data) {
            (ConstData::Components(a), ConstData::Components(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| x.bit_eq(y))
            }
            (ConstData::Elements(a), ConstData::Elements(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.has_value(y))
            }
            _ => false,
        }
    }

    pub fn swizzle(&self, mask: &SwizzleMask) -> Self {
        Self::new(
            self.ty.with_vector_elements(mask.len() as u8),
            mask.iter().map(|c| self.component(c as usize)).collect(),
        )
    }

    /// Column `i` of a matrix, element `i` of a vector or array.
    pub fn element(&self, i: usize) -> Option<Self> {
        match &self.data {
            ConstData::Elements(e) => e.get(i).cloned(),
            ConstData::Components(c) => {
                if let Some(column) = self.ty.column_type() {
                    let rows = column.vector_elements() as usize;
                    let values = c.get(i * rows..(i + 1) * rows)?.to_vec();
                    Some(Self::new(column, values))
                } else {
                    c.get(i).map(|&v| Self::scalar(v))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_predicates_follow_base_type() {
        let v = Constant::splat(&GlslType::vec(ScalarType::Float, 3), ConstScalar::Float(1.0));
        assert!(v.is_one());
        assert!(!v.is_zero());
        assert!(Constant::int(-1).is_negative_one());
        assert!(!Constant::bool(true).is_negative_one());
        assert!(Constant::bool(false).is_zero());
        assert!(Constant::uint(0).is_zero());
    }

    #[test]
    fn negative_zero_is_distinct_bitwise() {
        let a = Constant::float(0.0);
        let b = Constant::float(-0.0);
        assert!(!a.has_value(&b));
        assert!(b.is_zero());
    }

    #[test]
    fn matrix_columns_are_extracted() {
        let m = Constant::new(
            GlslType::mat(2, 2),
            [1.0, 2.0, 3.0, 4.0].map(ConstScalar::Float).to_vec(),
        );
        let col = m.element(1).unwrap();
        assert_eq!(col.ty, GlslType::vec(ScalarType::Float, 2));
        assert!(col.component(0).bit_eq(ConstScalar::Float(3.0)));
    }
}
