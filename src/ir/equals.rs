//! Structural equality of rvalue trees.

use super::{Deref, Rvalue};

impl Rvalue<'_> {
    /// Compares trees node by node. With `ignore_swizzles`, swizzle masks
    /// are not compared (the swizzled values still are).
    pub fn equals(&self, other: &Rvalue<'_>, ignore_swizzles: bool) -> bool {
        match (self, other) {
            (Rvalue::Constant(a), Rvalue::Constant(b)) => a.has_value(b),
            (Rvalue::Deref(a), Rvalue::Deref(b)) => a.equals(b, ignore_swizzles),
            (Rvalue::Swizzle(a), Rvalue::Swizzle(b)) => {
                (ignore_swizzles || a.mask == b.mask) && a.val.equals(&b.val, ignore_swizzles)
            }
            (Rvalue::Expression(a), Rvalue::Expression(b)) => {
                a.op == b.op
                    && (ignore_swizzles || a.ty == b.ty)
                    && a.operands.len() == b.operands.len()
                    && a.operands
                        .iter()
                        .zip(&b.operands)
                        .all(|(x, y)| x.equals(y, ignore_swizzles))
            }
            (Rvalue::Texture(a), Rvalue::Texture(b)) => {
                a.op == b.op
                    && a.ty == b.ty
                    && a.sampler.equals(&b.sampler, ignore_swizzles)
                    && match (&a.coordinate, &b.coordinate) {
                        (Some(x), Some(y)) => x.equals(y, ignore_swizzles),
                        (None, None) => true,
                        _ => false,
                    }
                    && match (&a.lod, &b.lod) {
                        (Some(x), Some(y)) => x.equals(y, ignore_swizzles),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

impl Deref<'_> {
    pub fn equals(&self, other: &Deref<'_>, ignore_swizzles: bool) -> bool {
        match (self, other) {
            (Deref::Var(a), Deref::Var(b)) => core::ptr::eq(a.get(), b.get()),
            (Deref::Array(a), Deref::Array(b)) => {
                a.array.equals(&b.array, ignore_swizzles) && a.index.equals(&b.index, ignore_swizzles)
            }
            (Deref::Record(a), Deref::Record(b)) => {
                a.field == b.field && a.record.equals(&b.record, ignore_swizzles)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{builder::*, Constant, GlslType, IrArenas, IrContext, ScalarType, SwizzleMask, VariableMode};

    #[test]
    fn swizzle_masks_can_be_ignored() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let v = ctx.new_variable("v", GlslType::vec(ScalarType::Float, 4), VariableMode::Auto);
        let a = unop(crate::ir::ExprOp::Log2, channel(var(v), 0));
        let b = unop(crate::ir::ExprOp::Log2, channel(var(v), 1));
        assert!(!a.equals(&b, false));
        assert!(a.equals(&b, true));
        let c = swizzle(var(v), SwizzleMask::new(&[1, 2]));
        assert!(!a.equals(&c, true));
    }

    #[test]
    fn constants_compare_by_value() {
        assert!(constant(Constant::float(1.0)).equals(&constant(Constant::float(1.0)), false));
        assert!(!constant(Constant::float(1.0)).equals(&constant(Constant::int(1)), false));
    }
}
