//! Lowering passes: rewrite constructs the back end cannot express into
//! simpler IR. Each runs once, ahead of the optimization loop.

use super::{builder, Constant, GlslType, Instruction, IrContext, Rvalue, VarRef};

pub mod int64;
pub mod named_interface_blocks;
pub mod packed_varyings;
pub mod packing_builtins;
pub mod variable_index_to_cond_assign;
pub mod vec_index_to_cond_assign;

bitflags::bitflags! {
    /// Packing built-ins to expand into shifts, masks and conversions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PackingLowering: u16 {
        const PACK_SNORM_2X16 = 1 << 0;
        const UNPACK_SNORM_2X16 = 1 << 1;
        const PACK_UNORM_2X16 = 1 << 2;
        const UNPACK_UNORM_2X16 = 1 << 3;
        const PACK_SNORM_4X8 = 1 << 4;
        const UNPACK_SNORM_4X8 = 1 << 5;
        const PACK_UNORM_4X8 = 1 << 6;
        const UNPACK_UNORM_4X8 = 1 << 7;
        const PACK_HALF_2X16 = 1 << 8;
        const UNPACK_HALF_2X16 = 1 << 9;
    }
}

bitflags::bitflags! {
    /// 64-bit integer operations to replace with built-in function calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Int64Lowering: u8 {
        const MUL = 1 << 0;
        const DIV = 1 << 1;
        const MOD = 1 << 2;
        const SIGN = 1 << 3;
    }
}

/// Stores `value` in a fresh temporary, queueing its declaration and
/// assignment on `pending`.
pub(crate) fn store_temporary<'a>(
    ctx: &IrContext<'a>,
    pending: &mut Vec<Instruction<'a>>,
    prefix: &str,
    value: Rvalue<'a>,
) -> VarRef<'a> {
    let t = ctx.new_temporary(prefix, value.ty().clone());
    pending.push(Instruction::Variable(t));
    pending.push(builder::assign_var(t, value));
    t
}

/// Declares a fresh temporary without initializing it.
pub(crate) fn declare_temporary<'a>(
    ctx: &IrContext<'a>,
    pending: &mut Vec<Instruction<'a>>,
    prefix: &str,
    ty: GlslType,
) -> VarRef<'a> {
    let t = ctx.new_temporary(prefix, ty);
    pending.push(Instruction::Variable(t));
    t
}

/// An integer constant of the same scalar type as `ty`.
pub(crate) fn index_constant<'a>(ty: &GlslType, value: usize) -> Rvalue<'a> {
    let c = Constant::from_value(&ty.scalar_type(), value as f64, value as i64)
        .unwrap_or_else(|| Constant::int(value as i32));
    builder::constant(c)
}

/// The value of a constant array or vector index.
pub(crate) fn constant_index(index: &Rvalue<'_>) -> Option<usize> {
    let c = index.as_constant()?;
    usize::try_from(c.components().first()?.as_i64()).ok()
}
