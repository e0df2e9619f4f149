//! Shorthands for building typed IR nodes.

use super::{
    ArrayDeref, Assignment, Constant, Deref, ExprOp, Expression, GlslType, Instruction,
    RecordDeref, Rvalue, Swizzle, SwizzleMask, VarRef, WriteMask,
};

pub fn expr<'a>(op: ExprOp, operands: Vec<Rvalue<'a>>) -> Rvalue<'a> {
    let ty = {
        let types = operands.iter().map(Rvalue::ty).collect::<Vec<_>>();
        op.result_type(&types)
    };
    Rvalue::Expression(Expression { op, ty, operands })
}

#[inline]
pub fn unop<'a>(op: ExprOp, a: Rvalue<'a>) -> Rvalue<'a> {
    expr(op, vec![a])
}

#[inline]
pub fn binop<'a>(op: ExprOp, a: Rvalue<'a>, b: Rvalue<'a>) -> Rvalue<'a> {
    expr(op, vec![a, b])
}

#[inline]
pub fn triop<'a>(op: ExprOp, a: Rvalue<'a>, b: Rvalue<'a>, c: Rvalue<'a>) -> Rvalue<'a> {
    expr(op, vec![a, b, c])
}

macro_rules! binop_shorthands {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name<'a>(a: Rvalue<'a>, b: Rvalue<'a>) -> Rvalue<'a> {
                binop(ExprOp::$op, a, b)
            }
        )*
    };
}
macro_rules! unop_shorthands {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(a: Rvalue<'_>) -> Rvalue<'_> {
                unop(ExprOp::$op, a)
            }
        )*
    };
}

binop_shorthands! {
    add => Add,
    sub => Sub,
    mul => Mul,
    div => Div,
    modulo => Mod,
    min => Min,
    max => Max,
    dot => Dot,
    less => Less,
    gequal => Gequal,
    equal => Equal,
    nequal => Nequal,
    bit_and => BitAnd,
    bit_or => BitOr,
    lshift => Lshift,
    rshift => Rshift,
    logic_and => LogicAnd,
    logic_or => LogicOr,
}

unop_shorthands! {
    neg => Neg,
    abs => Abs,
    sign => Sign,
    rcp => Rcp,
    exp2 => Exp2,
    floor => Floor,
    trunc => Trunc,
    round_even => RoundEven,
    saturate => Saturate,
    logic_not => LogicNot,
    bit_not => BitNot,
    f2i => F2i,
    f2u => F2u,
    i2f => I2f,
    u2f => U2f,
    i2u => I2u,
    u2i => U2i,
}

pub fn csel<'a>(cond: Rvalue<'a>, a: Rvalue<'a>, b: Rvalue<'a>) -> Rvalue<'a> {
    triop(ExprOp::Csel, cond, a, b)
}

pub fn fma<'a>(a: Rvalue<'a>, b: Rvalue<'a>, c: Rvalue<'a>) -> Rvalue<'a> {
    triop(ExprOp::Fma, a, b, c)
}

pub fn lrp<'a>(x: Rvalue<'a>, y: Rvalue<'a>, a: Rvalue<'a>) -> Rvalue<'a> {
    triop(ExprOp::Lrp, x, y, a)
}

#[inline]
pub fn var(v: VarRef<'_>) -> Rvalue<'_> {
    Rvalue::var(v)
}

#[inline]
pub fn constant<'a>(c: Constant) -> Rvalue<'a> {
    Rvalue::Constant(c)
}

pub fn swizzle<'a>(val: Rvalue<'a>, mask: SwizzleMask) -> Rvalue<'a> {
    let ty = val.ty().with_vector_elements(mask.len() as u8);
    Rvalue::Swizzle(Swizzle {
        val: Box::new(val),
        mask,
        ty,
    })
}

/// `val.xxxx` up to `n` components.
pub fn splat(val: Rvalue<'_>, n: usize) -> Rvalue<'_> {
    swizzle(val, SwizzleMask::splat(0, n))
}

/// Broadcasts a scalar to match `ty`, leaving everything else untouched.
pub fn swizzle_if_required<'a>(ty: &GlslType, val: Rvalue<'a>) -> Rvalue<'a> {
    if ty.is_vector() && val.ty().is_scalar() {
        splat(val, ty.vector_elements() as usize)
    } else {
        val
    }
}

/// A single component of `val`.
pub fn channel(val: Rvalue<'_>, c: u8) -> Rvalue<'_> {
    swizzle(val, SwizzleMask::new(&[c]))
}

pub fn array_ref<'a>(array: Rvalue<'a>, index: Rvalue<'a>) -> Deref<'a> {
    let ty = match array.ty() {
        GlslType::Array { element, .. } => (**element).clone(),
        t if t.is_matrix() => t.column_type().unwrap_or(GlslType::Void),
        t => t.scalar_type(),
    };
    Deref::Array(ArrayDeref {
        array: Box::new(array),
        index: Box::new(index),
        ty,
    })
}

pub fn record_ref(record: Rvalue<'_>, field: usize) -> Deref<'_> {
    let ty = record
        .ty()
        .field(field)
        .map(|f| f.ty.clone())
        .unwrap_or(GlslType::Void);
    Deref::Record(RecordDeref {
        record: Box::new(record),
        field,
        ty,
    })
}

/// Full-width mask for writing a value of `ty`.
pub fn full_write_mask(ty: &GlslType) -> WriteMask {
    if ty.is_scalar_or_vector() {
        WriteMask::from_count(ty.vector_elements() as usize)
    } else {
        WriteMask::empty()
    }
}

pub fn assign<'a>(lhs: Deref<'a>, rhs: Rvalue<'a>, write_mask: WriteMask) -> Instruction<'a> {
    Instruction::Assignment(Assignment {
        lhs,
        rhs,
        condition: None,
        write_mask,
    })
}

/// `v = rhs` writing every component (or the whole aggregate).
pub fn assign_var<'a>(v: VarRef<'a>, rhs: Rvalue<'a>) -> Instruction<'a> {
    let mask = full_write_mask(&v.ty);
    assign(Deref::Var(v), rhs, mask)
}

pub fn cond_assign<'a>(
    lhs: Deref<'a>,
    rhs: Rvalue<'a>,
    write_mask: WriteMask,
    condition: Rvalue<'a>,
) -> Instruction<'a> {
    Instruction::Assignment(Assignment {
        lhs,
        rhs,
        condition: Some(condition),
        write_mask,
    })
}
