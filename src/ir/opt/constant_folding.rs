//! Compile-time evaluation of expression trees.
//!
//! Integer arithmetic wraps, and division or modulo by zero yields zero.
//! Float arithmetic is IEEE-754 in the operand's precision; float to
//! integer conversion truncates and saturates (NaN becomes zero). Shift
//! counts are masked to the operand width.

use std::borrow::Cow;

use crate::ir::{
    visitor::{visit_list, visit_rvalue, Visit, Visitor},
    Call, ConstScalar, Constant, Deref, ExprOp, GlslType, Instruction, Rvalue, ScalarType,
    VariableMode,
};

/// Replaces `slot` with its value when every operand is a constant node.
pub fn try_fold(slot: &mut Rvalue<'_>) -> bool {
    fold_slot(slot, false)
}

/// Like [`try_fold`], additionally treating dereferences of variables with a
/// known `constant_value` as constant operands. A bare variable dereference
/// is still left in place.
pub fn try_fold_with_variables(slot: &mut Rvalue<'_>) -> bool {
    fold_slot(slot, true)
}

fn fold_slot(slot: &mut Rvalue<'_>, use_variables: bool) -> bool {
    if matches!(slot, Rvalue::Constant(_) | Rvalue::Deref(Deref::Var(_))) {
        return false;
    }
    match constant_value(slot, use_variables) {
        Some(c) => {
            *slot = Rvalue::Constant(c);
            true
        }
        None => false,
    }
}

/// Value of an operand, if it is known at compile time.
fn operand_value<'r>(rv: &'r Rvalue<'_>, use_variables: bool) -> Option<Cow<'r, Constant>> {
    match rv {
        Rvalue::Constant(c) => Some(Cow::Borrowed(c)),
        Rvalue::Deref(Deref::Var(v)) if use_variables => {
            v.constant_value.borrow().clone().map(Cow::Owned)
        }
        Rvalue::Deref(_) if use_variables => constant_value(rv, true).map(Cow::Owned),
        _ => None,
    }
}

/// Evaluates the node itself from constant operands.
pub fn constant_value(rv: &Rvalue<'_>, use_variables: bool) -> Option<Constant> {
    match rv {
        Rvalue::Constant(c) => Some(c.clone()),
        Rvalue::Deref(Deref::Var(_)) => operand_value(rv, use_variables).map(Cow::into_owned),
        Rvalue::Deref(Deref::Array(a)) => {
            let array = operand_value(&a.array, use_variables)?;
            let index = operand_value(&a.index, use_variables)?;
            let i = index.components().first()?.as_i64();
            if i < 0 {
                return None;
            }
            array.element(i as usize)
        }
        Rvalue::Deref(Deref::Record(r)) => {
            operand_value(&r.record, use_variables)?.element(r.field)
        }
        Rvalue::Swizzle(s) => {
            let val = operand_value(&s.val, use_variables)?;
            Some(val.swizzle(&s.mask))
        }
        Rvalue::Expression(e) => {
            // cheap rejection before evaluating
            let operands = e
                .operands
                .iter()
                .map(|o| operand_value(o, use_variables))
                .collect::<Option<Vec<_>>>()?;
            let operands = operands.iter().map(|c| c.as_ref()).collect::<Vec<_>>();
            evaluate(e.op, &e.ty, &operands)
        }
        Rvalue::Texture(_) => None,
    }
}

/// Evaluates `op` producing a value of `ty`.
pub fn evaluate(op: ExprOp, ty: &GlslType, operands: &[&Constant]) -> Option<Constant> {
    if operands.iter().any(|o| o.components().is_empty()) {
        return None;
    }
    let n = ty.components();
    let a = operands[0];

    Some(match op {
        ExprOp::Dot => {
            let mut sum = ConstScalar::zero(a.ty.base_type()?);
            for i in 0..a.ty.components() {
                let p = arith(ExprOp::Mul, a.component(i), operands[1].component(i))?;
                sum = arith(ExprOp::Add, sum, p)?;
            }
            Constant::scalar(sum)
        }
        ExprOp::AllEqual | ExprOp::AnyNequal => {
            let b = operands[1];
            let width = a.ty.components().max(b.ty.components());
            let all = (0..width).all(|i| scalar_equal(a.component(i), b.component(i)));
            Constant::bool(if op == ExprOp::AllEqual { all } else { !all })
        }
        ExprOp::Mul if a.ty.is_matrix() || operands[1].ty.is_matrix() => {
            matrix_multiply(ty, a, operands[1])?
        }
        ExprOp::VectorExtract => {
            let i = operands[1].component(0).as_i64();
            if i < 0 || i as usize >= a.components().len() {
                return None;
            }
            Constant::scalar(a.components()[i as usize])
        }
        ExprOp::VectorInsert => {
            let i = operands[2].component(0).as_i64();
            if i < 0 || i as usize >= a.components().len() {
                return None;
            }
            let mut c = a.components().to_vec();
            c[i as usize] = operands[1].component(0);
            Constant::new(ty.clone(), c)
        }
        ExprOp::Vector => Constant::new(
            ty.clone(),
            operands.iter().map(|o| o.component(0)).collect(),
        ),
        ExprOp::PackSnorm2x16
        | ExprOp::PackUnorm2x16
        | ExprOp::PackSnorm4x8
        | ExprOp::PackUnorm4x8
        | ExprOp::PackHalf2x16 => {
            let values = a.components().iter().map(|c| c.as_f32()).collect::<Vec<_>>();
            Constant::uint(pack(op, &values))
        }
        ExprOp::UnpackSnorm2x16
        | ExprOp::UnpackUnorm2x16
        | ExprOp::UnpackSnorm4x8
        | ExprOp::UnpackUnorm4x8
        | ExprOp::UnpackHalf2x16 => {
            let ConstScalar::Uint(packed) = a.component(0) else {
                return None;
            };
            let values = unpack(op, packed);
            Constant::new(ty.clone(), values.into_iter().map(ConstScalar::Float).collect())
        }
        ExprOp::PackDouble2x32 | ExprOp::PackInt2x32 | ExprOp::PackUint2x32 => {
            let lo = a.component(0).bits() & 0xffff_ffff;
            let hi = a.component(1).bits() & 0xffff_ffff;
            let bits = lo | (hi << 32);
            Constant::scalar(match op {
                ExprOp::PackDouble2x32 => ConstScalar::Double(f64::from_bits(bits)),
                ExprOp::PackInt2x32 => ConstScalar::Int64(bits as i64),
                _ => ConstScalar::Uint64(bits),
            })
        }
        ExprOp::UnpackDouble2x32 | ExprOp::UnpackInt2x32 | ExprOp::UnpackUint2x32 => {
            let bits = a.component(0).bits();
            let (lo, hi) = (bits as u32, (bits >> 32) as u32);
            let c = if op == ExprOp::UnpackInt2x32 {
                vec![ConstScalar::Int(lo as i32), ConstScalar::Int(hi as i32)]
            } else {
                vec![ConstScalar::Uint(lo), ConstScalar::Uint(hi)]
            };
            Constant::new(ty.clone(), c)
        }
        _ => {
            let mut c = Vec::with_capacity(n);
            for i in 0..n {
                let args = operands.iter().map(|o| o.component(i)).collect::<Vec<_>>();
                c.push(component_op(op, &args)?);
            }
            Constant::new(ty.clone(), c)
        }
    })
}

fn component_op(op: ExprOp, args: &[ConstScalar]) -> Option<ConstScalar> {
    match args {
        [a] => unary(op, *a),
        [a, b] => binary(op, *a, *b),
        [a, b, c] => ternary(op, *a, *b, *c),
        [a, b, c, d] if op == ExprOp::BitfieldInsert => bitfield_insert(*a, *b, *c, *d),
        _ => None,
    }
}

macro_rules! float_fn {
    ($x:expr, |$v:ident| $body:expr) => {
        match $x {
            ConstScalar::Float($v) => Some(ConstScalar::Float($body)),
            ConstScalar::Double($v) => Some(ConstScalar::Double($body)),
            _ => None,
        }
    };
}

fn unary(op: ExprOp, x: ConstScalar) -> Option<ConstScalar> {
    use ConstScalar as C;

    if let Some(target) = op.conversion_target() {
        return convert(op, target, x);
    }
    match op {
        ExprOp::BitNot => match x {
            C::Int(v) => Some(C::Int(!v)),
            C::Uint(v) => Some(C::Uint(!v)),
            C::Int64(v) => Some(C::Int64(!v)),
            C::Uint64(v) => Some(C::Uint64(!v)),
            _ => None,
        },
        ExprOp::LogicNot => match x {
            C::Bool(b) => Some(C::Bool(!b)),
            _ => None,
        },
        ExprOp::Neg => match x {
            C::Int(v) => Some(C::Int(v.wrapping_neg())),
            C::Uint(v) => Some(C::Uint(v.wrapping_neg())),
            C::Int64(v) => Some(C::Int64(v.wrapping_neg())),
            C::Uint64(v) => Some(C::Uint64(v.wrapping_neg())),
            _ => float_fn!(x, |v| -v),
        },
        ExprOp::Abs => match x {
            C::Int(v) => Some(C::Int(v.wrapping_abs())),
            C::Int64(v) => Some(C::Int64(v.wrapping_abs())),
            C::Uint(_) | C::Uint64(_) => Some(x),
            _ => float_fn!(x, |v| v.abs()),
        },
        ExprOp::Sign => match x {
            C::Int(v) => Some(C::Int(v.signum())),
            C::Int64(v) => Some(C::Int64(v.signum())),
            C::Uint(v) => Some(C::Uint((v > 0) as u32)),
            C::Uint64(v) => Some(C::Uint64((v > 0) as u64)),
            _ => float_fn!(x, |v| if v > 0.0 {
                1.0
            } else if v < 0.0 {
                -1.0
            } else {
                0.0
            }),
        },
        ExprOp::Rcp => float_fn!(x, |v| 1.0 / v),
        ExprOp::Rsq => float_fn!(x, |v| 1.0 / v.sqrt()),
        ExprOp::Sqrt => float_fn!(x, |v| v.sqrt()),
        ExprOp::Exp => float_fn!(x, |v| v.exp()),
        ExprOp::Log => float_fn!(x, |v| v.ln()),
        ExprOp::Exp2 => float_fn!(x, |v| v.exp2()),
        ExprOp::Log2 => float_fn!(x, |v| v.log2()),
        ExprOp::Trunc => float_fn!(x, |v| v.trunc()),
        ExprOp::Ceil => float_fn!(x, |v| v.ceil()),
        ExprOp::Floor => float_fn!(x, |v| v.floor()),
        ExprOp::Fract => float_fn!(x, |v| v - v.floor()),
        ExprOp::RoundEven => float_fn!(x, |v| v.round_ties_even()),
        ExprOp::Sin => float_fn!(x, |v| v.sin()),
        ExprOp::Cos => float_fn!(x, |v| v.cos()),
        ExprOp::Saturate => float_fn!(x, |v| v.clamp(0.0, 1.0)),
        ExprOp::Dfdx | ExprOp::Dfdy => float_fn!(x, |v| v * 0.0),
        ExprOp::BitfieldReverse => match x {
            C::Int(v) => Some(C::Int(v.reverse_bits())),
            C::Uint(v) => Some(C::Uint(v.reverse_bits())),
            _ => None,
        },
        ExprOp::BitCount => match x {
            C::Int(v) => Some(C::Int(v.count_ones() as i32)),
            C::Uint(v) => Some(C::Int(v.count_ones() as i32)),
            _ => None,
        },
        ExprOp::FindMsb => {
            let bits = match x {
                // for negative values the most significant 0 bit counts
                C::Int(v) if v < 0 => !v as u32,
                C::Int(v) => v as u32,
                C::Uint(v) => v,
                _ => return None,
            };
            Some(C::Int(if bits == 0 {
                -1
            } else {
                31 - bits.leading_zeros() as i32
            }))
        }
        ExprOp::FindLsb => {
            let bits = match x {
                C::Int(v) => v as u32,
                C::Uint(v) => v,
                _ => return None,
            };
            Some(C::Int(if bits == 0 {
                -1
            } else {
                bits.trailing_zeros() as i32
            }))
        }
        _ => None,
    }
}

fn convert(op: ExprOp, target: ScalarType, x: ConstScalar) -> Option<ConstScalar> {
    use ConstScalar as C;

    Some(match (op, x) {
        (ExprOp::BitcastI2f | ExprOp::BitcastU2f, C::Int(_) | C::Uint(_)) => {
            C::Float(f32::from_bits(x.bits() as u32))
        }
        (ExprOp::BitcastF2i, C::Float(v)) => C::Int(v.to_bits() as i32),
        (ExprOp::BitcastF2u, C::Float(v)) => C::Uint(v.to_bits()),
        _ => match target {
            ScalarType::Bool => C::Bool(match x {
                C::Float(v) => v != 0.0,
                C::Double(v) => v != 0.0,
                other => other.bits() != 0,
            }),
            // `as` from floats truncates toward zero and saturates
            ScalarType::Int => C::Int(match x {
                C::Float(v) => v as i32,
                C::Double(v) => v as i32,
                other => other.bits() as i32,
            }),
            ScalarType::Uint => C::Uint(match x {
                C::Float(v) => v as u32,
                C::Double(v) => v as u32,
                other => other.bits() as u32,
            }),
            ScalarType::Float => C::Float(match x {
                C::Bool(b) => b as u8 as f32,
                C::Int(v) => v as f32,
                C::Uint(v) => v as f32,
                C::Double(v) => v as f32,
                _ => return None,
            }),
            ScalarType::Double => C::Double(match x {
                C::Int(v) => v as f64,
                C::Uint(v) => v as f64,
                C::Float(v) => v as f64,
                _ => return None,
            }),
            ScalarType::Int64 => C::Int64(match x {
                C::Int(v) => v as i64,
                C::Uint64(v) => v as i64,
                _ => return None,
            }),
            ScalarType::Uint64 => C::Uint64(match x {
                C::Uint(v) => v as u64,
                C::Int64(v) => v as u64,
                _ => return None,
            }),
        },
    })
}

fn scalar_equal(a: ConstScalar, b: ConstScalar) -> bool {
    match (a, b) {
        (ConstScalar::Float(x), ConstScalar::Float(y)) => x == y,
        (ConstScalar::Double(x), ConstScalar::Double(y)) => x == y,
        _ => a.bits() == b.bits(),
    }
}

fn compare(op: ExprOp, a: ConstScalar, b: ConstScalar) -> Option<bool> {
    use core::cmp::Ordering;
    use ConstScalar as C;

    if op == ExprOp::Equal {
        return Some(scalar_equal(a, b));
    }
    if op == ExprOp::Nequal {
        return Some(!scalar_equal(a, b));
    }
    let ord = match (a, b) {
        (C::Int(x), C::Int(y)) => Some(x.cmp(&y)),
        (C::Uint(x), C::Uint(y)) => Some(x.cmp(&y)),
        (C::Int64(x), C::Int64(y)) => Some(x.cmp(&y)),
        (C::Uint64(x), C::Uint64(y)) => Some(x.cmp(&y)),
        (C::Float(x), C::Float(y)) => x.partial_cmp(&y),
        (C::Double(x), C::Double(y)) => x.partial_cmp(&y),
        _ => return None,
    };
    // unordered comparisons are false
    Some(match op {
        ExprOp::Less => ord == Some(Ordering::Less),
        ExprOp::Greater => ord == Some(Ordering::Greater),
        ExprOp::Lequal => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        ExprOp::Gequal => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        _ => return None,
    })
}

macro_rules! int_arith {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {
        match ($a, $b) {
            (ConstScalar::Int($x), ConstScalar::Int($y)) => Some(ConstScalar::Int($body)),
            (ConstScalar::Uint($x), ConstScalar::Uint($y)) => Some(ConstScalar::Uint($body)),
            (ConstScalar::Int64($x), ConstScalar::Int64($y)) => Some(ConstScalar::Int64($body)),
            (ConstScalar::Uint64($x), ConstScalar::Uint64($y)) => {
                Some(ConstScalar::Uint64($body))
            }
            _ => None,
        }
    };
}

macro_rules! float_arith {
    ($a:expr, $b:expr, |$x:ident, $y:ident| $body:expr) => {
        match ($a, $b) {
            (ConstScalar::Float($x), ConstScalar::Float($y)) => Some(ConstScalar::Float($body)),
            (ConstScalar::Double($x), ConstScalar::Double($y)) => {
                Some(ConstScalar::Double($body))
            }
            _ => None,
        }
    };
}

fn arith(op: ExprOp, a: ConstScalar, b: ConstScalar) -> Option<ConstScalar> {
    let int = match op {
        ExprOp::Add => int_arith!(a, b, |x, y| x.wrapping_add(y)),
        ExprOp::Sub => int_arith!(a, b, |x, y| x.wrapping_sub(y)),
        ExprOp::Mul => int_arith!(a, b, |x, y| x.wrapping_mul(y)),
        ExprOp::Div => int_arith!(a, b, |x, y| if y == 0 { 0 } else { x.wrapping_div(y) }),
        ExprOp::Mod => int_arith!(a, b, |x, y| if y == 0 { 0 } else { x.wrapping_rem(y) }),
        ExprOp::Min => int_arith!(a, b, |x, y| x.min(y)),
        ExprOp::Max => int_arith!(a, b, |x, y| x.max(y)),
        ExprOp::BitAnd => int_arith!(a, b, |x, y| x & y),
        ExprOp::BitOr => int_arith!(a, b, |x, y| x | y),
        ExprOp::BitXor => int_arith!(a, b, |x, y| x ^ y),
        _ => None,
    };
    if int.is_some() {
        return int;
    }
    match op {
        ExprOp::Add => float_arith!(a, b, |x, y| x + y),
        ExprOp::Sub => float_arith!(a, b, |x, y| x - y),
        ExprOp::Mul => float_arith!(a, b, |x, y| x * y),
        ExprOp::Div => float_arith!(a, b, |x, y| x / y),
        ExprOp::Mod => float_arith!(a, b, |x, y| x - y * (x / y).floor()),
        ExprOp::Min => float_arith!(a, b, |x, y| if y < x { y } else { x }),
        ExprOp::Max => float_arith!(a, b, |x, y| if y > x { y } else { x }),
        ExprOp::Pow => float_arith!(a, b, |x, y| x.powf(y)),
        _ => None,
    }
}

fn shift(op: ExprOp, a: ConstScalar, b: ConstScalar) -> Option<ConstScalar> {
    use ConstScalar as C;

    let width = a.base_type().bit_size();
    let s = (b.bits() as u32) & (width - 1);
    let left = op == ExprOp::Lshift;
    Some(match a {
        C::Int(v) => C::Int(if left { v.wrapping_shl(s) } else { v >> s }),
        C::Uint(v) => C::Uint(if left { v.wrapping_shl(s) } else { v >> s }),
        C::Int64(v) => C::Int64(if left { v.wrapping_shl(s) } else { v >> s }),
        C::Uint64(v) => C::Uint64(if left { v.wrapping_shl(s) } else { v >> s }),
        _ => return None,
    })
}

fn binary(op: ExprOp, a: ConstScalar, b: ConstScalar) -> Option<ConstScalar> {
    use ConstScalar as C;

    match op {
        _ if op.is_comparison() => compare(op, a, b).map(C::Bool),
        ExprOp::Lshift | ExprOp::Rshift => shift(op, a, b),
        ExprOp::LogicAnd | ExprOp::LogicOr | ExprOp::LogicXor => match (a, b) {
            (C::Bool(x), C::Bool(y)) => Some(C::Bool(match op {
                ExprOp::LogicAnd => x && y,
                ExprOp::LogicOr => x || y,
                _ => x != y,
            })),
            _ => None,
        },
        _ => arith(op, a, b),
    }
}

fn ternary(op: ExprOp, a: ConstScalar, b: ConstScalar, c: ConstScalar) -> Option<ConstScalar> {
    use ConstScalar as C;

    match op {
        ExprOp::Fma => match (a, b, c) {
            (C::Float(x), C::Float(y), C::Float(z)) => Some(C::Float(x.mul_add(y, z))),
            (C::Double(x), C::Double(y), C::Double(z)) => Some(C::Double(x.mul_add(y, z))),
            _ => None,
        },
        ExprOp::Lrp => match (a, b, c) {
            (C::Float(x), C::Float(y), C::Float(t)) => Some(C::Float(x * (1.0 - t) + y * t)),
            (C::Double(x), C::Double(y), C::Double(t)) => Some(C::Double(x * (1.0 - t) + y * t)),
            _ => None,
        },
        ExprOp::Csel => Some(if a.as_bool() { b } else { c }),
        ExprOp::BitfieldExtract => {
            let (offset, bits) = (b.as_i64(), c.as_i64());
            if bits == 0 || offset < 0 || bits < 0 || offset + bits > 32 {
                // undefined results read as zero
                return Some(ConstScalar::zero(a.base_type()));
            }
            Some(match a {
                C::Int(v) => C::Int((v << (32 - bits - offset)) >> (32 - bits)),
                C::Uint(v) => C::Uint((v << (32 - bits - offset)) >> (32 - bits)),
                _ => return None,
            })
        }
        _ => None,
    }
}

fn bitfield_insert(
    base: ConstScalar,
    insert: ConstScalar,
    offset: ConstScalar,
    bits: ConstScalar,
) -> Option<ConstScalar> {
    let (offset, bits) = (offset.as_i64(), bits.as_i64());
    if bits == 0 {
        return Some(base);
    }
    if offset < 0 || bits < 0 || offset + bits > 32 {
        return Some(ConstScalar::zero(base.base_type()));
    }
    let mask = (u32::MAX >> (32 - bits)) << offset;
    let merged = (base.bits() as u32 & !mask) | ((insert.bits() as u32) << offset & mask);
    Some(match base {
        ConstScalar::Int(_) => ConstScalar::Int(merged as i32),
        ConstScalar::Uint(_) => ConstScalar::Uint(merged),
        _ => return None,
    })
}

/// Column-major matrix products.
fn matrix_multiply(ty: &GlslType, a: &Constant, b: &Constant) -> Option<Constant> {
    if a.ty.is_scalar() || b.ty.is_scalar() {
        let mut c = Vec::with_capacity(ty.components());
        for i in 0..ty.components() {
            c.push(arith(ExprOp::Mul, a.component(i), b.component(i))?);
        }
        return Some(Constant::new(ty.clone(), c));
    }

    // shapes as (rows, columns); a vector on the left is a row vector
    let (a_rows, a_cols) = if a.ty.is_matrix() {
        (a.ty.vector_elements() as usize, a.ty.matrix_columns() as usize)
    } else {
        (1, a.ty.vector_elements() as usize)
    };
    let (b_rows, b_cols) = if b.ty.is_matrix() {
        (b.ty.vector_elements() as usize, b.ty.matrix_columns() as usize)
    } else {
        (b.ty.vector_elements() as usize, 1)
    };
    if a_cols != b_rows || a_rows * b_cols != ty.components() {
        return None;
    }
    let base = ty.base_type()?;
    let mut c = Vec::with_capacity(a_rows * b_cols);
    for j in 0..b_cols {
        for i in 0..a_rows {
            let mut sum = ConstScalar::zero(base);
            for k in 0..a_cols {
                let x = a.components()[k * a_rows + i];
                let y = b.components()[j * b_rows + k];
                sum = arith(ExprOp::Add, sum, arith(ExprOp::Mul, x, y)?)?;
            }
            c.push(sum);
        }
    }
    Some(Constant::new(ty.clone(), c))
}

fn pack(op: ExprOp, values: &[f32]) -> u32 {
    let get = |i: usize| values.get(i).copied().unwrap_or(0.0);
    match op {
        ExprOp::PackSnorm2x16 => (0..2).fold(0, |acc, i| {
            let v = (get(i).clamp(-1.0, 1.0) * 32767.0).round_ties_even() as i16 as u16;
            acc | (v as u32) << (16 * i)
        }),
        ExprOp::PackUnorm2x16 => (0..2).fold(0, |acc, i| {
            let v = (get(i).clamp(0.0, 1.0) * 65535.0).round_ties_even() as u16;
            acc | (v as u32) << (16 * i)
        }),
        ExprOp::PackSnorm4x8 => (0..4).fold(0, |acc, i| {
            let v = (get(i).clamp(-1.0, 1.0) * 127.0).round_ties_even() as i8 as u8;
            acc | (v as u32) << (8 * i)
        }),
        ExprOp::PackUnorm4x8 => (0..4).fold(0, |acc, i| {
            let v = (get(i).clamp(0.0, 1.0) * 255.0).round_ties_even() as u8;
            acc | (v as u32) << (8 * i)
        }),
        _ => (f32_to_f16_bits(get(0)) as u32) | (f32_to_f16_bits(get(1)) as u32) << 16,
    }
}

fn unpack(op: ExprOp, p: u32) -> Vec<f32> {
    match op {
        ExprOp::UnpackSnorm2x16 => (0..2)
            .map(|i| ((p >> (16 * i)) as u16 as i16 as f32 / 32767.0).clamp(-1.0, 1.0))
            .collect(),
        ExprOp::UnpackUnorm2x16 => (0..2)
            .map(|i| (p >> (16 * i)) as u16 as f32 / 65535.0)
            .collect(),
        ExprOp::UnpackSnorm4x8 => (0..4)
            .map(|i| ((p >> (8 * i)) as u8 as i8 as f32 / 127.0).clamp(-1.0, 1.0))
            .collect(),
        ExprOp::UnpackUnorm4x8 => (0..4).map(|i| (p >> (8 * i)) as u8 as f32 / 255.0).collect(),
        _ => vec![f16_bits_to_f32(p as u16), f16_bits_to_f32((p >> 16) as u16)],
    }
}

/// Round-to-nearest-even conversion to binary16.
pub fn f32_to_f16_bits(v: f32) -> u16 {
    let x = v.to_bits();
    let sign = ((x >> 16) & 0x8000) as u16;
    let exp = ((x >> 23) & 0xff) as i32;
    let mant = x & 0x7f_ffff;

    if exp == 0xff {
        let nan = if mant != 0 { 0x200 | (mant >> 13) as u16 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    let e = exp - 127 + 15;
    if e >= 0x1f {
        return sign | 0x7c00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = mant | 0x80_0000;
        let shift = (14 - e) as u32;
        let half = m >> shift;
        let rem = m & ((1 << shift) - 1);
        let halfway = 1 << (shift - 1);
        let rounded = if rem > halfway || (rem == halfway && half & 1 == 1) {
            half + 1
        } else {
            half
        };
        return sign | rounded as u16;
    }

    let half = ((e as u32) << 10) | (mant >> 13);
    let rem = mant & 0x1fff;
    // a carry out of the mantissa rounds up into the exponent, up to infinity
    let rounded = if rem > 0x1000 || (rem == 0x1000 && half & 1 == 1) {
        half + 1
    } else {
        half
    };
    sign | rounded as u16
}

pub fn f16_bits_to_f32(h: u16) -> f32 {
    let sign = ((h & 0x8000) as u32) << 16;
    let exp = ((h >> 10) & 0x1f) as u32;
    let mant = (h & 0x3ff) as u32;
    match exp {
        0 => {
            let v = mant as f32 / 16_777_216.0;
            if sign != 0 {
                -v
            } else {
                v
            }
        }
        0x1f => f32::from_bits(sign | 0x7f80_0000 | (mant << 13)),
        _ => f32::from_bits(sign | ((exp + 127 - 15) << 23) | (mant << 13)),
    }
}

struct ConstantFolding {
    progress: bool,
}
impl<'a> Visitor<'a> for ConstantFolding {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        if try_fold_with_variables(rvalue) {
            tracing::trace!("[ConstantFolding] folded to {}", crate::ir::print::print_rvalue(rvalue));
            self.progress = true;
        }
    }

    fn enter_call(&mut self, ir: &mut Call<'a>) -> Visit {
        // only value parameters may become constants
        for (formal, actual) in ir.callee.parameters.iter().zip(ir.actual_parameters.iter_mut()) {
            if matches!(formal.mode(), VariableMode::FunctionIn | VariableMode::ConstIn)
                && visit_rvalue(self, actual) == Visit::Stop
            {
                return Visit::Stop;
            }
        }
        Visit::ContinueWithParent
    }
}

/// Folds every constant subexpression and resolves assignments whose
/// condition became constant.
pub fn do_constant_folding(instructions: &mut Vec<Instruction<'_>>) -> bool {
    let mut v = ConstantFolding { progress: false };
    visit_list(&mut v, instructions);
    let conditions = resolve_constant_conditions(instructions);
    v.progress || conditions
}

fn resolve_constant_conditions(list: &mut Vec<Instruction<'_>>) -> bool {
    let mut progress = false;
    list.retain_mut(|ir| match ir {
        Instruction::Assignment(a) => match a.condition.as_ref().and_then(Rvalue::as_constant) {
            Some(c) if c.components().first().is_some_and(|b| b.as_bool()) => {
                a.condition = None;
                progress = true;
                true
            }
            Some(_) => {
                tracing::debug!("[ConstantFolding] removed never-taken conditional assignment");
                progress = true;
                false
            }
            None => true,
        },
        Instruction::If(i) => {
            progress |= resolve_constant_conditions(&mut i.then_instructions);
            progress |= resolve_constant_conditions(&mut i.else_instructions);
            true
        }
        Instruction::Loop(l) => {
            progress |= resolve_constant_conditions(&mut l.body);
            true
        }
        Instruction::Function(f) => {
            for sig in f.signatures.iter_mut() {
                progress |= resolve_constant_conditions(&mut sig.body);
            }
            true
        }
        _ => true,
    });
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        builder::*, IrArenas, IrContext, SwizzleMask, WriteMask,
    };

    fn fold(mut rv: Rvalue<'_>) -> Option<Constant> {
        try_fold(&mut rv).then(|| rv.as_constant().cloned()).flatten()
    }

    fn floats(c: &Constant) -> Vec<f32> {
        c.components().iter().map(|x| x.as_f32()).collect()
    }

    #[test]
    fn folds_vector_arithmetic_with_broadcast() {
        let v = Constant::new(
            GlslType::vec(ScalarType::Float, 3),
            [1.0, 2.0, 3.0].map(ConstScalar::Float).to_vec(),
        );
        let c = fold(mul(constant(v), constant(Constant::float(2.0)))).unwrap();
        assert_eq!(floats(&c), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn integer_edge_cases_follow_the_documented_policy() {
        let c = fold(div(constant(Constant::int(7)), constant(Constant::int(0)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Int(0)));
        let c = fold(div(constant(Constant::int(i32::MIN)), constant(Constant::int(-1)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Int(i32::MIN)));
        let c = fold(lshift(constant(Constant::uint(1)), constant(Constant::uint(33)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Uint(2)));
        let c = fold(f2i(constant(Constant::float(f32::NAN)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Int(0)));
        let c = fold(f2i(constant(Constant::float(-3.7e10)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Int(i32::MIN)));
    }

    #[test]
    fn float_edge_cases_are_ieee() {
        let c = fold(div(constant(Constant::float(1.0)), constant(Constant::float(-0.0)))).unwrap();
        assert_eq!(c.component(0).as_f32(), f32::NEG_INFINITY);
        let c = fold(min(constant(Constant::float(-0.0)), constant(Constant::float(0.0)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Float(-0.0)));
        let c = fold(less(constant(Constant::float(f32::NAN)), constant(Constant::float(1.0)))).unwrap();
        assert!(!c.component(0).as_bool());
        let c = fold(neg(constant(Constant::float(0.0)))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Float(-0.0)));
    }

    #[test]
    fn folds_horizontal_operations() {
        let v = Constant::new(
            GlslType::vec(ScalarType::Float, 2),
            [3.0, 4.0].map(ConstScalar::Float).to_vec(),
        );
        let c = fold(dot(constant(v.clone()), constant(v.clone()))).unwrap();
        assert_eq!(floats(&c), vec![25.0]);
        let s = fold(swizzle(constant(v), SwizzleMask::new(&[1, 1, 0]))).unwrap();
        assert_eq!(floats(&s), vec![4.0, 4.0, 3.0]);
    }

    #[test]
    fn matrix_vector_products() {
        // columns (1, 2) and (3, 4)
        let m = Constant::new(
            GlslType::mat(2, 2),
            [1.0, 2.0, 3.0, 4.0].map(ConstScalar::Float).to_vec(),
        );
        let v = Constant::new(
            GlslType::vec(ScalarType::Float, 2),
            [1.0, 1.0].map(ConstScalar::Float).to_vec(),
        );
        let c = fold(mul(constant(m.clone()), constant(v.clone()))).unwrap();
        assert_eq!(floats(&c), vec![4.0, 6.0]);
        let c = fold(mul(constant(v), constant(m))).unwrap();
        assert_eq!(floats(&c), vec![3.0, 7.0]);
    }

    #[test]
    fn half_floats() {
        assert_eq!(f32_to_f16_bits(1.0), 0x3c00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xc000);
        assert_eq!(f32_to_f16_bits(65520.0), 0x7c00);
        assert_eq!(f32_to_f16_bits(5.960_464_5e-8), 0x0001);
        assert_eq!(f16_bits_to_f32(0x3555), 0.333_251_95);
        assert!(f16_bits_to_f32(0x7e00).is_nan());
    }

    #[test]
    fn pack_and_unpack() {
        let v = Constant::new(
            GlslType::vec(ScalarType::Float, 2),
            [1.0, -1.0].map(ConstScalar::Float).to_vec(),
        );
        let c = fold(unop(ExprOp::PackSnorm2x16, constant(v))).unwrap();
        assert!(c.component(0).bit_eq(ConstScalar::Uint(0x8001_7fff)));
        let u = fold(unop(ExprOp::UnpackUnorm4x8, constant(Constant::uint(0xff00_00ff)))).unwrap();
        assert_eq!(floats(&u), vec![1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn variable_dereferences_stay_in_place() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let a = ctx.new_variable("a", GlslType::FLOAT, VariableMode::Auto);
        *a.constant_value.borrow_mut() = Some(Constant::float(3.0));

        let mut rv = var(a);
        assert!(!try_fold_with_variables(&mut rv));
        let mut e = add(var(a), constant(Constant::float(1.0)));
        assert!(!try_fold(&mut e));
        assert!(try_fold_with_variables(&mut e));
        assert!(e.is_value(4.0, 4));
    }

    #[test]
    fn constant_conditions_are_resolved() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let x = ctx.new_variable("x", GlslType::FLOAT, VariableMode::Auto);
        let mut list = vec![
            cond_assign(
                Deref::Var(x),
                constant(Constant::float(1.0)),
                WriteMask::X,
                logic_not(constant(Constant::bool(true))),
            ),
            cond_assign(
                Deref::Var(x),
                constant(Constant::float(2.0)),
                WriteMask::X,
                constant(Constant::bool(true)),
            ),
        ];
        assert!(do_constant_folding(&mut list));
        assert_eq!(list.len(), 1);
        assert!(list[0].as_assignment().unwrap().condition.is_none());
        assert!(!do_constant_folding(&mut list));
    }
}
