//! Algebraic identities, constant reassociation and idiom recognition.
//!
//! Operands count as constant when their folded value is known, including
//! through variables with a known `constant_value`. Every rewrite is
//! followed by folding the rewritten subtree, so `1.0 + (x + 2.0)` settles
//! as `x + 3.0` in one visit.

use tracing::trace;

use super::{
    constant_folding::{constant_value, try_fold_with_variables},
    declare_pass, OptimizerOptions,
};
use crate::ir::{
    builder::*,
    print::print_rvalue,
    visitor::{rewrite_rvalue_tree, visit_list_emitting, Emitter, Visitor},
    Constant, Deref, ExprOp, ExprOp as Op, Expression, Instruction, IrContext, Rvalue,
    SwizzleMask,
};

declare_pass!(
    /// Rewrites expressions using algebraic identities.
    Algebraic,
    "algebraic",
    |ctx, options, ir| do_algebraic(ctx, options, ir)
);

pub fn do_algebraic<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    let mut v = AlgebraicVisitor {
        ctx,
        options,
        pending: Vec::new(),
        progress: false,
    };
    visit_list_emitting(&mut v, instructions);
    v.progress
}

struct AlgebraicVisitor<'c, 'a> {
    ctx: &'c IrContext<'a>,
    options: &'c OptimizerOptions,
    pending: Vec<Instruction<'a>>,
    progress: bool,
}

impl<'a> Emitter<'a> for AlgebraicVisitor<'_, 'a> {
    fn pending(&mut self) -> &mut Vec<Instruction<'a>> {
        &mut self.pending
    }
}

impl<'a> Visitor<'a> for AlgebraicVisitor<'_, 'a> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        let Rvalue::Expression(e) = rvalue else {
            return;
        };
        let ty = e.ty.clone();
        let op = e.op;
        if let Some(new) = self.handle_expression(e) {
            *rvalue = swizzle_if_required(&ty, new);
            rewrite_rvalue_tree(rvalue, |rv| {
                try_fold_with_variables(rv);
            });
            trace!("[Algebraic] {} became {}", op.name(), print_rvalue(rvalue));
            self.progress = true;
        }
    }
}

/// Folded operand values of one expression.
struct Known(Vec<Option<Constant>>);
impl Known {
    fn get(&self, i: usize) -> Option<&Constant> {
        self.0.get(i).and_then(Option::as_ref)
    }

    /// Scalar or vector constant with every component equal to the value.
    fn is(&self, i: usize, f: f64, n: i64) -> bool {
        self.get(i)
            .is_some_and(|c| c.ty.is_scalar_or_vector() && c.is_value(f, n))
    }

    fn zero(&self, i: usize) -> bool {
        self.is(i, 0.0, 0)
    }

    fn one(&self, i: usize) -> bool {
        self.is(i, 1.0, 1)
    }

    fn negative_one(&self, i: usize) -> bool {
        self.get(i)
            .is_some_and(|c| c.ty.is_scalar_or_vector() && c.is_negative_one())
    }
}

fn as_expr_mut<'e, 'a>(rv: &'e mut Rvalue<'a>) -> Option<&'e mut Expression<'a>> {
    match rv {
        Rvalue::Expression(e) => Some(e),
        _ => None,
    }
}

#[inline]
fn op_of(e: &Expression<'_>, i: usize) -> Option<ExprOp> {
    e.operands[i].expr_op()
}

/// Operand `j` of the expression sitting in operand `i`.
fn take_inner<'a>(e: &mut Expression<'a>, i: usize, j: usize) -> Option<Rvalue<'a>> {
    Some(as_expr_mut(&mut e.operands[i])?.operands[j].take())
}

fn take_expression<'a>(e: &mut Expression<'a>) -> Expression<'a> {
    let empty = Expression {
        op: e.op,
        ty: e.ty.clone(),
        operands: Vec::new(),
    };
    std::mem::replace(e, empty)
}

fn zero_of<'a>(e: &Expression<'_>) -> Rvalue<'a> {
    constant(Constant::zero(&e.ty))
}

impl<'a> AlgebraicVisitor<'_, 'a> {
    fn handle_expression(&mut self, e: &mut Expression<'a>) -> Option<Rvalue<'a>> {
        let k = Known(
            e.operands
                .iter()
                .map(|o| constant_value(o, true))
                .collect(),
        );
        match e.op {
            Op::BitNot | Op::Neg if op_of(e, 0) == Some(e.op) => take_inner(e, 0, 0),
            Op::Abs if matches!(op_of(e, 0), Some(Op::Abs | Op::Neg)) => {
                Some(abs(take_inner(e, 0, 0)?))
            }
            Op::LogicNot => simplify_logic_not(e),
            Op::Exp if op_of(e, 0) == Some(Op::Log) => take_inner(e, 0, 0),
            Op::Log if op_of(e, 0) == Some(Op::Exp) => take_inner(e, 0, 0),
            Op::Log2 if op_of(e, 0) == Some(Op::Exp2) => take_inner(e, 0, 0),
            Op::Exp2 if op_of(e, 0) == Some(Op::Log2) => take_inner(e, 0, 0),
            Op::Exp2 if self.options.native_pow => exp2_of_log2_product(e),
            Op::F2i | Op::F2u if op_of(e, 0) == Some(Op::Trunc) => {
                Some(unop(e.op, take_inner(e, 0, 0)?))
            }
            Op::Rcp => match op_of(e, 0)? {
                Op::Rcp => take_inner(e, 0, 0),
                Op::Sqrt => Some(unop(Op::Rsq, take_inner(e, 0, 0)?)),
                Op::Rsq => Some(unop(Op::Sqrt, take_inner(e, 0, 0)?)),
                _ => None,
            },
            Op::PackUint2x32
            | Op::UnpackUint2x32
            | Op::PackInt2x32
            | Op::UnpackInt2x32
            | Op::PackDouble2x32
            | Op::UnpackDouble2x32
                if op_of(e, 0) == inverse_packing(e.op) =>
            {
                take_inner(e, 0, 0)
            }
            Op::Add => self.add(e, &k),
            Op::Sub => {
                if k.zero(0) {
                    Some(neg(e.operands[1].take()))
                } else if k.zero(1) {
                    Some(e.operands[0].take())
                } else {
                    None
                }
            }
            Op::Mul => mul_rules(e, &k),
            Op::Div => {
                if k.one(1) {
                    Some(e.operands[0].take())
                } else if e.ty.is_float() && k.one(0) {
                    Some(rcp(e.operands[1].take()))
                } else {
                    None
                }
            }
            Op::Dot => dot_rules(e, &k),
            Op::Less | Op::Greater | Op::Lequal | Op::Gequal | Op::Equal | Op::Nequal => {
                compare_sum_with_zero(e, &k)
            }
            Op::AllEqual | Op::AnyNequal
                if e.operands[0].ty().is_scalar() && e.operands[1].ty().is_scalar() =>
            {
                let op = if e.op == Op::AllEqual {
                    Op::Equal
                } else {
                    Op::Nequal
                };
                Some(binop(op, e.operands[0].take(), e.operands[1].take()))
            }
            Op::Lshift | Op::Rshift if k.zero(0) || k.zero(1) => Some(e.operands[0].take()),
            Op::LogicAnd => {
                if k.one(0) {
                    Some(e.operands[1].take())
                } else if k.one(1) {
                    Some(e.operands[0].take())
                } else if k.zero(0) || k.zero(1) {
                    Some(zero_of(e))
                } else if op_of(e, 0) == Some(Op::LogicNot) && op_of(e, 1) == Some(Op::LogicNot) {
                    // !a && !b == !(a || b)
                    let a = take_inner(e, 0, 0)?;
                    let b = take_inner(e, 1, 0)?;
                    Some(logic_not(logic_or(a, b)))
                } else if e.operands[0].equals(&e.operands[1], false) {
                    Some(e.operands[0].take())
                } else {
                    None
                }
            }
            Op::LogicOr => {
                if k.zero(0) {
                    Some(e.operands[1].take())
                } else if k.zero(1) {
                    Some(e.operands[0].take())
                } else if k.one(0) || k.one(1) {
                    Constant::from_value(&e.ty, 1.0, 1).map(constant)
                } else if op_of(e, 0) == Some(Op::LogicNot) && op_of(e, 1) == Some(Op::LogicNot) {
                    let a = take_inner(e, 0, 0)?;
                    let b = take_inner(e, 1, 0)?;
                    Some(logic_not(logic_and(a, b)))
                } else if e.operands[0].equals(&e.operands[1], false) {
                    Some(e.operands[0].take())
                } else {
                    None
                }
            }
            Op::LogicXor => {
                if k.zero(0) {
                    Some(e.operands[1].take())
                } else if k.zero(1) {
                    Some(e.operands[0].take())
                } else if k.one(0) {
                    Some(logic_not(e.operands[1].take()))
                } else if k.one(1) {
                    Some(logic_not(e.operands[0].take()))
                } else if e.operands[0].equals(&e.operands[1], false) {
                    Some(zero_of(e))
                } else {
                    None
                }
            }
            Op::BitAnd => {
                if k.zero(0) || k.zero(1) {
                    Some(zero_of(e))
                } else if e.operands[0].equals(&e.operands[1], false) {
                    Some(e.operands[0].take())
                } else {
                    None
                }
            }
            Op::BitOr | Op::BitXor => {
                if k.zero(0) {
                    Some(e.operands[1].take())
                } else if k.zero(1) {
                    Some(e.operands[0].take())
                } else if e.operands[0].equals(&e.operands[1], false) {
                    Some(if e.op == Op::BitOr {
                        e.operands[0].take()
                    } else {
                        zero_of(e)
                    })
                } else {
                    None
                }
            }
            Op::Pow => self.pow(e, &k),
            Op::Min | Op::Max if e.ty.is_float() && self.options.native_saturate => {
                saturate_idiom(e, &k)
            }
            Op::Fma => {
                if k.zero(0) || k.zero(1) {
                    Some(e.operands[2].take())
                } else if k.zero(2) {
                    Some(mul(e.operands[0].take(), e.operands[1].take()))
                } else if k.one(0) {
                    Some(add(e.operands[1].take(), e.operands[2].take()))
                } else if k.one(1) {
                    Some(add(e.operands[0].take(), e.operands[2].take()))
                } else {
                    None
                }
            }
            Op::Lrp => {
                if k.zero(2) {
                    Some(e.operands[0].take())
                } else if k.one(2) {
                    Some(e.operands[1].take())
                } else if e.operands[0].equals(&e.operands[1], false) {
                    Some(e.operands[0].take())
                } else if k.zero(0) {
                    Some(mul(e.operands[1].take(), e.operands[2].take()))
                } else if k.zero(1) {
                    // x * (1 - a)
                    let a = e.operands[2].take();
                    let one = Constant::from_value(a.ty(), 1.0, 1)?;
                    Some(mul(e.operands[0].take(), add(constant(one), neg(a))))
                } else {
                    None
                }
            }
            Op::Csel => {
                if k.one(0) {
                    Some(e.operands[1].take())
                } else if k.zero(0) {
                    Some(e.operands[2].take())
                } else if e.operands[1].equals(&e.operands[2], false) {
                    Some(e.operands[1].take())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn add(&mut self, e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
        if k.zero(0) {
            return Some(e.operands[1].take());
        }
        if k.zero(1) {
            return Some(e.operands[0].take());
        }
        for i in 0..2 {
            let cancels = e.operands[i]
                .as_expression()
                .filter(|n| n.op == Op::Neg)
                .is_some_and(|n| n.operands[0].equals(&e.operands[1 - i], false));
            if cancels {
                return Some(zero_of(e));
            }
        }
        if let Some(r) = reassociate(e, k) {
            return Some(r);
        }
        if self.options.native_lrp {
            if let Some(r) = lrp_idiom(e) {
                return Some(r);
            }
        }
        if self.options.optimize_for_aos {
            return dot_idiom(e);
        }
        None
    }

    fn pow(&mut self, e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
        if k.one(0) {
            return Constant::from_value(&e.ty, 1.0, 1).map(constant);
        }
        if k.one(1) {
            return Some(e.operands[0].take());
        }
        if k.is(0, 2.0, 2) {
            return Some(exp2(e.operands[1].take()));
        }
        if k.is(1, 2.0, 2) {
            let (x1, x2) = self.materialize(e.operands[0].take());
            return Some(mul(x1, x2));
        }
        if k.is(1, 4.0, 4) {
            let (x1, x2) = self.materialize(e.operands[0].take());
            let (s1, s2) = self.materialize(mul(x1, x2));
            return Some(mul(s1, s2));
        }
        None
    }

    /// Two uses of `value`, storing it in a temporary first unless it is
    /// cheap to repeat.
    fn materialize(&mut self, value: Rvalue<'a>) -> (Rvalue<'a>, Rvalue<'a>) {
        let trivial = match &value {
            Rvalue::Constant(_) | Rvalue::Deref(Deref::Var(_)) => true,
            Rvalue::Swizzle(s) => s.val.as_var().is_some(),
            _ => false,
        };
        if trivial {
            return (value.clone(), value);
        }
        let t = self.ctx.new_temporary("algebraic", value.ty().clone());
        self.pending.push(Instruction::Variable(t));
        self.pending.push(assign_var(t, value));
        (var(t), var(t))
    }
}

fn inverse_packing(op: ExprOp) -> Option<ExprOp> {
    Some(match op {
        Op::PackUint2x32 => Op::UnpackUint2x32,
        Op::UnpackUint2x32 => Op::PackUint2x32,
        Op::PackInt2x32 => Op::UnpackInt2x32,
        Op::UnpackInt2x32 => Op::PackInt2x32,
        Op::PackDouble2x32 => Op::UnpackDouble2x32,
        Op::UnpackDouble2x32 => Op::PackDouble2x32,
        _ => return None,
    })
}

fn simplify_logic_not<'a>(e: &mut Expression<'a>) -> Option<Rvalue<'a>> {
    let inner = e.operands[0].as_expression()?;
    if inner.op == Op::LogicNot {
        return take_inner(e, 0, 0);
    }
    let inverse = inner.op.inverse_comparison()?;
    let inner = as_expr_mut(&mut e.operands[0])?;
    let a = inner.operands[0].take();
    let b = inner.operands[1].take();
    Some(binop(inverse, a, b))
}

/// `exp2(log2(x) * y)` is `pow(x, y)`.
fn exp2_of_log2_product<'a>(e: &mut Expression<'a>) -> Option<Rvalue<'a>> {
    let product = e.operands[0].as_expression().filter(|m| m.op == Op::Mul)?;
    let log2_pos = (0..2).find(|&i| product.operands[i].expr_op() == Some(Op::Log2))?;
    let product = as_expr_mut(&mut e.operands[0])?;
    let y = product.operands[1 - log2_pos].take();
    let x = take_inner(product, log2_pos, 0)?;
    let x = swizzle_if_required(y.ty(), x);
    let y = swizzle_if_required(x.ty(), y);
    Some(binop(Op::Pow, x, y))
}

fn mul_rules<'a>(e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
    if e.operands.iter().any(|o| o.ty().is_matrix()) {
        return None;
    }
    if k.one(0) {
        return Some(e.operands[1].take());
    }
    if k.one(1) {
        return Some(e.operands[0].take());
    }
    if k.zero(0) || k.zero(1) {
        return Some(zero_of(e));
    }
    if k.negative_one(0) {
        return Some(neg(e.operands[1].take()));
    }
    if k.negative_one(1) {
        return Some(neg(e.operands[0].take()));
    }
    if let Some(r) = reassociate(e, k) {
        return Some(r);
    }
    round_idiom(e)
}

fn reassociate<'a>(e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
    let const_index = match (k.get(0).is_some(), k.get(1).is_some()) {
        (true, false) => 0,
        (false, true) => 1,
        _ => return None,
    };
    if e.operands.iter().any(|o| o.ty().is_matrix()) {
        return None;
    }
    let op = e.op;
    let [a, b] = &mut e.operands[..] else {
        return None;
    };
    let (konst, other) = if const_index == 0 { (a, b) } else { (b, a) };
    if !reassociate_into(op, konst, other) {
        return None;
    }
    Some(Rvalue::Expression(take_expression(e)))
}

/// Swaps `konst` with the non-constant sibling of a constant found in the
/// same-operator tree under `other`, leaving two constants side by side.
fn reassociate_into<'a>(op: ExprOp, konst: &mut Rvalue<'a>, other: &mut Rvalue<'a>) -> bool {
    let Rvalue::Expression(inner) = other else {
        return false;
    };
    if inner.op != op || inner.operands.iter().any(|o| o.ty().is_matrix()) {
        return false;
    }
    let known = [0, 1].map(|i| constant_value(&inner.operands[i], true).is_some());
    let swapped = match known {
        [true, true] => false,
        [true, false] => {
            std::mem::swap(konst, &mut inner.operands[1]);
            true
        }
        [false, true] => {
            std::mem::swap(konst, &mut inner.operands[0]);
            true
        }
        [false, false] => {
            let [l, r] = &mut inner.operands[..] else {
                return false;
            };
            reassociate_into(op, konst, l) || reassociate_into(op, konst, r)
        }
    };
    if swapped {
        let ty = op.result_type(&[inner.operands[0].ty(), inner.operands[1].ty()]);
        inner.ty = ty;
    }
    swapped
}

/// `(-x + y) * a + x` in any operand order is `lrp(x, y, a)`.
fn lrp_idiom<'a>(e: &mut Expression<'a>) -> Option<Rvalue<'a>> {
    let mut found = None;
    'search: for mul_pos in 0..2 {
        let Some(product) = e.operands[mul_pos].as_expression().filter(|m| m.op == Op::Mul)
        else {
            continue;
        };
        let x = &e.operands[1 - mul_pos];
        for add_pos in 0..2 {
            let Some(sum) = product.operands[add_pos]
                .as_expression()
                .filter(|s| s.op == Op::Add)
            else {
                continue;
            };
            for neg_pos in 0..2 {
                let Some(negation) = sum.operands[neg_pos]
                    .as_expression()
                    .filter(|n| n.op == Op::Neg)
                else {
                    continue;
                };
                if !negation.operands[0].equals(x, false) {
                    continue;
                }
                let y = &sum.operands[1 - neg_pos];
                let a = &product.operands[1 - add_pos];
                if !x.ty().is_float() || x.ty() != y.ty() || x.ty() != a.ty() {
                    continue;
                }
                found = Some((mul_pos, add_pos, neg_pos));
                break 'search;
            }
        }
    }
    let (mul_pos, add_pos, neg_pos) = found?;
    let x = e.operands[1 - mul_pos].take();
    let product = as_expr_mut(&mut e.operands[mul_pos])?;
    let a = product.operands[1 - add_pos].take();
    let y = take_inner(product, add_pos, 1 - neg_pos)?;
    Some(lrp(x, y, a))
}

/// One side of a product: a dereferenced vector and the channels read.
struct Term<'r, 'a> {
    val: &'r Rvalue<'a>,
    channels: &'r [u8],
}

fn swizzled_term<'r, 'a>(rv: &'r Rvalue<'a>) -> Option<Term<'r, 'a>> {
    let s = rv.as_swizzle()?;
    if s.val.as_deref().is_none() || !s.val.ty().is_vector() {
        return None;
    }
    Some(Term {
        val: &s.val,
        channels: s.mask.as_slice(),
    })
}

/// `a.i * b.j` or `dot(a.ij, b.kl)`.
fn product_terms<'r, 'a>(rv: &'r Rvalue<'a>) -> Option<(Term<'r, 'a>, Term<'r, 'a>)> {
    let e = rv.as_expression()?;
    let l = swizzled_term(e.operands.first()?)?;
    let r = swizzled_term(e.operands.get(1)?)?;
    let ok = match e.op {
        Op::Mul => l.channels.len() == 1 && r.channels.len() == 1,
        Op::Dot => l.channels.len() == r.channels.len(),
        _ => false,
    };
    ok.then_some((l, r))
}

/// `a.x * b.x + a.y * b.y` as `dot(a.xy, b.xy)`, also growing an existing
/// dot product by one more term.
fn dot_idiom<'a>(e: &mut Expression<'a>) -> Option<Rvalue<'a>> {
    if !e.ty.is_float() || !e.ty.is_scalar() {
        return None;
    }
    let (a0, b0) = product_terms(&e.operands[0])?;
    let (a1, b1) = product_terms(&e.operands[1])?;
    let (a1, b1) = if a0.val.equals(a1.val, false) && b0.val.equals(b1.val, false) {
        (a1, b1)
    } else if a0.val.equals(b1.val, false) && b0.val.equals(a1.val, false) {
        (b1, a1)
    } else {
        return None;
    };
    if a0.channels.len() + a1.channels.len() > 4 {
        return None;
    }
    let left = SwizzleMask::new(&[a0.channels, a1.channels].concat());
    let right = SwizzleMask::new(&[b0.channels, b1.channels].concat());
    let (a, b) = (a0.val.clone(), b0.val.clone());
    Some(dot(swizzle(a, left), swizzle(b, right)))
}

/// `floor(abs(x) + 0.5) * sign(x)` is `trunc(x + sign(x) * 0.5)`.
fn round_idiom<'a>(e: &mut Expression<'a>) -> Option<Rvalue<'a>> {
    let matches = |i: usize| -> Option<usize> {
        let sign_e = e.operands[i].as_expression().filter(|s| s.op == Op::Sign)?;
        let floor_e = e.operands[1 - i]
            .as_expression()
            .filter(|f| f.op == Op::Floor)?;
        let sum = floor_e.operands[0]
            .as_expression()
            .filter(|a| a.op == Op::Add)?;
        (0..2).find(|&j| {
            sum.operands[1 - j].is_value(0.5, 0)
                && sum.operands[j]
                    .as_expression()
                    .filter(|a| a.op == Op::Abs)
                    .is_some_and(|a| a.operands[0].equals(&sign_e.operands[0], false))
        })
    };
    let (i, j) = (0..2).find_map(|i| matches(i).map(|j| (i, j)))?;
    let floor_e = e.operands[1 - i].as_expression()?;
    let point_five = floor_e.operands[0].as_expression()?.operands[1 - j].clone();
    let sign_x = e.operands[i].take();
    let x = sign_x.as_expression()?.operands[0].clone();
    Some(trunc(add(x, mul(sign_x, point_five))))
}

fn dot_rules<'a>(e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
    if k.zero(0) || k.zero(1) {
        return Some(zero_of(e));
    }
    for i in 0..2 {
        let Some(c) = k.get(i) else {
            continue;
        };
        let width = c.ty.vector_elements() as usize;
        let live = (0..width as u8)
            .filter(|&ch| c.component(ch as usize).as_f64() != 0.0)
            .collect::<Vec<_>>();
        if live.is_empty() || live.len() >= width {
            continue;
        }
        // drop the channels the constant zeroes out
        let mask = SwizzleMask::new(&live);
        let a = swizzle(e.operands[0].take(), mask);
        let b = swizzle(e.operands[1].take(), mask);
        let op = if live.len() == 1 { Op::Mul } else { Op::Dot };
        return Some(binop(op, a, b));
    }
    None
}

/// `0 < a + b` is `-a < b`, and `a + b < 0` is `a < -b`.
fn compare_sum_with_zero<'a>(e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
    for add_pos in 0..2 {
        let Some(sum) = e.operands[add_pos]
            .as_expression()
            .filter(|s| s.op == Op::Add)
        else {
            continue;
        };
        if !k.zero(1 - add_pos)
            || !sum.ty.is_float()
            || sum.operands[0].ty() != sum.operands[1].ty()
        {
            continue;
        }
        let sum = as_expr_mut(&mut e.operands[add_pos])?;
        let a = sum.operands[0].take();
        let b = sum.operands[1].take();
        return Some(if add_pos == 1 {
            binop(e.op, neg(a), b)
        } else {
            binop(e.op, a, neg(b))
        });
    }
    None
}

fn strictly_between_zero_and_one(c: &Constant) -> bool {
    !c.components().is_empty()
        && c.components().iter().all(|x| {
            let v = x.as_f64();
            v > 0.0 && v < 1.0
        })
}

/// Clamps to `[0, 1]` written with `min` and `max` become `saturate`.
fn saturate_idiom<'a>(e: &mut Expression<'a>, k: &Known) -> Option<Rvalue<'a>> {
    let is_min = e.op == Op::Min;
    let inner_op = if is_min { Op::Max } else { Op::Min };
    for op in 0..2 {
        let Some(outer) = k.get(1 - op) else {
            continue;
        };
        let Some(inner) = e.operands[op].as_expression().filter(|i| i.op == inner_op) else {
            continue;
        };
        if inner.operands.iter().all(|o| o.as_constant().is_none()) {
            break;
        }
        for x_pos in 0..2 {
            let Some(inner_c) = inner.operands[1 - x_pos].as_constant() else {
                continue;
            };
            let x = || inner.operands[x_pos].clone();
            let rewritten = if is_min && inner_c.is_zero() && outer.is_one() {
                // min(max(x, 0), 1)
                saturate(x())
            } else if !is_min && inner_c.is_one() && outer.is_zero() {
                // max(min(x, 1), 0)
                saturate(x())
            } else if is_min && inner_c.is_zero() && strictly_between_zero_and_one(outer) {
                // min(max(x, 0), b)
                saturate(min(x(), constant(outer.clone())))
            } else if !is_min && strictly_between_zero_and_one(inner_c) && outer.is_zero() {
                // max(min(x, b), 0)
                saturate(min(x(), constant(inner_c.clone())))
            } else if !is_min && inner_c.is_one() && strictly_between_zero_and_one(outer) {
                // max(min(x, 1), b)
                saturate(max(x(), constant(outer.clone())))
            } else if is_min && strictly_between_zero_and_one(inner_c) && outer.is_one() {
                // min(max(x, b), 1)
                saturate(max(x(), constant(inner_c.clone())))
            } else {
                continue;
            };
            return Some(rewritten);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, reader::read_instructions, IrArenas};

    fn run_with(src: &str, options: &OptimizerOptions) -> String {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        do_algebraic(&ctx, options, &mut list);
        print_instructions(&list)
    }

    fn run(src: &str) -> String {
        run_with(src, &OptimizerOptions::default())
    }

    /// Simplifies `rhs` assigned to a float output `o` from inputs `a`, `b`
    /// and `c`, returning the new right-hand side.
    fn simplify(ty: &str, rhs: &str) -> String {
        let src = format!(
            "(declare (shader_in) {ty} a)\n\
             (declare (shader_in) {ty} b)\n\
             (declare (shader_in) {ty} c)\n\
             (declare (shader_out) {ty} o)\n\
             (assign () (var_ref o) {rhs})\n"
        );
        let out = run(&src);
        let last = out.lines().last().unwrap();
        let start = last.find("(var_ref o) ").unwrap() + "(var_ref o) ".len();
        last[start..last.len() - 1].to_owned()
    }

    #[test]
    fn additive_and_multiplicative_identities() {
        let out = run(indoc! {"
            (declare (shader_in) vec4 b)
            (declare (shader_out) vec4 c)
            (assign (xyzw) (var_ref c) (expression vec4 * (expression vec4 + (var_ref b) (constant float (0.0))) (constant float (1.0))))
        "});
        assert_eq!(
            out.lines().last().unwrap(),
            "(assign (xyzw) (var_ref c) (var_ref b))"
        );

        assert_eq!(
            simplify("float", "(expression float * (var_ref a) (constant float (0.0)))"),
            "(constant float (0.0))"
        );
        assert_eq!(
            simplify("float", "(expression float * (constant float (-1.0)) (var_ref a))"),
            "(expression float neg (var_ref a))"
        );
        assert_eq!(
            simplify("float", "(expression float - (constant float (0.0)) (var_ref a))"),
            "(expression float neg (var_ref a))"
        );
        assert_eq!(
            simplify("float", "(expression float + (var_ref a) (expression float neg (var_ref a)))"),
            "(constant float (0.0))"
        );
        assert_eq!(
            simplify("float", "(expression float / (constant float (1.0)) (var_ref a))"),
            "(expression float rcp (var_ref a))"
        );
        assert_eq!(
            simplify("int", "(expression int << (var_ref a) (constant int (0)))"),
            "(var_ref a)"
        );
    }

    #[test]
    fn scalar_results_are_broadcast() {
        let out = run(indoc! {"
            (declare (shader_in) float f)
            (declare (shader_out) vec4 o)
            (assign (xyzw) (var_ref o) (expression vec4 + (var_ref f) (constant vec4 (0.0 0.0 0.0 0.0))))
        "});
        assert_eq!(
            out.lines().last().unwrap(),
            "(assign (xyzw) (var_ref o) (swiz xxxx (var_ref f)))"
        );
    }

    #[test]
    fn unary_inverses_cancel() {
        assert_eq!(
            simplify("float", "(expression float neg (expression float neg (var_ref a)))"),
            "(var_ref a)"
        );
        assert_eq!(
            simplify("float", "(expression float abs (expression float neg (var_ref a)))"),
            "(expression float abs (var_ref a))"
        );
        assert_eq!(
            simplify("float", "(expression float exp2 (expression float log2 (var_ref a)))"),
            "(var_ref a)"
        );
        assert_eq!(
            simplify("float", "(expression float rcp (expression float sqrt (var_ref a)))"),
            "(expression float rsq (var_ref a))"
        );
        assert_eq!(
            simplify("int", "(expression int ~ (expression int ~ (var_ref a)))"),
            "(var_ref a)"
        );
    }

    #[test]
    fn negated_comparisons_are_inverted() {
        assert_eq!(
            simplify(
                "bool",
                "(expression bool ! (expression bool ! (var_ref a)))"
            ),
            "(var_ref a)"
        );
        let out = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_out) bool o)
            (assign (x) (var_ref o) (expression bool ! (expression bool < (var_ref a) (var_ref b))))
        "});
        assert_eq!(
            out.lines().last().unwrap(),
            "(assign (x) (var_ref o) (expression bool >= (var_ref a) (var_ref b)))"
        );
    }

    #[test]
    fn constants_are_reassociated_and_folded() {
        assert_eq!(
            simplify(
                "float",
                "(expression float + (constant float (1.0)) (expression float + (var_ref a) (constant float (2.0))))"
            ),
            "(expression float + (var_ref a) (constant float (3.0)))"
        );
        assert_eq!(
            simplify(
                "float",
                "(expression float * (expression float * (constant float (2.0)) (var_ref a)) (constant float (4.0)))"
            ),
            "(expression float * (constant float (8.0)) (var_ref a))"
        );
    }

    #[test]
    fn pow_by_two_squares_through_a_temporary() {
        let out = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_out) float o)
            (assign (x) (var_ref o) (expression float pow (expression float + (var_ref a) (var_ref b)) (constant float (2.0))))
        "});
        assert_eq!(
            out,
            indoc! {"
                (declare (shader_in) float a)
                (declare (shader_in) float b)
                (declare (shader_out) float o)
                (declare (temporary) float algebraic@0)
                (assign (x) (var_ref algebraic@0) (expression float + (var_ref a) (var_ref b)))
                (assign (x) (var_ref o) (expression float * (var_ref algebraic@0) (var_ref algebraic@0)))
            "}
        );
    }

    #[test]
    fn pow_special_cases() {
        assert_eq!(
            simplify("float", "(expression float pow (var_ref a) (constant float (1.0)))"),
            "(var_ref a)"
        );
        assert_eq!(
            simplify("float", "(expression float pow (constant float (2.0)) (var_ref a))"),
            "(expression float exp2 (var_ref a))"
        );
        assert_eq!(
            simplify("float", "(expression float pow (var_ref a) (constant float (4.0)))"),
            "(expression float * (var_ref algebraic@0) (var_ref algebraic@0))"
        );
    }

    #[test]
    fn clamps_become_saturate_when_native() {
        let clamp = "(expression float min (expression float max (var_ref a) (constant float (0.0))) (constant float (1.0)))";
        assert_eq!(
            simplify("float", clamp),
            "(expression float saturate (var_ref a))"
        );
        assert_eq!(
            simplify(
                "float",
                "(expression float max (expression float min (var_ref a) (constant float (0.5))) (constant float (0.0)))"
            ),
            "(expression float saturate (expression float min (var_ref a) (constant float (0.5))))"
        );

        let src = format!(
            "(declare (shader_in) float a)\n(declare (shader_out) float o)\n(assign (x) (var_ref o) {clamp})\n"
        );
        let options = OptimizerOptions {
            native_saturate: false,
            ..Default::default()
        };
        assert!(run_with(&src, &options).contains("min"));
    }

    #[test]
    fn lerp_idiom_is_recognized() {
        assert_eq!(
            simplify(
                "float",
                "(expression float + (expression float * (expression float + (expression float neg (var_ref a)) (var_ref b)) (var_ref c)) (var_ref a))"
            ),
            "(expression float lrp (var_ref a) (var_ref b) (var_ref c))"
        );
    }

    #[test]
    fn sum_compared_with_zero_moves_a_term() {
        let out = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_out) bool o)
            (assign (x) (var_ref o) (expression bool < (constant float (0.0)) (expression float + (var_ref a) (var_ref b))))
        "});
        assert_eq!(
            out.lines().last().unwrap(),
            "(assign (x) (var_ref o) (expression bool < (expression float neg (var_ref a)) (var_ref b)))"
        );
    }

    #[test]
    fn rounding_idiom_becomes_trunc() {
        assert_eq!(
            simplify(
                "float",
                "(expression float * (expression float floor (expression float + (expression float abs (var_ref a)) (constant float (0.5)))) (expression float sign (var_ref a)))"
            ),
            "(expression float trunc (expression float + (var_ref a) (expression float * (expression float sign (var_ref a)) (constant float (0.5)))))"
        );
    }

    #[test]
    fn dot_with_zero_channels_is_narrowed() {
        let out = run(indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) float o)
            (assign (x) (var_ref o) (expression float dot (var_ref v) (constant vec4 (1.0 0.0 0.0 0.0))))
        "});
        assert_eq!(
            out.lines().last().unwrap(),
            "(assign (x) (var_ref o) (expression float * (swiz x (var_ref v)) (constant float (1.0))))"
        );
    }

    #[test]
    fn scalar_products_become_dot_for_aos_targets() {
        let src = indoc! {"
            (declare (shader_in) vec4 a)
            (declare (shader_in) vec4 b)
            (declare (shader_out) float o)
            (assign (x) (var_ref o) (expression float + (expression float * (swiz x (var_ref a)) (swiz x (var_ref b))) (expression float * (swiz y (var_ref b)) (swiz y (var_ref a)))))
        "};
        assert!(!run(src).contains("dot"));
        let options = OptimizerOptions {
            optimize_for_aos: true,
            ..Default::default()
        };
        assert_eq!(
            run_with(src, &options).lines().last().unwrap(),
            "(assign (x) (var_ref o) (expression float dot (swiz xy (var_ref a)) (swiz xy (var_ref b))))"
        );
    }

    #[test]
    fn logic_identities() {
        assert_eq!(
            simplify("bool", "(expression bool && (var_ref a) (constant bool (true)))"),
            "(var_ref a)"
        );
        assert_eq!(
            simplify("bool", "(expression bool || (var_ref a) (constant bool (true)))"),
            "(constant bool (true))"
        );
        assert_eq!(
            simplify("bool", "(expression bool ^^ (var_ref a) (var_ref a))"),
            "(constant bool (false))"
        );
        assert_eq!(
            simplify(
                "bool",
                "(expression bool && (expression bool ! (var_ref a)) (expression bool ! (var_ref b)))"
            ),
            "(expression bool ! (expression bool || (var_ref a) (var_ref b)))"
        );
        assert_eq!(
            simplify(
                "bool",
                "(expression bool || (expression bool ! (var_ref a)) (expression bool ! (var_ref b)))"
            ),
            "(expression bool ! (expression bool && (var_ref a) (var_ref b)))"
        );
        assert_eq!(
            simplify("bool", "(expression bool ^^ (constant bool (true)) (var_ref b))"),
            "(expression bool ! (var_ref b))"
        );
        assert_eq!(
            simplify("bool", "(expression bool ^^ (var_ref a) (constant bool (true)))"),
            "(expression bool ! (var_ref a))"
        );
    }

    #[test]
    fn ternaries_with_constant_selectors() {
        assert_eq!(
            simplify(
                "float",
                "(expression float lrp (var_ref a) (var_ref b) (constant float (1.0)))"
            ),
            "(var_ref b)"
        );
        assert_eq!(
            simplify(
                "float",
                "(expression float fma (var_ref a) (constant float (1.0)) (var_ref b))"
            ),
            "(expression float + (var_ref a) (var_ref b))"
        );
        assert_eq!(
            simplify(
                "float",
                "(expression float csel (constant bool (false)) (var_ref a) (var_ref b))"
            ),
            "(var_ref b)"
        );
    }
}
