//! Turns dynamic indexing of vector components into conditional writes.
//!
//! `v[i]` becomes a temporary assigned once per component under
//! `i == c`; `v[i] = x` becomes one conditional write per component. A
//! constant index turns into a plain swizzle or write mask.

use tracing::debug;

use super::{constant_index, declare_temporary, index_constant, store_temporary};
use crate::ir::{
    builder::{channel, cond_assign, equal, logic_and, swizzle, var},
    opt::declare_pass,
    visitor::{visit_list_emitting, Emitter, Visitor},
    Assignment, Deref, ExprOp, Instruction, IrContext, Rvalue, SwizzleMask, WriteMask,
};

declare_pass!(
    VecIndexToCondAssign,
    "vec_index_to_cond_assign",
    |ctx, options, ir| lower_vec_index_to_cond_assign(ctx, ir)
);

pub fn lower_vec_index_to_cond_assign<'a>(
    ctx: &IrContext<'a>,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    let mut progress = lower_writes(ctx, instructions);
    let mut v = VecIndexVisitor {
        ctx,
        pending: Vec::new(),
        progress: false,
    };
    visit_list_emitting(&mut v, instructions);
    progress |= v.progress;
    progress
}

fn lower_writes<'a>(ctx: &IrContext<'a>, list: &mut Vec<Instruction<'a>>) -> bool {
    let mut progress = false;
    let mut i = 0;
    while i < list.len() {
        match &mut list[i] {
            Instruction::If(ir) => {
                progress |= lower_writes(ctx, &mut ir.then_instructions);
                progress |= lower_writes(ctx, &mut ir.else_instructions);
            }
            Instruction::Loop(l) => progress |= lower_writes(ctx, &mut l.body),
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    progress |= lower_writes(ctx, &mut sig.body);
                }
            }
            _ => (),
        }
        let replacement = list[i]
            .as_assignment_mut()
            .and_then(|a| split_component_write(ctx, a));
        if let Some(replacement) = replacement {
            let n = replacement.len();
            list.splice(i..=i, replacement);
            i += n;
            progress = true;
            continue;
        }
        i += 1;
    }
    progress
}

/// `base[index] = rhs` where `base` is a vector.
fn split_component_write<'a>(
    ctx: &IrContext<'a>,
    a: &mut Assignment<'a>,
) -> Option<Vec<Instruction<'a>>> {
    let Deref::Array(ad) = &mut a.lhs else {
        return None;
    };
    if !ad.array.ty().is_vector() {
        return None;
    }
    let Rvalue::Deref(base) = &*ad.array else {
        return None;
    };
    let base = base.clone();
    let n = ad.array.ty().vector_elements() as usize;

    if let Some(c) = constant_index(&ad.index) {
        if c >= n {
            return None;
        }
        debug!("[VecIndexToCondAssign] constant component write .{}", WriteMask::from_channel(c).letters());
        return Some(vec![Instruction::Assignment(Assignment {
            lhs: base,
            rhs: a.rhs.take(),
            condition: a.condition.take(),
            write_mask: WriteMask::from_channel(c),
        })]);
    }

    let mut out = Vec::new();
    let index_ty = ad.index.ty().clone();
    let index = store_temporary(ctx, &mut out, "vec_index", ad.index.take());
    let value = store_temporary(ctx, &mut out, "vec_value", a.rhs.take());
    let guard = a
        .condition
        .take()
        .map(|c| store_temporary(ctx, &mut out, "vec_cond", c));
    for c in 0..n {
        let test = equal(var(index), index_constant(&index_ty, c));
        let test = match guard {
            Some(g) => logic_and(var(g), test),
            None => test,
        };
        out.push(cond_assign(base.clone(), var(value), WriteMask::from_channel(c), test));
    }
    debug!("[VecIndexToCondAssign] split dynamic component write into {n} conditional writes");
    Some(out)
}

struct VecIndexVisitor<'c, 'a> {
    ctx: &'c IrContext<'a>,
    pending: Vec<Instruction<'a>>,
    progress: bool,
}
impl<'a> Emitter<'a> for VecIndexVisitor<'_, 'a> {
    fn pending(&mut self) -> &mut Vec<Instruction<'a>> {
        &mut self.pending
    }
}
impl<'a> VecIndexVisitor<'_, 'a> {
    /// `vector[index]` as a temporary filled by conditional writes.
    fn extract(&mut self, vector: Rvalue<'a>, index: Rvalue<'a>) -> Rvalue<'a> {
        let n = vector.ty().vector_elements() as usize;
        let result_ty = vector.ty().scalar_type();
        let index_ty = index.ty().clone();
        let src = store_temporary(self.ctx, &mut self.pending, "vec_index_src", vector);
        let idx = store_temporary(self.ctx, &mut self.pending, "vec_index", index);
        let result = declare_temporary(self.ctx, &mut self.pending, "vec_index_result", result_ty);
        for c in 0..n {
            self.pending.push(cond_assign(
                Deref::Var(result),
                channel(var(src), c as u8),
                WriteMask::X,
                equal(var(idx), index_constant(&index_ty, c)),
            ));
        }
        var(result)
    }

    /// `vector_insert(vector, value, index)` as a temporary copy with one
    /// conditionally replaced component.
    fn insert(&mut self, vector: Rvalue<'a>, value: Rvalue<'a>, index: Rvalue<'a>) -> Rvalue<'a> {
        let n = vector.ty().vector_elements() as usize;
        let index_ty = index.ty().clone();
        let result = store_temporary(self.ctx, &mut self.pending, "vec_insert", vector);
        let value = store_temporary(self.ctx, &mut self.pending, "vec_insert_value", value);
        let idx = store_temporary(self.ctx, &mut self.pending, "vec_index", index);
        for c in 0..n {
            self.pending.push(cond_assign(
                Deref::Var(result),
                var(value),
                WriteMask::from_channel(c),
                equal(var(idx), index_constant(&index_ty, c)),
            ));
        }
        var(result)
    }
}
impl<'a> Visitor<'a> for VecIndexVisitor<'_, 'a> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        match rvalue {
            Rvalue::Deref(Deref::Array(ad)) if ad.array.ty().is_vector() => {
                let n = ad.array.ty().vector_elements() as usize;
                *rvalue = match constant_index(&ad.index) {
                    Some(c) if c < n => swizzle(ad.array.take(), SwizzleMask::new(&[c as u8])),
                    Some(_) => return,
                    None => {
                        let (vector, index) = (ad.array.take(), ad.index.take());
                        self.extract(vector, index)
                    }
                };
            }
            Rvalue::Expression(e) if e.op == ExprOp::VectorExtract => {
                let n = e.operands[0].ty().vector_elements() as usize;
                *rvalue = match constant_index(&e.operands[1]) {
                    Some(c) if c < n => swizzle(e.operands[0].take(), SwizzleMask::new(&[c as u8])),
                    Some(_) => return,
                    None => {
                        let (vector, index) = (e.operands[0].take(), e.operands[1].take());
                        self.extract(vector, index)
                    }
                };
            }
            Rvalue::Expression(e)
                if e.op == ExprOp::VectorInsert && constant_index(&e.operands[2]).is_none() =>
            {
                let vector = e.operands[0].take();
                let value = e.operands[1].take();
                let index = e.operands[2].take();
                *rvalue = self.insert(vector, value, index);
            }
            _ => return,
        }
        debug!("[VecIndexToCondAssign] lowered a component index");
        self.progress = true;
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{
        print::print_instructions, reader::read_instructions, validate::validate, IrArenas,
    };

    fn run(src: &str) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let progress = lower_vec_index_to_cond_assign(&ctx, &mut list);
        validate(&mut list).unwrap();
        (progress, print_instructions(&list))
    }

    #[test]
    fn dynamic_reads_become_conditional_copies() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec3 v)
            (declare (uniform) int i)
            (declare (shader_out) float o)
            (assign (x) (var_ref o) (array_ref (var_ref v) (var_ref i)))
        "});
        assert!(progress);
        for c in ["x", "y", "z"] {
            assert!(out.contains(&format!("(swiz {c} (var_ref vec_index_src@0))")), "{out}");
        }
        assert!(out.contains("(expression bool == (var_ref vec_index@1) (constant int (2)))"), "{out}");
        assert!(out.ends_with("(assign (x) (var_ref o) (var_ref vec_index_result@2))\n"), "{out}");
    }

    #[test]
    fn constant_indices_become_swizzles_and_masks() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec4 o)
            (assign (x) (array_ref (var_ref o) (constant int (3))) (array_ref (var_ref v) (constant int (1))))
        "});
        assert!(progress);
        assert!(out.contains("(assign (w) (var_ref o) (swiz y (var_ref v)))"), "{out}");
    }

    #[test]
    fn dynamic_writes_are_split_per_component() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) float x)
            (declare (uniform) uint i)
            (declare (shader_out) vec2 o)
            (assign (x) (array_ref (var_ref o) (var_ref i)) (var_ref x))
        "});
        assert!(progress);
        assert!(out.contains("(constant uint (0))"), "{out}");
        assert!(out.contains("(assign (expression bool == (var_ref vec_index@0) (constant uint (1))) (y) (var_ref o) (var_ref vec_value@1))"), "{out}");
    }
}
