//! Merges runs of scalarized component writes back into one vector write.
//!
//! `r.x = f(v.x); r.y = f(v.y);` becomes `r.xy = f(v.xy);`. Only runs of
//! consecutive unconditional single-channel writes to one variable are
//! merged, and each write must read its sources at the channel it writes.

use tracing::debug;

use super::declare_pass;
use crate::ir::{
    basic_block::for_each_basic_block, Deref, ExprOp, Instruction, Rvalue, SwizzleMask, VarRef,
    WriteMask,
};

declare_pass!(
    Vectorize,
    "vectorize",
    |ctx, options, ir| do_vectorize(ir)
);

pub fn do_vectorize(instructions: &mut Vec<Instruction<'_>>) -> bool {
    let mut progress = false;
    for_each_basic_block(instructions, &mut |block| {
        progress |= vectorize_block(block);
    });
    progress
}

/// Operations that accept a scalar operand next to a vector one.
fn broadcasts_scalars(op: ExprOp) -> bool {
    matches!(
        op,
        ExprOp::Add
            | ExprOp::Sub
            | ExprOp::Mul
            | ExprOp::Div
            | ExprOp::Mod
            | ExprOp::Min
            | ExprOp::Max
            | ExprOp::BitAnd
            | ExprOp::BitOr
            | ExprOp::BitXor
    )
}

/// Whether `rv` computes channel `c` of its vector sources and nothing else.
fn is_channel_wise(rv: &Rvalue<'_>, c: u8, lhs: VarRef<'_>, parent: Option<ExprOp>) -> bool {
    match rv {
        Rvalue::Swizzle(s) => {
            s.mask.len() == 1
                && s.mask.get(0) == c
                && s.val.ty().is_vector()
                && s.val.as_var().is_some_and(|v| v != lhs)
        }
        Rvalue::Expression(e) => {
            !e.op.is_horizontal()
                && e.ty.is_scalar()
                && e.operands.iter().all(|o| is_channel_wise(o, c, lhs, Some(e.op)))
        }
        Rvalue::Constant(k) => k.ty.is_scalar() && parent.is_some_and(broadcasts_scalars),
        Rvalue::Deref(Deref::Var(v)) => {
            *v != lhs && v.ty.is_scalar() && parent.is_some_and(broadcasts_scalars)
        }
        Rvalue::Deref(_) | Rvalue::Texture(_) => false,
    }
}

/// Whether `rv` reads at least one vector channel through a swizzle. A
/// right-hand side made only of broadcast scalars has nothing to widen.
fn reads_a_channel(rv: &Rvalue<'_>) -> bool {
    match rv {
        Rvalue::Swizzle(_) => true,
        Rvalue::Expression(e) => e.operands.iter().any(reads_a_channel),
        _ => false,
    }
}

/// Widens every single-channel swizzle to `mask` and retypes the
/// expressions above them.
fn widen(rv: &mut Rvalue<'_>, mask: &SwizzleMask) {
    match rv {
        Rvalue::Swizzle(s) => {
            s.mask = *mask;
            s.ty = s.val.ty().with_vector_elements(mask.len() as u8);
        }
        Rvalue::Expression(e) => {
            for o in e.operands.iter_mut() {
                widen(o, mask);
            }
            let types = e.operands.iter().map(Rvalue::ty).collect::<Vec<_>>();
            e.ty = e.op.result_type(&types);
        }
        _ => (),
    }
}

struct Run {
    var: Option<usize>,
    indices: Vec<usize>,
    channels: WriteMask,
}

/// A single-channel write that could join a run.
fn scalar_write<'r, 'a>(ir: &'r Instruction<'a>) -> Option<(VarRef<'a>, u8, &'r Rvalue<'a>)> {
    let a = ir.as_assignment()?;
    if a.condition.is_some() || a.write_mask.count() != 1 {
        return None;
    }
    let v = a.lhs.as_var()?;
    if !v.ty.is_vector() || v.mode().is_buffer_backed() {
        return None;
    }
    let c = a.write_mask.channels().next()? as u8;
    (is_channel_wise(&a.rhs, c, v, None) && reads_a_channel(&a.rhs)).then_some((v, c, &a.rhs))
}

fn vectorize_block(block: &mut Vec<Instruction<'_>>) -> bool {
    let mut removed = vec![false; block.len()];
    let mut progress = false;
    let mut run = Run {
        var: None,
        indices: Vec::new(),
        channels: WriteMask::empty(),
    };

    for i in 0..block.len() {
        let joins = match (scalar_write(&block[i]), run.var) {
            (Some((v, c, rhs)), Some(first)) => {
                scalar_write(&block[first]).is_some_and(|(w, _, first_rhs)| {
                    v == w
                        && !run.channels.contains(WriteMask::from_channel(c as usize))
                        && rhs.equals(first_rhs, true)
                })
            }
            _ => false,
        };
        if !joins {
            progress |= flush(block, &mut run, &mut removed);
        }
        if let Some((_, c, _)) = scalar_write(&block[i]) {
            run.var.get_or_insert(i);
            run.indices.push(i);
            run.channels |= WriteMask::from_channel(c as usize);
        }
    }
    progress |= flush(block, &mut run, &mut removed);

    if progress {
        let mut i = 0;
        block.retain(|_| {
            let keep = !removed[i];
            i += 1;
            keep
        });
    }
    progress
}

fn flush(block: &mut [Instruction<'_>], run: &mut Run, removed: &mut [bool]) -> bool {
    let indices = std::mem::take(&mut run.indices);
    let channels = std::mem::replace(&mut run.channels, WriteMask::empty());
    run.var = None;
    let Some((&last, rest)) = indices.split_last() else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }

    let components = channels.channels().map(|c| c as u8).collect::<Vec<_>>();
    let mask = SwizzleMask::new(&components);
    let Some(a) = block[last].as_assignment_mut() else {
        return false;
    };
    a.write_mask = channels;
    widen(&mut a.rhs, &mask);
    debug!("[Vectorize] merged {} writes into .{}", indices.len(), channels.letters());
    for &i in rest {
        removed[i] = true;
    }
    true
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{
        print::print_instructions, reader::read_instructions, validate::validate, IrArenas,
        IrContext,
    };

    fn run(src: &str) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let progress = do_vectorize(&mut list);
        (progress, print_instructions(&list))
    }

    #[test]
    fn scalarized_log2_becomes_one_vector_write() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec4 r)
            (assign (x) (var_ref r) (expression float log2 (swiz x (var_ref v))))
            (assign (y) (var_ref r) (expression float log2 (swiz y (var_ref v))))
            (assign (z) (var_ref r) (expression float log2 (swiz z (var_ref v))))
            (assign (w) (var_ref r) (expression float log2 (swiz w (var_ref v))))
        "});
        assert!(progress);
        assert_eq!(
            out,
            indoc! {"
                (declare (shader_in) vec4 v)
                (declare (shader_out) vec4 r)
                (assign (xyzw) (var_ref r) (expression vec4 log2 (swiz xyzw (var_ref v))))
            "}
        );
    }

    #[test]
    fn scalar_operands_are_broadcast() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec3 v)
            (declare (uniform) float s)
            (declare (shader_out) vec3 r)
            (assign (x) (var_ref r) (expression float * (swiz x (var_ref v)) (var_ref s)))
            (assign (z) (var_ref r) (expression float * (swiz z (var_ref v)) (var_ref s)))
        "});
        assert!(progress);
        assert!(
            out.contains("(assign (xz) (var_ref r) (expression vec2 * (swiz xz (var_ref v)) (var_ref s)))"),
            "{out}"
        );
    }

    #[test]
    fn cross_channel_and_mismatched_writes_stay_scalar() {
        let src = indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec4 r)
            (assign (x) (var_ref r) (expression float neg (swiz y (var_ref v))))
            (assign (y) (var_ref r) (expression float neg (swiz x (var_ref v))))
            (assign (z) (var_ref r) (expression float abs (swiz z (var_ref v))))
            (assign (w) (var_ref r) (expression float neg (swiz w (var_ref v))))
        "};
        let (progress, out) = run(src);
        assert!(!progress);
        assert_eq!(out, src);
    }

    #[test]
    fn runs_break_at_other_instructions_and_self_reads() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec2 v)
            (declare () vec2 r)
            (declare (shader_out) vec2 o)
            (assign (x) (var_ref r) (expression float sqrt (swiz x (var_ref v))))
            (emit-vertex)
            (assign (y) (var_ref r) (expression float sqrt (swiz y (var_ref v))))
            (assign (x) (var_ref o) (expression float + (swiz x (var_ref o)) (swiz x (var_ref r))))
            (assign (y) (var_ref o) (expression float + (swiz y (var_ref o)) (swiz y (var_ref r))))
        "});
        assert!(!progress);
        assert_eq!(out.matches("(assign (").count(), 4);
    }

    #[test]
    fn broadcast_only_writes_are_not_merged() {
        let src = indoc! {"
            (declare (uniform) float s)
            (declare (uniform) float t)
            (declare (shader_out) vec2 r)
            (assign (x) (var_ref r) (expression float * (var_ref s) (var_ref t)))
            (assign (y) (var_ref r) (expression float * (var_ref s) (var_ref t)))
        "};
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        assert!(!do_vectorize(&mut list));
        validate(&mut list).unwrap();
        assert_eq!(print_instructions(&list), src);
    }
}
