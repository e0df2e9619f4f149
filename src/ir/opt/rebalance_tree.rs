//! Reshapes long reduction chains (`a + b + c + d + ...`) into balanced
//! trees so independent partial results can be computed in parallel.
//!
//! The chain is flattened into its in-order leaf sequence (the "vine"),
//! then rebuilt by compression rounds: a first partial round folds just
//! enough leading pairs to leave a power-of-two leaf count, every further
//! round folds all adjacent pairs. Leaf order is preserved throughout.

use tracing::debug;

use super::declare_pass;
use crate::ir::{
    visitor::{visit_list, Visitor},
    Deref, ExprOp, Expression, GlslType, Instruction, Rvalue,
};

declare_pass!(
    RebalanceTree,
    "rebalance_tree",
    |ctx, options, ir| do_rebalance_tree(ir)
);

#[derive(Default)]
struct Reduction {
    leaves: usize,
    constants: usize,
    /// Depth counted in reduction nodes only.
    depth: usize,
    rejected: bool,
}

fn is_reduction_node(rv: &Rvalue<'_>, op: ExprOp, ty: &GlslType) -> bool {
    rv.as_expression().is_some_and(|e| {
        e.op == op && e.ty.base_type() == ty.base_type() && !e.ty.is_matrix()
    })
}

fn analyze(rv: &Rvalue<'_>, op: ExprOp, ty: &GlslType, r: &mut Reduction) -> usize {
    if is_reduction_node(rv, op, ty) {
        if let Some(e) = rv.as_expression() {
            let depth = e
                .operands
                .iter()
                .map(|o| analyze(o, op, ty, r))
                .max()
                .unwrap_or(0);
            return depth + 1;
        }
    }
    r.leaves += 1;
    match rv {
        Rvalue::Constant(_) => r.constants += 1,
        Rvalue::Deref(Deref::Array(_) | Deref::Record(_)) => r.rejected = true,
        Rvalue::Swizzle(s) if matches!(*s.val, Rvalue::Deref(Deref::Array(_) | Deref::Record(_))) => {
            r.rejected = true
        }
        _ if rv.ty().is_matrix() => r.rejected = true,
        _ => (),
    }
    0
}

fn flatten<'a>(rv: Rvalue<'a>, op: ExprOp, ty: &GlslType, out: &mut Vec<Rvalue<'a>>) {
    if is_reduction_node(&rv, op, ty) {
        if let Rvalue::Expression(e) = rv {
            for o in e.operands {
                flatten(o, op, ty, out);
            }
            return;
        }
    }
    out.push(rv);
}

/// Combines two subtrees, taking the wider operand's type.
fn join<'a>(op: ExprOp, a: Rvalue<'a>, b: Rvalue<'a>) -> Rvalue<'a> {
    let ty = if a.ty().components() >= b.ty().components() {
        a.ty().clone()
    } else {
        b.ty().clone()
    };
    Rvalue::Expression(Expression {
        op,
        ty,
        operands: vec![a, b],
    })
}

fn compress<'a>(op: ExprOp, vine: Vec<Rvalue<'a>>, pairs: usize) -> Vec<Rvalue<'a>> {
    let mut out = Vec::with_capacity(vine.len() - pairs);
    let mut it = vine.into_iter();
    for _ in 0..pairs {
        if let (Some(a), Some(b)) = (it.next(), it.next()) {
            out.push(join(op, a, b));
        }
    }
    out.extend(it);
    out
}

fn rebuild<'a>(op: ExprOp, mut vine: Vec<Rvalue<'a>>) -> Option<Rvalue<'a>> {
    let full = vine.len().next_power_of_two();
    if full != vine.len() {
        let target = full / 2;
        let pairs = vine.len() - target;
        vine = compress(op, vine, pairs);
    }
    while vine.len() > 1 {
        let pairs = vine.len() / 2;
        vine = compress(op, vine, pairs);
    }
    vine.pop()
}

#[derive(Default)]
struct RebalanceVisitor {
    progress: bool,
}
impl<'a> Visitor<'a> for RebalanceVisitor {
    fn handle_rvalue_enter(&mut self, rvalue: &mut Rvalue<'a>) {
        let Some(e) = rvalue.as_expression() else {
            return;
        };
        if !e.op.is_associative_commutative() || e.ty.is_matrix() {
            return;
        }
        let (op, ty) = (e.op, e.ty.clone());

        let mut r = Reduction::default();
        r.depth = analyze(rvalue, op, &ty, &mut r);
        let expressions = r.leaves.saturating_sub(1);
        if r.rejected || r.constants > 1 || expressions <= 2 {
            return;
        }
        let balanced_depth = r.leaves.next_power_of_two().trailing_zeros() as usize;
        if r.depth <= balanced_depth {
            return;
        }

        let mut vine = Vec::with_capacity(r.leaves);
        flatten(rvalue.take(), op, &ty, &mut vine);
        if let Some(tree) = rebuild(op, vine) {
            debug!("[RebalanceTree] {} leaves of {}: depth {} -> {}", r.leaves, op.name(), r.depth, balanced_depth);
            *rvalue = tree;
            self.progress = true;
        }
    }
}

pub fn do_rebalance_tree(instructions: &mut [Instruction<'_>]) -> bool {
    let mut v = RebalanceVisitor::default();
    visit_list(&mut v, instructions);
    v.progress
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, reader::read_instructions, IrArenas, IrContext};

    fn run(src: &str) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let progress = do_rebalance_tree(&mut list);
        (progress, print_instructions(&list))
    }

    #[test]
    fn left_deep_sum_becomes_balanced() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_in) float c)
            (declare (shader_in) float d)
            (declare (shader_out) float o)
            (assign (x) (var_ref o)
              (expression float + (expression float + (expression float + (var_ref a) (var_ref b)) (var_ref c)) (var_ref d)))
        "});
        assert!(progress);
        assert!(
            out.contains(
                "(expression float + (expression float + (var_ref a) (var_ref b)) (expression float + (var_ref c) (var_ref d)))"
            ),
            "{out}"
        );

        let (progress, _) = run(&out);
        assert!(!progress);
    }

    #[test]
    fn odd_leaf_counts_keep_order() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_in) float c)
            (declare (shader_in) float d)
            (declare (shader_in) float e)
            (declare (shader_out) float o)
            (assign (x) (var_ref o)
              (expression float * (expression float * (expression float * (expression float * (var_ref a) (var_ref b)) (var_ref c)) (var_ref d)) (var_ref e)))
        "});
        assert!(progress);
        // a*b is folded first to get a power-of-two count, then pairs
        assert!(
            out.contains(
                "(expression float * (expression float * (expression float * (var_ref a) (var_ref b)) (var_ref c)) (expression float * (var_ref d) (var_ref e)))"
            ),
            "{out}"
        );
    }

    #[test]
    fn mixed_width_leaves_take_the_wider_type() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_in) vec3 c)
            (declare (shader_in) vec3 d)
            (declare (shader_out) vec3 o)
            (assign (xyz) (var_ref o)
              (expression vec3 + (expression vec3 + (expression float + (var_ref a) (var_ref b)) (var_ref c)) (var_ref d)))
        "});
        assert!(progress);
        assert!(
            out.contains(
                "(expression vec3 + (expression float + (var_ref a) (var_ref b)) (expression vec3 + (var_ref c) (var_ref d)))"
            ),
            "{out}"
        );
    }

    #[test]
    fn array_leaves_and_short_chains_are_left_alone() {
        let (progress, _) = run(indoc! {"
            (declare (uniform) (array float 4) arr)
            (declare (shader_in) int i)
            (declare (shader_in) float b)
            (declare (shader_in) float c)
            (declare (shader_in) float d)
            (declare (shader_out) float o)
            (declare (shader_out) float p)
            (assign (x) (var_ref o)
              (expression float + (expression float + (expression float + (array_ref (var_ref arr) (var_ref i)) (var_ref b)) (var_ref c)) (var_ref d)))
            (assign (x) (var_ref p)
              (expression float + (expression float + (var_ref b) (var_ref c)) (var_ref d)))
        "});
        assert!(!progress);
    }

    #[test]
    fn two_constants_block_rebalancing() {
        let (progress, _) = run(indoc! {"
            (declare (shader_in) float a)
            (declare (shader_in) float b)
            (declare (shader_out) float o)
            (assign (x) (var_ref o)
              (expression float + (expression float + (expression float + (var_ref a) (constant float (1.0))) (var_ref b)) (constant float (2.0))))
        "});
        assert!(!progress);
    }
}
