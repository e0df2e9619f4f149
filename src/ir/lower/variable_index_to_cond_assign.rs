//! Replaces non-constant array (and matrix column) indexing with a chain
//! of conditional assignments, for storage classes the target cannot
//! address indirectly.

use tracing::debug;

use super::{constant_index, declare_temporary, index_constant, store_temporary};
use crate::ir::{
    builder::{array_ref, cond_assign, equal, full_write_mask, logic_and, var},
    opt::{declare_pass, OptimizerOptions},
    visitor::{visit_list_emitting, Emitter, Visitor},
    ArrayDeref, Assignment, Deref, GlslType, Instruction, IrContext, Rvalue, VariableMode,
};

declare_pass!(
    VariableIndexToCondAssign,
    "variable_index_to_cond_assign",
    |ctx, options, ir| lower_variable_index_to_cond_assign(ctx, options, ir)
);

/// Number of addressable elements behind an index, if it can be lowered.
fn indexable_length(ty: &GlslType) -> Option<usize> {
    match ty {
        GlslType::Array { length, .. } => Some(*length),
        t if t.is_matrix() => Some(t.matrix_columns() as usize),
        _ => None,
    }
}

fn should_lower(ad: &ArrayDeref<'_>, options: &OptimizerOptions) -> bool {
    if indexable_length(ad.array.ty()).is_none() || constant_index(&ad.index).is_some() {
        return false;
    }
    let Some(root) = ad.array.variable_referenced() else {
        return false;
    };
    match root.mode() {
        VariableMode::ShaderIn => options.lower_indirect_inputs,
        VariableMode::ShaderOut => options.lower_indirect_outputs,
        VariableMode::Uniform => options.lower_indirect_uniforms,
        VariableMode::Auto
        | VariableMode::Temporary
        | VariableMode::FunctionIn
        | VariableMode::FunctionOut
        | VariableMode::FunctionInout
        | VariableMode::ConstIn => options.lower_indirect_temps,
        VariableMode::ShaderStorage | VariableMode::Shared | VariableMode::SystemValue => false,
    }
}

pub fn lower_variable_index_to_cond_assign<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    if !(options.lower_indirect_inputs
        || options.lower_indirect_outputs
        || options.lower_indirect_temps
        || options.lower_indirect_uniforms)
    {
        return false;
    }
    let mut progress = lower_writes(ctx, options, instructions);
    let mut v = IndexVisitor {
        ctx,
        options,
        pending: Vec::new(),
        progress: false,
    };
    visit_list_emitting(&mut v, instructions);
    progress |= v.progress;
    progress
}

/// The outermost dynamically indexed array dereference in a write target.
fn dynamic_index_mut<'d, 'a>(
    d: &'d mut Deref<'a>,
    options: &OptimizerOptions,
) -> Option<&'d mut ArrayDeref<'a>> {
    match d {
        Deref::Var(_) => None,
        Deref::Array(ad) => {
            if should_lower(ad, options) {
                Some(ad)
            } else {
                match &mut *ad.array {
                    Rvalue::Deref(inner) => dynamic_index_mut(inner, options),
                    _ => None,
                }
            }
        }
        Deref::Record(r) => match &mut *r.record {
            Rvalue::Deref(inner) => dynamic_index_mut(inner, options),
            _ => None,
        },
    }
}

fn lower_writes<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    list: &mut Vec<Instruction<'a>>,
) -> bool {
    let mut progress = false;
    let mut i = 0;
    while i < list.len() {
        match &mut list[i] {
            Instruction::If(ir) => {
                progress |= lower_writes(ctx, options, &mut ir.then_instructions);
                progress |= lower_writes(ctx, options, &mut ir.else_instructions);
            }
            Instruction::Loop(l) => progress |= lower_writes(ctx, options, &mut l.body),
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    progress |= lower_writes(ctx, options, &mut sig.body);
                }
            }
            _ => (),
        }
        let replacement = list[i]
            .as_assignment_mut()
            .and_then(|a| split_element_write(ctx, options, a));
        match replacement {
            // the split writes may still index dynamically further in
            Some(replacement) => {
                list.splice(i..=i, replacement);
                progress = true;
            }
            None => i += 1,
        }
    }
    progress
}

fn split_element_write<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    a: &mut Assignment<'a>,
) -> Option<Vec<Instruction<'a>>> {
    let ad = dynamic_index_mut(&mut a.lhs, options)?;
    let length = indexable_length(ad.array.ty())?;
    let index_ty = ad.index.ty().clone();

    let mut out = Vec::new();
    let index = store_temporary(ctx, &mut out, "index", ad.index.take());
    *ad.index = var(index);

    let value = store_temporary(ctx, &mut out, "index_value", a.rhs.take());
    let guard = a
        .condition
        .take()
        .map(|c| store_temporary(ctx, &mut out, "index_cond", c));
    for k in 0..length {
        let mut lhs = a.lhs.clone();
        if let Some(target) = dynamic_index_mut(&mut lhs, options) {
            *target.index = index_constant(&index_ty, k);
        }
        let test = equal(var(index), index_constant(&index_ty, k));
        let test = match guard {
            Some(g) => logic_and(var(g), test),
            None => test,
        };
        out.push(cond_assign(lhs, var(value), a.write_mask, test));
    }
    debug!("[VariableIndexToCondAssign] split indirect write into {length} conditional writes");
    Some(out)
}

struct IndexVisitor<'c, 'a> {
    ctx: &'c IrContext<'a>,
    options: &'c OptimizerOptions,
    pending: Vec<Instruction<'a>>,
    progress: bool,
}
impl<'a> Emitter<'a> for IndexVisitor<'_, 'a> {
    fn pending(&mut self) -> &mut Vec<Instruction<'a>> {
        &mut self.pending
    }
}
impl<'a> Visitor<'a> for IndexVisitor<'_, 'a> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        let Rvalue::Deref(Deref::Array(ad)) = rvalue else {
            return;
        };
        if !should_lower(ad, self.options) {
            return;
        }
        let Some(length) = indexable_length(ad.array.ty()) else {
            return;
        };
        let element_ty = ad.ty.clone();
        let index_ty = ad.index.ty().clone();
        let base = ad.array.take();
        let index = store_temporary(self.ctx, &mut self.pending, "index", ad.index.take());
        let result = declare_temporary(self.ctx, &mut self.pending, "index_result", element_ty.clone());
        for k in 0..length {
            self.pending.push(cond_assign(
                Deref::Var(result),
                Rvalue::Deref(array_ref(base.clone(), index_constant(&index_ty, k))),
                full_write_mask(&element_ty),
                equal(var(index), index_constant(&index_ty, k)),
            ));
        }
        debug!("[VariableIndexToCondAssign] lowered indirect read of {length} elements");
        *rvalue = var(result);
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

    fn run(src: &str, options: &OptimizerOptions) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let progress = lower_variable_index_to_cond_assign(&ctx, options, &mut list);
        validate(&mut list).unwrap();
        (progress, print_instructions(&list))
    }

    const UNIFORM_READ: &str = indoc! {"
        (declare (uniform) (array vec4 3) colors)
        (declare (shader_in) int i)
        (declare (shader_out) vec4 o)
        (assign (xyzw) (var_ref o) (array_ref (var_ref colors) (var_ref i)))
    "};

    #[test]
    fn reads_are_gated_by_storage_class() {
        let (progress, _) = run(UNIFORM_READ, &OptimizerOptions::default());
        assert!(!progress);

        let options = OptimizerOptions {
            lower_indirect_temps: true,
            ..Default::default()
        };
        let (progress, _) = run(UNIFORM_READ, &options);
        assert!(!progress);

        let options = OptimizerOptions {
            lower_indirect_uniforms: true,
            ..Default::default()
        };
        let (progress, out) = run(UNIFORM_READ, &options);
        assert!(progress);
        assert_eq!(out.matches("(array_ref (var_ref colors) (constant int (").count(), 3);
        assert!(out.ends_with("(assign (xyzw) (var_ref o) (var_ref index_result@1))\n"), "{out}");
    }

    #[test]
    fn writes_become_one_guarded_write_per_element() {
        let options = OptimizerOptions {
            lower_indirect_temps: true,
            ..Default::default()
        };
        let (progress, out) = run(
            indoc! {"
                (declare (shader_in) int i)
                (declare (shader_in) float x)
                (declare (uniform) bool c)
                (declare () (array float 2) a)
                (declare (shader_out) float o)
                (assign (var_ref c) (x) (array_ref (var_ref a) (var_ref i)) (var_ref x))
                (assign (x) (var_ref o) (array_ref (var_ref a) (constant int (1))))
            "},
            &options,
        );
        assert!(progress);
        assert!(
            out.contains(
                "(assign (expression bool && (var_ref index_cond@2) (expression bool == (var_ref index@0) (constant int (1)))) (x) (array_ref (var_ref a) (constant int (1))) (var_ref index_value@1))"
            ),
            "{out}"
        );
        assert!(out.contains("(assign (x) (var_ref o) (array_ref (var_ref a) (constant int (1))))"));
    }

    #[test]
    fn matrix_columns_are_indexable() {
        let options = OptimizerOptions {
            lower_indirect_temps: true,
            ..Default::default()
        };
        let (progress, out) = run(
            indoc! {"
                (declare () mat2 m)
                (declare (shader_in) int i)
                (declare (shader_out) vec2 o)
                (assign (xy) (var_ref o) (array_ref (var_ref m) (var_ref i)))
            "},
            &options,
        );
        assert!(progress);
        assert!(out.contains("(array_ref (var_ref m) (constant int (1)))"), "{out}");
    }
}
