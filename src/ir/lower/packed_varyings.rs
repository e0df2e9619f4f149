//! Splits `dvec3`/`dvec4` shader inputs and outputs into `dvec2`-sized
//! varyings for targets whose varying slots hold at most four 32-bit words.
//!
//! The original variable stays as a private temporary. Inputs are copied
//! into it on entry to `main`; outputs are copied out before every
//! `emit-vertex`, before every return from `main` and at its end.

use tracing::debug;

use crate::ir::{
    builder::{assign, swizzle, var},
    opt::{declare_pass, OptimizerOptions},
    Deref, GlslType, Instruction, IrContext, ScalarType, SwizzleMask, VarRef, VariableMode,
    WriteMask,
};

declare_pass!(
    LowerPackedVaryings,
    "packed_varyings",
    |ctx, options, ir| lower_packed_varyings(ctx, options, ir)
);

/// A wide varying and the two halves now carrying it.
#[derive(Clone, Copy)]
struct Split<'a> {
    original: VarRef<'a>,
    low: VarRef<'a>,
    high: VarRef<'a>,
}
impl<'a> Split<'a> {
    fn high_channels(&self) -> &'static [u8] {
        if self.original.ty.vector_elements() == 4 {
            &[2, 3]
        } else {
            &[2]
        }
    }

    /// `original.xy = low; original.z(w) = high;`
    fn copy_in(&self) -> [Instruction<'a>; 2] {
        let high = self.high_channels();
        let high_mask = high
            .iter()
            .fold(WriteMask::empty(), |m, &c| m | WriteMask::from_channel(c as usize));
        [
            assign(Deref::Var(self.original), var(self.low), WriteMask::from_count(2)),
            assign(Deref::Var(self.original), var(self.high), high_mask),
        ]
    }

    /// `low = original.xy; high = original.z(w);`
    fn copy_out(&self) -> [Instruction<'a>; 2] {
        let high = self.high_channels();
        [
            assign(
                Deref::Var(self.low),
                swizzle(var(self.original), SwizzleMask::new(&[0, 1])),
                WriteMask::from_count(2),
            ),
            assign(
                Deref::Var(self.high),
                swizzle(var(self.original), SwizzleMask::new(high)),
                WriteMask::from_count(high.len()),
            ),
        ]
    }
}

fn is_wide_double(ty: &GlslType) -> bool {
    ty.base_type() == Some(ScalarType::Double) && ty.is_vector() && ty.vector_elements() > 2
}

pub fn lower_packed_varyings<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    if !options.lower_double_varyings {
        return false;
    }
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    let mut i = 0;
    while i < instructions.len() {
        let Instruction::Variable(v) = instructions[i] else {
            i += 1;
            continue;
        };
        let mode = v.mode();
        if !matches!(mode, VariableMode::ShaderIn | VariableMode::ShaderOut) || !is_wide_double(&v.ty) {
            i += 1;
            continue;
        }
        let high_ty = GlslType::vec(ScalarType::Double, v.ty.vector_elements() - 2);
        let split = Split {
            original: v,
            low: ctx.new_variable(format!("{}.0", v.name), GlslType::vec(ScalarType::Double, 2), mode),
            high: ctx.new_variable(format!("{}.1", v.name), high_ty, mode),
        };
        v.set_mode(VariableMode::Temporary);
        debug!("[LowerPackedVaryings] split {} {}", v.ty.name(), v.name);
        instructions.insert(i + 1, Instruction::Variable(split.low));
        instructions.insert(i + 2, Instruction::Variable(split.high));
        if mode == VariableMode::ShaderIn {
            inputs.push(split);
        } else {
            outputs.push(split);
        }
        i += 3;
    }
    if inputs.is_empty() && outputs.is_empty() {
        return false;
    }

    let copy_out = outputs.iter().flat_map(Split::copy_out).collect::<Vec<_>>();
    for ir in instructions.iter_mut() {
        let Instruction::Function(f) = ir else {
            continue;
        };
        let is_main = f.name == "main";
        for sig in f.signatures.iter_mut() {
            if !copy_out.is_empty() {
                insert_copies(&mut sig.body, &copy_out, is_main);
                if is_main && !matches!(sig.body.last(), Some(Instruction::Return(_))) {
                    sig.body.extend(copy_out.iter().cloned());
                }
            }
            if is_main {
                let copy_in = inputs.iter().flat_map(Split::copy_in).collect::<Vec<_>>();
                sig.body.splice(0..0, copy_in);
            }
        }
    }
    true
}

/// Puts `copies` before every `emit-vertex`, and before every return when
/// `at_returns` is set.
fn insert_copies<'a>(list: &mut Vec<Instruction<'a>>, copies: &[Instruction<'a>], at_returns: bool) {
    let mut i = 0;
    while i < list.len() {
        match &mut list[i] {
            Instruction::If(ir) => {
                insert_copies(&mut ir.then_instructions, copies, at_returns);
                insert_copies(&mut ir.else_instructions, copies, at_returns);
            }
            Instruction::Loop(l) => insert_copies(&mut l.body, copies, at_returns),
            Instruction::EmitVertex => {
                list.splice(i..i, copies.iter().cloned());
                i += copies.len();
            }
            Instruction::Return(_) if at_returns => {
                list.splice(i..i, copies.iter().cloned());
                i += copies.len();
            }
            _ => (),
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{
        print::print_instructions, reader::read_instructions, validate::validate, IrArenas,
    };

    fn run(src: &str, enabled: bool) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let options = OptimizerOptions {
            lower_double_varyings: enabled,
            ..Default::default()
        };
        let progress = lower_packed_varyings(&ctx, &options, &mut list);
        validate(&mut list).unwrap();
        (progress, print_instructions(&list))
    }

    const PASS_THROUGH: &str = indoc! {"
        (declare (shader_in) dvec3 pos)
        (declare (shader_out) dvec4 col)
        (declare (uniform) bool early)
        (function main
          (signature void
            (parameters)
            ((assign (xyzw) (var_ref col) (expression dvec4 vector (swiz x (var_ref pos)) (swiz y (var_ref pos)) (swiz z (var_ref pos)) (swiz x (var_ref pos))))
             (if (var_ref early) ((return)) ())
             (assign (x) (var_ref col) (swiz z (var_ref pos))))))
    "};

    #[test]
    fn wide_double_varyings_are_split() {
        let (progress, out) = run(PASS_THROUGH, true);
        assert!(progress);
        assert!(out.starts_with(indoc! {"
            (declare (temporary) dvec3 pos)
            (declare (shader_in) dvec2 pos.0)
            (declare (shader_in) double pos.1)
            (declare (temporary) dvec4 col)
            (declare (shader_out) dvec2 col.0)
            (declare (shader_out) dvec2 col.1)
        "}), "{out}");
        assert!(out.contains("(assign (xy) (var_ref pos) (var_ref pos.0))"), "{out}");
        assert!(out.contains("(assign (z) (var_ref pos) (var_ref pos.1))"), "{out}");
        // once before the early return, once at the end
        assert_eq!(
            out.matches("(assign (xy) (var_ref col.1) (swiz zw (var_ref col)))").count(),
            2,
            "{out}"
        );
    }

    #[test]
    fn outputs_are_copied_before_each_vertex() {
        let (progress, out) = run(
            indoc! {"
                (declare (shader_out) dvec3 v)
                (function main
                  (signature void
                    (parameters)
                    ((assign (xyz) (var_ref v) (constant dvec3 (1.0 2.0 3.0)))
                     (emit-vertex)
                     (assign (x) (var_ref v) (constant double (4.0)))
                     (emit-vertex))))
            "},
            true,
        );
        assert!(progress);
        assert_eq!(out.matches("(assign (x) (var_ref v.1) (swiz z (var_ref v)))").count(), 3, "{out}");
    }

    #[test]
    fn disabled_or_narrow_varyings_are_kept() {
        let (progress, _) = run(PASS_THROUGH, false);
        assert!(!progress);
        let (progress, _) = run(
            indoc! {"
                (declare (shader_in) dvec2 a)
                (declare (shader_out) vec4 b)
            "},
            true,
        );
        assert!(!progress);
    }
}
