//! Swizzle composition and no-op swizzle removal.

use tracing::trace;

use super::declare_pass;
use crate::ir::{
    visitor::{visit_list, Visitor},
    Instruction, Rvalue,
};

declare_pass!(
    OptimizeSwizzles,
    "swizzle",
    |ctx, options, ir| do_optimize_swizzles(ir)
);

#[derive(Default)]
struct SwizzleVisitor {
    progress: bool,
}
impl<'a> Visitor<'a> for SwizzleVisitor {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        let Rvalue::Swizzle(outer) = rvalue else {
            return;
        };
        // (v.abc).xy  =>  v.ab
        if let Rvalue::Swizzle(inner) = &mut *outer.val {
            let mask = inner.mask.compose(&outer.mask);
            trace!("[OptimizeSwizzles] {}.{} => {}", inner.mask.letters(), outer.mask.letters(), mask.letters());
            let base = inner.val.take();
            *outer.val = base;
            outer.mask = mask;
            self.progress = true;
        }
        let width = outer.val.ty().vector_elements() as usize;
        if outer.val.ty().is_scalar_or_vector() && outer.mask.is_identity(width) {
            trace!("[OptimizeSwizzles] dropping identity swizzle .{}", outer.mask.letters());
            *rvalue = outer.val.take();
            self.progress = true;
        }
    }
}

pub fn do_optimize_swizzles(instructions: &mut [Instruction<'_>]) -> bool {
    let mut v = SwizzleVisitor::default();
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
        let progress = do_optimize_swizzles(&mut list);
        (progress, print_instructions(&list))
    }

    #[test]
    fn nested_swizzles_compose() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec2 o)
            (assign (xy) (var_ref o) (swiz yx (swiz wzy (var_ref v))))
        "});
        assert!(progress);
        assert!(out.contains("(assign (xy) (var_ref o) (swiz zw (var_ref v)))"), "{out}");
    }

    #[test]
    fn identity_swizzles_vanish() {
        let (progress, out) = run(indoc! {"
            (declare (shader_in) vec3 v)
            (declare (shader_out) vec3 o)
            (assign (xyz) (var_ref o) (swiz zyx (swiz zyx (var_ref v))))
        "});
        assert!(progress);
        assert!(out.contains("(assign (xyz) (var_ref o) (var_ref v))"), "{out}");

        let (progress, _) = run(&out);
        assert!(!progress);
    }

    #[test]
    fn narrowing_swizzles_stay() {
        let (progress, _) = run(indoc! {"
            (declare (shader_in) vec4 v)
            (declare (shader_out) vec3 o)
            (assign (xyz) (var_ref o) (swiz xyz (var_ref v)))
        "});
        assert!(!progress);
    }
}
