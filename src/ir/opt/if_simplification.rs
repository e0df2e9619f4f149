//! Removes `if` statements whose outcome is known or that do nothing.

use tracing::debug;

use super::declare_pass;
use crate::ir::{builder::logic_not, Instruction};

declare_pass!(
    IfSimplification,
    "if_simplification",
    |ctx, options, ir| do_if_simplification(ir)
);

pub fn do_if_simplification(instructions: &mut Vec<Instruction<'_>>) -> bool {
    let mut progress = false;
    let mut i = 0;
    while i < instructions.len() {
        match &mut instructions[i] {
            Instruction::If(ir) => {
                progress |= do_if_simplification(&mut ir.then_instructions);
                progress |= do_if_simplification(&mut ir.else_instructions);

                if let Some(c) = ir.condition.as_constant() {
                    let taken = if c.components().first().is_some_and(|v| v.as_bool()) {
                        std::mem::take(&mut ir.then_instructions)
                    } else {
                        std::mem::take(&mut ir.else_instructions)
                    };
                    debug!("[IfSimplification] constant condition, splicing {} instruction(s)", taken.len());
                    let n = taken.len();
                    instructions.splice(i..=i, taken);
                    i += n;
                    progress = true;
                    continue;
                }
                if ir.then_instructions.is_empty() && ir.else_instructions.is_empty() {
                    debug!("[IfSimplification] removing empty if");
                    instructions.remove(i);
                    progress = true;
                    continue;
                }
                if ir.then_instructions.is_empty() {
                    // if (c) {} else {x}  =>  if (!c) {x}
                    ir.condition = logic_not(ir.condition.take());
                    std::mem::swap(&mut ir.then_instructions, &mut ir.else_instructions);
                    progress = true;
                }
            }
            Instruction::Loop(l) => progress |= do_if_simplification(&mut l.body),
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    progress |= do_if_simplification(&mut sig.body);
                }
            }
            _ => (),
        }
        i += 1;
    }
    progress
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
        let progress = do_if_simplification(&mut list);
        (progress, print_instructions(&list))
    }

    #[test]
    fn constant_conditions_keep_the_taken_branch() {
        let (progress, out) = run(indoc! {"
            (declare (shader_out) float o)
            (if (constant bool (false))
              ((assign (x) (var_ref o) (constant float (1.0))))
              ((assign (x) (var_ref o) (constant float (2.0)))))
        "});
        assert!(progress);
        assert_eq!(
            out,
            indoc! {"
                (declare (shader_out) float o)
                (assign (x) (var_ref o) (constant float (2.0)))
            "}
        );
    }

    #[test]
    fn empty_ifs_vanish_and_empty_then_is_swapped() {
        let (progress, out) = run(indoc! {"
            (declare (uniform) bool c)
            (declare (shader_out) float o)
            (if (var_ref c) () ())
            (if (var_ref c)
              ()
              ((assign (x) (var_ref o) (constant float (1.0)))))
        "});
        assert!(progress);
        assert_eq!(
            out,
            indoc! {"
                (declare (uniform) bool c)
                (declare (shader_out) float o)
                (if (expression bool ! (var_ref c))
                  (
                    (assign (x) (var_ref o) (constant float (1.0)))
                  )
                  (
                  ))
            "}
        );
    }
}
