//! Marks locals that are only ever assigned one constant.

use std::collections::HashMap;

use tracing::debug;

use super::declare_pass;
use crate::ir::{
    refcount::Refcount,
    visitor::{visit_list, Visit, Visitor},
    Assignment, Constant, Instruction, VarRef,
};

declare_pass!(
    /// Sets `constant_value` on locals with a single constant assignment.
    ConstantVariable,
    "constant_variable",
    |ctx, options, ir| do_constant_variable(ir)
);

#[derive(Default)]
struct ConstantWrites<'a> {
    writes: HashMap<VarRef<'a>, Constant>,
}
impl<'a> Visitor<'a> for ConstantWrites<'a> {
    fn enter_assignment(&mut self, ir: &mut Assignment<'a>) -> Visit {
        if ir.condition.is_some() {
            return Visit::ContinueWithParent;
        }
        if let (Some(v), Some(c)) = (ir.whole_variable_written(), ir.rhs.as_constant()) {
            self.writes.insert(v, c.clone());
        }
        Visit::ContinueWithParent
    }
}

pub fn do_constant_variable(instructions: &mut [Instruction<'_>]) -> bool {
    let refcount = Refcount::compute(instructions);
    let mut finder = ConstantWrites::default();
    visit_list(&mut finder, instructions);

    let mut progress = false;
    for (v, value) in finder.writes {
        if !v.mode().is_local() || refcount.get(v).assignments != 1 {
            continue;
        }
        let mut slot = v.constant_value.borrow_mut();
        if slot.is_some() {
            continue;
        }
        debug!("[ConstantVariable] {} is always {:?}", v.name, value.components());
        *slot = Some(value);
        progress = true;
    }
    progress
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{reader::read_instructions, IrArenas, IrContext};

    #[test]
    fn single_constant_assignment_marks_the_variable() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(
            &ctx,
            indoc! {"
                (declare () float k)
                (declare () float twice)
                (declare (shader_out) float o)
                (assign (x) (var_ref k) (constant float (0.25)))
                (assign (x) (var_ref twice) (constant float (1.0)))
                (assign (x) (var_ref twice) (constant float (2.0)))
                (assign (x) (var_ref o) (constant float (3.0)))
            "},
        )
        .unwrap();
        assert!(do_constant_variable(&mut list));
        let var_named = |name: &str| {
            list.iter()
                .find_map(|ir| match ir {
                    Instruction::Variable(v) if v.name == name => Some(*v),
                    _ => None,
                })
                .unwrap()
        };
        assert!(var_named("k")
            .constant_value
            .borrow()
            .as_ref()
            .is_some_and(|c| c.is_value(0.25, 0)));
        assert!(var_named("twice").constant_value.borrow().is_none());
        assert!(var_named("o").constant_value.borrow().is_none());

        assert!(!do_constant_variable(&mut list));
    }

    #[test]
    fn out_arguments_count_as_assignments() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(
            &ctx,
            indoc! {"
                (function fill
                  (signature void
                    (parameters (declare (out) float r))
                    ((assign (x) (var_ref r) (constant float (5.0))))))
                (function main
                  (signature void
                    (parameters)
                    ((declare () float v)
                     (assign (x) (var_ref v) (constant float (1.0)))
                     (call fill ((var_ref v))))))
            "},
        )
        .unwrap();
        assert!(!do_constant_variable(&mut list));
    }
}
