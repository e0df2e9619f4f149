//! Whole-program removal of variables that are never read.

use std::collections::HashSet;

use tracing::debug;

use super::declare_pass;
use crate::ir::{refcount::Refcount, Instruction, VarRef, VariableMode};

declare_pass!(
    DeadCode,
    "dead_code",
    |ctx, options, ir| do_dead_code(ir, options.uniform_locations_assigned)
);

/// Declarations that stay even when unreferenced.
fn keeps_declaration(var: VarRef<'_>, uniform_locations_assigned: bool) -> bool {
    match var.mode() {
        VariableMode::Uniform => uniform_locations_assigned || var.constant_value.borrow().is_some(),
        VariableMode::ShaderIn | VariableMode::SystemValue => true,
        m => m.is_externally_visible_write(),
    }
}

pub fn do_dead_code(instructions: &mut Vec<Instruction<'_>>, uniform_locations_assigned: bool) -> bool {
    let refcount = Refcount::compute(instructions);
    let dead = refcount
        .iter()
        .filter(|(v, e)| {
            e.declarations > 0 && e.reads == 0 && !v.mode().is_externally_visible_write()
        })
        .map(|(v, _)| v)
        .collect::<HashSet<_>>();
    if dead.is_empty() {
        return false;
    }

    let mut sweep = Sweep {
        dead: &dead,
        written_by_calls: HashSet::new(),
        progress: false,
    };
    sweep.assignments(instructions);

    let removable = dead
        .iter()
        .copied()
        .filter(|v| {
            !sweep.written_by_calls.contains(v) && !keeps_declaration(*v, uniform_locations_assigned)
        })
        .collect::<HashSet<_>>();
    let mut progress = sweep.progress;
    remove_declarations(instructions, &removable, &mut progress);
    progress
}

struct Sweep<'d, 'a> {
    dead: &'d HashSet<VarRef<'a>>,
    written_by_calls: HashSet<VarRef<'a>>,
    progress: bool,
}
impl<'a> Sweep<'_, 'a> {
    fn is_dead(&self, var: Option<VarRef<'a>>) -> bool {
        var.is_some_and(|v| self.dead.contains(&v))
    }

    fn assignments(&mut self, list: &mut Vec<Instruction<'a>>) {
        list.retain(|ir| {
            let Instruction::Assignment(a) = ir else {
                return true;
            };
            let target = a.lhs.variable_referenced();
            if !self.is_dead(target) {
                return true;
            }
            if let Some(v) = target {
                debug!("[DeadCode] removing assignment to {}", v.name);
            }
            self.progress = true;
            false
        });
        for ir in list.iter_mut() {
            match ir {
                Instruction::If(i) => {
                    self.assignments(&mut i.then_instructions);
                    self.assignments(&mut i.else_instructions);
                }
                Instruction::Loop(l) => self.assignments(&mut l.body),
                Instruction::Function(f) => {
                    for sig in f.signatures.iter_mut() {
                        self.assignments(&mut sig.body);
                    }
                }
                Instruction::Call(c) => {
                    if self.is_dead(c.return_deref.as_ref().and_then(|r| r.variable_referenced())) {
                        c.return_deref = None;
                        self.progress = true;
                    }
                    for (formal, actual) in c.callee.parameters.iter().zip(&c.actual_parameters) {
                        if matches!(
                            formal.mode(),
                            VariableMode::FunctionOut | VariableMode::FunctionInout
                        ) {
                            self.written_by_calls.extend(actual.variable_referenced());
                        }
                    }
                }
                _ => (),
            }
        }
    }
}

pub(super) fn remove_declarations<'a>(
    list: &mut Vec<Instruction<'a>>,
    removable: &HashSet<VarRef<'a>>,
    progress: &mut bool,
) {
    list.retain(|ir| match ir {
        Instruction::Variable(v) if removable.contains(v) => {
            debug!("[DeadCode] removing declaration of {}", v.name);
            *progress = true;
            false
        }
        _ => true,
    });
    for ir in list.iter_mut() {
        match ir {
            Instruction::If(i) => {
                remove_declarations(&mut i.then_instructions, removable, progress);
                remove_declarations(&mut i.else_instructions, removable, progress);
            }
            Instruction::Loop(l) => remove_declarations(&mut l.body, removable, progress),
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    remove_declarations(&mut sig.body, removable, progress);
                }
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, reader::read_instructions, IrArenas, IrContext};

    fn run(src: &str, uniform_locations_assigned: bool) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let progress = do_dead_code(&mut list, uniform_locations_assigned);
        (progress, print_instructions(&list))
    }

    #[test]
    fn unread_locals_disappear_with_their_assignments() {
        let (progress, out) = run(
            indoc! {"
                (declare (shader_in) vec4 b)
                (declare () vec4 a)
                (declare (shader_out) vec4 c)
                (assign (xyzw) (var_ref a) (var_ref b))
                (assign (xyzw) (var_ref c) (var_ref b))
            "},
            false,
        );
        assert!(progress);
        assert_eq!(
            out,
            indoc! {"
                (declare (shader_in) vec4 b)
                (declare (shader_out) vec4 c)
                (assign (xyzw) (var_ref c) (var_ref b))
            "}
        );
    }

    #[test]
    fn outputs_and_buffers_are_kept() {
        let src = indoc! {"
            (declare (shader_out) float o)
            (declare (shader_storage) float s)
            (assign (x) (var_ref o) (constant float (1.0)))
            (assign (x) (var_ref s) (constant float (2.0)))
        "};
        let (progress, out) = run(src, false);
        assert!(!progress);
        assert_eq!(out, src);
    }

    #[test]
    fn unused_uniforms_depend_on_location_assignment() {
        let src = indoc! {"
            (declare (uniform) float u)
            (declare (shader_in) float i)
        "};
        let (progress, out) = run(src, false);
        assert!(progress);
        assert_eq!(out, "(declare (shader_in) float i)\n");

        let (progress, _) = run(src, true);
        assert!(!progress);
    }

    #[test]
    fn calls_into_dead_variables_keep_running() {
        let (progress, out) = run(
            indoc! {"
                (function f
                  (signature float
                    (parameters (declare (out) float r))
                    ((assign (x) (var_ref r) (constant float (1.0)))
                     (return (constant float (2.0))))))
                (function main
                  (signature void
                    (parameters)
                    ((declare () float ret)
                     (declare () float side)
                     (call f (var_ref ret) ((var_ref side))))))
            "},
            false,
        );
        assert!(progress);
        assert!(out.contains("(call f ((var_ref side)))"));
        assert!(!out.contains("(declare () float ret)"));
        assert!(out.contains("(declare () float side)"));
    }
}
