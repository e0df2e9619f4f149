//! Moves the value of a write-once, read-once local into the place that
//! reads it.
//!
//! The search for the read stays within the rest of the instruction list
//! holding the write. It gives up at the first instruction that might
//! change what the moved expression evaluates to, and at any nested
//! control flow other than an `if` condition.

use std::collections::HashSet;

use tracing::debug;

use super::{dead_code::remove_declarations, declare_pass};
use crate::ir::{
    refcount::Refcount,
    visitor::{visit_instruction, visit_rvalue, Visitor},
    Instruction, Rvalue, VarRef, VariableMode,
};

declare_pass!(
    TreeGrafting,
    "tree_grafting",
    |ctx, options, ir| do_tree_grafting(ir)
);

pub fn do_tree_grafting(instructions: &mut Vec<Instruction<'_>>) -> bool {
    let refcount = Refcount::compute(instructions);
    let mut grafted = HashSet::new();
    graft_list(instructions, &refcount, &mut grafted);
    if grafted.is_empty() {
        return false;
    }
    let mut removed = false;
    remove_declarations(instructions, &grafted, &mut removed);
    true
}

fn candidate<'a>(ir: &Instruction<'a>, refcount: &Refcount<'a>) -> Option<VarRef<'a>> {
    let a = ir.as_assignment()?;
    if a.condition.is_some() {
        return None;
    }
    let v = a.whole_variable_written()?;
    if !v.mode().is_local() || !v.ty.is_scalar_or_vector() {
        return None;
    }
    let e = refcount.get(v);
    let single_use = e.declarations == 1 && e.assignments == 1 && e.reads == 1;
    (single_use && !a.rhs.references_var(v)).then_some(v)
}

fn graft_list<'a>(
    list: &mut Vec<Instruction<'a>>,
    refcount: &Refcount<'a>,
    grafted: &mut HashSet<VarRef<'a>>,
) {
    let mut i = 0;
    while i < list.len() {
        match &mut list[i] {
            Instruction::If(ir) => {
                graft_list(&mut ir.then_instructions, refcount, grafted);
                graft_list(&mut ir.else_instructions, refcount, grafted);
            }
            Instruction::Loop(l) => graft_list(&mut l.body, refcount, grafted),
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    graft_list(&mut sig.body, refcount, grafted);
                }
            }
            _ => (),
        }
        if let Some(v) = candidate(&list[i], refcount) {
            if try_graft(list, i, v) {
                debug!("[TreeGrafting] grafted {}", v.name);
                list.remove(i);
                grafted.insert(v);
                continue;
            }
        }
        i += 1;
    }
}

enum Step {
    Continue,
    Grafted,
    Abort,
}

/// Replaces the read of `var` with `rhs` on the first slot that matches.
struct Graft<'a> {
    var: VarRef<'a>,
    rhs: Option<Rvalue<'a>>,
    /// Variables the moved expression reads.
    sources: HashSet<VarRef<'a>>,
}
impl<'a> Visitor<'a> for Graft<'a> {
    fn handle_rvalue_enter(&mut self, rvalue: &mut Rvalue<'a>) {
        if rvalue.as_var() == Some(self.var) {
            if let Some(rhs) = self.rhs.take() {
                *rvalue = rhs;
            }
        }
    }
}
impl<'a> Graft<'a> {
    fn done(&self) -> bool {
        self.rhs.is_none()
    }

    fn into_slot(&mut self, slot: &mut Rvalue<'a>) -> Step {
        visit_rvalue(self, slot);
        if self.done() {
            Step::Grafted
        } else {
            Step::Abort
        }
    }

    fn kills(&self, written: Option<VarRef<'a>>) -> bool {
        written.is_some_and(|w| self.sources.contains(&w))
    }

    fn step(&mut self, ir: &mut Instruction<'a>) -> Step {
        match ir {
            Instruction::Variable(_)
            | Instruction::Demote
            | Instruction::EmitVertex
            | Instruction::EndPrimitive => Step::Continue,
            Instruction::Assignment(_) => {
                visit_instruction(self, ir);
                if self.done() {
                    return Step::Grafted;
                }
                let written = ir.as_assignment().and_then(|a| a.lhs.variable_referenced());
                if self.kills(written) {
                    Step::Abort
                } else {
                    Step::Continue
                }
            }
            Instruction::If(i) => self.into_slot(&mut i.condition),
            Instruction::Call(c) => {
                for (formal, actual) in c.callee.parameters.iter().zip(c.actual_parameters.iter_mut()) {
                    if matches!(formal.mode(), VariableMode::FunctionIn | VariableMode::ConstIn) {
                        visit_rvalue(self, actual);
                    }
                }
                if self.done() {
                    return Step::Grafted;
                }
                if !c.callee.is_intrinsic {
                    return Step::Abort;
                }
                let out_written = c
                    .callee
                    .parameters
                    .iter()
                    .zip(&c.actual_parameters)
                    .filter(|(f, _)| {
                        matches!(f.mode(), VariableMode::FunctionOut | VariableMode::FunctionInout)
                    })
                    .any(|(_, a)| self.kills(a.variable_referenced()));
                let ret_written =
                    self.kills(c.return_deref.as_ref().and_then(|r| r.variable_referenced()));
                if out_written || ret_written {
                    Step::Abort
                } else {
                    Step::Continue
                }
            }
            Instruction::Return(Some(value)) | Instruction::Discard(Some(value)) => {
                self.into_slot(value)
            }
            Instruction::Barrier => {
                if self.sources.iter().any(|v| v.mode().is_buffer_backed()) {
                    Step::Abort
                } else {
                    Step::Continue
                }
            }
            Instruction::Loop(_)
            | Instruction::Function(_)
            | Instruction::LoopJump(_)
            | Instruction::Return(None)
            | Instruction::Discard(None) => Step::Abort,
        }
    }
}

fn try_graft<'a>(list: &mut [Instruction<'a>], at: usize, var: VarRef<'a>) -> bool {
    let Some(rhs) = list[at].as_assignment().map(|a| a.rhs.clone()) else {
        return false;
    };
    let mut sources = HashSet::new();
    rhs.for_each_var(&mut |v| {
        sources.insert(v);
    });
    let mut graft = Graft {
        var,
        rhs: Some(rhs),
        sources,
    };
    for ir in list[at + 1..].iter_mut() {
        match graft.step(ir) {
            Step::Continue => (),
            Step::Grafted => return true,
            Step::Abort => return false,
        }
    }
    false
}
