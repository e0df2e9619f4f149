//! Per-variable declaration, assignment and read counts.

use std::collections::HashMap;

use super::{
    visitor::{visit_list, Visit, Visitor},
    Call, Deref, Instruction, Rvalue, VarRef, VariableMode,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefcountEntry {
    pub declarations: u32,
    pub assignments: u32,
    /// Dereferences in readable positions. Assignment targets are not
    /// counted; their array indices are.
    pub reads: u32,
}

#[derive(Debug, Default)]
pub struct Refcount<'a> {
    entries: HashMap<VarRef<'a>, RefcountEntry>,
}
impl<'a> Refcount<'a> {
    pub fn compute(instructions: &mut [Instruction<'a>]) -> Self {
        let mut rc = Self::default();
        visit_list(&mut rc, instructions);
        rc
    }

    pub fn get(&self, var: VarRef<'a>) -> RefcountEntry {
        self.entries.get(&var).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarRef<'a>, RefcountEntry)> + '_ {
        self.entries.iter().map(|(v, e)| (*v, *e))
    }

    fn entry(&mut self, var: VarRef<'a>) -> &mut RefcountEntry {
        self.entries.entry(var).or_default()
    }
}

impl<'a> Visitor<'a> for Refcount<'a> {
    fn visit_variable(&mut self, var: VarRef<'a>) -> Visit {
        self.entry(var).declarations += 1;
        Visit::Continue
    }

    fn visit_dereference_variable(&mut self, var: VarRef<'a>, assignee: bool) -> Visit {
        let e = self.entry(var);
        if assignee {
            e.assignments += 1;
        } else {
            e.reads += 1;
        }
        Visit::Continue
    }

    fn enter_call(&mut self, ir: &mut Call<'a>) -> Visit {
        // Out and inout arguments are written by the callee.
        for (formal, actual) in ir.callee.parameters.iter().zip(&ir.actual_parameters) {
            if !matches!(
                formal.mode(),
                VariableMode::FunctionOut | VariableMode::FunctionInout
            ) {
                continue;
            }
            if let Some(v) = actual.as_deref().and_then(Deref::variable_referenced) {
                self.entry(v).assignments += 1;
            }
        }
        Visit::Continue
    }
}

/// Whether `rv` is a read of exactly `var`, optionally through a swizzle.
pub fn is_read_of(rv: &Rvalue<'_>, var: VarRef<'_>) -> bool {
    match rv {
        Rvalue::Deref(Deref::Var(v)) => core::ptr::eq(v.get(), var.get()),
        Rvalue::Swizzle(s) => is_read_of(&s.val, var),
        _ => false,
    }
}
