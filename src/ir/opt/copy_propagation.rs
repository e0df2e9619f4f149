//! Replaces reads of a variable with the variable it was copied from.

use std::{collections::HashMap, rc::Rc};

use tracing::trace;

use super::{
    declare_pass,
    propagation::{propagate, trackable, Tracker},
};
use crate::ir::{Assignment, Deref, Instruction, Rvalue, VarRef, WriteMask};

declare_pass!(
    /// Whole-variable copy propagation.
    CopyPropagation,
    "copy_propagation",
    |ctx, options, ir| do_copy_propagation(ir)
);

pub fn do_copy_propagation(instructions: &mut [Instruction<'_>]) -> bool {
    propagate(&mut Copies, instructions)
}

/// Available copies, `lhs -> rhs`.
type AvailableCopies<'a> = Rc<HashMap<VarRef<'a>, VarRef<'a>>>;

struct Copies;
impl<'a> Tracker<'a> for Copies {
    type State = AvailableCopies<'a>;

    fn rewrite(&mut self, state: &Self::State, slot: &mut Rvalue<'a>) -> bool {
        let Rvalue::Deref(Deref::Var(v)) = slot else {
            return false;
        };
        let Some(&source) = state.get(v) else {
            return false;
        };
        trace!("[CopyPropagation] {} -> {}", v.name, source.name);
        *v = source;
        true
    }

    fn kill(&mut self, state: &mut Self::State, var: VarRef<'a>, _mask: WriteMask) {
        if !state.iter().any(|(l, r)| *l == var || *r == var) {
            return;
        }
        Rc::make_mut(state).retain(|l, r| *l != var && *r != var);
    }

    fn record(&mut self, state: &mut Self::State, a: &Assignment<'a>) {
        let (Some(lhs), Some(rhs)) = (a.whole_variable_written(), a.rhs.as_var()) else {
            return;
        };
        if lhs == rhs || lhs.ty != rhs.ty || !trackable(rhs) {
            return;
        }
        Rc::make_mut(state).insert(lhs, rhs);
    }
}
