//! Per-channel constant propagation.
//!
//! Channels written with constants are remembered until overwritten, and
//! reads covered entirely by remembered channels become constants. Slots
//! whose operands turn constant are folded on the spot.

use std::{collections::HashMap, rc::Rc};

use tracing::trace;

use super::{
    constant_folding::{constant_value, try_fold},
    declare_pass,
    propagation::{propagate, Tracker},
};
use crate::ir::{
    builder::constant, Assignment, ConstScalar, Constant, Deref, Instruction, Rvalue,
    SwizzleMask, VarRef, WriteMask,
};

declare_pass!(
    ConstantPropagation,
    "constant_propagation",
    |ctx, options, ir| do_constant_propagation(ir)
);

pub fn do_constant_propagation(instructions: &mut [Instruction<'_>]) -> bool {
    propagate(&mut Constants, instructions)
}

type KnownChannels = [Option<ConstScalar>; 4];
type ConstantState<'a> = Rc<HashMap<VarRef<'a>, KnownChannels>>;

struct Constants;
impl Constants {
    fn known_read<'a>(state: &ConstantState<'a>, slot: &Rvalue<'a>) -> Option<Constant> {
        let (v, mask) = match slot {
            Rvalue::Deref(Deref::Var(v)) if v.ty.is_scalar_or_vector() => {
                if let Some(c) = v.constant_value.borrow().as_ref() {
                    return Some(c.clone());
                }
                (*v, SwizzleMask::identity(v.ty.vector_elements() as usize))
            }
            Rvalue::Swizzle(s) => (s.val.as_var()?, s.mask),
            _ => return None,
        };
        let channels = state.get(&v)?;
        let values = mask
            .iter()
            .map(|c| channels[c as usize])
            .collect::<Option<Vec<_>>>()?;
        Some(Constant::new(slot.ty().clone(), values))
    }
}

impl<'a> Tracker<'a> for Constants {
    type State = ConstantState<'a>;

    fn rewrite(&mut self, state: &Self::State, slot: &mut Rvalue<'a>) -> bool {
        if let Some(c) = Self::known_read(state, slot) {
            if let Some(v) = slot.variable_referenced() {
                trace!("[ConstantPropagation] read of {} is constant", v.name);
            }
            *slot = constant(c);
            return true;
        }
        matches!(slot, Rvalue::Expression(_) | Rvalue::Swizzle(_)) && try_fold(slot)
    }

    fn kill(&mut self, state: &mut Self::State, var: VarRef<'a>, mask: WriteMask) {
        if !state.contains_key(&var) {
            return;
        }
        let state = Rc::make_mut(state);
        if let Some(channels) = state.get_mut(&var) {
            for c in mask.channels() {
                channels[c] = None;
            }
            if channels.iter().all(Option::is_none) {
                state.remove(&var);
            }
        }
    }

    fn record(&mut self, state: &mut Self::State, a: &Assignment<'a>) {
        let Deref::Var(lhs) = a.lhs else {
            return;
        };
        if !lhs.ty.is_scalar_or_vector() {
            return;
        }
        let Some(value) = constant_value(&a.rhs, false) else {
            return;
        };
        let state = Rc::make_mut(state);
        let entry = state.entry(lhs).or_insert([None; 4]);
        for (k, c) in a.write_mask.channels().enumerate() {
            entry[c] = Some(value.component(k));
        }
    }
}
