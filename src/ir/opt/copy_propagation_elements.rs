//! Per-channel copy propagation for scalars and vectors.
//!
//! After `a.xy = b.zw`, a read of `a.yx` becomes `b.wz`. A read is only
//! rewritten when every channel it touches mirrors the same source variable.

use std::{collections::HashMap, rc::Rc};

use tracing::trace;

use super::{
    declare_pass,
    propagation::{propagate, trackable, Tracker},
};
use crate::ir::{
    builder::{swizzle, var},
    Assignment, Deref, Instruction, Rvalue, SwizzleMask, VarRef, WriteMask,
};

declare_pass!(
    /// Channel-wise copy propagation.
    CopyPropagationElements,
    "copy_propagation_elements",
    |ctx, options, ir| do_copy_propagation_elements(ir)
);

pub fn do_copy_propagation_elements(instructions: &mut [Instruction<'_>]) -> bool {
    propagate(&mut ElementCopies, instructions)
}

/// For each tracked variable, the source variable and channel each of its
/// channels currently mirrors.
type Channels<'a> = [Option<(VarRef<'a>, u8)>; 4];
type ElementState<'a> = Rc<HashMap<VarRef<'a>, Channels<'a>>>;

struct ElementCopies;

/// The source of `channels` read out of `var`, if they all come from one
/// other variable.
fn common_source<'a>(
    state: &ElementState<'a>,
    var: VarRef<'a>,
    channels: impl Iterator<Item = u8>,
) -> Option<(VarRef<'a>, Vec<u8>)> {
    let entry = state.get(&var)?;
    let mut source = None;
    let mut mapped = Vec::new();
    for c in channels {
        let (src, src_channel) = entry[c as usize]?;
        if source.is_some_and(|s| s != src) {
            return None;
        }
        source = Some(src);
        mapped.push(src_channel);
    }
    Some((source?, mapped))
}

fn source_read<'a>(source: VarRef<'a>, channels: &[u8]) -> Rvalue<'a> {
    let width = source.ty.vector_elements() as usize;
    let mask = SwizzleMask::new(channels);
    if mask.is_identity(width) {
        var(source)
    } else {
        swizzle(var(source), mask)
    }
}

impl<'a> Tracker<'a> for ElementCopies {
    type State = ElementState<'a>;

    fn rewrite(&mut self, state: &Self::State, slot: &mut Rvalue<'a>) -> bool {
        let (v, channels) = match &*slot {
            Rvalue::Deref(Deref::Var(v)) if v.ty.is_scalar_or_vector() => {
                (*v, SwizzleMask::identity(v.ty.vector_elements() as usize))
            }
            Rvalue::Swizzle(s) => match s.val.as_var() {
                Some(v) => (v, s.mask),
                None => return false,
            },
            _ => return false,
        };
        let Some((source, mapped)) = common_source(state, v, channels.iter()) else {
            return false;
        };
        trace!(
            "[CopyPropagationElements] {}.{} -> {}",
            v.name,
            channels.letters(),
            source.name
        );
        *slot = source_read(source, &mapped);
        true
    }

    fn kill(&mut self, state: &mut Self::State, var: VarRef<'a>, mask: WriteMask) {
        let touched = state.iter().any(|(dst, channels)| {
            *dst == var
                || channels
                    .iter()
                    .flatten()
                    .any(|(src, c)| *src == var && mask.contains(WriteMask::from_channel(*c as usize)))
        });
        if !touched {
            return;
        }
        let state = Rc::make_mut(state);
        if let Some(channels) = state.get_mut(&var) {
            for c in mask.channels() {
                channels[c] = None;
            }
        }
        for channels in state.values_mut() {
            for slot in channels.iter_mut() {
                if slot.is_some_and(|(src, c)| src == var && mask.contains(WriteMask::from_channel(c as usize))) {
                    *slot = None;
                }
            }
        }
        state.retain(|_, channels| channels.iter().any(Option::is_some));
    }

    fn record(&mut self, state: &mut Self::State, a: &Assignment<'a>) {
        let Deref::Var(lhs) = a.lhs else {
            return;
        };
        if !lhs.ty.is_scalar_or_vector() {
            return;
        }
        let (source, source_channels) = match &a.rhs {
            Rvalue::Deref(Deref::Var(v)) => (
                *v,
                SwizzleMask::identity(v.ty.vector_elements() as usize),
            ),
            Rvalue::Swizzle(s) => match s.val.as_var() {
                Some(v) => (v, s.mask),
                None => return,
            },
            _ => return,
        };
        if source == lhs || !source.ty.is_scalar_or_vector() || !trackable(source) {
            return;
        }
        let state = Rc::make_mut(state);
        let entry = state.entry(lhs).or_insert([None; 4]);
        for (k, c) in a.write_mask.channels().enumerate() {
            entry[c] = Some((source, source_channels.get(k)));
        }
    }
}
