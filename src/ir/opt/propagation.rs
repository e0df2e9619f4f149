//! Control-flow walk shared by the propagation passes.
//!
//! A [`Tracker`] owns the facts ("`a` currently equals `b`") and the walker
//! decides where they hold. Facts flow forward through straight-line code.
//! Both arms of an `if` start from the incoming facts and anything either arm
//! writes is forgotten after it. A loop body is walked once from nothing to
//! learn what it writes, then again from the incoming facts minus those
//! writes. Calls to non-intrinsic functions forget everything.

use std::collections::HashMap;

use crate::ir::{
    visitor::{visit_deref, visit_rvalue, Visitor},
    Assignment, Deref, Instruction, Rvalue, VarRef, VariableMode, WriteMask,
};

pub(super) trait Tracker<'a> {
    type State: Clone + Default;

    /// Rewrites one readable slot using what is known at this point.
    fn rewrite(&mut self, state: &Self::State, slot: &mut Rvalue<'a>) -> bool;

    /// Forgets the channels of `var` in `mask`, both as a destination and as
    /// the source of another variable's channels.
    fn kill(&mut self, state: &mut Self::State, var: VarRef<'a>, mask: WriteMask);

    /// Learns from an unconditional assignment after its target was killed.
    fn record(&mut self, state: &mut Self::State, assignment: &Assignment<'a>);
}

/// Whether facts about `var` may be kept at all. Buffer-backed memory can
/// change underneath us between any two instructions.
pub(super) fn trackable(var: VarRef<'_>) -> bool {
    !var.mode().is_buffer_backed()
}

/// Runs `tracker` over the top level and every signature body, each body
/// starting without facts.
pub(super) fn propagate<'a, T: Tracker<'a>>(
    tracker: &mut T,
    instructions: &mut [Instruction<'a>],
) -> bool {
    let mut walker = Walker {
        tracker,
        progress: false,
    };
    let mut frame = Frame::default();
    walker.block(&mut frame, instructions);
    walker.progress
}

struct Frame<'a, S> {
    state: S,
    /// Everything written since this frame began, per variable.
    kills: HashMap<VarRef<'a>, WriteMask>,
    killed_all: bool,
}
impl<S: Default> Default for Frame<'_, S> {
    fn default() -> Self {
        Self {
            state: S::default(),
            kills: HashMap::new(),
            killed_all: false,
        }
    }
}
impl<'a, S: Clone + Default> Frame<'a, S> {
    fn nested(&self) -> Self {
        Self {
            state: self.state.clone(),
            ..Default::default()
        }
    }
}

struct Walker<'t, T> {
    tracker: &'t mut T,
    progress: bool,
}

struct UseVisitor<'w, T, S> {
    tracker: &'w mut T,
    state: &'w S,
    progress: bool,
}
impl<'a, T: Tracker<'a, State = S>, S> Visitor<'a> for UseVisitor<'_, T, S> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        if self.tracker.rewrite(self.state, rvalue) {
            self.progress = true;
        }
    }
}

impl<'a, T: Tracker<'a>> Walker<'_, T> {
    fn use_rvalue(&mut self, state: &T::State, slot: &mut Rvalue<'a>) {
        let mut v = UseVisitor {
            tracker: &mut *self.tracker,
            state,
            progress: false,
        };
        visit_rvalue(&mut v, slot);
        self.progress |= v.progress;
    }

    /// Array indices inside an assignment target are reads.
    fn use_lhs(&mut self, state: &T::State, lhs: &mut Deref<'a>) {
        let mut v = UseVisitor {
            tracker: &mut *self.tracker,
            state,
            progress: false,
        };
        visit_deref(&mut v, lhs, true);
        self.progress |= v.progress;
    }

    fn kill(&mut self, frame: &mut Frame<'a, T::State>, var: VarRef<'a>, mask: WriteMask) {
        self.tracker.kill(&mut frame.state, var, mask);
        *frame.kills.entry(var).or_insert(WriteMask::empty()) |= mask;
    }

    fn kill_all(&mut self, frame: &mut Frame<'a, T::State>) {
        frame.state = T::State::default();
        frame.killed_all = true;
    }

    /// Applies what a nested frame wrote to `frame`.
    fn merge_kills(&mut self, frame: &mut Frame<'a, T::State>, nested: Frame<'a, T::State>) {
        if nested.killed_all {
            self.kill_all(frame);
            return;
        }
        for (var, mask) in nested.kills {
            self.kill(frame, var, mask);
        }
    }

    fn block(&mut self, frame: &mut Frame<'a, T::State>, list: &mut [Instruction<'a>]) {
        for ir in list.iter_mut() {
            self.instruction(frame, ir);
        }
    }

    fn instruction(&mut self, frame: &mut Frame<'a, T::State>, ir: &mut Instruction<'a>) {
        match ir {
            Instruction::Assignment(a) => {
                self.use_rvalue(&frame.state, &mut a.rhs);
                if let Some(c) = &mut a.condition {
                    self.use_rvalue(&frame.state, c);
                }
                self.use_lhs(&frame.state, &mut a.lhs);

                let Some(target) = a.lhs.variable_referenced() else {
                    return;
                };
                let mask = match &a.lhs {
                    Deref::Var(v) if v.ty.is_scalar_or_vector() => a.write_mask,
                    _ => WriteMask::all(),
                };
                self.kill(frame, target, mask);
                if a.condition.is_none() && trackable(target) {
                    self.tracker.record(&mut frame.state, a);
                }
            }
            Instruction::If(i) => {
                self.use_rvalue(&frame.state, &mut i.condition);
                let mut then_frame = frame.nested();
                self.block(&mut then_frame, &mut i.then_instructions);
                let mut else_frame = frame.nested();
                self.block(&mut else_frame, &mut i.else_instructions);
                self.merge_kills(frame, then_frame);
                self.merge_kills(frame, else_frame);
            }
            Instruction::Loop(l) => {
                let mut discovery = Frame::default();
                self.block(&mut discovery, &mut l.body);

                let mut body = frame.nested();
                if discovery.killed_all {
                    body.state = T::State::default();
                } else {
                    for (&var, &mask) in &discovery.kills {
                        self.tracker.kill(&mut body.state, var, mask);
                    }
                }
                self.block(&mut body, &mut l.body);
                self.merge_kills(frame, discovery);
                self.merge_kills(frame, body);
            }
            Instruction::Call(c) => {
                let mut written = Vec::new();
                for (formal, actual) in c.callee.parameters.iter().zip(c.actual_parameters.iter_mut())
                {
                    match formal.mode() {
                        VariableMode::FunctionOut | VariableMode::FunctionInout => {
                            written.extend(actual.variable_referenced());
                        }
                        _ => self.use_rvalue(&frame.state, actual),
                    }
                }
                if let Some(r) = &c.return_deref {
                    written.extend(r.variable_referenced());
                }
                for var in written {
                    self.kill(frame, var, WriteMask::all());
                }
                if !c.callee.is_intrinsic {
                    self.kill_all(frame);
                }
            }
            Instruction::Return(Some(v)) | Instruction::Discard(Some(v)) => {
                self.use_rvalue(&frame.state, v);
            }
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    let mut body = Frame::default();
                    self.block(&mut body, &mut sig.body);
                }
            }
            Instruction::Variable(_)
            | Instruction::LoopJump(_)
            | Instruction::Return(None)
            | Instruction::Discard(None)
            | Instruction::Demote
            | Instruction::EmitVertex
            | Instruction::EndPrimitive
            | Instruction::Barrier => (),
        }
    }
}
