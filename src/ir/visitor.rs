//! Hierarchical traversal with in-place rvalue slot rewriting.
//!
//! Every `enter_*` hook runs before the node's children and every `leave_*`
//! hook after them. [`Visitor::handle_rvalue`] is called with the slot that
//! owns an rvalue once the rvalue's subtree has been visited, so the hook may
//! overwrite the slot. Assignment left-hand sides are walked in assignee mode:
//! their roots never reach `handle_rvalue`, only their array indices do.

use super::{
    ArrayDeref, Assignment, Call, Constant, Deref, Expression, Function, If, Instruction, Loop,
    RecordDeref, Rvalue, Signature, Swizzle, Texture, VarRef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    /// Skip the rest of the current node's children (or, from an enter hook,
    /// all of them) and resume with its parent.
    ContinueWithParent,
    /// Abort the whole walk.
    Stop,
}

#[allow(unused_variables)]
pub trait Visitor<'a> {
    fn visit_variable(&mut self, var: VarRef<'a>) -> Visit {
        Visit::Continue
    }
    fn visit_constant(&mut self, ir: &mut Constant) -> Visit {
        Visit::Continue
    }
    fn visit_dereference_variable(&mut self, var: VarRef<'a>, assignee: bool) -> Visit {
        Visit::Continue
    }
    /// Jumps, discard-free terminators, vertex emission and barriers.
    fn visit_leaf_instruction(&mut self, ir: &Instruction<'a>) -> Visit {
        Visit::Continue
    }

    fn enter_array_deref(&mut self, ir: &mut ArrayDeref<'a>, assignee: bool) -> Visit {
        Visit::Continue
    }
    fn leave_array_deref(&mut self, ir: &mut ArrayDeref<'a>, assignee: bool) -> Visit {
        Visit::Continue
    }
    fn enter_record_deref(&mut self, ir: &mut RecordDeref<'a>, assignee: bool) -> Visit {
        Visit::Continue
    }
    fn leave_record_deref(&mut self, ir: &mut RecordDeref<'a>, assignee: bool) -> Visit {
        Visit::Continue
    }
    fn enter_swizzle(&mut self, ir: &mut Swizzle<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_swizzle(&mut self, ir: &mut Swizzle<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_expression(&mut self, ir: &mut Expression<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_expression(&mut self, ir: &mut Expression<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_texture(&mut self, ir: &mut Texture<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_texture(&mut self, ir: &mut Texture<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_assignment(&mut self, ir: &mut Assignment<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_assignment(&mut self, ir: &mut Assignment<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_if(&mut self, ir: &mut If<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_if(&mut self, ir: &mut If<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_loop(&mut self, ir: &mut Loop<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_loop(&mut self, ir: &mut Loop<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_call(&mut self, ir: &mut Call<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_call(&mut self, ir: &mut Call<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_return(&mut self, value: &mut Option<Rvalue<'a>>) -> Visit {
        Visit::Continue
    }
    fn leave_return(&mut self, value: &mut Option<Rvalue<'a>>) -> Visit {
        Visit::Continue
    }
    fn enter_discard(&mut self, condition: &mut Option<Rvalue<'a>>) -> Visit {
        Visit::Continue
    }
    fn leave_discard(&mut self, condition: &mut Option<Rvalue<'a>>) -> Visit {
        Visit::Continue
    }
    fn enter_function(&mut self, ir: &mut Function<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_function(&mut self, ir: &mut Function<'a>) -> Visit {
        Visit::Continue
    }
    fn enter_signature(&mut self, ir: &mut Signature<'a>) -> Visit {
        Visit::Continue
    }
    fn leave_signature(&mut self, ir: &mut Signature<'a>) -> Visit {
        Visit::Continue
    }

    /// Pre-order slot hook.
    fn handle_rvalue_enter(&mut self, rvalue: &mut Rvalue<'a>) {}
    /// Post-order slot hook.
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {}
}

macro_rules! visit_child {
    ($e:expr) => {
        match $e {
            Visit::Continue => false,
            Visit::ContinueWithParent => true,
            Visit::Stop => return Visit::Stop,
        }
    };
}

/// Runs `$children` unless `$enter` asked to skip them, then `$leave`.
macro_rules! enter_leave {
    ($enter:expr, $children:block, $leave:expr) => {
        match $enter {
            Visit::Stop => return Visit::Stop,
            Visit::ContinueWithParent => Visit::Continue,
            Visit::Continue => {
                $children
                match $leave {
                    Visit::Stop => Visit::Stop,
                    _ => Visit::Continue,
                }
            }
        }
    };
}

pub fn visit_list<'a, V: Visitor<'a> + ?Sized>(v: &mut V, list: &mut [Instruction<'a>]) -> Visit {
    for ir in list.iter_mut() {
        match visit_instruction(v, ir) {
            Visit::Continue => (),
            Visit::ContinueWithParent => return Visit::Continue,
            Visit::Stop => return Visit::Stop,
        }
    }
    Visit::Continue
}

pub fn visit_instruction<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    ir: &mut Instruction<'a>,
) -> Visit {
    if matches!(
        ir,
        Instruction::LoopJump(_)
            | Instruction::Demote
            | Instruction::EmitVertex
            | Instruction::EndPrimitive
            | Instruction::Barrier
    ) {
        return v.visit_leaf_instruction(ir);
    }
    match ir {
        Instruction::Variable(var) => v.visit_variable(*var),
        Instruction::Assignment(a) => enter_leave!(
            v.enter_assignment(a),
            {
                'children: {
                    if visit_child!(visit_deref(v, &mut a.lhs, true)) {
                        break 'children;
                    }
                    if visit_child!(visit_rvalue(v, &mut a.rhs)) {
                        break 'children;
                    }
                    if let Some(c) = &mut a.condition {
                        visit_child!(visit_rvalue(v, c));
                    }
                }
            },
            v.leave_assignment(a)
        ),
        Instruction::If(i) => enter_leave!(
            v.enter_if(i),
            {
                'children: {
                    if visit_child!(visit_rvalue(v, &mut i.condition)) {
                        break 'children;
                    }
                    if visit_child!(visit_list(v, &mut i.then_instructions)) {
                        break 'children;
                    }
                    visit_child!(visit_list(v, &mut i.else_instructions));
                }
            },
            v.leave_if(i)
        ),
        Instruction::Loop(l) => enter_leave!(
            v.enter_loop(l),
            {
                visit_child!(visit_list(v, &mut l.body));
            },
            v.leave_loop(l)
        ),
        Instruction::Call(c) => enter_leave!(
            v.enter_call(c),
            {
                'children: {
                    for p in c.actual_parameters.iter_mut() {
                        if visit_child!(visit_rvalue(v, p)) {
                            break 'children;
                        }
                    }
                    if let Some(r) = &mut c.return_deref {
                        visit_child!(visit_deref(v, r, true));
                    }
                }
            },
            v.leave_call(c)
        ),
        Instruction::Return(value) => enter_leave!(
            v.enter_return(value),
            {
                if let Some(r) = value {
                    visit_child!(visit_rvalue(v, r));
                }
            },
            v.leave_return(value)
        ),
        Instruction::Discard(condition) => enter_leave!(
            v.enter_discard(condition),
            {
                if let Some(c) = condition {
                    visit_child!(visit_rvalue(v, c));
                }
            },
            v.leave_discard(condition)
        ),
        Instruction::Function(f) => enter_leave!(
            v.enter_function(f),
            {
                for sig in f.signatures.iter_mut() {
                    let s = enter_leave!(
                        v.enter_signature(sig),
                        {
                            'params: {
                                for p in sig.decl.parameters.iter() {
                                    if visit_child!(v.visit_variable(*p)) {
                                        break 'params;
                                    }
                                }
                            }
                            visit_child!(visit_list(v, &mut sig.body));
                        },
                        v.leave_signature(sig)
                    );
                    if s == Visit::Stop {
                        return Visit::Stop;
                    }
                }
            },
            v.leave_function(f)
        ),
        Instruction::LoopJump(_)
        | Instruction::Demote
        | Instruction::EmitVertex
        | Instruction::EndPrimitive
        | Instruction::Barrier => Visit::Continue,
    }
}

/// Walks a dereference chain. In assignee mode the base of an array or
/// record dereference is walked as an lvalue as well.
pub fn visit_deref<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    d: &mut Deref<'a>,
    assignee: bool,
) -> Visit {
    match d {
        Deref::Var(var) => v.visit_dereference_variable(*var, assignee),
        Deref::Array(a) => enter_leave!(
            v.enter_array_deref(a, assignee),
            {
                'children: {
                    if visit_child!(visit_base(v, &mut a.array, assignee)) {
                        break 'children;
                    }
                    visit_child!(visit_rvalue(v, &mut a.index));
                }
            },
            v.leave_array_deref(a, assignee)
        ),
        Deref::Record(r) => enter_leave!(
            v.enter_record_deref(r, assignee),
            {
                visit_child!(visit_base(v, &mut r.record, assignee));
            },
            v.leave_record_deref(r, assignee)
        ),
    }
}

fn visit_base<'a, V: Visitor<'a> + ?Sized>(
    v: &mut V,
    base: &mut Rvalue<'a>,
    assignee: bool,
) -> Visit {
    match base {
        Rvalue::Deref(d) if assignee => visit_deref(v, d, true),
        _ => visit_rvalue(v, base),
    }
}

pub fn visit_rvalue<'a, V: Visitor<'a> + ?Sized>(v: &mut V, slot: &mut Rvalue<'a>) -> Visit {
    v.handle_rvalue_enter(slot);
    let s = match slot {
        Rvalue::Constant(c) => v.visit_constant(c),
        Rvalue::Deref(d) => visit_deref(v, d, false),
        Rvalue::Swizzle(s) => enter_leave!(
            v.enter_swizzle(s),
            {
                visit_child!(visit_rvalue(v, &mut s.val));
            },
            v.leave_swizzle(s)
        ),
        Rvalue::Expression(e) => enter_leave!(
            v.enter_expression(e),
            {
                'children: {
                    for o in e.operands.iter_mut() {
                        if visit_child!(visit_rvalue(v, o)) {
                            break 'children;
                        }
                    }
                }
            },
            v.leave_expression(e)
        ),
        Rvalue::Texture(t) => enter_leave!(
            v.enter_texture(t),
            {
                'children: {
                    if visit_child!(visit_deref(v, &mut t.sampler, false)) {
                        break 'children;
                    }
                    if let Some(c) = &mut t.coordinate {
                        if visit_child!(visit_rvalue(v, c)) {
                            break 'children;
                        }
                    }
                    if let Some(l) = &mut t.lod {
                        visit_child!(visit_rvalue(v, l));
                    }
                }
            },
            v.leave_texture(t)
        ),
    };
    match s {
        Visit::Stop => Visit::Stop,
        Visit::ContinueWithParent => Visit::ContinueWithParent,
        Visit::Continue => {
            v.handle_rvalue(slot);
            Visit::Continue
        }
    }
}

struct RvalueFn<F>(F);
impl<'a, F: FnMut(&mut Rvalue<'a>)> Visitor<'a> for RvalueFn<F> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        (self.0)(rvalue)
    }
}

/// Post-order rewrite of every readable rvalue slot in `list`.
pub fn rewrite_rvalues<'a>(list: &mut [Instruction<'a>], f: impl FnMut(&mut Rvalue<'a>)) {
    visit_list(&mut RvalueFn(f), list);
}

/// Post-order rewrite of every slot inside one rvalue, the root included.
pub fn rewrite_rvalue_tree<'a>(slot: &mut Rvalue<'a>, f: impl FnMut(&mut Rvalue<'a>)) {
    visit_rvalue(&mut RvalueFn(f), slot);
}

/// A visitor that queues instructions to be placed in front of the
/// instruction currently being visited.
pub trait Emitter<'a>: Visitor<'a> {
    fn pending(&mut self) -> &mut Vec<Instruction<'a>>;
}

/// Like [`visit_list`], splicing whatever the visitor queued ahead of the
/// instruction that queued it. Bodies of `if`, `loop` and signatures get
/// their own insertion points; an `if` condition emits ahead of the `if`.
pub fn visit_list_emitting<'a, V: Emitter<'a>>(v: &mut V, list: &mut Vec<Instruction<'a>>) {
    let mut i = 0;
    while i < list.len() {
        match &mut list[i] {
            Instruction::If(ir) => {
                visit_rvalue(v, &mut ir.condition);
                let queued = std::mem::take(v.pending());
                visit_list_emitting(v, &mut ir.then_instructions);
                visit_list_emitting(v, &mut ir.else_instructions);
                *v.pending() = queued;
            }
            Instruction::Loop(l) => visit_list_emitting(v, &mut l.body),
            Instruction::Function(f) => {
                for sig in f.signatures.iter_mut() {
                    visit_list_emitting(v, &mut sig.body);
                }
            }
            ir => {
                visit_instruction(v, ir);
            }
        }
        let queued = std::mem::take(v.pending());
        let n = queued.len();
        list.splice(i..i, queued);
        i += n + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::*, Constant, GlslType, IrArenas, IrContext, VariableMode};

    #[derive(Default)]
    struct DerefLog {
        reads: Vec<String>,
        writes: Vec<String>,
    }
    impl<'a> Visitor<'a> for DerefLog {
        fn visit_dereference_variable(&mut self, var: VarRef<'a>, assignee: bool) -> Visit {
            if assignee {
                self.writes.push(var.name.clone());
            } else {
                self.reads.push(var.name.clone());
            }
            Visit::Continue
        }
    }

    #[test]
    fn array_index_on_lhs_is_a_read() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let a = ctx.new_variable("a", GlslType::array(GlslType::FLOAT, 4), VariableMode::Auto);
        let i = ctx.new_variable("i", GlslType::INT, VariableMode::Auto);
        let b = ctx.new_variable("b", GlslType::FLOAT, VariableMode::Auto);
        let mut list = vec![assign(
            array_ref(var(a), var(i)),
            var(b),
            crate::ir::WriteMask::X,
        )];
        let mut log = DerefLog::default();
        visit_list(&mut log, &mut list);
        assert_eq!(log.writes, vec!["a"]);
        assert_eq!(log.reads, vec!["i", "b"]);
    }

    #[test]
    fn slots_are_rewritten_bottom_up() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let x = ctx.new_variable("x", GlslType::FLOAT, VariableMode::Auto);
        let mut list = vec![assign_var(x, add(var(x), var(x)))];
        let mut order = Vec::new();
        rewrite_rvalues(&mut list, |rv| {
            order.push(rv.expr_op().is_some());
            if rv.as_var().is_some() {
                *rv = constant(Constant::float(1.0));
            }
        });
        assert_eq!(order, vec![false, false, true]);
        let rhs = &list[0].as_assignment().unwrap().rhs;
        let e = rhs.as_expression().unwrap();
        assert!(e.operands.iter().all(|o| o.is_one()));
    }
}
