//! Splits named interface block instances into one variable per member.
//!
//! `blk.color` on a `(shader_out) Block blk` becomes a plain
//! `(shader_out) vec4 Block.color`, so later passes see ordinary varyings.

use std::collections::HashMap;

use tracing::debug;

use crate::ir::{
    opt::declare_pass,
    visitor::{visit_list, Visit, Visitor},
    Assignment, Call, Deref, GlslType, Instruction, IrContext, Rvalue, VarRef,
};

declare_pass!(
    LowerNamedInterfaceBlocks,
    "named_interface_blocks",
    |ctx, options, ir| lower_named_interface_blocks(ctx, ir)
);

pub fn lower_named_interface_blocks<'a>(
    ctx: &IrContext<'a>,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    let mut members: HashMap<VarRef<'a>, Vec<VarRef<'a>>> = HashMap::new();
    let mut i = 0;
    while i < instructions.len() {
        let Instruction::Variable(block) = instructions[i] else {
            i += 1;
            continue;
        };
        let GlslType::Record(record) = &block.ty else {
            i += 1;
            continue;
        };
        if !record.is_interface {
            i += 1;
            continue;
        }
        let fields = record
            .fields
            .iter()
            .map(|f| {
                ctx.new_variable(
                    format!("{}.{}", record.name, f.name),
                    f.ty.clone(),
                    block.mode(),
                )
            })
            .collect::<Vec<_>>();
        debug!(
            "[LowerNamedInterfaceBlocks] {} split into {} members",
            block.name,
            fields.len()
        );
        let n = fields.len();
        instructions.splice(i..=i, fields.iter().map(|f| Instruction::Variable(*f)));
        members.insert(block, fields);
        i += n;
    }
    if members.is_empty() {
        return false;
    }

    let mut v = MemberRewriter { members: &members };
    visit_list(&mut v, instructions);
    true
}

struct MemberRewriter<'m, 'a> {
    members: &'m HashMap<VarRef<'a>, Vec<VarRef<'a>>>,
}
impl<'a> MemberRewriter<'_, 'a> {
    /// Replaces `block.field` anywhere along a dereference chain.
    fn rewrite(&self, d: &mut Deref<'a>) {
        let replacement = match d {
            Deref::Var(_) => return,
            Deref::Record(r) => match &mut *r.record {
                Rvalue::Deref(Deref::Var(block)) => {
                    self.members.get(block).and_then(|m| m.get(r.field)).copied()
                }
                Rvalue::Deref(inner) => {
                    self.rewrite(inner);
                    None
                }
                _ => None,
            },
            Deref::Array(a) => {
                if let Rvalue::Deref(inner) = &mut *a.array {
                    self.rewrite(inner);
                }
                None
            }
        };
        if let Some(member) = replacement {
            *d = Deref::Var(member);
        }
    }
}
impl<'a> Visitor<'a> for MemberRewriter<'_, 'a> {
    fn enter_assignment(&mut self, ir: &mut Assignment<'a>) -> Visit {
        self.rewrite(&mut ir.lhs);
        Visit::Continue
    }

    fn enter_call(&mut self, ir: &mut Call<'a>) -> Visit {
        if let Some(r) = &mut ir.return_deref {
            self.rewrite(r);
        }
        Visit::Continue
    }

    fn handle_rvalue_enter(&mut self, rvalue: &mut Rvalue<'a>) {
        if let Rvalue::Deref(d) = rvalue {
            self.rewrite(d);
        }
    }
}
