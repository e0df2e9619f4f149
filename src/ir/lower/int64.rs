//! Replaces 64-bit integer multiply, divide, modulo and sign with calls to
//! back-end built-ins that work on pairs of 32-bit halves.
//!
//! Each component of the operation is unpacked to a `uvec2`/`ivec2`,
//! passed to `__builtin_{u,i}{mul,div,mod}64` or `__builtin_isign64`, and
//! the result packed back into the destination component.

use std::collections::HashMap;

use tracing::debug;

use super::{declare_temporary, store_temporary, Int64Lowering};
use crate::ir::{
    builder::{assign, channel, unop, var},
    find_signature,
    opt::{declare_pass, OptimizerOptions},
    visitor::{visit_list_emitting, Emitter, Visitor},
    Call, Deref, ExprOp, Function, GlslType, Instruction, IrContext, Rvalue, ScalarType,
    Signature, SignatureDecl, VariableMode, WriteMask,
};

declare_pass!(
    LowerInt64,
    "int64",
    |ctx, options, ir| lower_int64(ctx, options, ir)
);

fn builtin_name(op: ExprOp, base: ScalarType) -> Option<&'static str> {
    let signed = base == ScalarType::Int64;
    Some(match (op, signed) {
        (ExprOp::Mul, false) => "__builtin_umul64",
        (ExprOp::Mul, true) => "__builtin_imul64",
        (ExprOp::Div, false) => "__builtin_udiv64",
        (ExprOp::Div, true) => "__builtin_idiv64",
        (ExprOp::Mod, false) => "__builtin_umod64",
        (ExprOp::Mod, true) => "__builtin_imod64",
        (ExprOp::Sign, true) => "__builtin_isign64",
        _ => return None,
    })
}

fn requested(op: ExprOp, flags: Int64Lowering) -> bool {
    match op {
        ExprOp::Mul => flags.contains(Int64Lowering::MUL),
        ExprOp::Div => flags.contains(Int64Lowering::DIV),
        ExprOp::Mod => flags.contains(Int64Lowering::MOD),
        ExprOp::Sign => flags.contains(Int64Lowering::SIGN),
        _ => false,
    }
}

/// The 32-bit pair type standing in for one 64-bit component.
fn halves_type(base: ScalarType) -> GlslType {
    let half = if base == ScalarType::Int64 {
        ScalarType::Int
    } else {
        ScalarType::Uint
    };
    GlslType::vec(half, 2)
}

fn unpack_op(base: ScalarType) -> ExprOp {
    if base == ScalarType::Int64 {
        ExprOp::UnpackInt2x32
    } else {
        ExprOp::UnpackUint2x32
    }
}

fn pack_op(base: ScalarType) -> ExprOp {
    if base == ScalarType::Int64 {
        ExprOp::PackInt2x32
    } else {
        ExprOp::PackUint2x32
    }
}

pub fn lower_int64<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    if options.lower_int64.is_empty() {
        return false;
    }
    let mut builtins = HashMap::new();
    for op in [ExprOp::Mul, ExprOp::Div, ExprOp::Mod, ExprOp::Sign] {
        for base in [ScalarType::Int64, ScalarType::Uint64] {
            let Some(name) = builtin_name(op, base) else {
                continue;
            };
            if let Some(decl) = find_signature(instructions, name) {
                builtins.insert(name, decl);
            }
        }
    }
    let mut v = Int64Visitor {
        ctx,
        flags: options.lower_int64,
        builtins,
        created: Vec::new(),
        pending: Vec::new(),
        progress: false,
    };
    visit_list_emitting(&mut v, instructions);

    let created = std::mem::take(&mut v.created);
    for decl in created.into_iter().rev() {
        instructions.insert(
            0,
            Instruction::Function(Function {
                name: decl.name.clone(),
                signatures: vec![Signature {
                    decl,
                    body: Vec::new(),
                    is_defined: false,
                }],
            }),
        );
    }
    v.progress
}

struct Int64Visitor<'c, 'a> {
    ctx: &'c IrContext<'a>,
    flags: Int64Lowering,
    /// Built-in declarations by name, declared or created.
    builtins: HashMap<&'static str, &'a SignatureDecl<'a>>,
    created: Vec<&'a SignatureDecl<'a>>,
    pending: Vec<Instruction<'a>>,
    progress: bool,
}
impl<'a> Int64Visitor<'_, 'a> {
    fn builtin(&mut self, name: &'static str, base: ScalarType, arity: usize) -> &'a SignatureDecl<'a> {
        if let Some(&decl) = self.builtins.get(name) {
            return decl;
        }
        let ty = halves_type(base);
        let parameters = ["x", "y"][..arity]
            .iter()
            .map(|p| self.ctx.new_variable(*p, ty.clone(), VariableMode::FunctionIn))
            .collect();
        let decl = self.ctx.new_signature(SignatureDecl {
            name: name.into(),
            return_type: ty,
            parameters,
            is_intrinsic: true,
        });
        self.builtins.insert(name, decl);
        self.created.push(decl);
        decl
    }

    /// Evaluates `op` component by component through built-in calls and
    /// returns the temporary holding the result.
    fn lower(&mut self, op: ExprOp, ty: GlslType, operands: Vec<Rvalue<'a>>) -> Option<Rvalue<'a>> {
        let base = ty.base_type()?;
        let name = builtin_name(op, base)?;
        let callee = self.builtin(name, base, operands.len());

        let operands = operands
            .into_iter()
            .map(|o| store_temporary(self.ctx, &mut self.pending, "int64_op", o))
            .collect::<Vec<_>>();
        let result = declare_temporary(self.ctx, &mut self.pending, "int64_result", ty.clone());
        for c in 0..ty.vector_elements() {
            let args = operands
                .iter()
                .map(|o| {
                    let component = if o.ty.is_scalar() {
                        var(*o)
                    } else {
                        channel(var(*o), c)
                    };
                    let halves = unop(unpack_op(base), component);
                    var(store_temporary(self.ctx, &mut self.pending, "int64_arg", halves))
                })
                .collect();
            let ret = declare_temporary(self.ctx, &mut self.pending, "int64_ret", halves_type(base));
            self.pending.push(Instruction::Call(Call {
                callee,
                actual_parameters: args,
                return_deref: Some(Deref::Var(ret)),
            }));
            self.pending.push(assign(
                Deref::Var(result),
                unop(pack_op(base), var(ret)),
                WriteMask::from_channel(c as usize),
            ));
        }
        Some(var(result))
    }
}
impl<'a> Emitter<'a> for Int64Visitor<'_, 'a> {
    fn pending(&mut self) -> &mut Vec<Instruction<'a>> {
        &mut self.pending
    }
}
impl<'a> Visitor<'a> for Int64Visitor<'_, 'a> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        let Rvalue::Expression(e) = rvalue else {
            return;
        };
        if !e.ty.is_integer_64() || !requested(e.op, self.flags) {
            return;
        }
        if builtin_name(e.op, e.ty.base_type().unwrap_or(ScalarType::Int64)).is_none() {
            return;
        }
        let (op, ty) = (e.op, e.ty.clone());
        let operands = std::mem::take(&mut e.operands);
        if let Some(lowered) = self.lower(op, ty, operands) {
            debug!("[LowerInt64] {} through a built-in call", op.name());
            *rvalue = lowered;
            self.progress = true;
        }
    }
}
