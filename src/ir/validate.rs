//! Structural invariant checks over a whole instruction tree.

use std::collections::HashSet;

use thiserror::Error;

use super::{
    visitor::{visit_list, Visit, Visitor},
    Assignment, ExprOp, Expression, GlslType, If, Instruction, Rvalue, ScalarType, Swizzle,
    VarRef,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("variable `{0}` declared more than once")]
    DuplicateDeclaration(String),
    #[error("dereference of undeclared variable `{0}`")]
    UndeclaredVariable(String),
    #[error("{context} condition must be a boolean scalar, found {found}")]
    NonBooleanCondition { context: &'static str, found: String },
    #[error("`{op}` expects {expected} operands, found {found}")]
    OperandCount {
        op: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("`{op}` operand mismatch: {detail}")]
    OperandType { op: &'static str, detail: String },
    #[error("`{op}` result type should be {expected}, found {found}")]
    ResultType {
        op: &'static str,
        expected: String,
        found: String,
    },
    #[error("assignment to `{target}` has write mask {mask} for a {rhs} value")]
    WriteMask {
        target: String,
        mask: String,
        rhs: String,
    },
    #[error("assignment to `{target}` of {rhs} does not match {lhs}")]
    AssignmentType {
        target: String,
        lhs: String,
        rhs: String,
    },
    #[error("swizzle component {component} out of range for {ty}")]
    SwizzleRange { component: u8, ty: String },
}

pub fn validate(instructions: &mut [Instruction<'_>]) -> Result<(), ValidationError> {
    let mut declared = HashSet::new();
    collect_declarations(instructions, &mut declared)?;

    let mut v = Validator {
        declared,
        error: None,
    };
    visit_list(&mut v, instructions);
    match v.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Validates only in debug builds, treating any violation as a bug in the
/// pass that produced the tree.
pub fn debug_validate(instructions: &mut [Instruction<'_>]) {
    if cfg!(debug_assertions) {
        if let Err(e) = validate(instructions) {
            panic!("invalid IR: {e}");
        }
    }
}

fn collect_declarations<'a>(
    instructions: &[Instruction<'a>],
    declared: &mut HashSet<VarRef<'a>>,
) -> Result<(), ValidationError> {
    let declare = |v: VarRef<'a>, declared: &mut HashSet<VarRef<'a>>| {
        if declared.insert(v) {
            Ok(())
        } else {
            Err(ValidationError::DuplicateDeclaration(v.name.clone()))
        }
    };
    for ir in instructions {
        match ir {
            Instruction::Variable(v) => declare(*v, declared)?,
            Instruction::If(i) => {
                collect_declarations(&i.then_instructions, declared)?;
                collect_declarations(&i.else_instructions, declared)?;
            }
            Instruction::Loop(l) => collect_declarations(&l.body, declared)?,
            Instruction::Function(f) => {
                for sig in &f.signatures {
                    for p in &sig.decl.parameters {
                        declare(*p, declared)?;
                    }
                    collect_declarations(&sig.body, declared)?;
                }
            }
            _ => (),
        }
    }
    Ok(())
}

struct Validator<'a> {
    declared: HashSet<VarRef<'a>>,
    error: Option<ValidationError>,
}
impl Validator<'_> {
    fn fail(&mut self, e: ValidationError) -> Visit {
        self.error = Some(e);
        Visit::Stop
    }

    fn check_condition(&mut self, context: &'static str, cond: &Rvalue<'_>) -> Visit {
        if *cond.ty() == GlslType::BOOL {
            Visit::Continue
        } else {
            self.fail(ValidationError::NonBooleanCondition {
                context,
                found: cond.ty().name(),
            })
        }
    }
}

fn operand_types_named(e: &Expression<'_>) -> String {
    e.operands
        .iter()
        .map(|o| o.ty().name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> Visitor<'a> for Validator<'a> {
    fn visit_dereference_variable(&mut self, var: VarRef<'a>, _assignee: bool) -> Visit {
        if self.declared.contains(&var) {
            Visit::Continue
        } else {
            self.fail(ValidationError::UndeclaredVariable(var.name.clone()))
        }
    }

    fn leave_expression(&mut self, ir: &mut Expression<'a>) -> Visit {
        let op = ir.op;
        let n = ir.operands.len();
        let count_ok = match op {
            ExprOp::Vector => (2..=4).contains(&n),
            _ => n == op.num_operands(),
        };
        if !count_ok {
            return self.fail(ValidationError::OperandCount {
                op: op.name(),
                expected: op.num_operands(),
                found: n,
            });
        }

        let base = |i: usize| ir.operands[i].ty().base_type();
        let all_base = |pred: fn(ScalarType) -> bool| (0..n).all(|i| base(i).is_some_and(pred));
        let operand_rule = match op {
            ExprOp::BitNot | ExprOp::BitAnd | ExprOp::BitOr | ExprOp::BitXor => {
                all_base(ScalarType::is_integer)
            }
            ExprOp::Lshift | ExprOp::Rshift => all_base(ScalarType::is_integer),
            ExprOp::LogicNot | ExprOp::LogicAnd | ExprOp::LogicOr | ExprOp::LogicXor => {
                all_base(|b| b == ScalarType::Bool)
            }
            ExprOp::Dot => {
                all_base(ScalarType::is_float) && ir.operands[0].ty() == ir.operands[1].ty()
            }
            ExprOp::Csel => base(0) == Some(ScalarType::Bool),
            _ => true,
        };
        if !operand_rule {
            let detail = operand_types_named(ir);
            return self.fail(ValidationError::OperandType {
                op: op.name(),
                detail,
            });
        }

        // Matrix products carry shapes the component-wise rule cannot express.
        if ir.operands.iter().any(|o| o.ty().is_matrix()) {
            return Visit::Continue;
        }
        let expected = {
            let types = ir.operands.iter().map(Rvalue::ty).collect::<Vec<_>>();
            op.result_type(&types)
        };
        if expected != ir.ty {
            return self.fail(ValidationError::ResultType {
                op: op.name(),
                expected: expected.name(),
                found: ir.ty.name(),
            });
        }
        Visit::Continue
    }

    fn leave_swizzle(&mut self, ir: &mut Swizzle<'a>) -> Visit {
        let width = ir.val.ty().vector_elements();
        if let Some(component) = ir.mask.iter().find(|c| *c >= width) {
            return self.fail(ValidationError::SwizzleRange {
                component,
                ty: ir.val.ty().name(),
            });
        }
        Visit::Continue
    }

    fn leave_assignment(&mut self, ir: &mut Assignment<'a>) -> Visit {
        if let Some(c) = &ir.condition {
            if self.check_condition("assignment", c) == Visit::Stop {
                return Visit::Stop;
            }
        }

        let target = || {
            ir.lhs
                .variable_referenced()
                .map(|v| v.name.clone())
                .unwrap_or_default()
        };
        let lhs_ty = ir.lhs.ty();
        let rhs_ty = ir.rhs.ty();
        if lhs_ty.is_scalar_or_vector() {
            let width = lhs_ty.vector_elements() as usize;
            let mask_ok = !ir.write_mask.is_empty()
                && ir.write_mask.count() == rhs_ty.components()
                && ir.write_mask.channels().all(|c| c < width)
                && lhs_ty.base_type() == rhs_ty.base_type();
            if !mask_ok {
                return self.fail(ValidationError::WriteMask {
                    target: target(),
                    mask: ir.write_mask.letters(),
                    rhs: rhs_ty.name(),
                });
            }
        } else if lhs_ty != rhs_ty {
            return self.fail(ValidationError::AssignmentType {
                target: target(),
                lhs: lhs_ty.name(),
                rhs: rhs_ty.name(),
            });
        }
        Visit::Continue
    }

    fn leave_if(&mut self, ir: &mut If<'a>) -> Visit {
        self.check_condition("if", &ir.condition)
    }

    fn leave_discard(&mut self, condition: &mut Option<Rvalue<'a>>) -> Visit {
        match condition {
            Some(c) => self.check_condition("discard", c),
            None => Visit::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::*, Constant, IrArenas, IrContext, VariableMode, WriteMask};

    #[test]
    fn accepts_a_well_formed_block() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let v = ctx.new_variable("v", GlslType::vec(ScalarType::Float, 4), VariableMode::Auto);
        let s = ctx.new_variable("s", GlslType::FLOAT, VariableMode::Auto);
        let mut list = vec![
            Instruction::Variable(v),
            Instruction::Variable(s),
            assign_var(s, dot(var(v), var(v))),
            assign(crate::ir::Deref::Var(v), var(s), WriteMask::Y),
        ];
        assert_eq!(validate(&mut list), Ok(()));
    }

    #[test]
    fn rejects_undeclared_and_duplicate_variables() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let x = ctx.new_variable("x", GlslType::FLOAT, VariableMode::Auto);
        let mut list = vec![assign_var(x, constant(Constant::float(0.0)))];
        assert_eq!(
            validate(&mut list),
            Err(ValidationError::UndeclaredVariable("x".into()))
        );

        let mut list = vec![Instruction::Variable(x), Instruction::Variable(x)];
        assert_eq!(
            validate(&mut list),
            Err(ValidationError::DuplicateDeclaration("x".into()))
        );
    }

    #[test]
    fn rejects_mismatched_write_masks() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let v = ctx.new_variable("v", GlslType::vec(ScalarType::Float, 4), VariableMode::Auto);
        let mut list = vec![
            Instruction::Variable(v),
            assign(
                crate::ir::Deref::Var(v),
                constant(Constant::float(1.0)),
                WriteMask::X | WriteMask::Y,
            ),
        ];
        assert!(matches!(
            validate(&mut list),
            Err(ValidationError::WriteMask { .. })
        ));
    }

    #[test]
    fn rejects_bitwise_ops_on_floats() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let f = ctx.new_variable("f", GlslType::FLOAT, VariableMode::Auto);
        let mut list = vec![
            Instruction::Variable(f),
            assign_var(f, bit_and(var(f), var(f))),
        ];
        assert!(matches!(
            validate(&mut list),
            Err(ValidationError::OperandType { op: "&", .. })
        ));
    }
}
