//! Removes function signatures that are never called.

use std::collections::HashSet;

use tracing::debug;

use super::declare_pass;
use crate::ir::{
    visitor::{visit_list, Visit, Visitor},
    Call, Instruction, SignatureDecl,
};

declare_pass!(
    DeadFunctions,
    "dead_functions",
    |ctx, options, ir| do_dead_functions(ir)
);

#[derive(Default)]
struct Callees {
    called: HashSet<*const SignatureDecl<'static>>,
}
impl<'a> Visitor<'a> for Callees {
    fn enter_call(&mut self, ir: &mut Call<'a>) -> Visit {
        self.called.insert(key(ir.callee));
        Visit::Continue
    }
}

fn key(decl: &SignatureDecl<'_>) -> *const SignatureDecl<'static> {
    (decl as *const SignatureDecl<'_>).cast()
}

pub fn do_dead_functions(instructions: &mut Vec<Instruction<'_>>) -> bool {
    let mut callees = Callees::default();
    visit_list(&mut callees, instructions);

    let mut progress = false;
    for ir in instructions.iter_mut() {
        let Instruction::Function(f) = ir else {
            continue;
        };
        if f.name == "main" {
            continue;
        }
        let before = f.signatures.len();
        f.signatures.retain(|sig| callees.called.contains(&key(sig.decl)));
        if f.signatures.len() != before {
            debug!("[DeadFunctions] removed {} signature(s) of {}", before - f.signatures.len(), f.name);
            progress = true;
        }
    }
    let before = instructions.len();
    instructions.retain(|ir| !matches!(ir, Instruction::Function(f) if f.signatures.is_empty()));
    progress || instructions.len() != before
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, reader::read_instructions, IrArenas, IrContext};

    #[test]
    fn uncalled_functions_are_dropped_in_rounds() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(
            &ctx,
            indoc! {"
                (function leaf
                  (signature void (parameters) ()))
                (function unused
                  (signature void (parameters) ((call leaf ()))))
                (function used
                  (signature void (parameters) ()))
                (function main
                  (signature void (parameters) ((call used ()))))
            "},
        )
        .unwrap();
        assert!(do_dead_functions(&mut list));
        let out = print_instructions(&list);
        assert!(!out.contains("function unused"));
        assert!(out.contains("function leaf"));
        assert!(out.contains("function used"));

        assert!(do_dead_functions(&mut list));
        assert!(!print_instructions(&list).contains("function leaf"));
        assert!(!do_dead_functions(&mut list));
    }
}
