//! Dead store elimination within basic blocks.
//!
//! Each assignment leaves behind the set of channels it wrote that nothing
//! has read yet. A later unconditional write covering those channels makes
//! them dead: the earlier assignment loses them from its write mask, and
//! goes away once no channel is left.

use tracing::debug;

use super::declare_pass;
use crate::ir::{
    basic_block::for_each_basic_block,
    builder::{constant, swizzle},
    visitor::{visit_instruction, Visit, Visitor},
    Assignment, Deref, Instruction, Rvalue, Swizzle, SwizzleMask, VarRef, VariableMode,
    WriteMask,
};

declare_pass!(
    DeadCodeLocal,
    "dead_code_local",
    |ctx, options, ir| do_dead_code_local(ir)
);

pub fn do_dead_code_local(instructions: &mut Vec<Instruction<'_>>) -> bool {
    let mut progress = false;
    for_each_basic_block(instructions, &mut |block| {
        progress |= dead_code_local_block(block);
    });
    progress
}

struct Entry<'a> {
    index: usize,
    var: VarRef<'a>,
    /// Written and not read since. Aggregates use the full mask.
    unused: WriteMask,
}

/// Channels read by one instruction, per variable.
#[derive(Default)]
struct Reads<'a> {
    uses: Vec<(VarRef<'a>, WriteMask)>,
}
impl<'a> Visitor<'a> for Reads<'a> {
    fn visit_dereference_variable(&mut self, var: VarRef<'a>, assignee: bool) -> Visit {
        if !assignee {
            self.uses.push((var, WriteMask::all()));
        }
        Visit::Continue
    }

    fn enter_swizzle(&mut self, ir: &mut Swizzle<'a>) -> Visit {
        let Some(var) = ir.val.as_var() else {
            return Visit::Continue;
        };
        let mask = ir
            .mask
            .iter()
            .fold(WriteMask::empty(), |m, c| m | WriteMask::from_channel(c as usize));
        self.uses.push((var, mask));
        Visit::ContinueWithParent
    }
}

fn tracked(var: VarRef<'_>) -> bool {
    !var.mode().is_buffer_backed()
}

fn is_self_assignment(a: &Assignment<'_>) -> bool {
    a.condition.is_none()
        && a.whole_variable_written().is_some()
        && a.lhs.as_var() == a.rhs.as_var()
}

/// Drops `dead` channels from `a`. Returns false when nothing is left.
fn narrow(a: &mut Assignment<'_>, dead: WriteMask) -> bool {
    let kept = a.write_mask.difference(dead);
    if kept.is_empty() {
        return false;
    }
    let components = a
        .write_mask
        .channels()
        .enumerate()
        .filter(|(_, c)| kept.contains(WriteMask::from_channel(*c)))
        .map(|(k, _)| k as u8)
        .collect::<Vec<_>>();
    let mask = SwizzleMask::new(&components);
    a.rhs = match a.rhs.take() {
        Rvalue::Constant(c) => constant(c.swizzle(&mask)),
        rhs => swizzle(rhs, mask),
    };
    a.write_mask = kept;
    true
}

fn dead_code_local_block(block: &mut Vec<Instruction<'_>>) -> bool {
    let mut entries: Vec<Entry<'_>> = Vec::new();
    let mut removed = vec![false; block.len()];
    let mut progress = false;

    for i in 0..block.len() {
        let mut reads = Reads::default();
        visit_instruction(&mut reads, &mut block[i]);
        for (var, mask) in reads.uses {
            for e in entries.iter_mut().filter(|e| e.var == var) {
                e.unused = e.unused.difference(mask);
            }
        }
        if matches!(block[i], Instruction::EmitVertex) {
            // the emitted vertex captures every output
            entries.retain(|e| e.var.mode() != VariableMode::ShaderOut);
        }
        entries.retain(|e| !e.unused.is_empty());

        let Instruction::Assignment(a) = &block[i] else {
            continue;
        };
        if is_self_assignment(a) {
            debug!("[DeadCodeLocal] removing self-assignment");
            removed[i] = true;
            progress = true;
            continue;
        }
        let Deref::Var(var) = a.lhs else {
            continue;
        };
        if !tracked(var) {
            continue;
        }
        let written = if var.ty.is_scalar_or_vector() {
            a.write_mask
        } else {
            WriteMask::all()
        };

        if a.condition.is_none() {
            for e in entries.iter_mut().filter(|e| e.var == var) {
                let dead = e.unused.intersection(written);
                if dead.is_empty() {
                    continue;
                }
                e.unused = e.unused.difference(dead);
                let Instruction::Assignment(earlier) = &mut block[e.index] else {
                    continue;
                };
                progress = true;
                if var.ty.is_scalar_or_vector() && narrow(earlier, dead) {
                    debug!("[DeadCodeLocal] narrowed write to {} to {}", var.name, earlier.write_mask.letters());
                } else {
                    debug!("[DeadCodeLocal] removing dead write to {}", var.name);
                    removed[e.index] = true;
                    e.unused = WriteMask::empty();
                }
            }
            entries.retain(|e| !e.unused.is_empty());
        }

        entries.push(Entry {
            index: i,
            var,
            unused: written,
        });
    }

    if progress {
        let mut i = 0;
        block.retain(|_| {
            let keep = !removed[i];
            i += 1;
            keep
        });
    }
    progress
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, reader::read_instructions, IrArenas, IrContext};

    fn run(src: &str) -> (bool, String) {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let mut list = read_instructions(&ctx, src).unwrap();
        let progress = do_dead_code_local(&mut list);
        (progress, print_instructions(&list))
    }

    #[test]
    fn overwritten_store_is_removed() {
        let (progress, out) = run(indoc! {"
            (declare (shader_out) vec4 o)
            (declare (shader_in) vec4 v)
            (assign (xyzw) (var_ref o) (var_ref v))
            (assign (xyzw) (var_ref o) (constant vec4 (0.0 0.0 0.0 0.0)))
        "});
        assert!(progress);
        assert_eq!(
            out,
            indoc! {"
                (declare (shader_out) vec4 o)
                (declare (shader_in) vec4 v)
                (assign (xyzw) (var_ref o) (constant vec4 (0.0 0.0 0.0 0.0)))
            "}
        );
    }

    #[test]
    fn partially_overwritten_store_is_narrowed() {
        let (progress, out) = run(indoc! {"
            (declare (shader_out) vec4 o)
            (declare (shader_in) vec4 v)
            (assign (xyzw) (var_ref o) (var_ref v))
            (assign (xy) (var_ref o) (constant vec2 (0.0 1.0)))
        "});
        assert!(progress);
        assert!(out.contains("(assign (zw) (var_ref o) (swiz zw (var_ref v)))"));
    }

    #[test]
    fn reads_keep_earlier_stores_alive() {
        let src = indoc! {"
            (declare () vec2 a)
            (declare (shader_out) float o)
            (declare (shader_out) float p)
            (assign (xy) (var_ref a) (constant vec2 (1.0 2.0)))
            (assign (x) (var_ref o) (swiz x (var_ref a)))
            (assign (xy) (var_ref a) (constant vec2 (3.0 4.0)))
            (assign (x) (var_ref p) (swiz y (var_ref a)))
        "};
        let (progress, out) = run(src);
        assert!(progress);
        // only the y channel of the first store was overwritten unread
        assert!(out.contains("(assign (x) (var_ref a) (constant float (1.0)))"));

        let (progress, _) = run(&out);
        assert!(!progress);
    }

    #[test]
    fn self_assignment_is_removed() {
        let (progress, out) = run(indoc! {"
            (declare () vec3 a)
            (assign (xyz) (var_ref a) (var_ref a))
        "});
        assert!(progress);
        assert_eq!(out, "(declare () vec3 a)\n");
    }

    #[test]
    fn emit_vertex_reads_outputs() {
        let (progress, _) = run(indoc! {"
            (declare (shader_out) vec4 pos)
            (assign (xyzw) (var_ref pos) (constant vec4 (0.0 0.0 0.0 1.0)))
            (emit-vertex)
            (assign (xyzw) (var_ref pos) (constant vec4 (1.0 0.0 0.0 1.0)))
            (emit-vertex)
        "});
        assert!(!progress);
    }

    #[test]
    fn conditional_stores_do_not_kill() {
        let (progress, _) = run(indoc! {"
            (declare (uniform) bool c)
            (declare (shader_out) float o)
            (assign (x) (var_ref o) (constant float (1.0)))
            (assign (var_ref c) (x) (var_ref o) (constant float (2.0)))
        "});
        assert!(!progress);
    }
}
