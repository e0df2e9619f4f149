//! Splitting instruction lists into basic blocks.

use super::Instruction;

/// Calls `f` for every maximal straight-line run of instructions, including
/// the runs inside nested `if`/`loop` bodies and function signatures.
///
/// A run never contains control flow; a call terminates the run it appears
/// in. The callback receives the run as an owned list and may remove,
/// replace or insert instructions in it freely.
pub fn for_each_basic_block<'a, F>(list: &mut Vec<Instruction<'a>>, f: &mut F)
where
    F: FnMut(&mut Vec<Instruction<'a>>),
{
    let mut start = 0;
    let mut i = 0;
    while i < list.len() {
        if list[i].is_block_boundary() {
            i = flush(list, start, i, f);
            descend(&mut list[i], f);
            i += 1;
            start = i;
            continue;
        }

        i += 1;
        if matches!(list[i - 1], Instruction::Call(_)) {
            i = flush(list, start, i, f);
            start = i;
        }
    }
    flush(list, start, list.len(), f);
}

/// Runs `f` on `list[start..end]` and returns the index just past the
/// (possibly resized) run.
fn flush<'a, F>(list: &mut Vec<Instruction<'a>>, start: usize, end: usize, f: &mut F) -> usize
where
    F: FnMut(&mut Vec<Instruction<'a>>),
{
    if start == end {
        return end;
    }
    let mut block = list.drain(start..end).collect::<Vec<_>>();
    f(&mut block);
    let len = block.len();
    list.splice(start..start, block);
    start + len
}

fn descend<'a, F>(ir: &mut Instruction<'a>, f: &mut F)
where
    F: FnMut(&mut Vec<Instruction<'a>>),
{
    match ir {
        Instruction::If(i) => {
            for_each_basic_block(&mut i.then_instructions, f);
            for_each_basic_block(&mut i.else_instructions, f);
        }
        Instruction::Loop(l) => for_each_basic_block(&mut l.body, f),
        Instruction::Function(func) => {
            for sig in func.signatures.iter_mut() {
                for_each_basic_block(&mut sig.body, f);
            }
        }
        _ => (),
    }
}
