//! S-expression rendering of instruction lists.

use std::{collections::HashSet, fmt::Write as _, rc::Rc};

use super::{
    ConstData, ConstScalar, Constant, Deref, GlslType, Instruction, RecordType, Rvalue,
    Signature, VarRef, VariableMode,
};

pub fn print_instructions(instructions: &[Instruction<'_>]) -> String {
    let mut p = Printer::default();
    let mut records = Vec::new();
    collect_records(instructions, &mut records, &mut HashSet::new());
    for r in &records {
        p.record(r);
    }
    for ir in instructions {
        p.instruction(ir);
    }
    p.out
}

pub fn print_rvalue(rv: &Rvalue<'_>) -> String {
    let mut s = String::new();
    write_rvalue(&mut s, rv);
    s
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}
impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn record(&mut self, r: &RecordType) {
        let head = if r.is_interface { "interface" } else { "record" };
        let mut s = format!("({head} {}", r.name);
        for f in &r.fields {
            let _ = write!(s, " ({} {})", f.ty.name(), f.name);
        }
        s.push(')');
        self.line(&s);
    }

    fn block(&mut self, head: &str, body: &[Instruction<'_>], tail: &str) {
        self.line(head);
        self.indent += 1;
        for ir in body {
            self.instruction(ir);
        }
        self.indent -= 1;
        self.line(tail);
    }

    fn instruction(&mut self, ir: &Instruction<'_>) {
        match ir {
            Instruction::Variable(v) => self.line(&declaration(*v)),
            Instruction::Assignment(a) => {
                let mut s = String::from("(assign ");
                if let Some(c) = &a.condition {
                    write_rvalue(&mut s, c);
                    s.push(' ');
                }
                let _ = write!(s, "({}) ", a.write_mask.letters());
                write_deref(&mut s, &a.lhs);
                s.push(' ');
                write_rvalue(&mut s, &a.rhs);
                s.push(')');
                self.line(&s);
            }
            Instruction::If(i) => {
                let mut head = String::from("(if ");
                write_rvalue(&mut head, &i.condition);
                self.line(&head);
                self.indent += 1;
                self.block("(", &i.then_instructions, ")");
                self.block("(", &i.else_instructions, "))");
                self.indent -= 1;
            }
            Instruction::Loop(l) => {
                self.line("(loop");
                self.indent += 1;
                self.block("(", &l.body, "))");
                self.indent -= 1;
            }
            Instruction::LoopJump(super::LoopJump::Break) => self.line("(break)"),
            Instruction::LoopJump(super::LoopJump::Continue) => self.line("(continue)"),
            Instruction::Call(c) => {
                let mut s = format!("(call {} ", c.callee.name);
                if let Some(r) = &c.return_deref {
                    write_deref(&mut s, r);
                    s.push(' ');
                }
                s.push('(');
                write_list(&mut s, &c.actual_parameters);
                s.push_str("))");
                self.line(&s);
            }
            Instruction::Return(v) => self.line(&optional_form("return", v.as_ref())),
            Instruction::Discard(c) => self.line(&optional_form("discard", c.as_ref())),
            Instruction::Demote => self.line("(demote)"),
            Instruction::EmitVertex => self.line("(emit-vertex)"),
            Instruction::EndPrimitive => self.line("(end-primitive)"),
            Instruction::Barrier => self.line("(barrier)"),
            Instruction::Function(f) => {
                self.line(&format!("(function {}", f.name));
                self.indent += 1;
                for sig in &f.signatures {
                    self.signature(sig);
                }
                self.indent -= 1;
                self.line(")");
            }
        }
    }

    fn signature(&mut self, sig: &Signature<'_>) {
        let intrinsic = if sig.decl.is_intrinsic { "intrinsic " } else { "" };
        self.line(&format!("(signature {intrinsic}{}", sig.decl.return_type.name()));
        self.indent += 1;
        self.line("(parameters");
        self.indent += 1;
        for p in &sig.decl.parameters {
            self.line(&declaration(*p));
        }
        self.indent -= 1;
        self.line(")");
        self.block("(", &sig.body, "))");
        self.indent -= 1;
    }
}

fn declaration(v: VarRef<'_>) -> String {
    let mode = match v.mode() {
        VariableMode::Auto => "",
        m => m.name(),
    };
    format!("(declare ({mode}) {} {})", v.ty.name(), v.name)
}

fn optional_form(head: &str, value: Option<&Rvalue<'_>>) -> String {
    match value {
        Some(v) => format!("({head} {})", print_rvalue(v)),
        None => format!("({head})"),
    }
}

fn write_list(s: &mut String, list: &[Rvalue<'_>]) {
    for (n, rv) in list.iter().enumerate() {
        if n > 0 {
            s.push(' ');
        }
        write_rvalue(s, rv);
    }
}

fn write_deref(s: &mut String, d: &Deref<'_>) {
    match d {
        Deref::Var(v) => {
            let _ = write!(s, "(var_ref {})", v.name);
        }
        Deref::Array(a) => {
            s.push_str("(array_ref ");
            write_rvalue(s, &a.array);
            s.push(' ');
            write_rvalue(s, &a.index);
            s.push(')');
        }
        Deref::Record(r) => {
            s.push_str("(record_ref ");
            write_rvalue(s, &r.record);
            let field = r
                .record
                .ty()
                .field(r.field)
                .map_or_else(|| r.field.to_string(), |f| f.name.clone());
            let _ = write!(s, " {field})");
        }
    }
}

fn write_rvalue(s: &mut String, rv: &Rvalue<'_>) {
    match rv {
        Rvalue::Constant(c) => write_constant(s, c),
        Rvalue::Deref(d) => write_deref(s, d),
        Rvalue::Swizzle(sw) => {
            let _ = write!(s, "(swiz {} ", sw.mask.letters());
            write_rvalue(s, &sw.val);
            s.push(')');
        }
        Rvalue::Expression(e) => {
            let _ = write!(s, "(expression {} {} ", e.ty.name(), e.op.name());
            write_list(s, &e.operands);
            s.push(')');
        }
        Rvalue::Texture(t) => {
            let _ = write!(s, "(texture {} {} ", t.op.name(), t.ty.name());
            write_deref(s, &t.sampler);
            s.push(' ');
            match &t.coordinate {
                Some(c) => write_rvalue(s, c),
                None => s.push_str("()"),
            }
            if let Some(l) = &t.lod {
                s.push(' ');
                write_rvalue(s, l);
            }
            s.push(')');
        }
    }
}

fn write_constant(s: &mut String, c: &Constant) {
    let _ = write!(s, "(constant {} (", c.ty.name());
    match &c.data {
        ConstData::Components(values) => {
            for (n, v) in values.iter().enumerate() {
                if n > 0 {
                    s.push(' ');
                }
                write_scalar(s, *v);
            }
        }
        ConstData::Elements(elements) => {
            for (n, e) in elements.iter().enumerate() {
                if n > 0 {
                    s.push(' ');
                }
                write_constant(s, e);
            }
        }
    }
    s.push_str("))");
}

fn write_scalar(s: &mut String, v: ConstScalar) {
    let _ = match v {
        ConstScalar::Bool(b) => write!(s, "{b}"),
        ConstScalar::Int(x) => write!(s, "{x}"),
        ConstScalar::Uint(x) => write!(s, "{x}"),
        ConstScalar::Float(x) => write!(s, "{x:?}"),
        ConstScalar::Double(x) => write!(s, "{x:?}"),
        ConstScalar::Int64(x) => write!(s, "{x}"),
        ConstScalar::Uint64(x) => write!(s, "{x}"),
    };
}

/// Record types used by declarations, dependencies first.
fn collect_records(
    instructions: &[Instruction<'_>],
    out: &mut Vec<Rc<RecordType>>,
    seen: &mut HashSet<String>,
) {
    fn visit_type(ty: &GlslType, out: &mut Vec<Rc<RecordType>>, seen: &mut HashSet<String>) {
        match ty {
            GlslType::Array { element, .. } => visit_type(element, out, seen),
            GlslType::Record(r) => {
                if !seen.insert(r.name.clone()) {
                    return;
                }
                for f in &r.fields {
                    visit_type(&f.ty, out, seen);
                }
                out.push(r.clone());
            }
            _ => (),
        }
    }

    for ir in instructions {
        match ir {
            Instruction::Variable(v) => visit_type(&v.ty, out, seen),
            Instruction::If(i) => {
                collect_records(&i.then_instructions, out, seen);
                collect_records(&i.else_instructions, out, seen);
            }
            Instruction::Loop(l) => collect_records(&l.body, out, seen),
            Instruction::Function(f) => {
                for sig in &f.signatures {
                    for p in &sig.decl.parameters {
                        visit_type(&p.ty, out, seen);
                    }
                    collect_records(&sig.body, out, seen);
                }
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::*, IrArenas, IrContext, ScalarType, SwizzleMask, WriteMask};

    #[test]
    fn prints_assignments_inline() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let v = ctx.new_variable("v", GlslType::vec(ScalarType::Float, 4), VariableMode::ShaderIn);
        let r = ctx.new_variable("r", GlslType::vec(ScalarType::Float, 2), VariableMode::Auto);
        let list = vec![
            Instruction::Variable(v),
            Instruction::Variable(r),
            assign(
                Deref::Var(r),
                add(
                    swizzle(var(v), SwizzleMask::new(&[2, 3])),
                    constant(Constant::float(0.5)),
                ),
                WriteMask::X | WriteMask::Y,
            ),
        ];
        assert_eq!(
            print_instructions(&list),
            "(declare (shader_in) vec4 v)\n\
             (declare () vec2 r)\n\
             (assign (xy) (var_ref r) (expression vec2 + (swiz zw (var_ref v)) (constant float (0.5))))\n"
        );
    }
}
