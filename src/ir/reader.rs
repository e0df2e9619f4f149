//! Reads the s-expression form written by [`super::print`].

use std::{collections::HashMap, rc::Rc};

use thiserror::Error;

use super::{
    builder, Assignment, Call, ConstData, ConstScalar, Constant, Deref, ExprOp, Expression,
    Function, GlslType, If, Instruction, IrContext, Loop, LoopJump, RecordField, RecordType,
    Rvalue, ScalarType, Signature, SignatureDecl, Texture, TextureOp, VarRef, VariableMode,
    WriteMask,
};
use crate::utils::{swizzle_mask, write_mask, BoolToErrorHelper, Located};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadErrorKind {
    #[error("unexpected `)`")]
    UnexpectedClose,
    #[error("unclosed `(`")]
    UnclosedList,
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("malformed `{0}` form")]
    Malformed(&'static str),
    #[error("unknown type `{0}`")]
    UnknownType(String),
    #[error("unknown variable mode `{0}`")]
    UnknownMode(String),
    #[error("unknown instruction `{0}`")]
    UnknownInstruction(String),
    #[error("unknown rvalue `{0}`")]
    UnknownRvalue(String),
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),
    #[error("unknown texture operation `{0}`")]
    UnknownTextureOp(String),
    #[error("undeclared variable `{0}`")]
    UndeclaredVariable(String),
    #[error("no matching signature for `{0}`")]
    UnknownFunction(String),
    #[error("no field named `{0}`")]
    UnknownField(String),
    #[error("invalid swizzle or write mask `{0}`")]
    InvalidSwizzle(String),
    #[error("invalid {ty} value `{value}`")]
    InvalidValue { ty: String, value: String },
    #[error("{ty} constant needs {expected} values, found {found}")]
    ConstantCount {
        ty: String,
        expected: usize,
        found: usize,
    },
}
impl ReadErrorKind {
    #[inline(always)]
    pub fn at(self, line: usize, col: usize) -> Located<Self> {
        Located { t: self, line, col }
    }
}

pub type ReadError = Located<ReadErrorKind>;
pub type ReadResult<T> = Result<T, ReadError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Open,
    Close,
    Atom,
}

#[derive(Debug, Clone)]
struct Token<'s> {
    slice: &'s str,
    kind: TokenKind,
    line: usize,
    col: usize,
}

struct Tokenizer<'s> {
    source: &'s str,
    line: usize,
    col: usize,
}
impl<'s> Tokenizer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            line: 0,
            col: 0,
        }
    }

    fn skip_spaces_and_comments(&mut self) {
        loop {
            let (bytes, _) = self
                .source
                .chars()
                .take_while(|c| c.is_whitespace())
                .fold((0, ()), |(b, _), c| {
                    if c == '\n' {
                        self.line += 1;
                        self.col = 0;
                    } else {
                        self.col += 1;
                    }
                    (b + c.len_utf8(), ())
                });
            self.source = &self.source[bytes..];

            if !self.source.starts_with('#') {
                break;
            }
            // line comment
            self.source = self.source.trim_start_matches(|c| c != '\n');
        }
    }

    fn next_token(&mut self) -> Option<Token<'s>> {
        self.skip_spaces_and_comments();
        if self.source.is_empty() {
            return None;
        }

        let (kind, bytes, chars) = match self.source.as_bytes()[0] {
            b'(' => (TokenKind::Open, 1, 1),
            b')' => (TokenKind::Close, 1, 1),
            _ => {
                let (chars, bytes) = self
                    .source
                    .chars()
                    .take_while(|&c| !c.is_whitespace() && !"()#".contains(c))
                    .fold((0, 0), |(a, b), c| (a + 1, b + c.len_utf8()));
                (TokenKind::Atom, bytes, chars)
            }
        };
        let tk = Token {
            slice: &self.source[..bytes],
            kind,
            line: self.line,
            col: self.col,
        };
        self.source = &self.source[bytes..];
        self.col += chars;
        Some(tk)
    }
}

#[derive(Debug)]
enum SExpr<'s> {
    Atom(&'s str, usize, usize),
    List(Vec<SExpr<'s>>, usize, usize),
}
impl<'s> SExpr<'s> {
    fn err(&self, t: ReadErrorKind) -> ReadError {
        let (Self::Atom(_, line, col) | Self::List(_, line, col)) = self;
        t.at(*line, *col)
    }

    fn as_atom(&self) -> Option<&'s str> {
        match self {
            Self::Atom(a, ..) => Some(a),
            Self::List(..) => None,
        }
    }

    fn atom(&self, what: &'static str) -> ReadResult<&'s str> {
        self.as_atom()
            .ok_or_else(|| self.err(ReadErrorKind::Expected(what)))
    }

    fn list(&self, what: &'static str) -> ReadResult<&[SExpr<'s>]> {
        match self {
            Self::List(items, ..) => Ok(items),
            Self::Atom(..) => Err(self.err(ReadErrorKind::Expected(what))),
        }
    }

    /// A list form and its leading keyword.
    fn form(&self) -> ReadResult<(&'s str, &[SExpr<'s>])> {
        let items = self.list("a form")?;
        let head = items
            .first()
            .ok_or_else(|| self.err(ReadErrorKind::Expected("a form keyword")))?
            .atom("a form keyword")?;
        Ok((head, &items[1..]))
    }
}

fn parse_sexprs(source: &str) -> ReadResult<Vec<SExpr<'_>>> {
    let mut stack = vec![(Vec::new(), 0, 0)];
    let mut tokenizer = Tokenizer::new(source);
    while let Some(tk) = tokenizer.next_token() {
        match tk.kind {
            TokenKind::Open => stack.push((Vec::new(), tk.line, tk.col)),
            TokenKind::Close => {
                let (items, line, col) = match stack.pop() {
                    Some(top) if !stack.is_empty() => top,
                    _ => return Err(ReadErrorKind::UnexpectedClose.at(tk.line, tk.col)),
                };
                if let Some((parent, ..)) = stack.last_mut() {
                    parent.push(SExpr::List(items, line, col));
                }
            }
            TokenKind::Atom => {
                if let Some((parent, ..)) = stack.last_mut() {
                    parent.push(SExpr::Atom(tk.slice, tk.line, tk.col));
                }
            }
        }
    }
    if let [_, .., (_, line, col)] = &stack[..] {
        return Err(ReadErrorKind::UnclosedList.at(*line, *col));
    }
    Ok(stack.pop().map(|(items, ..)| items).unwrap_or_default())
}

/// Parses a whole translation unit: record and interface definitions,
/// global declarations and functions.
pub fn read_instructions<'a>(
    ctx: &IrContext<'a>,
    source: &str,
) -> ReadResult<Vec<Instruction<'a>>> {
    let forms = parse_sexprs(source)?;
    let mut reader = Reader {
        ctx,
        records: HashMap::new(),
        scopes: vec![HashMap::new()],
        functions: HashMap::new(),
    };

    // calls may refer to functions defined further down
    for f in &forms {
        reader.predeclare(f)?;
    }
    let mut out = Vec::new();
    for f in &forms {
        if let Some(ir) = reader.top_level(f)? {
            out.push(ir);
        }
    }
    Ok(out)
}

/// Parses one rvalue against the given variables.
pub fn read_rvalue<'a>(
    ctx: &IrContext<'a>,
    variables: &[VarRef<'a>],
    source: &str,
) -> ReadResult<Rvalue<'a>> {
    let forms = parse_sexprs(source)?;
    let [form] = &forms[..] else {
        return Err(ReadErrorKind::Expected("exactly one rvalue").at(0, 0));
    };
    let scope = variables.iter().map(|v| (v.name.clone(), *v)).collect();
    let mut reader = Reader {
        ctx,
        records: HashMap::new(),
        scopes: vec![scope],
        functions: HashMap::new(),
    };
    reader.rvalue(form)
}

struct Reader<'c, 'a> {
    ctx: &'c IrContext<'a>,
    records: HashMap<String, Rc<RecordType>>,
    scopes: Vec<HashMap<String, VarRef<'a>>>,
    functions: HashMap<String, Vec<&'a SignatureDecl<'a>>>,
}
impl<'a> Reader<'_, 'a> {
    fn lookup(&self, e: &SExpr<'_>, name: &str) -> ReadResult<VarRef<'a>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.get(name).copied())
            .ok_or_else(|| e.err(ReadErrorKind::UndeclaredVariable(name.into())))
    }

    fn predeclare(&mut self, e: &SExpr<'_>) -> ReadResult<()> {
        let (head, rest) = e.form()?;
        match head {
            "record" | "interface" => self.record(e, rest, head == "interface"),
            "function" => {
                let name = rest
                    .first()
                    .ok_or_else(|| e.err(ReadErrorKind::Malformed("function")))?
                    .atom("a function name")?;
                for sig in &rest[1..] {
                    let decl = self.signature_decl(name, sig)?;
                    self.functions.entry(name.into()).or_default().push(decl);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn top_level(&mut self, e: &SExpr<'_>) -> ReadResult<Option<Instruction<'a>>> {
        let (head, rest) = e.form()?;
        match head {
            "record" | "interface" => Ok(None),
            "function" => {
                let name = rest
                    .first()
                    .ok_or_else(|| e.err(ReadErrorKind::Malformed("function")))?
                    .atom("a function name")?;
                let decls = self.functions.get(name).cloned().unwrap_or_default();
                let mut signatures = Vec::new();
                for (sig, decl) in rest[1..].iter().zip(decls) {
                    let items = sig.list("a signature")?;
                    let body = items
                        .last()
                        .ok_or_else(|| sig.err(ReadErrorKind::Malformed("signature")))?;
                    self.scopes.push(
                        decl.parameters
                            .iter()
                            .map(|p| (p.name.clone(), *p))
                            .collect(),
                    );
                    let body = self.instructions(body);
                    self.scopes.pop();
                    signatures.push(Signature {
                        decl,
                        body: body?,
                        is_defined: !decl.is_intrinsic,
                    });
                }
                Ok(Some(Instruction::Function(Function {
                    name: name.into(),
                    signatures,
                })))
            }
            _ => self.instruction(e).map(Some),
        }
    }

    fn record(&mut self, e: &SExpr<'_>, rest: &[SExpr<'_>], is_interface: bool) -> ReadResult<()> {
        let name = rest
            .first()
            .ok_or_else(|| e.err(ReadErrorKind::Malformed("record")))?
            .atom("a record name")?;
        let fields = rest[1..]
            .iter()
            .map(|f| match f.list("a field")? {
                [ty, field] => Ok(RecordField {
                    name: field.atom("a field name")?.into(),
                    ty: self.ty(ty)?,
                }),
                _ => Err(f.err(ReadErrorKind::Malformed("field"))),
            })
            .collect::<ReadResult<Vec<_>>>()?;
        self.records.insert(
            name.into(),
            Rc::new(RecordType {
                name: name.into(),
                fields,
                is_interface,
            }),
        );
        Ok(())
    }

    fn signature_decl(&mut self, name: &str, e: &SExpr<'_>) -> ReadResult<&'a SignatureDecl<'a>> {
        let (head, mut rest) = e.form()?;
        (head == "signature").or_err(|| e.err(ReadErrorKind::Expected("a signature")))?;
        let is_intrinsic = rest.first().and_then(SExpr::as_atom) == Some("intrinsic");
        if is_intrinsic {
            rest = &rest[1..];
        }
        let [ret, params, _body] = rest else {
            return Err(e.err(ReadErrorKind::Malformed("signature")));
        };
        let (phead, decls) = params.form()?;
        (phead == "parameters").or_err(|| params.err(ReadErrorKind::Expected("parameters")))?;
        self.scopes.push(HashMap::new());
        let parameters = decls
            .iter()
            .map(|d| self.declaration(d))
            .collect::<ReadResult<Vec<_>>>();
        self.scopes.pop();
        let parameters = parameters?;
        Ok(self.ctx.new_signature(SignatureDecl {
            name: name.into(),
            return_type: self.ty(ret)?,
            parameters,
            is_intrinsic,
        }))
    }

    fn ty(&self, e: &SExpr<'_>) -> ReadResult<GlslType> {
        match e {
            SExpr::Atom(name, ..) => GlslType::from_name(name)
                .or_else(|| self.records.get(*name).map(|r| GlslType::Record(r.clone())))
                .ok_or_else(|| e.err(ReadErrorKind::UnknownType((*name).into()))),
            SExpr::List(items, ..) => match &items[..] {
                [head, element, length] if head.as_atom() == Some("array") => {
                    let length = length.atom("an array length")?;
                    let length = length
                        .parse()
                        .map_err(|_| e.err(ReadErrorKind::UnknownType(length.into())))?;
                    Ok(GlslType::array(self.ty(element)?, length))
                }
                _ => Err(e.err(ReadErrorKind::Malformed("array type"))),
            },
        }
    }

    /// `(declare (modes...) type name)`, registered in the innermost scope.
    fn declaration(&mut self, e: &SExpr<'_>) -> ReadResult<VarRef<'a>> {
        let (head, rest) = e.form()?;
        (head == "declare").or_err(|| e.err(ReadErrorKind::Expected("a declaration")))?;
        let [modes, ty, name] = rest else {
            return Err(e.err(ReadErrorKind::Malformed("declare")));
        };
        let mut mode = VariableMode::Auto;
        for m in modes.list("a mode list")? {
            let m_name = m.atom("a variable mode")?;
            mode = VariableMode::from_name(m_name)
                .ok_or_else(|| m.err(ReadErrorKind::UnknownMode(m_name.into())))?;
        }
        let name = name.atom("a variable name")?;
        let var = self.ctx.new_variable(name, self.ty(ty)?, mode);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), var);
        }
        Ok(var)
    }

    fn instructions(&mut self, e: &SExpr<'_>) -> ReadResult<Vec<Instruction<'a>>> {
        let items = e.list("an instruction list")?;
        self.scopes.push(HashMap::new());
        let list = items
            .iter()
            .map(|i| self.instruction(i))
            .collect::<ReadResult<Vec<_>>>();
        self.scopes.pop();
        list
    }

    fn instruction(&mut self, e: &SExpr<'_>) -> ReadResult<Instruction<'a>> {
        let (head, rest) = e.form()?;
        let malformed = || e.err(ReadErrorKind::Malformed(keyword(head)));
        Ok(match (head, rest) {
            ("declare", _) => Instruction::Variable(self.declaration(e)?),
            ("assign", [mask, lhs, rhs]) => self.assignment(None, mask, lhs, rhs)?,
            ("assign", [cond, mask, lhs, rhs]) => self.assignment(Some(cond), mask, lhs, rhs)?,
            ("if", [cond, then, otherwise]) => Instruction::If(If {
                condition: self.rvalue(cond)?,
                then_instructions: self.instructions(then)?,
                else_instructions: self.instructions(otherwise)?,
            }),
            ("loop", [body]) => Instruction::Loop(Loop {
                body: self.instructions(body)?,
            }),
            ("break", []) => Instruction::LoopJump(LoopJump::Break),
            ("continue", []) => Instruction::LoopJump(LoopJump::Continue),
            ("call", [name, params]) => self.call(e, name, None, params)?,
            ("call", [name, ret, params]) => self.call(e, name, Some(ret), params)?,
            ("return", []) => Instruction::Return(None),
            ("return", [v]) => Instruction::Return(Some(self.rvalue(v)?)),
            ("discard", []) => Instruction::Discard(None),
            ("discard", [c]) => Instruction::Discard(Some(self.rvalue(c)?)),
            ("demote", []) => Instruction::Demote,
            ("emit-vertex", []) => Instruction::EmitVertex,
            ("end-primitive", []) => Instruction::EndPrimitive,
            ("barrier", []) => Instruction::Barrier,
            (
                "assign" | "if" | "loop" | "break" | "continue" | "call" | "return" | "discard"
                | "demote" | "emit-vertex" | "end-primitive" | "barrier",
                _,
            ) => return Err(malformed()),
            _ => return Err(e.err(ReadErrorKind::UnknownInstruction(head.into()))),
        })
    }

    fn assignment(
        &mut self,
        cond: Option<&SExpr<'_>>,
        mask: &SExpr<'_>,
        lhs: &SExpr<'_>,
        rhs: &SExpr<'_>,
    ) -> ReadResult<Instruction<'a>> {
        let condition = cond.map(|c| self.rvalue(c)).transpose()?;
        let lhs = self.deref(lhs)?;
        let rhs = self.rvalue(rhs)?;
        let bits = match mask.list("a write mask")? {
            _ if !lhs.ty().is_scalar_or_vector() => WriteMask::empty(),
            [] => builder::full_write_mask(lhs.ty()),
            [letters] => {
                let letters = letters.atom("write mask letters")?;
                write_mask(letters, lhs.ty().vector_elements())
                    .ok_or_else(|| mask.err(ReadErrorKind::InvalidSwizzle(letters.into())))?
            }
            _ => return Err(mask.err(ReadErrorKind::Malformed("write mask"))),
        };
        Ok(Instruction::Assignment(Assignment {
            lhs,
            rhs,
            condition,
            write_mask: bits,
        }))
    }

    fn call(
        &mut self,
        e: &SExpr<'_>,
        name: &SExpr<'_>,
        ret: Option<&SExpr<'_>>,
        params: &SExpr<'_>,
    ) -> ReadResult<Instruction<'a>> {
        let name = name.atom("a function name")?;
        let return_deref = ret.map(|r| self.deref(r)).transpose()?;
        let actual_parameters = params
            .list("a parameter list")?
            .iter()
            .map(|p| self.rvalue(p))
            .collect::<ReadResult<Vec<_>>>()?;
        let callee = self
            .functions
            .get(name)
            .and_then(|decls| {
                decls.iter().copied().find(|d| {
                    d.parameters.len() == actual_parameters.len()
                        && d.parameters
                            .iter()
                            .zip(&actual_parameters)
                            .all(|(f, a)| f.ty == *a.ty())
                })
            })
            .ok_or_else(|| e.err(ReadErrorKind::UnknownFunction(name.into())))?;
        Ok(Instruction::Call(Call {
            callee,
            actual_parameters,
            return_deref,
        }))
    }

    fn deref(&mut self, e: &SExpr<'_>) -> ReadResult<Deref<'a>> {
        match self.rvalue(e)? {
            Rvalue::Deref(d) => Ok(d),
            _ => Err(e.err(ReadErrorKind::Expected("a dereference"))),
        }
    }

    fn rvalue(&mut self, e: &SExpr<'_>) -> ReadResult<Rvalue<'a>> {
        let (head, rest) = e.form()?;
        match (head, rest) {
            ("var_ref", [name]) => {
                let name = name.atom("a variable name")?;
                Ok(Rvalue::var(self.lookup(e, name)?))
            }
            ("array_ref", [array, index]) => {
                let array = self.rvalue(array)?;
                let index = self.rvalue(index)?;
                Ok(Rvalue::Deref(builder::array_ref(array, index)))
            }
            ("record_ref", [record, field]) => {
                let record = self.rvalue(record)?;
                let field_name = field.atom("a field name")?;
                let index = match record.ty() {
                    GlslType::Record(r) => r.field_index(field_name),
                    _ => None,
                }
                .ok_or_else(|| field.err(ReadErrorKind::UnknownField(field_name.into())))?;
                Ok(Rvalue::Deref(builder::record_ref(record, index)))
            }
            ("swiz", [letters, val]) => {
                let letters_text = letters.atom("swizzle letters")?;
                let val = self.rvalue(val)?;
                let mask = swizzle_mask(letters_text, val.ty().vector_elements())
                    .ok_or_else(|| letters.err(ReadErrorKind::InvalidSwizzle(letters_text.into())))?;
                Ok(builder::swizzle(val, mask))
            }
            ("expression", [ty, op, operands @ ..]) => {
                let ty = self.ty(ty)?;
                let op_name = op.atom("an operator")?;
                let op = ExprOp::from_name(op_name)
                    .ok_or_else(|| e.err(ReadErrorKind::UnknownOperator(op_name.into())))?;
                let operands = operands
                    .iter()
                    .map(|o| self.rvalue(o))
                    .collect::<ReadResult<Vec<_>>>()?;
                Ok(Rvalue::Expression(Expression { op, ty, operands }))
            }
            ("constant", [ty, values]) => {
                let ty = self.ty(ty)?;
                Ok(Rvalue::Constant(self.constant(e, ty, values)?))
            }
            ("texture", [op, ty, sampler, coordinate, lod @ ..]) if lod.len() <= 1 => {
                let op_name = op.atom("a texture operation")?;
                let op = TextureOp::from_name(op_name)
                    .ok_or_else(|| e.err(ReadErrorKind::UnknownTextureOp(op_name.into())))?;
                let coordinate = match coordinate {
                    SExpr::List(items, ..) if items.is_empty() => None,
                    c => Some(Box::new(self.rvalue(c)?)),
                };
                Ok(Rvalue::Texture(Texture {
                    op,
                    ty: self.ty(ty)?,
                    sampler: self.deref(sampler)?,
                    coordinate,
                    lod: match lod.first() {
                        Some(l) => Some(Box::new(self.rvalue(l)?)),
                        None => None,
                    },
                }))
            }
            ("var_ref" | "array_ref" | "record_ref" | "swiz" | "expression" | "constant"
            | "texture", _) => Err(e.err(ReadErrorKind::Malformed(keyword(head)))),
            _ => Err(e.err(ReadErrorKind::UnknownRvalue(head.into()))),
        }
    }

    fn constant(&mut self, e: &SExpr<'_>, ty: GlslType, values: &SExpr<'_>) -> ReadResult<Constant> {
        let values = values.list("a value list")?;
        let count_error = |expected| {
            e.err(ReadErrorKind::ConstantCount {
                ty: ty.name(),
                expected,
                found: values.len(),
            })
        };
        match &ty {
            GlslType::Basic { base, .. } => {
                (values.len() == ty.components()).or_err(|| count_error(ty.components()))?;
                let components = values
                    .iter()
                    .map(|v| scalar(*base, v))
                    .collect::<ReadResult<Vec<_>>>()?;
                Ok(Constant {
                    ty: ty.clone(),
                    data: ConstData::Components(components),
                })
            }
            GlslType::Array { length, .. } => {
                (values.len() == *length).or_err(|| count_error(*length))?;
                let elements = self.constant_elements(values)?;
                Ok(Constant::aggregate(ty.clone(), elements))
            }
            GlslType::Record(r) => {
                (values.len() == r.fields.len()).or_err(|| count_error(r.fields.len()))?;
                let elements = self.constant_elements(values)?;
                Ok(Constant::aggregate(ty.clone(), elements))
            }
            _ => Err(e.err(ReadErrorKind::UnknownType(ty.name()))),
        }
    }

    fn constant_elements(&mut self, values: &[SExpr<'_>]) -> ReadResult<Vec<Constant>> {
        values
            .iter()
            .map(|v| match self.rvalue(v)? {
                Rvalue::Constant(c) => Ok(c),
                _ => Err(v.err(ReadErrorKind::Expected("a constant"))),
            })
            .collect()
    }
}

fn scalar(base: ScalarType, e: &SExpr<'_>) -> ReadResult<ConstScalar> {
    let text = e.atom("a constant value")?;
    let invalid = || {
        e.err(ReadErrorKind::InvalidValue {
            ty: GlslType::scalar(base).name(),
            value: text.into(),
        })
    };
    Ok(match base {
        ScalarType::Bool => match text {
            "true" | "1" => ConstScalar::Bool(true),
            "false" | "0" => ConstScalar::Bool(false),
            _ => return Err(invalid()),
        },
        ScalarType::Int => ConstScalar::Int(text.parse().map_err(|_| invalid())?),
        ScalarType::Uint => ConstScalar::Uint(text.parse().map_err(|_| invalid())?),
        ScalarType::Float => ConstScalar::Float(text.parse().map_err(|_| invalid())?),
        ScalarType::Double => ConstScalar::Double(text.parse().map_err(|_| invalid())?),
        ScalarType::Int64 => ConstScalar::Int64(text.parse().map_err(|_| invalid())?),
        ScalarType::Uint64 => ConstScalar::Uint64(text.parse().map_err(|_| invalid())?),
    })
}

/// Interns known keywords so errors can carry a `'static` form name.
fn keyword(head: &str) -> &'static str {
    const KEYWORDS: &[&str] = &[
        "assign",
        "if",
        "loop",
        "break",
        "continue",
        "call",
        "return",
        "discard",
        "demote",
        "emit-vertex",
        "end-primitive",
        "barrier",
        "var_ref",
        "array_ref",
        "record_ref",
        "swiz",
        "expression",
        "constant",
        "texture",
    ];
    KEYWORDS.iter().copied().find(|k| *k == head).unwrap_or("form")
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::ir::{print::print_instructions, IrArenas};

    #[test]
    fn reads_functions_and_forward_calls() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let src = indoc! {"
            # globals
            (declare (shader_out) vec4 color)
            (function main
              (signature void
                (parameters)
                (
                  (call helper ((constant float (0.5))))
                )))
            (function helper
              (signature void
                (parameters (declare (in) float x))
                (
                  (assign (x) (var_ref color) (var_ref x))
                )))
        "};
        let list = read_instructions(&ctx, src).unwrap();
        assert_eq!(list.len(), 3);
        let Instruction::Function(main) = &list[1] else {
            panic!("expected main");
        };
        let Instruction::Call(call) = &main.signatures[0].body[0] else {
            panic!("expected a call");
        };
        assert_eq!(call.callee.name, "helper");
        assert_eq!(call.callee.parameters[0].mode(), VariableMode::FunctionIn);
    }

    #[test]
    fn printing_then_reading_is_stable() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let src = indoc! {"
            (record Light (vec3 dir) (float power))
            (declare (uniform) Light light)
            (declare (uniform) (array float 3) weights)
            (declare () float s)
            (declare () int i)
            (if (expression bool < (var_ref s) (constant float (1.0)))
              (
                (assign (x) (var_ref s) (record_ref (var_ref light) power))
              )
              (
                (assign (x) (var_ref s) (array_ref (var_ref weights) (var_ref i)))
              ))
            (loop
              (
                (break)
              ))
        "};
        let list = read_instructions(&ctx, src).unwrap();
        let printed = print_instructions(&list);
        assert_eq!(printed, src);

        let arenas2 = IrArenas::new();
        let ctx2 = IrContext::new(&arenas2);
        let reread = read_instructions(&ctx2, &printed).unwrap();
        assert_eq!(print_instructions(&reread), printed);
    }

    #[test]
    fn errors_carry_positions() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let err = read_instructions(&ctx, "(declare () vec4 a)\n(assign (x) (var_ref b) (var_ref a))")
            .unwrap_err();
        assert_eq!(err.t, ReadErrorKind::UndeclaredVariable("b".into()));
        assert_eq!((err.line, err.col), (1, 12));
        assert_eq!(err.to_string(), "2:13: undeclared variable `b`");

        let err = read_instructions(&ctx, "(declare () vec4 a").unwrap_err();
        assert_eq!(err.t, ReadErrorKind::UnclosedList);
    }

    #[test]
    fn constants_check_their_component_count() {
        let arenas = IrArenas::new();
        let ctx = IrContext::new(&arenas);
        let err = read_rvalue(&ctx, &[], "(constant vec2 (1.0))").unwrap_err();
        assert!(matches!(
            err.t,
            ReadErrorKind::ConstantCount {
                expected: 2,
                found: 1,
                ..
            }
        ));
        let c = read_rvalue(&ctx, &[], "(constant bool (true))").unwrap();
        assert!(c.as_constant().is_some_and(|c| c.components()[0].as_bool()));
    }
}
