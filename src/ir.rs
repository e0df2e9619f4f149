use std::cell::{Cell, RefCell};

use typed_arena::Arena;

pub mod basic_block;
pub mod builder;
pub mod constant;
pub mod equals;
pub mod lower;
pub mod ops;
pub mod opt;
pub mod print;
pub mod reader;
pub mod refcount;
pub mod types;
pub mod validate;
pub mod visitor;

pub use self::{
    constant::{ConstData, ConstScalar, Constant},
    ops::ExprOp,
    types::{GlslType, RecordField, RecordType, SamplerDim, ScalarType},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableMode {
    Auto,
    Temporary,
    ShaderIn,
    ShaderOut,
    Uniform,
    ShaderStorage,
    Shared,
    SystemValue,
    FunctionIn,
    FunctionOut,
    FunctionInout,
    ConstIn,
}
impl VariableMode {
    pub const ALL: [Self; 12] = [
        Self::Auto,
        Self::Temporary,
        Self::ShaderIn,
        Self::ShaderOut,
        Self::Uniform,
        Self::ShaderStorage,
        Self::Shared,
        Self::SystemValue,
        Self::FunctionIn,
        Self::FunctionOut,
        Self::FunctionInout,
        Self::ConstIn,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Temporary => "temporary",
            Self::ShaderIn => "shader_in",
            Self::ShaderOut => "shader_out",
            Self::Uniform => "uniform",
            Self::ShaderStorage => "shader_storage",
            Self::Shared => "shared",
            Self::SystemValue => "system_value",
            Self::FunctionIn => "in",
            Self::FunctionOut => "out",
            Self::FunctionInout => "inout",
            Self::ConstIn => "const_in",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Locals of a function body, including its value parameters.
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Auto | Self::Temporary)
    }

    /// Memory that other invocations may read or write concurrently.
    pub const fn is_buffer_backed(self) -> bool {
        matches!(self, Self::ShaderStorage | Self::Shared)
    }

    /// Values that are observed outside of the shader after it ran.
    pub const fn is_externally_visible_write(self) -> bool {
        matches!(
            self,
            Self::ShaderOut | Self::ShaderStorage | Self::Shared | Self::FunctionOut | Self::FunctionInout
        )
    }
}

/// A declared variable. Exactly one exists per declaration; every
/// dereference refers back to it through a [`VarRef`].
#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub ty: GlslType,
    mode: Cell<VariableMode>,
    /// Set when the variable provably always holds this value.
    pub constant_value: RefCell<Option<Constant>>,
}
impl Variable {
    pub fn new(name: impl Into<String>, ty: GlslType, mode: VariableMode) -> Self {
        Self {
            name: name.into(),
            ty,
            mode: Cell::new(mode),
            constant_value: RefCell::new(None),
        }
    }

    #[inline(always)]
    pub fn mode(&self) -> VariableMode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: VariableMode) {
        self.mode.set(mode);
    }
}

/// A back-reference to an arena-allocated [`Variable`], compared and
/// hashed by identity.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct VarRef<'a>(pub &'a Variable);
impl<'a> VarRef<'a> {
    #[inline]
    pub const fn get(self) -> &'a Variable {
        self.0
    }
}
impl std::ops::Deref for VarRef<'_> {
    type Target = Variable;

    #[inline(always)]
    fn deref(&self) -> &Variable {
        self.0
    }
}
impl PartialEq for VarRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.0, other.0)
    }
}
impl Eq for VarRef<'_> {}
impl std::hash::Hash for VarRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.0 as *const Variable).hash(state)
    }
}
impl core::fmt::Debug for VarRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "var<{}>({:p})", self.0.name, self.0)
    }
}

bitflags::bitflags! {
    /// Components written by an assignment.
    #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
    pub struct WriteMask : u8 {
        const X = 0x01;
        const Y = 0x02;
        const Z = 0x04;
        const W = 0x08;
    }
}
impl WriteMask {
    /// The first `n` components.
    #[inline]
    pub const fn from_count(n: usize) -> Self {
        Self::from_bits_truncate(((1u32 << n) - 1) as u8)
    }

    #[inline]
    pub const fn from_channel(c: usize) -> Self {
        Self::from_bits_truncate(1 << c)
    }

    #[inline]
    pub const fn count(self) -> usize {
        self.bits().count_ones() as usize
    }

    /// Indices of the written components in ascending order.
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..4).filter(move |&c| self.bits() & (1 << c) != 0)
    }

    pub fn letters(self) -> String {
        self.channels().map(|c| b"xyzw"[c] as char).collect()
    }
}

/// Up to four component selections out of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwizzleMask {
    components: [u8; 4],
    len: u8,
}
impl SwizzleMask {
    pub fn new(components: &[u8]) -> Self {
        debug_assert!((1..=4).contains(&components.len()));
        let mut c = [0; 4];
        c[..components.len()].copy_from_slice(components);
        Self {
            components: c,
            len: components.len() as u8,
        }
    }

    pub fn identity(n: usize) -> Self {
        Self::new(&[0, 1, 2, 3][..n])
    }

    pub fn splat(component: u8, n: usize) -> Self {
        Self::new(&[component; 4][..n])
    }

    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn get(&self, i: usize) -> u8 {
        self.as_slice()[i]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.components[..self.len as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.as_slice().iter().copied()
    }

    /// `outer` applied on top of `self`: `(v.self).outer`.
    pub fn compose(&self, outer: &SwizzleMask) -> SwizzleMask {
        let c = outer.iter().map(|o| self.get(o as usize)).collect::<Vec<_>>();
        SwizzleMask::new(&c)
    }

    pub fn is_identity(&self, src_width: usize) -> bool {
        self.len() == src_width && self.iter().enumerate().all(|(i, c)| i == c as usize)
    }

    pub fn letters(&self) -> String {
        self.iter().map(|c| b"xyzw"[c as usize] as char).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ArrayDeref<'a> {
    pub array: Box<Rvalue<'a>>,
    pub index: Box<Rvalue<'a>>,
    pub ty: GlslType,
}

#[derive(Debug, Clone)]
pub struct RecordDeref<'a> {
    pub record: Box<Rvalue<'a>>,
    pub field: usize,
    pub ty: GlslType,
}

#[derive(Debug, Clone)]
pub enum Deref<'a> {
    Var(VarRef<'a>),
    Array(ArrayDeref<'a>),
    Record(RecordDeref<'a>),
}
impl<'a> Deref<'a> {
    pub fn ty(&self) -> &GlslType {
        match self {
            Self::Var(v) => &v.get().ty,
            Self::Array(a) => &a.ty,
            Self::Record(r) => &r.ty,
        }
    }

    /// The variable at the root of a dereference chain.
    pub fn variable_referenced(&self) -> Option<VarRef<'a>> {
        match self {
            Self::Var(v) => Some(*v),
            Self::Array(a) => a.array.variable_referenced(),
            Self::Record(r) => r.record.variable_referenced(),
        }
    }

    pub fn as_var(&self) -> Option<VarRef<'a>> {
        match self {
            Self::Var(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Swizzle<'a> {
    pub val: Box<Rvalue<'a>>,
    pub mask: SwizzleMask,
    pub ty: GlslType,
}

#[derive(Debug, Clone)]
pub struct Expression<'a> {
    pub op: ExprOp,
    pub ty: GlslType,
    pub operands: Vec<Rvalue<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureOp {
    Tex,
    Txb,
    Txl,
    Txf,
    Txs,
}
impl TextureOp {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tex => "tex",
            Self::Txb => "txb",
            Self::Txl => "txl",
            Self::Txf => "txf",
            Self::Txs => "txs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Tex, Self::Txb, Self::Txl, Self::Txf, Self::Txs]
            .into_iter()
            .find(|o| o.name() == name)
    }

    pub const fn has_lod(self) -> bool {
        matches!(self, Self::Txb | Self::Txl | Self::Txf | Self::Txs)
    }
}

#[derive(Debug, Clone)]
pub struct Texture<'a> {
    pub op: TextureOp,
    pub ty: GlslType,
    pub sampler: Deref<'a>,
    pub coordinate: Option<Box<Rvalue<'a>>>,
    pub lod: Option<Box<Rvalue<'a>>>,
}

#[derive(Debug, Clone)]
pub enum Rvalue<'a> {
    Constant(Constant),
    Deref(Deref<'a>),
    Swizzle(Swizzle<'a>),
    Expression(Expression<'a>),
    Texture(Texture<'a>),
}
impl<'a> Rvalue<'a> {
    pub fn ty(&self) -> &GlslType {
        match self {
            Self::Constant(c) => &c.ty,
            Self::Deref(d) => d.ty(),
            Self::Swizzle(s) => &s.ty,
            Self::Expression(e) => &e.ty,
            Self::Texture(t) => &t.ty,
        }
    }

    #[inline]
    pub fn var(v: VarRef<'a>) -> Self {
        Self::Deref(Deref::Var(v))
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Self::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_expression(&self) -> Option<&Expression<'a>> {
        match self {
            Self::Expression(e) => Some(e),
            _ => None,
        }
    }

    /// The operation of an expression node.
    pub fn expr_op(&self) -> Option<ExprOp> {
        self.as_expression().map(|e| e.op)
    }

    pub fn as_swizzle(&self) -> Option<&Swizzle<'a>> {
        match self {
            Self::Swizzle(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_deref(&self) -> Option<&Deref<'a>> {
        match self {
            Self::Deref(d) => Some(d),
            _ => None,
        }
    }

    /// A whole-variable dereference.
    pub fn as_var(&self) -> Option<VarRef<'a>> {
        self.as_deref().and_then(Deref::as_var)
    }

    pub fn variable_referenced(&self) -> Option<VarRef<'a>> {
        match self {
            Self::Deref(d) => d.variable_referenced(),
            Self::Swizzle(s) => s.val.variable_referenced(),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_constant().is_some_and(Constant::is_zero)
    }

    pub fn is_one(&self) -> bool {
        self.as_constant().is_some_and(Constant::is_one)
    }

    pub fn is_negative_one(&self) -> bool {
        self.as_constant().is_some_and(Constant::is_negative_one)
    }

    pub fn is_value(&self, f: f64, i: i64) -> bool {
        self.as_constant().is_some_and(|c| c.is_value(f, i))
    }

    /// Calls `f` for every variable dereferenced anywhere below this node.
    pub fn for_each_var(&self, f: &mut impl FnMut(VarRef<'a>)) {
        match self {
            Self::Constant(_) => (),
            Self::Deref(d) => d.for_each_var(f),
            Self::Swizzle(s) => s.val.for_each_var(f),
            Self::Expression(e) => e.operands.iter().for_each(|o| o.for_each_var(f)),
            Self::Texture(t) => {
                t.sampler.for_each_var(f);
                if let Some(c) = &t.coordinate {
                    c.for_each_var(f);
                }
                if let Some(l) = &t.lod {
                    l.for_each_var(f);
                }
            }
        }
    }

    pub fn references_var(&self, var: VarRef<'a>) -> bool {
        let mut found = false;
        self.for_each_var(&mut |v| found |= v == var);
        found
    }

    /// Takes the node out of its slot, leaving a placeholder constant.
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Self::Constant(Constant::bool(false)))
    }
}
impl<'a> Deref<'a> {
    pub fn for_each_var(&self, f: &mut impl FnMut(VarRef<'a>)) {
        match self {
            Self::Var(v) => f(*v),
            Self::Array(a) => {
                a.array.for_each_var(f);
                a.index.for_each_var(f);
            }
            Self::Record(r) => r.record.for_each_var(f),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Assignment<'a> {
    pub lhs: Deref<'a>,
    pub rhs: Rvalue<'a>,
    pub condition: Option<Rvalue<'a>>,
    pub write_mask: WriteMask,
}
impl<'a> Assignment<'a> {
    /// The variable written in full by this assignment, if any.
    pub fn whole_variable_written(&self) -> Option<VarRef<'a>> {
        let v = self.lhs.as_var()?;
        if v.ty.is_scalar_or_vector()
            && self.write_mask != WriteMask::from_count(v.ty.vector_elements() as usize)
        {
            return None;
        }
        Some(v)
    }
}

#[derive(Debug, Clone)]
pub struct If<'a> {
    pub condition: Rvalue<'a>,
    pub then_instructions: Vec<Instruction<'a>>,
    pub else_instructions: Vec<Instruction<'a>>,
}

#[derive(Debug, Clone)]
pub struct Loop<'a> {
    pub body: Vec<Instruction<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopJump {
    Break,
    Continue,
}

#[derive(Debug)]
pub struct SignatureDecl<'a> {
    pub name: String,
    pub return_type: GlslType,
    pub parameters: Vec<VarRef<'a>>,
    /// Implemented by the back end; never has a body in the tree.
    pub is_intrinsic: bool,
}

#[derive(Debug, Clone)]
pub struct Call<'a> {
    pub callee: &'a SignatureDecl<'a>,
    pub actual_parameters: Vec<Rvalue<'a>>,
    pub return_deref: Option<Deref<'a>>,
}

#[derive(Debug, Clone)]
pub struct Signature<'a> {
    pub decl: &'a SignatureDecl<'a>,
    pub body: Vec<Instruction<'a>>,
    pub is_defined: bool,
}

#[derive(Debug, Clone)]
pub struct Function<'a> {
    pub name: String,
    pub signatures: Vec<Signature<'a>>,
}

#[derive(Debug, Clone)]
pub enum Instruction<'a> {
    Variable(VarRef<'a>),
    Assignment(Assignment<'a>),
    If(If<'a>),
    Loop(Loop<'a>),
    LoopJump(LoopJump),
    Call(Call<'a>),
    Return(Option<Rvalue<'a>>),
    Discard(Option<Rvalue<'a>>),
    Demote,
    EmitVertex,
    EndPrimitive,
    Barrier,
    Function(Function<'a>),
}
impl<'a> Instruction<'a> {
    pub fn as_assignment(&self) -> Option<&Assignment<'a>> {
        match self {
            Self::Assignment(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_assignment_mut(&mut self) -> Option<&mut Assignment<'a>> {
        match self {
            Self::Assignment(a) => Some(a),
            _ => None,
        }
    }

    /// Control flow and calls delimit basic blocks.
    pub const fn is_block_boundary(&self) -> bool {
        matches!(self, Self::If(_) | Self::Loop(_) | Self::Function(_))
    }
}

/// Backing storage for one compilation; every node reference lives as
/// long as this.
#[derive(Default)]
pub struct IrArenas<'a> {
    variables: Arena<Variable>,
    signatures: Arena<SignatureDecl<'a>>,
}
impl IrArenas<'_> {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct IrContext<'a> {
    arenas: &'a IrArenas<'a>,
    temporary_counter: Cell<usize>,
}
impl<'a> IrContext<'a> {
    pub fn new(arenas: &'a IrArenas<'a>) -> Self {
        Self {
            arenas,
            temporary_counter: Cell::new(0),
        }
    }

    pub fn new_variable(
        &self,
        name: impl Into<String>,
        ty: GlslType,
        mode: VariableMode,
    ) -> VarRef<'a> {
        VarRef(self.arenas.variables.alloc(Variable::new(name, ty, mode)))
    }

    /// A compiler-generated temporary with a name unique to this context.
    pub fn new_temporary(&self, prefix: &str, ty: GlslType) -> VarRef<'a> {
        let n = self.temporary_counter.get();
        self.temporary_counter.set(n + 1);
        self.new_variable(format!("{prefix}@{n}"), ty, VariableMode::Temporary)
    }

    pub fn new_signature(&self, decl: SignatureDecl<'a>) -> &'a SignatureDecl<'a> {
        self.arenas.signatures.alloc(decl)
    }
}

/// Visits every function signature body in a top-level instruction list.
pub fn for_each_signature_body<'a>(
    instructions: &mut [Instruction<'a>],
    mut f: impl FnMut(&'a SignatureDecl<'a>, &mut Vec<Instruction<'a>>),
) {
    for ir in instructions.iter_mut() {
        if let Instruction::Function(func) = ir {
            for sig in func.signatures.iter_mut() {
                f(sig.decl, &mut sig.body);
            }
        }
    }
}

/// Finds a signature declaration by function name.
pub fn find_signature<'a>(
    instructions: &[Instruction<'a>],
    name: &str,
) -> Option<&'a SignatureDecl<'a>> {
    instructions.iter().find_map(|ir| match ir {
        Instruction::Function(f) if f.name == name => f.signatures.first().map(|s| s.decl),
        _ => None,
    })
}

/// Variables declared at global scope (outside functions).
pub fn global_variables<'a>(instructions: &[Instruction<'a>]) -> Vec<VarRef<'a>> {
    instructions
        .iter()
        .filter_map(|ir| match ir {
            Instruction::Variable(v) => Some(*v),
            _ => None,
        })
        .collect()
}
