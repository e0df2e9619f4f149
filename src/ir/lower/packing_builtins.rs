//! Expands the `pack*`/`unpack*` built-ins into integer and float
//! arithmetic for targets without native packing instructions.
//!
//! Half-float conversion rounds to nearest even, flushes nothing and keeps
//! NaN payloads quiet, matching the constant evaluator bit for bit.

use tracing::debug;

use super::{store_temporary, PackingLowering};
use crate::ir::{
    builder::{
        add, bit_and, bit_or, channel, constant, csel, div, expr, f2i, f2u, gequal, i2f, i2u,
        less, lshift, max, min, mul, round_even, rshift, sub, u2f, u2i, unop, var,
    },
    opt::{declare_pass, OptimizerOptions},
    visitor::{visit_list_emitting, Emitter, Visitor},
    Constant, ExprOp, Instruction, IrContext, Rvalue, VarRef,
};

declare_pass!(
    LowerPackingBuiltins,
    "packing_builtins",
    |ctx, options, ir| lower_packing_builtins(ctx, options, ir)
);

fn flag(op: ExprOp) -> Option<PackingLowering> {
    Some(match op {
        ExprOp::PackSnorm2x16 => PackingLowering::PACK_SNORM_2X16,
        ExprOp::UnpackSnorm2x16 => PackingLowering::UNPACK_SNORM_2X16,
        ExprOp::PackUnorm2x16 => PackingLowering::PACK_UNORM_2X16,
        ExprOp::UnpackUnorm2x16 => PackingLowering::UNPACK_UNORM_2X16,
        ExprOp::PackSnorm4x8 => PackingLowering::PACK_SNORM_4X8,
        ExprOp::UnpackSnorm4x8 => PackingLowering::UNPACK_SNORM_4X8,
        ExprOp::PackUnorm4x8 => PackingLowering::PACK_UNORM_4X8,
        ExprOp::UnpackUnorm4x8 => PackingLowering::UNPACK_UNORM_4X8,
        ExprOp::PackHalf2x16 => PackingLowering::PACK_HALF_2X16,
        ExprOp::UnpackHalf2x16 => PackingLowering::UNPACK_HALF_2X16,
        _ => return None,
    })
}

pub fn lower_packing_builtins<'a>(
    ctx: &IrContext<'a>,
    options: &OptimizerOptions,
    instructions: &mut Vec<Instruction<'a>>,
) -> bool {
    if options.lower_packing.is_empty() {
        return false;
    }
    let mut v = PackingVisitor {
        ctx,
        flags: options.lower_packing,
        pending: Vec::new(),
        progress: false,
    };
    visit_list_emitting(&mut v, instructions);
    v.progress
}

fn u<'a>(v: u32) -> Rvalue<'a> {
    constant(Constant::uint(v))
}

fn i<'a>(v: i32) -> Rvalue<'a> {
    constant(Constant::int(v))
}

fn f<'a>(v: f32) -> Rvalue<'a> {
    constant(Constant::float(v))
}

fn clamp(x: Rvalue<'_>, lo: f32, hi: f32) -> Rvalue<'_> {
    min(max(x, f(lo)), f(hi))
}

/// Component `c` of `q` shifted into its `bits`-wide slot, ORed together.
fn combine(q: VarRef<'_>, n: usize, bits: u32) -> Rvalue<'_> {
    (1..n).fold(channel(var(q), 0), |acc, c| {
        bit_or(acc, lshift(channel(var(q), c as u8), u(bits * c as u32)))
    })
}

struct PackingVisitor<'c, 'a> {
    ctx: &'c IrContext<'a>,
    flags: PackingLowering,
    pending: Vec<Instruction<'a>>,
    progress: bool,
}
impl<'a> PackingVisitor<'_, 'a> {
    fn store(&mut self, prefix: &str, value: Rvalue<'a>) -> VarRef<'a> {
        store_temporary(self.ctx, &mut self.pending, prefix, value)
    }

    /// `pack{S,U}norm{2x16,4x8}`: scale, round, then splice the integers.
    fn pack_norm(&mut self, v: Rvalue<'a>, signed: bool, n: usize) -> Rvalue<'a> {
        let bits = 32 / n as u32;
        let (lo, scale) = if signed {
            (-1.0, ((1u32 << (bits - 1)) - 1) as f32)
        } else {
            (0.0, ((1u32 << bits) - 1) as f32)
        };
        let scaled = round_even(mul(clamp(v, lo, 1.0), f(scale)));
        let q = if signed {
            bit_and(i2u(f2i(scaled)), u((1u32 << bits) - 1))
        } else {
            f2u(scaled)
        };
        let q = self.store("pack_q", q);
        combine(q, n, bits)
    }

    /// `unpack{S,U}norm{2x16,4x8}`: split the word, then scale back.
    fn unpack_norm(&mut self, packed: Rvalue<'a>, signed: bool, n: usize) -> Rvalue<'a> {
        let bits = 32 / n as u32;
        let t = self.store("unpack_src", packed);
        if signed {
            // each field moves to the top, then sign-extends on the way down
            let fields = (0..n as u32)
                .map(|c| match 32 - bits * (c + 1) {
                    0 => var(t),
                    s => lshift(var(t), u(s)),
                })
                .collect();
            let scale = ((1u32 << (bits - 1)) - 1) as f32;
            let ints = rshift(u2i(expr(ExprOp::Vector, fields)), i((32 - bits) as i32));
            clamp(div(i2f(ints), f(scale)), -1.0, 1.0)
        } else {
            let mask = (1u32 << bits) - 1;
            let fields = (0..n as u32)
                .map(|c| {
                    let shifted = match c {
                        0 => var(t),
                        _ => rshift(var(t), u(bits * c)),
                    };
                    if bits * (c + 1) == 32 {
                        shifted
                    } else {
                        bit_and(shifted, u(mask))
                    }
                })
                .collect();
            div(u2f(expr(ExprOp::Vector, fields)), f(mask as f32))
        }
    }

    /// Binary16 bits of one float, in the low half of a `uint`.
    fn half_bits(&mut self, x: Rvalue<'a>) -> VarRef<'a> {
        let bits = self.store("half_bits", unop(ExprOp::BitcastF2u, x));
        let mag = self.store("half_mag", bit_and(var(bits), u(0x7fff_ffff)));
        let sign = bit_and(rshift(var(bits), u(16)), u(0x8000));

        let nan_inf = bit_or(
            u(0x7c00),
            csel(less(u(0x7f80_0000), var(mag)), u(0x200), u(0)),
        );
        let round_bit = bit_and(rshift(var(mag), u(13)), u(1));
        let normal = rshift(
            add(add(sub(var(mag), u(0x3800_0000)), u(0xfff)), round_bit),
            u(13),
        );
        let subnormal = f2u(round_even(mul(
            unop(ExprOp::BitcastU2f, var(mag)),
            f(16_777_216.0),
        )));
        let finite = csel(less(var(mag), u(0x3880_0000)), subnormal, normal);
        let finite = csel(gequal(var(mag), u(0x477f_f000)), u(0x7c00), finite);
        let value = csel(gequal(var(mag), u(0x7f80_0000)), nan_inf, finite);
        self.store("half", bit_or(sign, value))
    }

    fn pack_half(&mut self, v: Rvalue<'a>) -> Rvalue<'a> {
        let src = self.store("pack_half_src", v);
        let lo = self.half_bits(channel(var(src), 0));
        let hi = self.half_bits(channel(var(src), 1));
        bit_or(var(lo), lshift(var(hi), u(16)))
    }

    /// One float from the binary16 field at bit `16 * c` of `t`.
    fn half_to_float(&mut self, t: VarRef<'a>, c: u32) -> Rvalue<'a> {
        let field = match c {
            0 => var(t),
            _ => rshift(var(t), u(16 * c)),
        };
        let h = self.store("half", bit_and(field, u(0xffff)));
        let em = self.store("half_em", bit_and(var(h), u(0x7fff)));
        let sign = lshift(bit_and(var(h), u(0x8000)), u(16));

        let subnormal = unop(
            ExprOp::BitcastF2u,
            mul(u2f(var(em)), f(5.960_464_5e-8)),
        );
        let inf_nan = bit_or(lshift(var(em), u(13)), u(0x7f80_0000));
        let normal = add(lshift(var(em), u(13)), u(0x3800_0000));
        let value = csel(
            less(var(em), u(0x400)),
            subnormal,
            csel(gequal(var(em), u(0x7c00)), inf_nan, normal),
        );
        unop(ExprOp::BitcastU2f, bit_or(sign, value))
    }

    fn unpack_half(&mut self, packed: Rvalue<'a>) -> Rvalue<'a> {
        let t = self.store("unpack_src", packed);
        let x = self.half_to_float(t, 0);
        let y = self.half_to_float(t, 1);
        expr(ExprOp::Vector, vec![x, y])
    }
}
impl<'a> Emitter<'a> for PackingVisitor<'_, 'a> {
    fn pending(&mut self) -> &mut Vec<Instruction<'a>> {
        &mut self.pending
    }
}
impl<'a> Visitor<'a> for PackingVisitor<'_, 'a> {
    fn handle_rvalue(&mut self, rvalue: &mut Rvalue<'a>) {
        let Rvalue::Expression(e) = rvalue else {
            return;
        };
        if !flag(e.op).is_some_and(|bit| self.flags.contains(bit)) {
            return;
        }
        let op = e.op;
        let operand = e.operands[0].take();
        *rvalue = match op {
            ExprOp::PackSnorm2x16 => self.pack_norm(operand, true, 2),
            ExprOp::PackUnorm2x16 => self.pack_norm(operand, false, 2),
            ExprOp::PackSnorm4x8 => self.pack_norm(operand, true, 4),
            ExprOp::PackUnorm4x8 => self.pack_norm(operand, false, 4),
            ExprOp::UnpackSnorm2x16 => self.unpack_norm(operand, true, 2),
            ExprOp::UnpackUnorm2x16 => self.unpack_norm(operand, false, 2),
            ExprOp::UnpackSnorm4x8 => self.unpack_norm(operand, true, 4),
            ExprOp::UnpackUnorm4x8 => self.unpack_norm(operand, false, 4),
            ExprOp::PackHalf2x16 => self.pack_half(operand),
            _ => self.unpack_half(operand),
        };
        debug!("[LowerPackingBuiltins] expanded {}", op.name());
        self.progress = true;
    }
}
