//! Shift and rotate emitters (the 0xE000–0xE7FF half of line E).
//!
//! Register forms: `1110 ccc d ss i tt rrr` — ccc is an immediate count
//! (0 means 8) or a data register, d the direction, ss the size, tt the
//! operation. Memory forms are word-sized single-position shifts over an
//! effective address.
//!
//! Flag strategy, per operation:
//! - C and X come from the bit shifted out. Immediate forms probe that
//!   bit with a `tst` before shifting; register-count forms widen into a
//!   64-bit shift and probe the bit that crossed the operand width (or a
//!   runtime `1 << (count-1)` mask for right shifts).
//! - N and Z are re-derived from the result with an in-width
//!   `cmn wzr, r, lsl #(32-width)`.
//! - V is cleared. The 68000's ASL overflow rule is not reproduced.
//! - Plain rotates take C from a bit of the rotated result instead; the
//!   extended rotates stitch the X bit into a widened operand so one host
//!   rotate realises the (width+1)-bit rotation.

use crate::ccr::{clear_flags, get_nz00, set_flags_if, SR_C, SR_CCR, SR_N, SR_NZVC, SR_X, SR_XC, SR_Z, SRB_X};
use crate::cpu::advance_pc;
use crate::dispatch::OpSize;
use crate::ea::load_ea;
use crate::emit::{Cond, Emitter, Reg};
use crate::regalloc::{GuestReg, RegAlloc};
use crate::stream::GuestStream;

fn decode_size(op: u16) -> OpSize {
    match (op >> 6) & 3 {
        0 => OpSize::Byte,
        1 => OpSize::Word,
        2 => OpSize::Long,
        _ => unreachable!("size 0b11 is a memory-form opcode"),
    }
}

fn immediate_count(op: u16) -> u8 {
    let c = ((op >> 9) & 7) as u8;
    if c == 0 {
        8
    } else {
        c
    }
}

/// Shared flag tail for ASx/LSx: clear the demanded bits, set C and X
/// from the preceding probe (host Z flag), then N and Z from an in-width
/// test of `value`.
fn shift_flag_update(e: &mut Emitter, ra: &mut RegAlloc, cc: Reg, size: OpSize, value: Reg, mask: u8) {
    clear_flags(e, ra, cc, mask);
    if mask & SR_XC != 0 {
        set_flags_if(e, ra, cc, Cond::NE, mask & SR_XC);
    }
    if mask & (SR_N | SR_Z) != 0 {
        e.cmn_w_shifted(Reg::WZR, value, size.nz_shift());
        if mask & SR_Z != 0 {
            set_flags_if(e, ra, cc, Cond::EQ, SR_Z);
        }
        if mask & SR_N != 0 {
            set_flags_if(e, ra, cc, Cond::MI, SR_N);
        }
    }
}

/// Probe the carry-out bit of an immediate-count shift while the operand
/// is still intact. Left shifts lose bit `width - count`; right shifts
/// lose bit `count - 1`.
fn probe_immediate_carry(e: &mut Emitter, size: OpSize, reg: Reg, left: bool, count: u8) {
    if left {
        let ror = match size {
            OpSize::Long => count,
            OpSize::Word => 16 + count,
            OpSize::Byte => (24 + count) & 31,
        };
        e.tst_w_imm(reg, 1, ror);
    } else {
        e.tst_w_imm(reg, 1, (33 - count) & 31);
    }
}

/// ASL/ASR, register form.
pub(crate) fn asx_reg(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_CCR;
    let left = op & 0x0100 != 0;
    let size = decode_size(op);
    let dn = GuestReg::D((op & 7) as u8);
    let reg = ra.map_read(e, dn);
    let tmp = ra.alloc_temp();
    ra.set_dirty(dn);

    if op & 0x0020 != 0 {
        let shiftreg = ra.map_read(e, GuestReg::D(((op >> 9) & 7) as u8));
        if left {
            // Widen to 64 bits so the bit crossing the operand width
            // survives the shift, then probe it.
            e.lsl_x(tmp, reg, shiftreg);
            match size {
                OpSize::Long => {
                    e.mov_w(reg, tmp);
                    if mask & SR_XC != 0 {
                        e.tst_x_imm(tmp, 1, 32);
                    }
                }
                OpSize::Word => {
                    if mask & SR_XC != 0 {
                        e.tst_w_imm(tmp, 1, 16);
                    }
                    e.bfi_w(reg, tmp, 0, 16);
                }
                OpSize::Byte => {
                    if mask & SR_XC != 0 {
                        e.tst_w_imm(tmp, 1, 24);
                    }
                    e.bfi_w(reg, tmp, 0, 8);
                }
            }
        } else {
            let probe = ra.alloc_temp();
            if mask & SR_XC != 0 {
                let t = ra.alloc_temp();
                e.sub_w_imm(t, shiftreg, 1);
                e.movz_w(probe, 1);
                e.lsl_x(probe, probe, t);
                ra.free(t);
            }
            match size {
                OpSize::Long => e.sxtw_x(tmp, reg),
                OpSize::Word => e.sxth_x(tmp, reg),
                OpSize::Byte => e.sxtb_x(tmp, reg),
            }
            if mask & SR_XC != 0 {
                e.tst_x(tmp, probe);
            }
            e.asr_x(tmp, tmp, shiftreg);
            match size {
                OpSize::Long => e.mov_w(reg, tmp),
                OpSize::Word => e.bfi_w(reg, tmp, 0, 16),
                OpSize::Byte => e.bfi_w(reg, tmp, 0, 8),
            }
            ra.free(probe);
        }
    } else {
        let count = immediate_count(op);
        if mask & SR_XC != 0 {
            probe_immediate_carry(e, size, reg, left, count);
        }
        if left {
            match size {
                OpSize::Long => e.lsl_w_imm(reg, reg, count),
                OpSize::Word => {
                    e.lsl_w_imm(tmp, reg, count);
                    e.bfi_w(reg, tmp, 0, 16);
                }
                OpSize::Byte => {
                    e.lsl_w_imm(tmp, reg, count);
                    e.bfi_w(reg, tmp, 0, 8);
                }
            }
        } else {
            match size {
                OpSize::Long => e.asr_w_imm(reg, reg, count),
                OpSize::Word => {
                    e.sxth_w(tmp, reg);
                    e.asr_w_imm(tmp, tmp, count);
                    e.bfi_w(reg, tmp, 0, 16);
                }
                OpSize::Byte => {
                    e.sxtb_w(tmp, reg);
                    e.asr_w_imm(tmp, tmp, count);
                    e.bfi_w(reg, tmp, 0, 8);
                }
            }
        }
    }

    advance_pc(e, ra, 2);

    if mask != 0 {
        let cc = ra.modify_cc(e);
        let value = if size == OpSize::Long { reg } else { tmp };
        shift_flag_update(e, ra, cc, size, value, mask);
    }
    ra.free(tmp);
}

/// LSL/LSR, register form.
pub(crate) fn lsx_reg(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_CCR;
    let left = op & 0x0100 != 0;
    let size = decode_size(op);
    let dn = GuestReg::D((op & 7) as u8);
    let reg = ra.map_read(e, dn);
    let tmp = ra.alloc_temp();
    ra.set_dirty(dn);

    if op & 0x0020 != 0 {
        let shiftreg = ra.map_read(e, GuestReg::D(((op >> 9) & 7) as u8));
        if left {
            e.lsl_x(tmp, reg, shiftreg);
            match size {
                OpSize::Long => {
                    e.mov_w(reg, tmp);
                    if mask & SR_XC != 0 {
                        e.tst_x_imm(tmp, 1, 32);
                    }
                }
                OpSize::Word => {
                    if mask & SR_XC != 0 {
                        e.tst_w_imm(tmp, 1, 16);
                    }
                    e.bfi_w(reg, tmp, 0, 16);
                }
                OpSize::Byte => {
                    if mask & SR_XC != 0 {
                        e.tst_w_imm(tmp, 1, 24);
                    }
                    e.bfi_w(reg, tmp, 0, 8);
                }
            }
        } else {
            let probe = ra.alloc_temp();
            if mask & SR_XC != 0 {
                let t = ra.alloc_temp();
                e.sub_w_imm(t, shiftreg, 1);
                e.movz_w(probe, 1);
                e.lsl_x(probe, probe, t);
                ra.free(t);
            }
            match size {
                OpSize::Long => e.mov_w(tmp, reg),
                OpSize::Word => e.uxth_w(tmp, reg),
                OpSize::Byte => e.uxtb_w(tmp, reg),
            }
            if mask & SR_XC != 0 {
                e.tst_x(tmp, probe);
            }
            e.lsr_x(tmp, tmp, shiftreg);
            match size {
                OpSize::Long => e.mov_w(reg, tmp),
                OpSize::Word => e.bfi_w(reg, tmp, 0, 16),
                OpSize::Byte => e.bfi_w(reg, tmp, 0, 8),
            }
            ra.free(probe);
        }
    } else {
        let count = immediate_count(op);
        if mask & SR_XC != 0 {
            probe_immediate_carry(e, size, reg, left, count);
        }
        if left {
            match size {
                OpSize::Long => e.lsl_w_imm(reg, reg, count),
                OpSize::Word => {
                    e.lsl_w_imm(tmp, reg, count);
                    e.bfi_w(reg, tmp, 0, 16);
                }
                OpSize::Byte => {
                    e.lsl_w_imm(tmp, reg, count);
                    e.bfi_w(reg, tmp, 0, 8);
                }
            }
        } else {
            match size {
                OpSize::Long => e.lsr_w_imm(reg, reg, count),
                OpSize::Word => {
                    e.uxth_w(tmp, reg);
                    e.lsr_w_imm(tmp, tmp, count);
                    e.bfi_w(reg, tmp, 0, 16);
                }
                OpSize::Byte => {
                    e.uxtb_w(tmp, reg);
                    e.lsr_w_imm(tmp, tmp, count);
                    e.bfi_w(reg, tmp, 0, 8);
                }
            }
        }
    }

    advance_pc(e, ra, 2);

    if mask != 0 {
        let cc = ra.modify_cc(e);
        let value = if size == OpSize::Long { reg } else { tmp };
        shift_flag_update(e, ra, cc, size, value, mask);
    }
    ra.free(tmp);
}

/// ROL/ROR, register form.
///
/// The operand is replicated across the host register (twice for words,
/// four times for bytes) so a single 32-bit rotate realises the in-width
/// rotation for any count. Left rotates run as right rotates by the
/// complement.
pub(crate) fn ro_reg(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_NZVC;
    let left = op & 0x0100 != 0;
    let size = decode_size(op);
    let dn = GuestReg::D((op & 7) as u8);
    let reg = ra.map_read(e, dn);
    let tmp = ra.alloc_temp();
    ra.set_dirty(dn);

    if op & 0x0020 != 0 {
        let sh = ra.copy_to_temp(e, GuestReg::D(((op >> 9) & 7) as u8));
        if left {
            e.neg_w(sh, sh);
            e.add_w_imm(sh, sh, 32);
        }
        match size {
            OpSize::Long => e.ror_w(reg, reg, sh),
            OpSize::Word => {
                e.mov_w(tmp, reg);
                e.bfi_w(tmp, tmp, 16, 16);
                e.ror_w(tmp, tmp, sh);
                e.bfi_w(reg, tmp, 0, 16);
            }
            OpSize::Byte => {
                e.mov_w(tmp, reg);
                e.bfi_w(tmp, tmp, 8, 8);
                e.bfi_w(tmp, tmp, 16, 16);
                e.ror_w(tmp, tmp, sh);
                e.bfi_w(reg, tmp, 0, 8);
            }
        }
        ra.free(sh);
    } else {
        let count = immediate_count(op);
        let r = if left { 32 - count } else { count };
        match size {
            OpSize::Long => e.ror_w_imm(reg, reg, r),
            OpSize::Word => {
                e.mov_w(tmp, reg);
                e.bfi_w(tmp, tmp, 16, 16);
                e.ror_w_imm(tmp, tmp, r);
                e.bfi_w(reg, tmp, 0, 16);
            }
            OpSize::Byte => {
                e.mov_w(tmp, reg);
                e.bfi_w(tmp, tmp, 8, 8);
                e.bfi_w(tmp, tmp, 16, 16);
                e.ror_w_imm(tmp, tmp, r);
                e.bfi_w(reg, tmp, 0, 8);
            }
        }
    }

    advance_pc(e, ra, 2);

    if mask != 0 {
        let cc = ra.modify_cc(e);
        if mask & (SR_N | SR_Z) != 0 {
            let value = if size == OpSize::Long { reg } else { tmp };
            e.cmn_w_shifted(Reg::WZR, value, size.nz_shift());
        }
        clear_flags(e, ra, cc, mask);
        if mask & SR_Z != 0 {
            set_flags_if(e, ra, cc, Cond::EQ, SR_Z);
        }
        if mask & SR_N != 0 {
            set_flags_if(e, ra, cc, Cond::MI, SR_N);
        }
        if mask & SR_C != 0 {
            // The bit last rotated out is already in the result: at the
            // bottom for left rotates, at the width's MSB for right.
            if left {
                e.bfi_w(cc, reg, 0, 1);
            } else {
                e.bfxil_w(cc, reg, size.bits() - 1, 1);
            }
        }
    }
    ra.free(tmp);
}

/// Write C (and X) from bit `bit` of the rotated pattern in `tmp`,
/// touching only the demanded bits.
fn rox_carry_from_bit(e: &mut Emitter, ra: &mut RegAlloc, cc: Reg, tmp: Reg, bit: u8, mask: u8) {
    if mask & SR_XC == 0 {
        return;
    }
    if mask & SR_C != 0 {
        if bit < 32 {
            e.bfxil_w(cc, tmp, bit, 1);
        } else {
            e.bfxil_x(cc, tmp, bit, 1);
        }
        if mask & SR_X != 0 {
            e.bfi_w(cc, cc, SRB_X, 1);
        }
    } else {
        let t = ra.alloc_temp();
        if bit < 32 {
            e.ubfx_w(t, tmp, bit, 1);
        } else {
            e.ubfx_x(t, tmp, bit, 1);
        }
        e.bfi_w(cc, t, SRB_X, 1);
        ra.free(t);
    }
}

/// ROXL/ROXR, register form.
///
/// The X bit joins the operand in a widened pattern (9, 17 or 33
/// significant bits within a 32/64-bit host register), a single host
/// rotate realises the extended rotation, and the new X/C fall out at a
/// fixed bit position. Register counts reduce modulo width+1 at run time;
/// a zero count only refreshes the flags (C becomes X, X is preserved).
pub(crate) fn rox_reg(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_CCR;
    let left = op & 0x0100 != 0;
    let size = decode_size(op);
    let cc = ra.modify_cc(e);
    let dn = GuestReg::D((op & 7) as u8);
    let dest = ra.map_read(e, dn);
    ra.set_dirty(dn);

    if op & 0x0020 != 0 {
        let amount_src = ra.map_read(e, GuestReg::D(((op >> 9) & 7) as u8));
        let amount = ra.alloc_temp();
        let tmp = ra.alloc_temp();
        let modulus = ra.alloc_temp();

        // count = Dn mod 64, reduced modulo width+1. An effective count
        // of zero leaves the operand and X alone: only N/Z refresh and C
        // takes the value of X.
        e.and_w_imm(tmp, amount_src, 6, 0);
        e.movz_w(modulus, size.bits() as u16 + 1);
        e.udiv_w(amount, tmp, modulus);
        e.msub_w(amount, amount, modulus, tmp);
        e.tst_w(amount, amount);
        let nonzero = e.b_cond(Cond::NE);

        if mask & SR_NZVC != 0 {
            e.cmn_w_shifted(Reg::WZR, dest, size.nz_shift());
            let mut m = mask;
            get_nz00(e, ra, cc, &mut m);
        }
        if mask & SR_C != 0 {
            // C = X, operand untouched.
            e.bfxil_w(cc, cc, SRB_X, 1);
        }
        let done = e.b();

        e.patch(nonzero);

        // Operand, clipped to the width.
        match size {
            OpSize::Byte => e.and_w_imm(tmp, dest, 8, 0),
            OpSize::Word => e.and_w_imm(tmp, dest, 16, 0),
            OpSize::Long => e.mov_w(tmp, dest),
        }

        // Right rotation of a long: the 64-bit pattern below cannot carry
        // the bit that becomes X when the count is the full 32, so probe
        // it out of the operand up front (bit count-1, the LSR rule).
        if !left && size == OpSize::Long {
            e.sub_w_imm(modulus, amount, 1);
            e.lsr_x(modulus, tmp, modulus);
        }

        // Feed X into the widened pattern.
        e.tst_w_imm(cc, 1, (32 - SRB_X) & 31);
        if left {
            // Convert to a right rotation by the register-size complement.
            e.neg_w(amount, amount);
            e.add_w_imm(amount, amount, if size == OpSize::Byte { 32 } else { 64 });
            let no_x = e.b_cond(Cond::EQ);
            match size {
                OpSize::Byte => e.orr_w_imm(tmp, tmp, 1, 24),
                OpSize::Word => e.orr_w_imm(tmp, tmp, 1, 16),
                OpSize::Long => e.orr_x_imm(tmp, tmp, 1, 32),
            }
            e.patch(no_x);
            match size {
                OpSize::Byte => {
                    e.bfi_w(tmp, tmp, 23, 9);
                    e.ror_w(tmp, tmp, amount);
                    e.bfi_w(dest, tmp, 0, 8);
                }
                OpSize::Word => {
                    e.bfi_x(tmp, tmp, 47, 17);
                    e.ror_x(tmp, tmp, amount);
                    e.bfi_w(dest, tmp, 0, 16);
                }
                OpSize::Long => {
                    e.lsl_x_imm(tmp, tmp, 31);
                    e.bfxil_x(tmp, tmp, 31, 32);
                    e.ror_x(tmp, tmp, amount);
                    e.mov_w(dest, tmp);
                }
            }
        } else {
            let no_x = e.b_cond(Cond::EQ);
            match size {
                OpSize::Byte => e.orr_w_imm(tmp, tmp, 1, 24),
                OpSize::Word => e.orr_w_imm(tmp, tmp, 1, 16),
                OpSize::Long => e.orr_x_imm(tmp, tmp, 1, 32),
            }
            e.patch(no_x);
            match size {
                OpSize::Byte => {
                    e.bfi_w(tmp, tmp, 9, 9);
                    e.ror_w(tmp, tmp, amount);
                    e.bfi_w(dest, tmp, 0, 8);
                }
                OpSize::Word => {
                    e.bfi_x(tmp, tmp, 17, 17);
                    e.ror_x(tmp, tmp, amount);
                    e.bfi_w(dest, tmp, 0, 16);
                }
                OpSize::Long => {
                    e.bfi_x(tmp, tmp, 33, 31);
                    e.ror_x(tmp, tmp, amount);
                    e.mov_w(dest, tmp);
                }
            }
        }

        if mask & SR_NZVC != 0 {
            e.cmn_w_shifted(Reg::WZR, tmp, size.nz_shift());
            let mut m = mask;
            get_nz00(e, ra, cc, &mut m);
        }
        if !left && size == OpSize::Long {
            // X/C from the probe taken before the rotation.
            if mask & SR_C != 0 {
                e.bfi_w(cc, modulus, 0, 1);
                if mask & SR_X != 0 {
                    e.bfi_w(cc, cc, SRB_X, 1);
                }
            } else if mask & SR_X != 0 {
                e.bfi_w(cc, modulus, SRB_X, 1);
            }
        } else {
            rox_carry_from_bit(e, ra, cc, tmp, size.bits(), mask);
        }

        e.patch(done);
        ra.free(modulus);
        ra.free(tmp);
        ra.free(amount);
    } else {
        let tmp = ra.alloc_temp();
        let count = immediate_count(op);

        if left {
            match size {
                OpSize::Byte => {
                    // Pattern: X at bit 31, operand at [30:23] and [7:0].
                    e.mov_w(tmp, dest);
                    e.bic_w_imm(tmp, tmp, 1, 1);
                    let no_x = e.tbz(cc, SRB_X);
                    e.orr_w_imm(tmp, tmp, 1, 1);
                    e.patch(no_x);
                    e.bfi_w(tmp, tmp, 23, 8);
                    e.ror_w_imm(tmp, tmp, 32 - count);
                    e.bfi_w(dest, tmp, 0, 8);
                }
                OpSize::Word => {
                    e.mov_w(tmp, dest);
                    e.bic_w_imm(tmp, tmp, 1, 1);
                    let no_x = e.tbz(cc, SRB_X);
                    e.orr_w_imm(tmp, tmp, 1, 1);
                    e.patch(no_x);
                    e.bfi_w(tmp, tmp, 15, 16);
                    e.ror_w_imm(tmp, tmp, 32 - count);
                    e.bfi_w(dest, tmp, 0, 16);
                }
                OpSize::Long => {
                    // 64-bit pattern: X at bit 63, operand at [62:31] and [31:0].
                    e.lsl_x_imm(tmp, dest, 31);
                    let no_x = e.tbz(cc, SRB_X);
                    e.orr_x_imm(tmp, tmp, 1, 1);
                    e.patch(no_x);
                    e.bfxil_x(tmp, tmp, 31, 32);
                    e.ror_x_imm(tmp, tmp, 64 - count);
                    e.mov_w(dest, tmp);
                }
            }
        } else {
            match size {
                OpSize::Byte => {
                    // Pattern: operand at [7:0], X at bit 8, both again at [17:9].
                    e.mov_w(tmp, dest);
                    e.bic_w_imm(tmp, tmp, 1, 24);
                    let no_x = e.tbz(cc, SRB_X);
                    e.orr_w_imm(tmp, tmp, 1, 24);
                    e.patch(no_x);
                    e.bfi_w(tmp, tmp, 9, 9);
                    e.ror_w_imm(tmp, tmp, count);
                    e.bfi_w(dest, tmp, 0, 8);
                }
                OpSize::Word => {
                    e.mov_w(tmp, dest);
                    e.bic_w_imm(tmp, tmp, 1, 16);
                    let no_x = e.tbz(cc, SRB_X);
                    e.orr_w_imm(tmp, tmp, 1, 16);
                    e.patch(no_x);
                    e.bfi_x(tmp, tmp, 17, 17);
                    e.ror_x_imm(tmp, tmp, count);
                    e.bfi_w(dest, tmp, 0, 16);
                }
                OpSize::Long => {
                    // 64-bit pattern: operand at [63:33] and [31:0], X at 32.
                    e.lsl_x_imm(tmp, dest, 33);
                    e.bfi_x(tmp, dest, 0, 32);
                    let no_x = e.tbz(cc, SRB_X);
                    e.orr_x_imm(tmp, tmp, 1, 32);
                    e.patch(no_x);
                    e.ror_x_imm(tmp, tmp, count);
                    e.mov_w(dest, tmp);
                }
            }
        }

        if mask & SR_NZVC != 0 {
            e.cmn_w_shifted(Reg::WZR, tmp, size.nz_shift());
            let mut m = mask;
            get_nz00(e, ra, cc, &mut m);
        }
        let carry_bit = match (left, size) {
            (true, OpSize::Byte) | (true, OpSize::Word) => 31,
            (true, OpSize::Long) => 63,
            (false, OpSize::Byte) => 8,
            (false, OpSize::Word) => 16,
            (false, OpSize::Long) => 32,
        };
        rox_carry_from_bit(e, ra, cc, tmp, carry_bit, mask);
        ra.free(tmp);
    }

    advance_pc(e, ra, 2);
}

/// Decode the EA field of a memory-form shift and fetch the operand.
/// Pre-decrement folds into the load, post-increment into the store.
fn mem_operand(
    e: &mut Emitter,
    ra: &mut RegAlloc,
    op: u16,
    stream: &mut GuestStream,
    signed: bool,
) -> (Reg, Reg, usize) {
    let tmp = ra.alloc_temp();
    let start = stream.pos();
    let dest = load_ea(e, ra, (op & 0x3F) as u8, stream);
    let ext_words = stream.pos() - start;
    let predec = op & 0x38 == 0x20;
    match (signed, predec) {
        (true, true) => e.ldrsh_w_pre(tmp, dest, -2),
        (true, false) => e.ldrsh_w_uoff(tmp, dest, 0),
        (false, true) => e.ldrh_pre(tmp, dest, -2),
        (false, false) => e.ldrh_uoff(tmp, dest, 0),
    }
    (tmp, dest, ext_words)
}

fn mem_store(e: &mut Emitter, op: u16, tmp: Reg, dest: Reg) {
    if op & 0x38 == 0x18 {
        e.strh_post(tmp, dest, 2);
    } else {
        e.strh_uoff(tmp, dest, 0);
    }
}

/// ASL/ASR, memory form: word operand, single shift.
pub(crate) fn asx_mem(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_CCR;
    let left = op & 0x0100 != 0;
    let (tmp, dest, ext_words) = mem_operand(e, ra, op, stream, true);

    if mask & SR_XC != 0 {
        if left {
            e.tst_w_imm(tmp, 1, 17); // bit 15
        } else {
            e.tst_w_imm(tmp, 1, 0); // bit 0
        }
    }
    if left {
        e.lsl_w_imm(tmp, tmp, 1);
    } else {
        e.asr_w_imm(tmp, tmp, 1);
    }
    mem_store(e, op, tmp, dest);

    advance_pc(e, ra, 2 * (1 + ext_words as u32));

    if mask != 0 {
        let cc = ra.modify_cc(e);
        shift_flag_update(e, ra, cc, OpSize::Word, tmp, mask);
    }
    ra.free(tmp);
    ra.free(dest);
}

/// LSL/LSR, memory form.
pub(crate) fn lsx_mem(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_CCR;
    let left = op & 0x0100 != 0;
    let (tmp, dest, ext_words) = mem_operand(e, ra, op, stream, false);

    if mask & SR_XC != 0 {
        if left {
            e.tst_w_imm(tmp, 1, 17);
        } else {
            e.tst_w_imm(tmp, 1, 0);
        }
    }
    if left {
        e.lsl_w_imm(tmp, tmp, 1);
    } else {
        e.lsr_w_imm(tmp, tmp, 1);
    }
    mem_store(e, op, tmp, dest);

    advance_pc(e, ra, 2 * (1 + ext_words as u32));

    if mask != 0 {
        let cc = ra.modify_cc(e);
        shift_flag_update(e, ra, cc, OpSize::Word, tmp, mask);
    }
    ra.free(tmp);
    ra.free(dest);
}

/// ROL/ROR, memory form. The halfword is doubled into the upper half so
/// a 32-bit rotate by one realises the word rotation.
pub(crate) fn ro_mem(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_NZVC;
    let left = op & 0x0100 != 0;
    let (tmp, dest, ext_words) = mem_operand(e, ra, op, stream, false);

    e.bfi_w(tmp, tmp, 16, 16);
    e.ror_w_imm(tmp, tmp, if left { 31 } else { 1 });
    mem_store(e, op, tmp, dest);

    advance_pc(e, ra, 2 * (1 + ext_words as u32));

    if mask != 0 {
        let cc = ra.modify_cc(e);
        if mask & (SR_N | SR_Z) != 0 {
            e.cmn_w_shifted(Reg::WZR, tmp, 16);
        }
        clear_flags(e, ra, cc, mask);
        if mask & SR_Z != 0 {
            set_flags_if(e, ra, cc, Cond::EQ, SR_Z);
        }
        if mask & SR_N != 0 {
            set_flags_if(e, ra, cc, Cond::MI, SR_N);
        }
        if mask & SR_C != 0 {
            // Left: the carried bit landed at bit 0. Right: it wrapped to
            // bit 31 of the doubled pattern.
            e.tst_w_imm(tmp, 1, if left { 0 } else { 1 });
            set_flags_if(e, ra, cc, Cond::NE, SR_C);
        }
    }
    ra.free(tmp);
    ra.free(dest);
}

/// ROXL/ROXR, memory form: X enters next to the halfword, one rotate
/// produces both the result and the new X.
pub(crate) fn rox_mem(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_CCR;
    let left = op & 0x0100 != 0;
    let cc = ra.modify_cc(e);
    let (tmp, dest, ext_words) = mem_operand(e, ra, op, stream, false);

    e.tst_w_imm(cc, 1, (32 - SRB_X) & 31);
    let no_x = e.b_cond(Cond::EQ);
    if left {
        e.orr_w_imm(tmp, tmp, 1, 1); // X at bit 31
    } else {
        e.orr_w_imm(tmp, tmp, 1, 16); // X at bit 16
    }
    e.patch(no_x);
    e.ror_w_imm(tmp, tmp, if left { 31 } else { 1 });
    mem_store(e, op, tmp, dest);

    advance_pc(e, ra, 2 * (1 + ext_words as u32));

    if mask != 0 {
        if mask & SR_NZVC != 0 {
            e.cmn_w_shifted(Reg::WZR, tmp, 16);
            let mut m = mask;
            get_nz00(e, ra, cc, &mut m);
        }
        rox_carry_from_bit(e, ra, cc, tmp, if left { 16 } else { 31 }, mask);
    }
    ra.free(tmp);
    ra.free(dest);
}
