//! Bit-field emitters (the 0xE8C0–0xEFFF half of line E).
//!
//! The extension word carries the field offset (bit 11 selects Dn, else a
//! 5-bit immediate) and width (bit 5 selects Dn, else immediate; 0 means
//! 32). Bits 14–12 name the data register operand of the forms that have
//! one.
//!
//! Register-sourced fields treat bit 31 of Dn as offset 0 and wrap around:
//! the operand is doubled into a 64-bit temporary and shifted so the field
//! sits left-justified at bit 63. Memory fields are byte-addressed; a
//! 64-bit load from the base byte covers any 32-bit field at any bit
//! offset 0–7, and register-sourced offsets first advance the base by
//! `offset >> 3`. A left-justified field makes the flag rule uniform:
//! N is the host sign, Z the host zero, V and C clear.

use crate::ccr::{get_nz00, SR_NZVC};
use crate::cpu::advance_pc;
use crate::ea::load_ea;
use crate::emit::{Emitter, Reg, Shift};
use crate::regalloc::{GuestReg, RegAlloc};
use crate::stream::GuestStream;

/// One of the two field parameters: immediate or register-sourced.
#[derive(Debug, Clone, Copy)]
enum Bf {
    Imm(u8),
    Dreg(u8),
}

fn field_spec(ext: u16) -> (Bf, Bf) {
    let offset = if ext & 0x0800 != 0 {
        Bf::Dreg(((ext >> 6) & 7) as u8)
    } else {
        Bf::Imm(((ext >> 6) & 31) as u8)
    };
    let width = if ext & 0x0020 != 0 {
        Bf::Dreg((ext & 7) as u8)
    } else {
        Bf::Imm((ext & 31) as u8)
    };
    (offset, width)
}

fn ext_dn(ext: u16) -> u8 {
    ((ext >> 12) & 7) as u8
}

/// Immediate width decode: 0 encodes 32.
fn imm_width(w: u8) -> u8 {
    if w == 0 {
        32
    } else {
        w
    }
}

/// Reduce a register-sourced width to 1..=32 at run time (the low five
/// bits, with 0 meaning 32).
fn runtime_width(e: &mut Emitter, w: Reg) {
    e.and_w_imm(w, w, 5, 0);
    let nz = e.cbnz_w(w);
    e.movz_w(w, 32);
    e.patch(nz);
}

/// `mask = (1 << width) - 1` as a 64-bit value; `runtime_width` must have
/// normalised `w` first.
fn low_mask64(e: &mut Emitter, w: Reg, mask: Reg) {
    e.movz_w(mask, 1);
    e.lsl_x(mask, mask, w);
    e.sub_x_imm(mask, mask, 1);
}

/// Double `src` into the top and bottom halves of `tmp` and shift left by
/// the immediate offset, leaving the (wrapping) field at bit 63.
fn dup64_imm(e: &mut Emitter, tmp: Reg, src: Reg, offset: u8) {
    e.lsl_x_imm(tmp, src, 32 + offset);
    e.orr_x_shifted(tmp, tmp, src, offset);
}

/// As `dup64_imm` with a register offset (pre-masked to 0..=31).
fn dup64_reg(e: &mut Emitter, tmp: Reg, src: Reg, offset: Reg) {
    e.lsl_x_imm(tmp, src, 32);
    e.orr_x_shifted(tmp, tmp, src, 0);
    e.lsl_x(tmp, tmp, offset);
}

/// Copy a register-sourced field offset, masked to the in-register range.
fn reg_offset_mod32(e: &mut Emitter, ra: &mut RegAlloc, dn: u8) -> Reg {
    let off = ra.copy_to_temp(e, GuestReg::D(dn));
    e.and_w_imm(off, off, 5, 0);
    off
}

/// For memory forms with a register offset: advance the base by the byte
/// part (arithmetic, so negative offsets walk backwards) and reduce the
/// offset to its bit remainder 0..=7. Returns the adjusted address in a
/// fresh temporary so (An) bindings stay intact.
fn mem_base_reg_offset(e: &mut Emitter, ra: &mut RegAlloc, base: Reg, off: Reg) -> Reg {
    let addr = ra.alloc_temp();
    e.add_w_shifted(addr, base, off, Shift::Asr, 3);
    e.and_w_imm(off, off, 3, 0);
    addr
}

/// BFTST — test a field, set N/Z, clear V/C.
pub(crate) fn bftst(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mut mask = stream.sr_mask() & SR_NZVC;
    let start = stream.pos();
    let ext = stream.next_word();
    let (off, wid) = field_spec(ext);

    if op & 0x38 == 0 {
        let src = ra.map_read(e, GuestReg::D((op & 7) as u8));
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                if o == 0 && w0 == 0 {
                    // The register itself is the field.
                    if mask != 0 {
                        let cc = ra.modify_cc(e);
                        e.cmn_w_shifted(Reg::WZR, src, 0);
                        get_nz00(e, ra, cc, &mut mask);
                    }
                } else {
                    let w = imm_width(w0);
                    let tmp = ra.alloc_temp();
                    dup64_imm(e, tmp, src, 0);
                    e.sbfx_x(tmp, tmp, 64 - o - w, w);
                    if mask != 0 {
                        let cc = ra.modify_cc(e);
                        e.cmn_w_shifted(Reg::WZR, tmp, 0);
                        get_nz00(e, ra, cc, &mut mask);
                    }
                    ra.free(tmp);
                }
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let tmp = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                dup64_imm(e, tmp, src, o);
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ands_x(tmp, tmp, maskr);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(tmp);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = reg_offset_mod32(e, ra, or);
                let tmp = ra.alloc_temp();
                dup64_reg(e, tmp, src, off_reg);
                e.ands_x_imm(tmp, tmp, w, w);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = reg_offset_mod32(e, ra, or);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let tmp = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                dup64_reg(e, tmp, src, off_reg);
                e.ands_x(tmp, tmp, maskr);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(off_reg);
            }
        }
    } else {
        let base = load_ea(e, ra, (op & 0x3F) as u8, stream);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let tmp = ra.alloc_temp();
                e.ldr_x_uoff(tmp, base, 0);
                e.sbfx_x(tmp, tmp, 64 - o - w, w);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_x_shifted(Reg::WZR, tmp, 64 - w);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let tmp = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                e.ldr_x_uoff(tmp, base, 0);
                if o != 0 {
                    e.lsl_x_imm(tmp, tmp, o);
                }
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ands_x(tmp, tmp, maskr);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(tmp);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let tmp = ra.alloc_temp();
                e.ldr_x_uoff(tmp, addr, 0);
                e.lsl_x(tmp, tmp, off_reg);
                e.ands_x_imm(tmp, tmp, w, w);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(addr);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let tmp = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ldr_x_uoff(tmp, addr, 0);
                e.lsl_x(tmp, tmp, off_reg);
                e.ands_x(tmp, tmp, maskr);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(addr);
                ra.free(off_reg);
            }
        }
        ra.free(base);
    }

    advance_pc(e, ra, 2 * (1 + (stream.pos() - start) as u32));
}

/// Shared body of BFEXTU and BFEXTS; `signed` picks the extension.
fn bfext(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream, signed: bool) {
    let mut mask = stream.sr_mask() & SR_NZVC;
    let start = stream.pos();
    let ext = stream.next_word();
    let (off, wid) = field_spec(ext);
    let dest_dn = GuestReg::D(ext_dn(ext));

    if op & 0x38 == 0 {
        let src = ra.map_read(e, GuestReg::D((op & 7) as u8));
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let dest = ra.map_write(dest_dn);
                if o == 0 && w == 32 {
                    e.mov_w(dest, src);
                } else {
                    let tmp = ra.alloc_temp();
                    dup64_imm(e, tmp, src, 0);
                    if signed {
                        e.sbfx_x(dest, tmp, 64 - o - w, w);
                    } else {
                        e.ubfx_x(dest, tmp, 64 - o - w, w);
                    }
                    ra.free(tmp);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_w_shifted(Reg::WZR, dest, 32 - w);
                    get_nz00(e, ra, cc, &mut mask);
                }
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let tmp = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                dup64_imm(e, tmp, src, o);
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ands_x(tmp, tmp, maskr);
                extract_down(e, tmp, wreg, maskr, signed);
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(tmp);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = reg_offset_mod32(e, ra, or);
                let tmp = ra.alloc_temp();
                dup64_reg(e, tmp, src, off_reg);
                e.ands_x_imm(tmp, tmp, w, w);
                if signed {
                    e.asr_x_imm(tmp, tmp, 64 - w);
                } else {
                    e.lsr_x_imm(tmp, tmp, 64 - w);
                }
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = reg_offset_mod32(e, ra, or);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let tmp = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                dup64_reg(e, tmp, src, off_reg);
                e.ands_x(tmp, tmp, maskr);
                extract_down(e, tmp, wreg, maskr, signed);
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(off_reg);
            }
        }
    } else {
        let base = load_ea(e, ra, (op & 0x3F) as u8, stream);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let tmp = ra.alloc_temp();
                e.ldr_x_uoff(tmp, base, 0);
                if signed {
                    e.sbfx_x(tmp, tmp, 64 - o - w, w);
                } else {
                    e.ubfx_x(tmp, tmp, 64 - o - w, w);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_x_shifted(Reg::WZR, tmp, 64 - w);
                    get_nz00(e, ra, cc, &mut mask);
                }
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                ra.free(tmp);
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let tmp = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                e.ldr_x_uoff(tmp, base, 0);
                if o != 0 {
                    e.lsl_x_imm(tmp, tmp, o);
                }
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ands_x(tmp, tmp, maskr);
                extract_down(e, tmp, wreg, maskr, signed);
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(tmp);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let tmp = ra.alloc_temp();
                e.ldr_x_uoff(tmp, addr, 0);
                e.lsl_x(tmp, tmp, off_reg);
                e.ands_x_imm(tmp, tmp, w, w);
                if signed {
                    e.asr_x_imm(tmp, tmp, 64 - w);
                } else {
                    e.lsr_x_imm(tmp, tmp, 64 - w);
                }
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(addr);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let tmp = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ldr_x_uoff(tmp, addr, 0);
                e.lsl_x(tmp, tmp, off_reg);
                e.ands_x(tmp, tmp, maskr);
                extract_down(e, tmp, wreg, maskr, signed);
                let dest = ra.map_write(dest_dn);
                e.mov_w(dest, tmp);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(addr);
                ra.free(off_reg);
            }
        }
        ra.free(base);
    }

    advance_pc(e, ra, 2 * (1 + (stream.pos() - start) as u32));
}

/// Shift the left-justified field in `tmp` down to bit 0 by a runtime
/// `64 - width`. Clobbers `scratch`; `wreg` still holds the width after.
///
/// Keeps the host N/Z flags intact (they were set by the field test), so
/// the caller may defer its `get_nz00` until after the move to the
/// destination.
fn extract_down(e: &mut Emitter, tmp: Reg, wreg: Reg, scratch: Reg, signed: bool) {
    e.movz_w(scratch, 64);
    e.sub_w(scratch, scratch, wreg);
    if signed {
        e.asr_x(tmp, tmp, scratch);
    } else {
        e.lsr_x(tmp, tmp, scratch);
    }
}

/// BFEXTU — unsigned field extract into a data register.
pub(crate) fn bfextu(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    bfext(e, ra, op, stream, false);
}

/// BFEXTS — signed field extract into a data register.
pub(crate) fn bfexts(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    bfext(e, ra, op, stream, true);
}

/// The three field-mutating operations share one emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BfModify {
    Chg,
    Clr,
    Set,
}

/// Apply a modify kind to a 32-bit register field at an immediate
/// position (w < 32; full-width cases are special-cased by the caller).
fn modify_reg_imm(e: &mut Emitter, kind: BfModify, src: Reg, w: u8, ror: u8) {
    match kind {
        BfModify::Chg => e.eor_w_imm(src, src, w, ror),
        BfModify::Clr => e.bic_w_imm(src, src, w, ror),
        BfModify::Set => e.orr_w_imm(src, src, w, ror),
    }
}

/// Apply a modify kind with a register-held mask rotated right by `ror`.
fn modify_reg_mask(e: &mut Emitter, kind: BfModify, src: Reg, maskr: Reg, ror: u8) {
    match kind {
        BfModify::Chg => e.eor_w_ror(src, src, maskr, ror),
        BfModify::Clr => e.bic_w_ror(src, src, maskr, ror),
        BfModify::Set => e.orr_w_ror(src, src, maskr, ror),
    }
}

/// 64-bit variants for the memory forms: mask shifted down by `lsr`.
fn modify_mem_imm(e: &mut Emitter, kind: BfModify, data: Reg, w: u8, ror: u8) {
    match kind {
        BfModify::Chg => e.eor_x_imm(data, data, w, ror),
        BfModify::Clr => e.bic_x_imm(data, data, w, ror),
        BfModify::Set => e.orr_x_imm(data, data, w, ror),
    }
}

fn modify_mem_mask(e: &mut Emitter, kind: BfModify, data: Reg, maskr: Reg, lsr: u8) {
    match kind {
        BfModify::Chg => e.eor_x_lsr(data, data, maskr, lsr),
        BfModify::Clr => e.bic_x_lsr(data, data, maskr, lsr),
        BfModify::Set => e.orr_x_lsr(data, data, maskr, lsr),
    }
}

/// BFCHG/BFCLR/BFSET. Flags reflect the field value before modification.
fn bf_modify(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream, kind: BfModify) {
    let mut mask = stream.sr_mask() & SR_NZVC;
    let start = stream.pos();
    let ext = stream.next_word();
    let (off, wid) = field_spec(ext);

    if op & 0x38 == 0 {
        let dn = GuestReg::D((op & 7) as u8);
        let src = ra.map_read(e, dn);
        ra.set_dirty(dn);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    let tmp = ra.alloc_temp();
                    e.ror_w_imm(tmp, src, (32 - o) & 31);
                    if w != 32 {
                        e.tst_w_imm(tmp, w, w);
                    } else {
                        e.cmn_w_shifted(Reg::WZR, tmp, 0);
                    }
                    get_nz00(e, ra, cc, &mut mask);
                    ra.free(tmp);
                }
                if w != 32 {
                    modify_reg_imm(e, kind, src, w, (w + o) & 31);
                } else {
                    match kind {
                        BfModify::Chg => e.mvn_w(src, src),
                        BfModify::Clr => e.movz_w(src, 0),
                        BfModify::Set => e.movn_w(src, 0),
                    }
                }
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_w(maskr, maskr, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    let tmp = ra.alloc_temp();
                    e.ror_w_imm(tmp, src, (32 - o) & 31);
                    e.tst_w(tmp, maskr);
                    get_nz00(e, ra, cc, &mut mask);
                    ra.free(tmp);
                }
                modify_reg_mask(e, kind, src, maskr, o);
                ra.free(maskr);
                ra.free(wreg);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = reg_offset_mod32(e, ra, or);
                let maskr = ra.alloc_temp();
                if w != 32 {
                    e.orr_w_imm(maskr, Reg::WZR, w, w);
                } else {
                    e.movn_w(maskr, 0);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    let tmp = ra.alloc_temp();
                    e.neg_w(tmp, off_reg);
                    e.ror_w(tmp, src, tmp);
                    e.tst_w(tmp, maskr);
                    get_nz00(e, ra, cc, &mut mask);
                    ra.free(tmp);
                }
                e.ror_w(maskr, maskr, off_reg);
                match kind {
                    BfModify::Chg => e.eor_w(src, src, maskr),
                    BfModify::Clr => e.bic_w(src, src, maskr),
                    BfModify::Set => e.orr_w(src, src, maskr),
                }
                ra.free(maskr);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = reg_offset_mod32(e, ra, or);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_w(maskr, maskr, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    let tmp = ra.alloc_temp();
                    e.neg_w(tmp, off_reg);
                    e.ror_w(tmp, src, tmp);
                    e.tst_w(tmp, maskr);
                    get_nz00(e, ra, cc, &mut mask);
                    ra.free(tmp);
                }
                e.ror_w(maskr, maskr, off_reg);
                match kind {
                    BfModify::Chg => e.eor_w(src, src, maskr),
                    BfModify::Clr => e.bic_w(src, src, maskr),
                    BfModify::Set => e.orr_w(src, src, maskr),
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(off_reg);
            }
        }
    } else {
        let base = load_ea(e, ra, (op & 0x3F) as u8, stream);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let data = ra.alloc_temp();
                e.ldr_x_uoff(data, base, 0);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    if o != 0 {
                        let test = ra.alloc_temp();
                        e.lsl_x_imm(test, data, o);
                        e.tst_x_imm(test, w, w);
                        ra.free(test);
                    } else {
                        e.tst_x_imm(data, w, w);
                    }
                    get_nz00(e, ra, cc, &mut mask);
                }
                modify_mem_imm(e, kind, data, w, w + o);
                e.str_x_uoff(data, base, 0);
                ra.free(data);
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let data = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                e.ldr_x_uoff(data, base, 0);
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    if o != 0 {
                        let test = ra.alloc_temp();
                        e.lsl_x_imm(test, data, o);
                        e.tst_x(test, maskr);
                        ra.free(test);
                    } else {
                        e.tst_x(data, maskr);
                    }
                    get_nz00(e, ra, cc, &mut mask);
                }
                modify_mem_mask(e, kind, data, maskr, o);
                e.str_x_uoff(data, base, 0);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(data);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let maskr = ra.alloc_temp();
                let data = ra.alloc_temp();
                e.orr_x_imm(maskr, Reg::XZR, w, w);
                e.ldr_x_uoff(data, addr, 0);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    let test = ra.alloc_temp();
                    e.lsl_x(test, data, off_reg);
                    e.tst_x(test, maskr);
                    get_nz00(e, ra, cc, &mut mask);
                    ra.free(test);
                }
                e.lsr_x(maskr, maskr, off_reg);
                match kind {
                    BfModify::Chg => e.eor_x(data, data, maskr),
                    BfModify::Clr => e.bic_x(data, data, maskr),
                    BfModify::Set => e.orr_x(data, data, maskr),
                }
                e.str_x_uoff(data, addr, 0);
                ra.free(data);
                ra.free(maskr);
                ra.free(addr);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let data = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ldr_x_uoff(data, addr, 0);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    let test = ra.alloc_temp();
                    e.lsl_x(test, data, off_reg);
                    e.tst_x(test, maskr);
                    get_nz00(e, ra, cc, &mut mask);
                    ra.free(test);
                }
                e.lsr_x(maskr, maskr, off_reg);
                match kind {
                    BfModify::Chg => e.eor_x(data, data, maskr),
                    BfModify::Clr => e.bic_x(data, data, maskr),
                    BfModify::Set => e.orr_x(data, data, maskr),
                }
                e.str_x_uoff(data, addr, 0);
                ra.free(data);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(addr);
                ra.free(off_reg);
            }
        }
        ra.free(base);
    }

    advance_pc(e, ra, 2 * (1 + (stream.pos() - start) as u32));
}

/// BFCHG — complement a field.
pub(crate) fn bfchg(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    bf_modify(e, ra, op, stream, BfModify::Chg);
}

/// BFCLR — clear a field.
pub(crate) fn bfclr(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    bf_modify(e, ra, op, stream, BfModify::Clr);
}

/// BFSET — set a field.
pub(crate) fn bfset(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    bf_modify(e, ra, op, stream, BfModify::Set);
}

/// BFINS — insert the low `width` bits of a data register into the field.
/// Flags reflect the inserted value.
pub(crate) fn bfins(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mut mask = stream.sr_mask() & SR_NZVC;
    let start = stream.pos();
    let ext = stream.next_word();
    let (off, wid) = field_spec(ext);
    let src = ra.map_read(e, GuestReg::D(ext_dn(ext)));

    if op & 0x38 == 0 {
        let dn = GuestReg::D((op & 7) as u8);
        let dest = ra.map_read(e, dn);
        ra.set_dirty(dn);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                if o == 0 && w == 32 {
                    if mask != 0 {
                        let cc = ra.modify_cc(e);
                        e.cmn_w_shifted(Reg::WZR, src, 0);
                        get_nz00(e, ra, cc, &mut mask);
                    }
                    e.mov_w(dest, src);
                } else {
                    let msrc = ra.alloc_temp();
                    if w != 32 {
                        e.and_w_imm(msrc, src, w, 0);
                    } else {
                        e.mov_w(msrc, src);
                    }
                    // Rotate the field into position: MSB lands at 31-o.
                    if (o + w) & 31 != 0 {
                        e.ror_w_imm(msrc, msrc, (o + w) & 31);
                    }
                    if mask != 0 {
                        let cc = ra.modify_cc(e);
                        let test = ra.alloc_temp();
                        e.ror_w_imm(test, msrc, (32 - o) & 31);
                        e.cmn_w_shifted(Reg::WZR, test, 0);
                        get_nz00(e, ra, cc, &mut mask);
                        ra.free(test);
                    }
                    if w != 32 {
                        e.bic_w_imm(dest, dest, w, (w + o) & 31);
                        e.orr_w(dest, dest, msrc);
                    } else {
                        e.mov_w(dest, msrc);
                    }
                    ra.free(msrc);
                }
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let msrc = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.and_w(msrc, src, maskr);
                e.ror_w(maskr, maskr, wreg);
                e.ror_w(msrc, msrc, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_w_shifted(Reg::WZR, msrc, 0);
                    get_nz00(e, ra, cc, &mut mask);
                }
                e.bic_w_ror(dest, dest, maskr, o);
                e.orr_w_ror(dest, dest, msrc, o);
                ra.free(msrc);
                ra.free(maskr);
                ra.free(wreg);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = reg_offset_mod32(e, ra, or);
                let msrc = ra.alloc_temp();
                if w != 32 {
                    e.and_w_imm(msrc, src, w, 0);
                    e.ror_w_imm(msrc, msrc, w);
                } else {
                    e.mov_w(msrc, src);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_w_shifted(Reg::WZR, msrc, 0);
                    get_nz00(e, ra, cc, &mut mask);
                }
                if w != 32 {
                    let maskr = ra.alloc_temp();
                    e.orr_w_imm(maskr, Reg::WZR, w, w);
                    e.ror_w(maskr, maskr, off_reg);
                    e.ror_w(msrc, msrc, off_reg);
                    e.bic_w(dest, dest, maskr);
                    e.orr_w(dest, dest, msrc);
                    ra.free(maskr);
                } else {
                    e.ror_w(dest, msrc, off_reg);
                }
                ra.free(msrc);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = reg_offset_mod32(e, ra, or);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let msrc = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.and_w(msrc, src, maskr);
                e.ror_w(maskr, maskr, wreg);
                e.ror_w(msrc, msrc, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_w_shifted(Reg::WZR, msrc, 0);
                    get_nz00(e, ra, cc, &mut mask);
                }
                e.ror_w(maskr, maskr, off_reg);
                e.ror_w(msrc, msrc, off_reg);
                e.bic_w(dest, dest, maskr);
                e.orr_w(dest, dest, msrc);
                ra.free(msrc);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(off_reg);
            }
        }
    } else {
        let base = load_ea(e, ra, (op & 0x3F) as u8, stream);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let data = ra.alloc_temp();
                let msrc = ra.alloc_temp();
                e.ldr_x_uoff(data, base, 0);
                if w != 32 {
                    e.and_w_imm(msrc, src, w, 0);
                } else {
                    e.mov_w(msrc, src);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_w_shifted(Reg::WZR, msrc, 32 - w);
                    get_nz00(e, ra, cc, &mut mask);
                }
                e.lsl_x_imm(msrc, msrc, 64 - o - w);
                modify_mem_imm(e, BfModify::Clr, data, w, w + o);
                e.orr_x(data, data, msrc);
                e.str_x_uoff(data, base, 0);
                ra.free(msrc);
                ra.free(data);
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let data = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let msrc = ra.alloc_temp();
                e.ldr_x_uoff(data, base, 0);
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.and_x(msrc, src, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ror_x(msrc, msrc, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.tst_x(msrc, msrc);
                    get_nz00(e, ra, cc, &mut mask);
                }
                modify_mem_mask(e, BfModify::Clr, data, maskr, o);
                e.orr_x_lsr(data, data, msrc, o);
                e.str_x_uoff(data, base, 0);
                ra.free(msrc);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(data);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let data = ra.alloc_temp();
                let msrc = ra.alloc_temp();
                e.ldr_x_uoff(data, addr, 0);
                if w != 32 {
                    e.and_w_imm(msrc, src, w, 0);
                } else {
                    e.mov_w(msrc, src);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.cmn_w_shifted(Reg::WZR, msrc, 32 - w);
                    get_nz00(e, ra, cc, &mut mask);
                }
                e.lsl_x_imm(msrc, msrc, 64 - w);
                e.lsr_x(msrc, msrc, off_reg);
                let maskr = ra.alloc_temp();
                e.orr_x_imm(maskr, Reg::XZR, w, w);
                e.lsr_x(maskr, maskr, off_reg);
                e.bic_x(data, data, maskr);
                e.orr_x(data, data, msrc);
                e.str_x_uoff(data, addr, 0);
                ra.free(maskr);
                ra.free(msrc);
                ra.free(data);
                ra.free(addr);
                ra.free(off_reg);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let data = ra.alloc_temp();
                let msrc = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.and_x(msrc, src, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ror_x(msrc, msrc, wreg);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    e.tst_x(msrc, msrc);
                    get_nz00(e, ra, cc, &mut mask);
                }
                e.ldr_x_uoff(data, addr, 0);
                e.lsr_x(maskr, maskr, off_reg);
                e.lsr_x(msrc, msrc, off_reg);
                e.bic_x(data, data, maskr);
                e.orr_x(data, data, msrc);
                e.str_x_uoff(data, addr, 0);
                ra.free(msrc);
                ra.free(data);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(addr);
                ra.free(off_reg);
            }
        }
        ra.free(base);
    }

    advance_pc(e, ra, 2 * (1 + (stream.pos() - start) as u32));
}

/// BFFFO — find the first set bit of the field. The result register gets
/// `offset + leading-zero count within the field`; a clear field yields
/// `offset + width`. Register-sourced offsets contribute their full value
/// to the result even though the field position only uses the low bits.
pub(crate) fn bfffo(e: &mut Emitter, ra: &mut RegAlloc, op: u16, stream: &mut GuestStream) {
    let mut mask = stream.sr_mask() & SR_NZVC;
    let start = stream.pos();
    let ext = stream.next_word();
    let (off, wid) = field_spec(ext);
    let dest_dn = ext_dn(ext);

    if op & 0x38 == 0 {
        let src = ra.map_read(e, GuestReg::D((op & 7) as u8));
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let tmp = ra.alloc_temp();
                dup64_imm(e, tmp, src, o);
                e.ands_x_imm(tmp, tmp, w, w);
                e.orr_x_imm(tmp, tmp, 64 - w, 0);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                if o != 0 {
                    e.add_w_imm(dest, dest, o as u16);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let tmp = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                dup64_imm(e, tmp, src, o);
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ands_x(tmp, tmp, maskr);
                e.orn_x(tmp, tmp, maskr);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                if o != 0 {
                    e.add_w_imm(dest, dest, o as u16);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(tmp);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_orig = bfffo_offset_operand(e, ra, or, dest_dn);
                let off_reg = ra.alloc_temp();
                e.and_w_imm(off_reg, off_orig, 5, 0);
                let tmp = ra.alloc_temp();
                dup64_reg(e, tmp, src, off_reg);
                e.ands_x_imm(tmp, tmp, w, w);
                e.orr_x_imm(tmp, tmp, 64 - w, 0);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                e.add_w(dest, dest, off_orig);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(off_reg);
                ra.free(off_orig);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_orig = bfffo_offset_operand(e, ra, or, dest_dn);
                let off_reg = ra.alloc_temp();
                e.and_w_imm(off_reg, off_orig, 5, 0);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let tmp = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                dup64_reg(e, tmp, src, off_reg);
                e.ands_x(tmp, tmp, maskr);
                e.orn_x(tmp, tmp, maskr);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                e.add_w(dest, dest, off_orig);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(off_reg);
                ra.free(off_orig);
            }
        }
    } else {
        let base = load_ea(e, ra, (op & 0x3F) as u8, stream);
        match (off, wid) {
            (Bf::Imm(o), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let tmp = ra.alloc_temp();
                e.ldr_x_uoff(tmp, base, 0);
                if o != 0 {
                    e.lsl_x_imm(tmp, tmp, o);
                }
                e.ands_x_imm(tmp, tmp, w, w);
                e.orr_x_imm(tmp, tmp, 64 - w, 0);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                if o != 0 {
                    e.add_w_imm(dest, dest, o as u16);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
            }
            (Bf::Imm(o), Bf::Dreg(wr)) => {
                let tmp = ra.alloc_temp();
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                e.ldr_x_uoff(tmp, base, 0);
                if o != 0 {
                    e.lsl_x_imm(tmp, tmp, o);
                }
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ands_x(tmp, tmp, maskr);
                e.orn_x(tmp, tmp, maskr);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                if o != 0 {
                    e.add_w_imm(dest, dest, o as u16);
                }
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(maskr);
                ra.free(wreg);
                ra.free(tmp);
            }
            (Bf::Dreg(or), Bf::Imm(w0)) => {
                let w = imm_width(w0);
                let off_orig = bfffo_offset_operand(e, ra, or, dest_dn);
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let tmp = ra.alloc_temp();
                e.ldr_x_uoff(tmp, addr, 0);
                e.lsl_x(tmp, tmp, off_reg);
                e.ands_x_imm(tmp, tmp, w, w);
                e.orr_x_imm(tmp, tmp, 64 - w, 0);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                e.add_w(dest, dest, off_orig);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(addr);
                ra.free(off_reg);
                ra.free(off_orig);
            }
            (Bf::Dreg(or), Bf::Dreg(wr)) => {
                let off_orig = bfffo_offset_operand(e, ra, or, dest_dn);
                let off_reg = ra.copy_to_temp(e, GuestReg::D(or));
                let addr = mem_base_reg_offset(e, ra, base, off_reg);
                let wreg = ra.copy_to_temp(e, GuestReg::D(wr));
                let maskr = ra.alloc_temp();
                let tmp = ra.alloc_temp();
                runtime_width(e, wreg);
                low_mask64(e, wreg, maskr);
                e.ror_x(maskr, maskr, wreg);
                e.ldr_x_uoff(tmp, addr, 0);
                e.lsl_x(tmp, tmp, off_reg);
                e.ands_x(tmp, tmp, maskr);
                e.orn_x(tmp, tmp, maskr);
                let dest = ra.map_write(GuestReg::D(dest_dn));
                e.clz_x(dest, tmp);
                e.add_w(dest, dest, off_orig);
                if mask != 0 {
                    let cc = ra.modify_cc(e);
                    get_nz00(e, ra, cc, &mut mask);
                }
                ra.free(tmp);
                ra.free(maskr);
                ra.free(wreg);
                ra.free(addr);
                ra.free(off_reg);
                ra.free(off_orig);
            }
        }
        ra.free(base);
    }

    advance_pc(e, ra, 2 * (1 + (stream.pos() - start) as u32));
}

/// The full offset value used for the BFFFO result. When the offset
/// register is also the destination it must be copied before the `clz`
/// overwrites it.
fn bfffo_offset_operand(e: &mut Emitter, ra: &mut RegAlloc, off_dn: u8, dest_dn: u8) -> Reg {
    if off_dn == dest_dn {
        ra.copy_to_temp(e, GuestReg::D(off_dn))
    } else {
        ra.map_read(e, GuestReg::D(off_dn))
    }
}
