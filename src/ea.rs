//! Effective-address computation for the line-E addressing modes.
//!
//! `load_ea` emits host code that leaves the guest address in the returned
//! register. For (An), (An)+ and -(An) that is the bound address register
//! itself — the pre/post writeback is folded into the halfword access of
//! the memory shift forms, so the binding is returned as-is (and marked
//! dirty for the auto-modifying modes). All other modes compute into a
//! temporary the caller frees.
//!
//! PC-relative modes resolve the PC component at translation time: the
//! stream knows the guest address of its extension words, and translated
//! units are immutable.

use crate::emit::{Emitter, Reg, Shift};
use crate::regalloc::{GuestReg, RegAlloc};
use crate::stream::GuestStream;

/// Emit the address computation for the 6-bit EA specifier `ea`,
/// consuming any extension words from the stream.
pub fn load_ea(e: &mut Emitter, ra: &mut RegAlloc, ea: u8, stream: &mut GuestStream) -> Reg {
    let mode = (ea >> 3) & 7;
    let reg = ea & 7;

    match mode {
        // (An)
        2 => ra.map_read(e, GuestReg::A(reg)),
        // (An)+ / -(An): the access instruction performs the writeback.
        3 | 4 => {
            let an = ra.map_read(e, GuestReg::A(reg));
            ra.set_dirty(GuestReg::A(reg));
            an
        }
        // (d16,An)
        5 => {
            let disp = stream.next_word() as i16;
            let an = ra.map_read(e, GuestReg::A(reg));
            let tmp = ra.alloc_temp();
            add_disp(e, tmp, an, disp as i32);
            tmp
        }
        // (d8,An,Xn)
        6 => {
            let ext = stream.next_word();
            let an = ra.map_read(e, GuestReg::A(reg));
            let tmp = ra.alloc_temp();
            index_from_ext(e, ra, tmp, ext);
            let scale = ((ext >> 9) & 3) as u8;
            e.add_w_shifted(tmp, an, tmp, Shift::Lsl, scale);
            add_disp(e, tmp, tmp, (ext as u8 as i8) as i32);
            tmp
        }
        7 => match reg {
            // (xxx).W
            0 => {
                let addr = stream.next_word() as i16 as i32 as u32;
                let tmp = ra.alloc_temp();
                e.mov_imm32(tmp, addr);
                tmp
            }
            // (xxx).L
            1 => {
                let hi = stream.next_word() as u32;
                let lo = stream.next_word() as u32;
                let tmp = ra.alloc_temp();
                e.mov_imm32(tmp, hi << 16 | lo);
                tmp
            }
            // (d16,PC)
            2 => {
                let base = stream.pc();
                let disp = stream.next_word() as i16 as i32;
                let tmp = ra.alloc_temp();
                e.mov_imm32(tmp, base.wrapping_add(disp as u32));
                tmp
            }
            // (d8,PC,Xn)
            3 => {
                let base = stream.pc();
                let ext = stream.next_word();
                let d8 = (ext as u8 as i8) as i32;
                let tmp = ra.alloc_temp();
                let idx = ra.alloc_temp();
                index_from_ext(e, ra, idx, ext);
                e.mov_imm32(tmp, base.wrapping_add(d8 as u32));
                let scale = ((ext >> 9) & 3) as u8;
                e.add_w_shifted(tmp, tmp, idx, Shift::Lsl, scale);
                ra.free(idx);
                tmp
            }
            _ => panic!("EA mode 7/{reg} has no address"),
        },
        _ => panic!("EA mode {mode} has no address"),
    }
}

/// Extension words consumed by the EA specifier `ea`. `ext` is the stream
/// content following them (unused by the brief-format modes supported
/// here, kept so callers can pass the raw tail).
pub fn ea_ext_words(ea: u8, _ext: &[u16]) -> usize {
    let mode = (ea >> 3) & 7;
    let reg = ea & 7;
    match mode {
        5 | 6 => 1,
        7 => match reg {
            1 => 2,
            0 | 2 | 3 => 1,
            _ => 0,
        },
        _ => 0,
    }
}

/// Materialise the index register of a brief extension word into `dst`:
/// Dn or An, sign-extended from 16 bits when the W/L bit is clear.
fn index_from_ext(e: &mut Emitter, ra: &mut RegAlloc, dst: Reg, ext: u16) {
    let idx_num = ((ext >> 12) & 7) as u8;
    let idx = if ext & 0x8000 != 0 {
        ra.map_read(e, GuestReg::A(idx_num))
    } else {
        ra.map_read(e, GuestReg::D(idx_num))
    };
    if ext & 0x0800 != 0 {
        e.mov_w(dst, idx);
    } else {
        e.sxth_w(dst, idx);
    }
}

/// `dst = src + disp` for a signed 16-bit displacement. The wide path
/// materialises the constant in `dst`, so `dst` must not alias `src`
/// there; callers with an in-place `dst` stay within the 8-bit range.
fn add_disp(e: &mut Emitter, dst: Reg, src: Reg, disp: i32) {
    if disp == 0 {
        if dst != src {
            e.mov_w(dst, src);
        }
    } else if (0..4096).contains(&disp) {
        e.add_w_imm(dst, src, disp as u16);
    } else if (-4095..0).contains(&disp) {
        e.sub_w_imm(dst, src, (-disp) as u16);
    } else {
        debug_assert!(dst != src);
        e.mov_imm32(dst, disp as u32);
        e.add_w(dst, src, dst);
    }
}
