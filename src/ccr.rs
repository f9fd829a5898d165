//! Guest condition-code model and the emitters that maintain it.
//!
//! The CCR is cached in a host register (obtained through
//! [`RegAlloc::modify_cc`]) with the 68000 bit layout: C at bit 0, then
//! V, Z, N, X. Flag helpers take the per-instruction demanded mask by
//! mutable reference and strip the bits they have handled, so callers can
//! skip work for statically dead flags.

use crate::emit::{Cond, Emitter, Reg};
use crate::regalloc::RegAlloc;

pub const SR_C: u8 = 0x01;
pub const SR_V: u8 = 0x02;
pub const SR_Z: u8 = 0x04;
pub const SR_N: u8 = 0x08;
pub const SR_X: u8 = 0x10;

pub const SR_XC: u8 = SR_X | SR_C;
pub const SR_NZVC: u8 = SR_N | SR_Z | SR_V | SR_C;
pub const SR_CCR: u8 = SR_NZVC | SR_X;

/// Bit positions within the status register.
pub const SRB_C: u8 = 0;
pub const SRB_V: u8 = 1;
pub const SRB_Z: u8 = 2;
pub const SRB_N: u8 = 3;
pub const SRB_X: u8 = 4;

/// Emit `cc &= !mask`. Two instructions; `mask` may be any bit pattern.
pub fn clear_flags(e: &mut Emitter, ra: &mut RegAlloc, cc: Reg, mask: u8) {
    debug_assert!(mask != 0);
    let tmp = ra.alloc_temp();
    e.movz_w(tmp, mask as u16);
    e.bic_w(cc, cc, tmp);
    ra.free(tmp);
}

/// Emit a conditional OR of `bits` into the CCR, taken when the host
/// condition `cond` holds. Single-bit masks use an immediate OR; wider
/// masks go through a temporary.
pub fn set_flags_if(e: &mut Emitter, ra: &mut RegAlloc, cc: Reg, cond: Cond, bits: u8) {
    debug_assert!(bits != 0);
    let skip = e.b_cond(cond.invert());
    if bits.count_ones() == 1 {
        let bit = bits.trailing_zeros() as u8;
        e.orr_w_imm(cc, cc, 1, (32 - bit) & 31);
    } else {
        let tmp = ra.alloc_temp();
        e.movz_w(tmp, bits as u16);
        e.orr_w(cc, cc, tmp);
        ra.free(tmp);
    }
    e.patch(skip);
}

/// Clear the demanded N/Z/V/C bits and re-assert N and Z from the live
/// host flags. V and C stay cleared; X is left for the caller.
///
/// Must run while the host N/Z flags still reflect the result (an in-width
/// `cmn` or a flag-setting AND). Strips the handled bits from `mask`.
pub fn get_nz00(e: &mut Emitter, ra: &mut RegAlloc, cc: Reg, mask: &mut u8) {
    let m = *mask & SR_NZVC;
    if m == 0 {
        return;
    }
    clear_flags(e, ra, cc, m);
    if m & SR_Z != 0 {
        set_flags_if(e, ra, cc, Cond::EQ, SR_Z);
    }
    if m & SR_N != 0 {
        set_flags_if(e, ra, cc, Cond::MI, SR_N);
    }
    *mask &= !m;
}
