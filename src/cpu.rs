use crate::emit::{Emitter, Reg};
use crate::regalloc::{GuestReg, RegAlloc};

/// Guest 68000 CPU state as seen by translated code.
///
/// Emitted fragments address this structure through the context register
/// (`x27`); the field offsets below are baked into the generated loads and
/// stores. The execution engine owns one instance per guest CPU.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub struct CpuContext {
    /// Data registers D0–D7.
    pub d: [u32; 8],
    /// Address registers A0–A7.
    pub a: [u32; 8],
    /// Program counter.
    pub pc: u32,
    /// Status register; the CCR occupies the low five bits (X N Z V C).
    pub sr: u32,
    /// Exception vector raised by the block, or 0. Checked by the
    /// dispatcher after every block return.
    pub pending_exception: u32,
}

pub const CTX_D_BASE: u16 = std::mem::offset_of!(CpuContext, d) as u16;
pub const CTX_A_BASE: u16 = std::mem::offset_of!(CpuContext, a) as u16;
pub const CTX_PC: u16 = std::mem::offset_of!(CpuContext, pc) as u16;
pub const CTX_SR: u16 = std::mem::offset_of!(CpuContext, sr) as u16;
pub const CTX_PENDING_EXCEPTION: u16 = std::mem::offset_of!(CpuContext, pending_exception) as u16;

/// Guest exception vectors raised by this family.
pub const VECTOR_ILLEGAL_INSTRUCTION: u32 = 4;

impl CpuContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Emit the guest-PC advance for one decoded instruction.
///
/// The PC lives in a host register for the duration of the block; the
/// advance is a single immediate add, written back when the allocator
/// flushes.
pub fn advance_pc(e: &mut Emitter, ra: &mut RegAlloc, bytes: u32) {
    debug_assert!(bytes < 4096);
    let pc = ra.map_read(e, GuestReg::Pc);
    ra.set_dirty(GuestReg::Pc);
    e.add_w_imm(pc, pc, bytes as u16);
}

/// Emit code that raises a guest exception and terminates the block.
///
/// All dirty guest state (including the PC) is written back first, so the
/// exception handler observes a consistent context. The block ends with a
/// return to the dispatcher followed by the terminator sentinel.
pub fn emit_exception(e: &mut Emitter, ra: &mut RegAlloc, vector: u32) {
    ra.flush(e);
    let tmp = ra.alloc_temp();
    e.movz_w(tmp, vector as u16);
    e.str_w_uoff(tmp, Reg::CTX, CTX_PENDING_EXCEPTION);
    ra.free(tmp);
    e.ret();
    e.sentinel();
}
