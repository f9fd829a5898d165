//! Family entrypoint for line E.
//!
//! The driver hands over the stream with the opcode unread. One call
//! translates one guest instruction — or three, when the byte-swap
//! peephole matches — and reports how many were consumed.

use crate::ccr::{clear_flags, set_flags_if, SR_C, SR_N, SR_NZVC, SR_Z};
use crate::cpu::{advance_pc, emit_exception, VECTOR_ILLEGAL_INSTRUCTION};
use crate::dispatch;
use crate::emit::{Cond, Emitter, Reg};
use crate::regalloc::{GuestReg, RegAlloc};
use crate::stream::GuestStream;

/// Translate the next guest instruction from `stream`, appending host
/// code to `e`. Returns the number of guest instructions consumed.
///
/// Opcodes outside the dispatch table produce the trap sequence: guest
/// state flushed, ILLEGAL_INSTRUCTION latched in the context, block
/// terminated. A host-side diagnostic is logged at translation time.
pub fn emit_line_e(e: &mut Emitter, ra: &mut RegAlloc, stream: &mut GuestStream) -> u16 {
    let opcode = stream.next_word();

    // RO(R|L).W #8,Dn ; SWAP Dn ; RO(R|L).W #8,Dn — a 32-bit byte swap
    // spelled with three rotates. The trailing rotate may go either way,
    // hence the direction bit is masked out of the comparison.
    if opcode & 0xFEF8 == 0xE058 {
        let swap = 0x4840 | (opcode & 7);
        if stream.peek(0) == Some(swap)
            && stream.peek(1).map(|w| w & 0xFEFF) == Some(opcode & 0xFEFF)
        {
            emit_bswap(e, ra, opcode, stream);
            return 3;
        }
    }

    if let Some(def) = dispatch::lookup(opcode) {
        (def.emit)(e, ra, opcode, stream);
        1
    } else {
        log::warn!(
            "unimplemented line E opcode {opcode:04x} at {:08x}",
            stream.pc().wrapping_sub(2)
        );
        emit_exception(e, ra, VECTOR_ILLEGAL_INSTRUCTION);
        1
    }
}

/// The peephole body: one `rev`, one PC advance for all three
/// instructions, flags as the final word rotate would have left them
/// (N/Z from the swapped value, C clear, X untouched).
fn emit_bswap(e: &mut Emitter, ra: &mut RegAlloc, opcode: u16, stream: &mut GuestStream) {
    let mask = stream.sr_mask() & SR_NZVC;
    let dn = GuestReg::D((opcode & 7) as u8);
    let reg = ra.map_read(e, dn);
    ra.set_dirty(dn);

    e.rev_w(reg, reg);
    advance_pc(e, ra, 6);
    stream.skip(2);

    if mask != 0 {
        let cc = ra.modify_cc(e);
        e.cmn_w_shifted(Reg::WZR, reg, 0);
        clear_flags(e, ra, cc, mask);
        if mask & SR_Z != 0 {
            set_flags_if(e, ra, cc, Cond::EQ, SR_Z);
        }
        if mask & SR_N != 0 {
            set_flags_if(e, ra, cc, Cond::MI, SR_N);
        }
        if mask & SR_C != 0 {
            // The compare-negative above can never set the host carry, so
            // this keeps C cleared; kept conditional for uniformity with
            // the rotate emitters.
            set_flags_if(e, ra, cc, Cond::CS, SR_C);
        }
    }
}
