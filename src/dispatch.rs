//! Opcode dispatch for line E.
//!
//! A 4,096-entry table indexed by the low 12 bits of the opcode, built
//! once from per-family pattern rules and immutable afterwards. Each
//! entry carries the emitter, the CCR bits the instruction consumes and
//! produces, the base encoded length and whether an effective-address
//! field follows. Undefined encodings stay `None` and fall through to the
//! illegal-instruction path in [`crate::line_e`].

use std::sync::LazyLock;

use crate::bitfield;
use crate::ccr::{SR_CCR, SR_NZVC, SR_X};
use crate::ea::ea_ext_words;
use crate::emit::Emitter;
use crate::regalloc::RegAlloc;
use crate::shifts;
use crate::stream::GuestStream;

/// Operand width of a guest instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSize {
    Byte,
    Word,
    Long,
}

impl OpSize {
    /// Width in bits.
    pub fn bits(self) -> u8 {
        match self {
            OpSize::Byte => 8,
            OpSize::Word => 16,
            OpSize::Long => 32,
        }
    }

    /// Left-shift that moves the operand's MSB to host bit 31 for the
    /// in-width N/Z test.
    pub fn nz_shift(self) -> u8 {
        32 - self.bits()
    }
}

/// An emitter routine for one guest instruction.
pub type EmitFn = fn(&mut Emitter, &mut RegAlloc, u16, &mut GuestStream);

/// Static description of one line-E encoding.
#[derive(Clone, Copy)]
pub struct OpcodeDef {
    pub emit: EmitFn,
    /// CCR bits the instruction reads.
    pub sr_needs: u8,
    /// CCR bits it can write.
    pub sr_sets: u8,
    /// Encoded length in words before EA extension words.
    pub base_words: u8,
    /// Whether bits 5..0 hold an effective address.
    pub has_ea: bool,
}

static TABLE: LazyLock<Vec<Option<OpcodeDef>>> =
    LazyLock::new(|| (0..0x1000u16).map(classify).collect());

/// Look up the table entry for an opcode (only the low 12 bits matter).
pub fn lookup(opcode: u16) -> Option<&'static OpcodeDef> {
    TABLE[(opcode & 0x0FFF) as usize].as_ref()
}

/// CCR masks for a global liveness analysis: (needs, sets). Undefined
/// opcodes need every flag and set none — the exception path must observe
/// an intact CCR.
pub fn sr_info(opcode: u16) -> (u8, u8) {
    match lookup(opcode) {
        Some(def) => (def.sr_needs, def.sr_sets),
        None => (SR_CCR, 0),
    }
}

/// Encoded length of the instruction at the head of `words`, in 16-bit
/// words including all extension words. Undefined opcodes occupy one word
/// (the entrypoint consumes exactly the opcode before trapping).
pub fn line_e_length(words: &[u16]) -> usize {
    let opcode = words[0];
    match lookup(opcode) {
        Some(def) => {
            let mut len = def.base_words as usize;
            if def.has_ea {
                let ext = words.get(len..).unwrap_or(&[]);
                len += ea_ext_words((opcode & 0x3F) as u8, ext);
            }
            len
        }
        None => 1,
    }
}

/// Decide what a single 12-bit encoding is, if anything.
fn classify(idx: u16) -> Option<OpcodeDef> {
    if (idx >> 6) & 3 != 3 {
        // Register-form shift/rotate: every combination is defined.
        let (emit, sr_needs, sr_sets): (EmitFn, u8, u8) = match (idx >> 3) & 3 {
            0 => (shifts::asx_reg, SR_X, SR_CCR),
            1 => (shifts::lsx_reg, SR_X, SR_CCR),
            2 => (shifts::rox_reg, SR_X, SR_CCR),
            _ => (shifts::ro_reg, 0, SR_NZVC),
        };
        return Some(OpcodeDef {
            emit,
            sr_needs,
            sr_sets,
            base_words: 1,
            has_ea: false,
        });
    }

    let ea = (idx & 0x3F) as u8;
    if idx & 0x800 == 0 {
        // Memory-form shift/rotate, word sized, shift by one.
        if !memshift_ea_legal(ea) {
            return None;
        }
        let (emit, sr_needs, sr_sets): (EmitFn, u8, u8) = match (idx >> 9) & 3 {
            0 => (shifts::asx_mem, SR_X, SR_CCR),
            1 => (shifts::lsx_mem, SR_X, SR_CCR),
            2 => (shifts::rox_mem, SR_X, SR_CCR),
            _ => (shifts::ro_mem, 0, SR_NZVC),
        };
        return Some(OpcodeDef {
            emit,
            sr_needs,
            sr_sets,
            base_words: 1,
            has_ea: true,
        });
    }

    // Bit-field group. Readers accept PC-relative sources; writers stop
    // at absolute long.
    let (emit, writes): (EmitFn, bool) = match (idx >> 8) & 7 {
        0 => (bitfield::bftst, false),
        1 => (bitfield::bfextu, false),
        2 => (bitfield::bfchg, true),
        3 => (bitfield::bfexts, false),
        4 => (bitfield::bfclr, true),
        5 => (bitfield::bfffo, false),
        6 => (bitfield::bfset, true),
        _ => (bitfield::bfins, true),
    };
    if !bitfield_ea_legal(ea, writes) {
        return None;
    }
    Some(OpcodeDef {
        emit,
        sr_needs: 0,
        sr_sets: SR_NZVC,
        base_words: 2,
        has_ea: ea >> 3 != 0,
    })
}

/// Memory shifts take alterable memory operands: (An) through abs.L.
fn memshift_ea_legal(ea: u8) -> bool {
    match ea >> 3 {
        2..=6 => true,
        7 => ea & 7 <= 1,
        _ => false,
    }
}

/// Bit-field operands: Dn or control addressing; no (An)+/-(An), no
/// immediate. PC-relative only for the non-mutating forms.
fn bitfield_ea_legal(ea: u8, writes: bool) -> bool {
    match ea >> 3 {
        0 => true,
        2 | 5 | 6 => true,
        7 => {
            let reg = ea & 7;
            reg <= 1 || (!writes && reg <= 3)
        }
        _ => false,
    }
}
