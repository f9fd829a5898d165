//! Just-in-time translation of Motorola 68000 machine code to AArch64.
//!
//! The crate covers the "line E" opcode family — shifts, rotates
//! (including the X-bit extended variants) and the bit-field group — and
//! translates one guest instruction at a time into native instruction
//! words. The embedder drives translation block by block: it owns the
//! [`stream::GuestStream`] over guest code, a [`regalloc::RegAlloc`] for
//! the lifetime of the block, and the [`emit::Emitter`] the host words
//! accumulate in. Finished blocks go into an executable
//! [`code_buffer::CodeBuffer`].
//!
//! Translated code addresses the guest CPU through a context register
//! (see [`cpu::CpuContext`]) and runs with big-endian data accesses, so
//! guest memory operands need no byte reversal.
//!
//! ```
//! use m68k_jit::emit::Emitter;
//! use m68k_jit::line_e::emit_line_e;
//! use m68k_jit::regalloc::RegAlloc;
//! use m68k_jit::stream::GuestStream;
//!
//! // ASL.B #1, D0
//! let words = [0xE300];
//! let mut stream = GuestStream::new(&words, 0x1000);
//! let mut e = Emitter::new();
//! let mut ra = RegAlloc::new();
//! let consumed = emit_line_e(&mut e, &mut ra, &mut stream);
//! ra.flush(&mut e);
//! e.ret();
//! assert_eq!(consumed, 1);
//! assert!(e.offset() > 2);
//! ```

pub mod bitfield;
pub mod ccr;
pub mod code_buffer;
pub mod cpu;
pub mod disasm;
pub mod dispatch;
pub mod ea;
pub mod emit;
pub mod line_e;
pub mod regalloc;
pub mod shifts;
pub mod stream;

pub use code_buffer::CodeBuffer;
pub use cpu::CpuContext;
pub use dispatch::{line_e_length, sr_info};
pub use line_e::emit_line_e;
