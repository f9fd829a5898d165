//! Bit-field operations over registers and memory, checked against a
//! direct bit-level model: register fields wrap around bit 0 of Dn (bit
//! offset 0 is the MSB), memory fields are byte-addressed big-endian.

mod harness;

use harness::{bitfield_opcode, run_stream, BfArg, GuestState};

fn ccr(n: bool, z: bool) -> u32 {
    (n as u32) << 3 | (z as u32) << 2
}

fn wmask(w: u32) -> u32 {
    if w == 32 {
        u32::MAX
    } else {
        (1 << w) - 1
    }
}

/// Field value of a register source: `w` bits starting `off` bits below
/// the MSB, wrapping.
fn reg_field(v: u32, off: u32, w: u32) -> u32 {
    let off = off % 32;
    let v64 = ((v as u64) << 32) | v as u64;
    ((v64 << off) >> (64 - w)) as u32
}

/// Write a field back into a register, wrapping.
fn reg_insert(dst: u32, off: u32, w: u32, val: u32) -> u32 {
    let mut res = dst;
    for i in 0..w {
        let pos = 31 - ((off + i) % 32);
        let bit = val >> (w - 1 - i) & 1;
        res = res & !(1 << pos) | bit << pos;
    }
    res
}

fn field_flags(field: u32, w: u32) -> u32 {
    ccr(field >> (w - 1) & 1 == 1, field == 0)
}

#[test]
fn bfextu_register_scenario() {
    // BFEXTU D4{8:8}, D5 with D4 = 0xAA55F00F → D5 = 0x55.
    let [op, ext] = bitfield_opcode(1, 4, 5, BfArg::Imm(8), BfArg::Imm(8));
    let init = GuestState {
        d: [0, 0, 0, 0, 0xAA55_F00F, 0xFFFF_FFFF, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &[]);
    assert_eq!(r.state.d[5], 0x55);
    assert_eq!(r.state.sr, ccr(false, false));
    assert_eq!(r.state.pc, 0x1004);
}

#[test]
fn bfins_register_scenario() {
    // BFINS D6, D7{4:12} with D7 = 0xFFFFFFFF, D6 = 0x123 → 0xF123FFFF.
    let [op, ext] = bitfield_opcode(7, 7, 6, BfArg::Imm(4), BfArg::Imm(12));
    let init = GuestState {
        d: [0, 0, 0, 0, 0, 0, 0x123, 0xFFFF_FFFF],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &[]);
    assert_eq!(r.state.d[7], 0xF123_FFFF);
    assert_eq!(r.state.sr, ccr(false, false));
}

#[test]
fn register_extract_all_forms() {
    let values = [0u32, 1, 0x8000_0000, 0xAA55_F00F, 0xFFFF_FFFF, 0x0123_4567];
    for &v in &values {
        for &(off, w) in &[(0u32, 1u32), (0, 8), (0, 32), (1, 31), (7, 3), (8, 8), (28, 8), (31, 32), (16, 32)] {
            // Immediate and register-sourced parameter combinations must
            // agree with each other and with the model.
            let field = reg_field(v, off, w);
            let want_u = field;
            let want_s = if field >> (w - 1) & 1 == 1 {
                field | !wmask(w)
            } else {
                field
            };
            let want_sr = field_flags(field, w);
            let w_enc = if w == 32 { 0 } else { w as u8 };

            let combos: [(BfArg, BfArg, [u32; 8]); 4] = [
                (BfArg::Imm(off as u8), BfArg::Imm(w_enc), [v, 0, 0, 0, 0, 0, 0, 0]),
                (BfArg::Reg(2), BfArg::Imm(w_enc), [v, 0, off, 0, 0, 0, 0, 0]),
                (BfArg::Imm(off as u8), BfArg::Reg(3), [v, 0, 0, w & 31, 0, 0, 0, 0]),
                (BfArg::Reg(2), BfArg::Reg(3), [v, 0, off, w & 31, 0, 0, 0, 0]),
            ];
            for (o_arg, w_arg, d) in combos {
                let [op, ext] = bitfield_opcode(1, 0, 1, o_arg, w_arg);
                let init = GuestState { d, pc: 0x1000, ..Default::default() };
                let r = run_stream(&[op, ext], 0x1000, &init, &[]);
                assert_eq!(
                    (r.state.d[1], r.state.sr),
                    (want_u, want_sr),
                    "BFEXTU v={v:#x} off={off} w={w} {o_arg:?}/{w_arg:?}\n{}",
                    m68k_jit::disasm::dump(&r.code)
                );

                let [op, ext] = bitfield_opcode(3, 0, 1, o_arg, w_arg);
                let init = GuestState { d, pc: 0x1000, ..Default::default() };
                let r = run_stream(&[op, ext], 0x1000, &init, &[]);
                assert_eq!(
                    (r.state.d[1], r.state.sr),
                    (want_s, want_sr),
                    "BFEXTS v={v:#x} off={off} w={w} {o_arg:?}/{w_arg:?}"
                );
            }
        }
    }
}

#[test]
fn bftst_register_leaves_operand_alone() {
    let [op, ext] = bitfield_opcode(0, 2, 0, BfArg::Imm(4), BfArg::Imm(8));
    let init = GuestState {
        d: [0, 0, 0x0F00_0000, 0, 0, 0, 0, 0],
        sr: 0x11, // stale X and C
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &[]);
    assert_eq!(r.state.d[2], 0x0F00_0000);
    // Field {4:8} of 0x0F000000 = 0xF0: N set, C cleared, X kept.
    assert_eq!(r.state.sr, 0x10 | ccr(true, false));
}

#[test]
fn register_modify_forms() {
    let values = [0u32, 0xFFFF_FFFF, 0xAA55_F00F, 0x8000_0001];
    for &v in &values {
        for &(off, w) in &[(0u32, 8u32), (4, 12), (12, 20), (24, 16), (0, 32), (31, 2)] {
            let field = reg_field(v, off, w);
            let want_sr = field_flags(field, w);
            let w_enc = if w == 32 { 0 } else { w as u8 };
            for (opnum, want_field) in [
                (2u16, !field & wmask(w)), // BFCHG
                (4, 0),                    // BFCLR
                (6, wmask(w)),             // BFSET
            ] {
                let [op, ext] = bitfield_opcode(opnum, 5, 0, BfArg::Imm(off as u8), BfArg::Imm(w_enc));
                let init = GuestState {
                    d: [0, 0, 0, 0, 0, v, 0, 0],
                    pc: 0x1000,
                    ..Default::default()
                };
                let r = run_stream(&[op, ext], 0x1000, &init, &[]);
                let want = reg_insert(v, off, w, want_field);
                assert_eq!(
                    (r.state.d[5], r.state.sr),
                    (want, want_sr),
                    "op={opnum} v={v:#x} off={off} w={w}\n{}",
                    m68k_jit::disasm::dump(&r.code)
                );
            }
        }
    }
}

#[test]
fn register_modify_with_runtime_parameters() {
    let v = 0x1234_5678u32;
    for &(off, w) in &[(4u32, 12u32), (30, 4), (0, 32), (17, 15)] {
        let field = reg_field(v, off, w);
        let [op, ext] = bitfield_opcode(2, 4, 0, BfArg::Reg(1), BfArg::Reg(2));
        let init = GuestState {
            d: [0, off, w & 31, 0, v, 0, 0, 0],
            pc: 0x1000,
            ..Default::default()
        };
        let r = run_stream(&[op, ext], 0x1000, &init, &[]);
        let want = reg_insert(v, off, w, !field & wmask(w));
        assert_eq!(
            (r.state.d[4], r.state.sr),
            (want, field_flags(field, w)),
            "off={off} w={w}\n{}",
            m68k_jit::disasm::dump(&r.code)
        );
    }
}

#[test]
fn bfins_register_all_forms() {
    let dsts = [0u32, 0xFFFF_FFFF, 0xA5A5_A5A5];
    let srcs = [0u32, 0x123, 0xFFFF_FFFF, 0x8000_0001];
    for &dst in &dsts {
        for &src in &srcs {
            for &(off, w) in &[(0u32, 8u32), (4, 12), (20, 16), (0, 32), (28, 8)] {
                let ins = src & wmask(w);
                let want = reg_insert(dst, off, w, ins);
                let want_sr = field_flags(ins, w);
                let w_enc = if w == 32 { 0 } else { w as u8 };
                let [op, ext] = bitfield_opcode(7, 0, 2, BfArg::Imm(off as u8), BfArg::Imm(w_enc));
                let init = GuestState {
                    d: [dst, 0, src, 0, 0, 0, 0, 0],
                    pc: 0x1000,
                    ..Default::default()
                };
                let r = run_stream(&[op, ext], 0x1000, &init, &[]);
                assert_eq!(
                    (r.state.d[0], r.state.sr),
                    (want, want_sr),
                    "dst={dst:#x} src={src:#x} off={off} w={w}\n{}",
                    m68k_jit::disasm::dump(&r.code)
                );
            }
        }
    }
}

#[test]
fn bfffo_register() {
    for &(v, off, w, want) in &[
        (0x8000_0000u32, 0u32, 32u32, 0u32),  // bit found immediately
        (0x0000_0001, 0, 32, 31),             // last bit of the field
        (0, 0, 32, 32),                       // empty field: offset + width
        (0x00F0_0000, 4, 12, 8),              // four leading zeros inside the field
        (0x0000_8000, 8, 16, 16),
    ] {
        let [op, ext] = bitfield_opcode(5, 3, 6, BfArg::Imm(off as u8), BfArg::Imm(if w == 32 { 0 } else { w as u8 }));
        let init = GuestState {
            d: [0, 0, 0, v, 0, 0, 0xDEAD, 0],
            pc: 0x1000,
            ..Default::default()
        };
        let r = run_stream(&[op, ext], 0x1000, &init, &[]);
        let field = reg_field(v, off, w);
        assert_eq!(r.state.d[6], want, "v={v:#x} off={off} w={w}");
        assert_eq!(r.state.sr, field_flags(field, w));
    }
}

#[test]
fn bfffo_register_offset_adds_full_value() {
    // Field parameters from registers: offset 40 wraps to bit 8 for the
    // lookup but the full 40 still lands in the result.
    let [op, ext] = bitfield_opcode(5, 3, 6, BfArg::Reg(1), BfArg::Imm(8));
    let init = GuestState {
        d: [0, 40, 0, 0x0080_0000, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &[]);
    // offset 40 % 32 = 8 → field = 0x80 → first set bit at index 0.
    assert_eq!(r.state.d[6], 40);
    assert_eq!(r.state.sr, ccr(true, false));
}

// ---- Memory forms ----

const BUF: u64 = 0x4000;

fn mem_init(bytes: [u8; 16]) -> [(u64, u64); 2] {
    [
        (BUF, u64::from_be_bytes(bytes[0..8].try_into().unwrap())),
        (BUF + 8, u64::from_be_bytes(bytes[8..16].try_into().unwrap())),
    ]
}

/// Field of a byte-addressed big-endian buffer: `w` bits starting `bit`
/// bits past byte `byte`, collected MSB-first.
fn mem_field(bytes: &[u8; 16], byte: i64, bit: u32, w: u32) -> u32 {
    let mut val = 0u32;
    for i in 0..w {
        let abs = byte * 8 + bit as i64 + i as i64;
        let by = bytes[(abs.div_euclid(8)) as usize];
        let b = by >> (7 - abs.rem_euclid(8)) & 1;
        val = val << 1 | b as u32;
    }
    val
}

#[test]
fn bftst_memory_straddles_long_boundary() {
    let mut bytes = [0u8; 16];
    bytes[3] = 0x01; // bit 31 of the first long
    bytes[4] = 0x80; // bit 0 of the second long
    // Field {30:4} covers bits 30..33: 0b0110.
    let [op, ext] = bitfield_opcode(0, 0o20, 0, BfArg::Imm(30), BfArg::Imm(4));
    let init = GuestState {
        a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
    assert_eq!(mem_field(&bytes, 0, 30, 4), 0b0110);
    assert_eq!(r.state.sr, ccr(false, false));
}

#[test]
fn bfextu_memory_all_parameter_forms() {
    let bytes: [u8; 16] = [
        0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0, 0x0F, 0xED, 0xCB, 0xA9, 0x87, 0x65, 0x43, 0x21,
    ];
    for &(off, w) in &[(0i64, 8u32), (4, 16), (12, 32), (31, 32), (7, 1), (0, 32)] {
        let want = mem_field(&bytes, 0, off as u32, w);
        let w_enc = if w == 32 { 0 } else { w as u8 };
        // Immediate offset.
        let [op, ext] = bitfield_opcode(1, 0o20, 5, BfArg::Imm(off as u8), BfArg::Imm(w_enc));
        let init = GuestState {
            a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
            pc: 0x1000,
            ..Default::default()
        };
        let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
        assert_eq!(
            (r.state.d[5], r.state.sr),
            (want, field_flags(want, w)),
            "imm off={off} w={w}\n{}",
            m68k_jit::disasm::dump(&r.code)
        );

        // Register offset (same position, runtime path).
        let [op, ext] = bitfield_opcode(1, 0o20, 5, BfArg::Reg(2), BfArg::Imm(w_enc));
        let init = GuestState {
            d: [0, 0, off as u32, 0, 0, 0, 0, 0],
            a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
            pc: 0x1000,
            ..Default::default()
        };
        let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
        assert_eq!(
            (r.state.d[5], r.state.sr),
            (want, field_flags(want, w)),
            "reg off={off} w={w}\n{}",
            m68k_jit::disasm::dump(&r.code)
        );
    }
}

#[test]
fn bfextu_memory_negative_register_offset() {
    let bytes: [u8; 16] = [
        0, 0, 0, 0, 0, 0, 0, 0xA5, 0x5A, 0, 0, 0, 0, 0, 0, 0,
    ];
    // Base at BUF+8, offset -8 reaches back into the previous byte.
    let [op, ext] = bitfield_opcode(1, 0o20, 4, BfArg::Reg(1), BfArg::Imm(16));
    let init = GuestState {
        d: [0, -8i32 as u32, 0, 0, 0, 0, 0, 0],
        a: [(BUF + 8) as u32, 0, 0, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
    assert_eq!(r.state.d[4], 0xA55A);
    assert_eq!(r.state.sr, ccr(true, false));
}

#[test]
fn memory_modify_and_insert() {
    let bytes: [u8; 16] = [
        0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0, 0, 0, 0, 0, 0, 0, 0,
    ];
    for &(off, w) in &[(4i64, 8u32), (0, 32), (28, 8), (30, 20)] {
        let old = mem_field(&bytes, 0, off as u32, w);
        let w_enc = if w == 32 { 0 } else { w as u8 };
        for (opnum, want_field) in [(2u16, !old & wmask(w)), (4, 0), (6, wmask(w))] {
            let [op, ext] = bitfield_opcode(opnum, 0o20, 0, BfArg::Imm(off as u8), BfArg::Imm(w_enc));
            let init = GuestState {
                a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
                pc: 0x1000,
                ..Default::default()
            };
            let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
            // Check the field reads back as expected and flags show the
            // pre-modification value.
            let lo = r.machine.read_u64(BUF);
            let hi = r.machine.read_u64(BUF + 8);
            let mut now = [0u8; 16];
            now[0..8].copy_from_slice(&lo.to_be_bytes());
            now[8..16].copy_from_slice(&hi.to_be_bytes());
            assert_eq!(
                mem_field(&now, 0, off as u32, w),
                want_field,
                "op={opnum} off={off} w={w}\n{}",
                m68k_jit::disasm::dump(&r.code)
            );
            assert_eq!(r.state.sr, field_flags(old, w));
        }

        // BFINS of a pattern.
        let ins = 0x5A5A_5A5A & wmask(w);
        let [op, ext] = bitfield_opcode(7, 0o20, 3, BfArg::Imm(off as u8), BfArg::Imm(w_enc));
        let init = GuestState {
            d: [0, 0, 0, 0x5A5A_5A5A, 0, 0, 0, 0],
            a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
            pc: 0x1000,
            ..Default::default()
        };
        let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
        let lo = r.machine.read_u64(BUF);
        let hi = r.machine.read_u64(BUF + 8);
        let mut now = [0u8; 16];
        now[0..8].copy_from_slice(&lo.to_be_bytes());
        now[8..16].copy_from_slice(&hi.to_be_bytes());
        assert_eq!(mem_field(&now, 0, off as u32, w), ins);
        assert_eq!(r.state.sr, field_flags(ins, w));
    }
}

#[test]
fn bfffo_memory() {
    let bytes: [u8; 16] = [0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    // First set bit is bit 11. Field {4:16} → clz within field = 7.
    let [op, ext] = bitfield_opcode(5, 0o20, 2, BfArg::Imm(4), BfArg::Imm(16));
    let init = GuestState {
        a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
    assert_eq!(r.state.d[2], 11);
    assert_eq!(r.state.sr, ccr(false, false));

    // Register offset: field {12:8} is all-clear, so the result is the
    // full offset plus the width and Z is set.
    let [op, ext] = bitfield_opcode(5, 0o20, 2, BfArg::Reg(1), BfArg::Imm(8));
    let init = GuestState {
        d: [0, 12, 0, 0, 0, 0, 0, 0],
        a: [BUF as u32, 0, 0, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &mem_init(bytes));
    assert_eq!(r.state.d[2], 20);
    assert_eq!(r.state.sr, ccr(false, true));
}

// ---- Round trips ----

#[test]
fn bfins_then_bfextu_round_trips() {
    for &(off, w) in &[(3u8, 7u8), (0, 32 & 31), (20, 12), (28, 8)] {
        let w_real = if w == 0 { 32 } else { w as u32 };
        let [ins_op, ins_ext] = bitfield_opcode(7, 1, 0, BfArg::Imm(off), BfArg::Imm(w));
        let [ext_op, ext_ext] = bitfield_opcode(1, 1, 2, BfArg::Imm(off), BfArg::Imm(w));
        let src = 0x0000_05A5u32;
        let init = GuestState {
            d: [src, 0xFFFF_FFFF, 0, 0, 0, 0, 0, 0],
            pc: 0x1000,
            ..Default::default()
        };
        let r = run_stream(&[ins_op, ins_ext, ext_op, ext_ext], 0x1000, &init, &[]);
        assert_eq!(r.state.d[2], src & wmask(w_real), "off={off} w={w_real}");
    }
}

#[test]
fn bfset_then_bfclr_clears_field() {
    let [set_op, set_ext] = bitfield_opcode(6, 3, 0, BfArg::Imm(6), BfArg::Imm(10));
    let [clr_op, clr_ext] = bitfield_opcode(4, 3, 0, BfArg::Imm(6), BfArg::Imm(10));
    let init = GuestState {
        d: [0, 0, 0, 0x1234_5678, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[set_op, set_ext, clr_op, clr_ext], 0x1000, &init, &[]);
    assert_eq!(r.state.d[3], reg_insert(0x1234_5678, 6, 10, 0));
}

#[test]
fn double_bfchg_is_identity() {
    let [op, ext] = bitfield_opcode(2, 2, 0, BfArg::Imm(9), BfArg::Imm(15));
    let init = GuestState {
        d: [0, 0, 0xCAFE_BABE, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext, op, ext], 0x1000, &init, &[]);
    assert_eq!(r.state.d[2], 0xCAFE_BABE);
}
