//! Memory-form shifts and rotates: word sized, single position, with the
//! auto-modifying addressing modes folded into the access.

mod harness;

use harness::{run_stream, GuestState};

fn ccr(n: bool, z: bool, v: bool, c: bool, x: bool) -> u32 {
    (x as u32) << 4 | (n as u32) << 3 | (z as u32) << 2 | (v as u32) << 1 | c as u32
}

/// Memory shift opcode: `kind` 0 ASx, 1 LSx, 2 ROXx, 3 ROx.
fn mem_opcode(kind: u16, left: bool, ea: u16) -> u16 {
    0xE0C0 | kind << 9 | (left as u16) << 8 | ea
}

/// Expected (result, CCR) of a single-position word shift, full mask.
fn mem_ref(kind: u16, left: bool, m: u16, x_in: bool) -> (u16, u32) {
    let (res, c, x_out) = match (kind, left) {
        (0, true) | (1, true) => ((m << 1), m >> 15 & 1 == 1, m >> 15 & 1 == 1),
        (0, false) => (((m as i16) >> 1) as u16, m & 1 == 1, m & 1 == 1),
        (1, false) => (m >> 1, m & 1 == 1, m & 1 == 1),
        (2, true) => ((m << 1) | x_in as u16, m >> 15 & 1 == 1, m >> 15 & 1 == 1),
        (2, false) => ((m >> 1) | (x_in as u16) << 15, m & 1 == 1, m & 1 == 1),
        (3, true) => (m.rotate_left(1), m >> 15 & 1 == 1, x_in),
        (3, false) => (m.rotate_right(1), m & 1 == 1, x_in),
        _ => unreachable!(),
    };
    let nf = res >> 15 & 1 == 1;
    let zf = res == 0;
    // ROL/ROR leave X alone; the others copy C into it.
    (res, ccr(nf, zf, false, c, x_out))
}

#[test]
fn all_memory_shifts_on_indirect() {
    let values = [0u16, 1, 0x8000, 0x8001, 0x7FFF, 0xFFFF, 0x1234];
    for kind in 0..4u16 {
        for left in [false, true] {
            for &m in &values {
                for x_in in [false, true] {
                    let op = mem_opcode(kind, left, 0o20); // (A0)
                    let init = GuestState {
                        a: [0x4000, 0, 0, 0, 0, 0, 0, 0],
                        sr: if x_in { 0x10 } else { 0 },
                        pc: 0x1000,
                        ..Default::default()
                    };
                    let mem = [(0x4000u64, (m as u64) << 48)];
                    let r = run_stream(&[op], 0x1000, &init, &mem);
                    let got = r.machine.read_u16(0x4000);
                    let (want, want_sr) = mem_ref(kind, left, m, x_in);
                    assert_eq!(
                        (got, r.state.sr),
                        (want, want_sr),
                        "kind={kind} left={left} m={m:#x} x={x_in}\n{}",
                        m68k_jit::disasm::dump(&r.code)
                    );
                    assert_eq!(r.state.a[0], 0x4000, "plain indirect must not move A0");
                    assert_eq!(r.state.pc, 0x1002);
                }
            }
        }
    }
}

#[test]
fn postincrement_advances_after_access() {
    // LSL.W (A1)+ — shifts the word at A1, then A1 += 2.
    let op = mem_opcode(1, true, 0o31);
    let init = GuestState {
        a: [0, 0x4000, 0, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op], 0x1000, &init, &[(0x4000, 0x4001u64 << 48)]);
    assert_eq!(r.machine.read_u16(0x4000), 0x8002);
    assert_eq!(r.state.a[1], 0x4002);
    assert_eq!(r.state.sr, ccr(true, false, false, false, false));
}

#[test]
fn predecrement_steps_back_before_access() {
    // ASR.W -(A2) — A2 -= 2 first, then the word there is shifted.
    let op = mem_opcode(0, false, 0o42);
    let init = GuestState {
        a: [0, 0, 0x4002, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op], 0x1000, &init, &[(0x4000, 0x8000u64 << 48)]);
    assert_eq!(r.machine.read_u16(0x4000), 0xC000);
    assert_eq!(r.state.a[2], 0x4000);
    assert_eq!(r.state.sr, ccr(true, false, false, false, false));
}

#[test]
fn displacement_mode_consumes_extension_word() {
    // ROXL.W 4(A3) with X=1.
    let op = mem_opcode(2, true, 0o53);
    let init = GuestState {
        a: [0, 0, 0, 0x4000, 0, 0, 0, 0],
        sr: 0x10,
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, 0x0004], 0x1000, &init, &[(0x4000, 0x00000001_00000000u64)]);
    // Word at 0x4004 = 0x0000 → result = X = 1.
    assert_eq!(r.machine.read_u16(0x4004), 0x0001);
    assert_eq!(r.state.pc, 0x1004);
    assert_eq!(r.state.sr, ccr(false, false, false, false, false));
}

#[test]
fn absolute_short_mode() {
    // ROR.W (0x5000).W
    let op = mem_opcode(3, false, 0o70);
    let init = GuestState {
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, 0x5000], 0x1000, &init, &[(0x5000, 0x0001u64 << 48)]);
    assert_eq!(r.machine.read_u16(0x5000), 0x8000);
    assert_eq!(r.state.sr, ccr(true, false, false, true, false));
    assert_eq!(r.state.pc, 0x1004);
}

#[test]
fn negative_displacement() {
    // LSR.W -2(A4)
    let op = mem_opcode(1, false, 0o54);
    let init = GuestState {
        a: [0, 0, 0, 0, 0x4002, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, 0xFFFE], 0x1000, &init, &[(0x4000, 0x0002u64 << 48)]);
    assert_eq!(r.machine.read_u16(0x4000), 0x0001);
    assert_eq!(r.state.sr, 0);
}

#[test]
fn wide_displacement() {
    // LSL.W 0x7FFE(A1) — the displacement exceeds the add-immediate range.
    let op = mem_opcode(1, true, 0o51);
    let init = GuestState {
        a: [0, 0x1000, 0, 0, 0, 0, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, 0x7FFE], 0x1000, &init, &[(0x8FFE, 0x2001u64 << 48)]);
    assert_eq!(r.machine.read_u16(0x8FFE), 0x4002);
    assert_eq!(r.state.sr, 0);
}

#[test]
fn index_mode_with_scaled_register() {
    // ROL.W (2,A5,D1.W*2) with D1 = 3 → address 0x4000 + 6 + 2 = 0x4008.
    let op = mem_opcode(3, true, 0o65);
    let ext = 0x1202; // D1.W, scale *2, d8 = 2
    let init = GuestState {
        d: [0, 3, 0, 0, 0, 0, 0, 0],
        a: [0, 0, 0, 0, 0, 0x4000, 0, 0],
        pc: 0x1000,
        ..Default::default()
    };
    let r = run_stream(&[op, ext], 0x1000, &init, &[(0x4008, 0x8000u64 << 48)]);
    assert_eq!(r.machine.read_u16(0x4008), 0x0001);
    assert_eq!(r.state.sr, ccr(false, false, false, true, false));
}
