//! Guest-to-host register binding for one translation unit.
//!
//! Guest registers are loaded from the [`CpuContext`](crate::cpu::CpuContext)
//! on first use and stay bound to a host register until the block-end
//! flush. Writes mark the binding dirty; only dirty bindings are written
//! back. Temporaries come from the same pool and must be freed by the
//! emitter that allocated them, on every exit path.
//!
//! Host convention: `x27` holds the context pointer; `w0`–`w12` form the
//! allocatable pool. All guest values are 32 bits wide, but a binding may
//! be used as the low half of an `x` register by the 64-bit widening
//! tricks in the shift and bit-field emitters (writes through the `w`
//! form keep the upper half zero).

use crate::cpu::{CTX_A_BASE, CTX_D_BASE, CTX_PC, CTX_SR};
use crate::emit::{Emitter, Reg};

/// A guest register that can be bound to a host register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestReg {
    /// Data register D0–D7.
    D(u8),
    /// Address register A0–A7.
    A(u8),
    /// Program counter.
    Pc,
    /// Status register (the cached CCR lives in its low bits).
    Sr,
}

impl GuestReg {
    fn slot(self) -> usize {
        match self {
            GuestReg::D(n) => {
                debug_assert!(n < 8);
                n as usize
            }
            GuestReg::A(n) => {
                debug_assert!(n < 8);
                8 + n as usize
            }
            GuestReg::Pc => 16,
            GuestReg::Sr => 17,
        }
    }

    fn ctx_offset(self) -> u16 {
        match self {
            GuestReg::D(n) => CTX_D_BASE + 4 * n as u16,
            GuestReg::A(n) => CTX_A_BASE + 4 * n as u16,
            GuestReg::Pc => CTX_PC,
            GuestReg::Sr => CTX_SR,
        }
    }
}

const SLOTS: usize = 18;

/// Number of allocatable host registers (w0..w12).
const POOL: u8 = 13;

pub struct RegAlloc {
    /// slot → bound host register.
    bound: [Option<u8>; SLOTS],
    /// host register → owning slot; `None` for temporaries.
    owner: [Option<usize>; POOL as usize],
    /// Free host registers, one bit each.
    free_mask: u16,
    /// Dirty slots, one bit each.
    dirty: u32,
}

impl Default for RegAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl RegAlloc {
    pub fn new() -> Self {
        RegAlloc {
            bound: [None; SLOTS],
            owner: [None; POOL as usize],
            free_mask: (1 << POOL) - 1,
            dirty: 0,
        }
    }

    fn take_host(&mut self) -> u8 {
        let h = self.free_mask.trailing_zeros() as u8;
        assert!(h < POOL, "host register pool exhausted");
        self.free_mask &= !(1 << h);
        h
    }

    /// Bind a guest register for reading, loading it from the context on
    /// first use.
    pub fn map_read(&mut self, e: &mut Emitter, r: GuestReg) -> Reg {
        let slot = r.slot();
        if let Some(h) = self.bound[slot] {
            return Reg(h);
        }
        let h = self.take_host();
        e.ldr_w_uoff(Reg(h), Reg::CTX, r.ctx_offset());
        self.bound[slot] = Some(h);
        self.owner[h as usize] = Some(slot);
        Reg(h)
    }

    /// Bind a guest register for a full overwrite. No load is emitted; the
    /// previous cached value (if any) is invalidated by reuse and the
    /// binding is marked dirty.
    pub fn map_write(&mut self, r: GuestReg) -> Reg {
        let slot = r.slot();
        let h = match self.bound[slot] {
            Some(h) => h,
            None => {
                let h = self.take_host();
                self.bound[slot] = Some(h);
                self.owner[h as usize] = Some(slot);
                h
            }
        };
        self.dirty |= 1 << slot;
        Reg(h)
    }

    /// Copy a guest register into a caller-owned temporary.
    pub fn copy_to_temp(&mut self, e: &mut Emitter, r: GuestReg) -> Reg {
        let src = self.map_read(e, r);
        let tmp = self.alloc_temp();
        e.mov_w(tmp, src);
        tmp
    }

    /// Allocate a scratch host register. The caller must `free` it.
    pub fn alloc_temp(&mut self) -> Reg {
        let h = self.take_host();
        Reg(h)
    }

    /// Release a register obtained from this allocator. Freeing a guest
    /// binding is a no-op (bindings live until `flush`), so emitters can
    /// uniformly free whatever `load_ea` handed them.
    pub fn free(&mut self, r: Reg) {
        let h = r.0;
        if h >= POOL || self.owner[h as usize].is_some() {
            return;
        }
        self.free_mask |= 1 << h;
    }

    /// Mark a guest register as modified so `flush` writes it back.
    pub fn set_dirty(&mut self, r: GuestReg) {
        debug_assert!(self.bound[r.slot()].is_some(), "dirtying an unbound register");
        self.dirty |= 1 << r.slot();
    }

    /// Host register caching the guest SR, bound and marked dirty.
    ///
    /// Must be called before emitting any flag write whose effect later
    /// guest instructions observe.
    pub fn modify_cc(&mut self, e: &mut Emitter) -> Reg {
        let cc = self.map_read(e, GuestReg::Sr);
        self.dirty |= 1 << GuestReg::Sr.slot();
        cc
    }

    /// Write every dirty binding back to the context and drop all
    /// bindings. Called at block boundaries and before raising a guest
    /// exception.
    pub fn flush(&mut self, e: &mut Emitter) {
        for slot in 0..SLOTS {
            if let Some(h) = self.bound[slot] {
                if self.dirty & (1 << slot) != 0 {
                    let r = slot_reg(slot);
                    e.str_w_uoff(Reg(h), Reg::CTX, r.ctx_offset());
                }
                self.bound[slot] = None;
                self.owner[h as usize] = None;
                self.free_mask |= 1 << h;
            }
        }
        self.dirty = 0;
    }

    /// Number of live temporaries (allocated, unbound, not yet freed).
    /// Zero between instructions when every emitter balances its
    /// allocations.
    pub fn live_temps(&self) -> usize {
        let mut n = 0;
        for h in 0..POOL {
            if self.free_mask & (1 << h) == 0 && self.owner[h as usize].is_none() {
                n += 1;
            }
        }
        n
    }
}

fn slot_reg(slot: usize) -> GuestReg {
    match slot {
        0..=7 => GuestReg::D(slot as u8),
        8..=15 => GuestReg::A(slot as u8 - 8),
        16 => GuestReg::Pc,
        17 => GuestReg::Sr,
        _ => unreachable!(),
    }
}
