use std::ptr;

/// Default reservation: 64MB of virtual address space for translated code.
const DEFAULT_RESERVE: usize = 64 * 1024 * 1024;

/// Initial committed region: 64KB.
const INITIAL_COMMIT: usize = 64 * 1024;

/// Executable memory for finalised translation units.
///
/// Uses a reservation model: a large virtual range is mapped PROT_NONE up
/// front (no physical pages), then committed on demand as translated
/// blocks are appended. A guard page at the end of the reservation
/// catches overruns.
///
/// Lifecycle:
/// 1. `new(size)` — reserve the range, commit the initial pages
/// 2. `append(words)` — copy a finished block out of the emitter
/// 3. `finalize()` — flip to execute-only, invalidate the icache
/// 4. `entry_at(offset)` — pointer for the execution engine
/// 5. `reopen()` — back to read+write for the next block
pub struct CodeBuffer {
    base: *mut u8,
    /// Total mmap'd size (reserved + guard page).
    reserved: usize,
    /// Bytes currently committed (RW). Always page-aligned.
    committed: usize,
    /// Bytes written so far.
    len: usize,
    finalized: bool,
}

// CodeBuffer holds a raw mmap'd pointer — safe to send across threads
// since we never alias it.
unsafe impl Send for CodeBuffer {}
unsafe impl Sync for CodeBuffer {}

impl CodeBuffer {
    /// Allocate a buffer with at least `min_size` bytes initially committed.
    pub fn new(min_size: usize) -> Result<Self, anyhow::Error> {
        let page_size = page_size();
        let initial_commit = align_up(min_size.max(INITIAL_COMMIT), page_size);
        let reserve = align_up(DEFAULT_RESERVE.max(initial_commit), page_size);
        let total = reserve + page_size; // + guard page

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        anyhow::ensure!(base != libc::MAP_FAILED, "code buffer mmap failed");

        let ret = unsafe {
            libc::mprotect(base, initial_commit, libc::PROT_READ | libc::PROT_WRITE)
        };
        if ret != 0 {
            unsafe { libc::munmap(base, total) };
            anyhow::bail!("code buffer mprotect (RW) failed");
        }

        Ok(CodeBuffer {
            base: base as *mut u8,
            reserved: total,
            committed: initial_commit,
            len: 0,
            finalized: false,
        })
    }

    /// Append a finished block of instruction words. Returns the byte
    /// offset the block starts at.
    pub fn append(&mut self, words: &[u32]) -> usize {
        debug_assert!(!self.finalized, "cannot append after finalize");
        let start = self.len;
        self.ensure_capacity(words.len() * 4);
        unsafe {
            let dst = self.base.add(self.len) as *mut u32;
            ptr::copy_nonoverlapping(words.as_ptr(), dst, words.len());
        }
        self.len += words.len() * 4;
        start
    }

    /// Read back an instruction word at byte offset `offset`.
    ///
    /// Only valid before `finalize()` — finalized pages are execute-only.
    pub fn read_u32(&self, offset: usize) -> u32 {
        debug_assert!(!self.finalized, "cannot read after finalize (execute-only)");
        debug_assert!(offset + 4 <= self.len, "read offset out of bounds");
        unsafe {
            let src = self.base.add(offset) as *const u32;
            ptr::read(src)
        }
    }

    /// Flip the buffer to execute-only and invalidate the instruction
    /// cache for the written range.
    pub fn finalize(&mut self) -> Result<(), anyhow::Error> {
        debug_assert!(!self.finalized, "already finalized");

        let ret = unsafe {
            libc::mprotect(self.base as *mut libc::c_void, self.committed, libc::PROT_EXEC)
        };
        anyhow::ensure!(ret == 0, "code buffer mprotect (X) failed");

        unsafe {
            invalidate_icache(self.base, self.len);
        }

        self.finalized = true;
        Ok(())
    }

    /// Flip a finalized buffer back to read+write for appending.
    pub fn reopen(&mut self) -> Result<(), anyhow::Error> {
        debug_assert!(self.finalized, "buffer is not finalized");

        let ret = unsafe {
            libc::mprotect(
                self.base as *mut libc::c_void,
                self.committed,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        anyhow::ensure!(ret == 0, "code buffer mprotect (RW reopen) failed");

        self.finalized = false;
        Ok(())
    }

    /// Entry pointer for a block at byte `offset`. Only valid after
    /// `finalize()`.
    pub fn entry_at(&self, offset: usize) -> *const u8 {
        debug_assert!(self.finalized, "must finalize before taking an entry");
        debug_assert!(offset < self.len);
        unsafe { self.base.add(offset) }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Commit more pages when `additional` bytes would overflow the
    /// committed region.
    fn ensure_capacity(&mut self, additional: usize) {
        let needed = self.len + additional;
        if needed <= self.committed {
            return;
        }

        let page_size = page_size();
        let max_commit = self.reserved - page_size;

        let mut new_committed = self.committed;
        while new_committed < needed {
            new_committed = new_committed.saturating_mul(2);
        }
        new_committed = align_up(new_committed, page_size).min(max_commit);

        assert!(
            needed <= new_committed,
            "code buffer exhausted: need {needed} bytes, max {max_commit}"
        );

        let ret = unsafe {
            libc::mprotect(
                self.base.add(self.committed) as *mut libc::c_void,
                new_committed - self.committed,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        assert!(ret == 0, "code buffer grow mprotect failed");

        self.committed = new_committed;
    }
}

impl Drop for CodeBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.reserved);
        }
    }
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

fn align_up(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Invalidate the instruction cache for a region of memory. Required on
/// aarch64 between writing code and executing it.
unsafe fn invalidate_icache(addr: *mut u8, len: usize) {
    #[cfg(target_os = "macos")]
    {
        unsafe extern "C" {
            fn sys_icache_invalidate(start: *mut libc::c_void, size: usize);
        }
        unsafe { sys_icache_invalidate(addr as *mut libc::c_void, len) };
    }

    #[cfg(target_os = "linux")]
    {
        unsafe extern "C" {
            fn __clear_cache(start: *mut libc::c_void, end: *mut libc::c_void);
        }
        unsafe {
            __clear_cache(addr as *mut libc::c_void, addr.add(len) as *mut libc::c_void)
        };
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = (addr, len);
    }
}
