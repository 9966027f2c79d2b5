//! Adapter over the region provider (spec §4.2/§6.2).
//!
//! The core never calls `libc` directly; every byte the heap ever touches
//! comes from [`extend`]. This mirrors the teacher's `BumpAllocator`, which
//! calls `libc::sbrk` inline in `allocate`/`deallocate` -- here that same
//! call is pulled out behind the spec's region-provider boundary so the rest
//! of the crate stays a pure-Rust core over a pluggable memory source.

use libc::{c_void, intptr_t, sbrk};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Low and high watermarks of the region this adapter has handed out,
/// tracked for [`crate::check::check`] (spec §6.2's `low()`/`high()`).
static REGION_LOW: AtomicUsize = AtomicUsize::new(0);
static REGION_HIGH: AtomicUsize = AtomicUsize::new(0);

/// Requests `nbytes` additional bytes from the region provider.
///
/// Returns the base address of the newly appended segment, or `None` if the
/// provider refused the grant (`sbrk` returning `(void*)-1`).
pub fn extend(nbytes: usize) -> Option<*mut u8> {
  let base = unsafe { sbrk(nbytes as intptr_t) };
  if base == usize::MAX as *mut c_void {
    return None;
  }

  let base = base as usize;
  if REGION_LOW.load(Ordering::Relaxed) == 0 {
    REGION_LOW.store(base, Ordering::Relaxed);
  }
  REGION_HIGH.store(base + nbytes, Ordering::Relaxed);

  Some(base as *mut u8)
}

/// Lowest address ever handed out by [`extend`], or `0` if the region has
/// never been extended.
pub fn low() -> usize {
  REGION_LOW.load(Ordering::Relaxed)
}

/// Highest address ever handed out by [`extend`].
pub fn high() -> usize {
  REGION_HIGH.load(Ordering::Relaxed)
}

/// `sbrk` is process-global: any test that brings up a [`crate::heap::Heap`]
/// extends the same break as every other such test. `cargo test` runs tests
/// on separate threads by default, so every module with a heap-backed test
/// locks this mutex for its duration rather than maintaining its own.
#[cfg(test)]
pub(crate) static HEAP_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
