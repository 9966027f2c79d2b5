//! `std::alloc::GlobalAlloc` wrapper (SPEC_FULL §4.7, supplement).
//!
//! The teacher's crate never implements `GlobalAlloc` -- `BumpAllocator` is
//! driven directly by its own `allocate`/`deallocate` methods. This wrapper
//! is the idiomatic Rust shape every allocator crate in the wider example
//! pack converges on so the core façade can actually be dropped in as
//! `#[global_allocator]`. It owns nothing the façade doesn't already own;
//! it only lazily brings up a [`Heap`] on first use and guards against
//! accidental re-entrancy.

use std::alloc::{GlobalAlloc, Layout};
use std::cell::Cell;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, OnceLock};

use crate::heap::Heap;
use crate::layout::DWORD;

thread_local! {
  static IN_ALLOCATOR: Cell<bool> = const { Cell::new(false) };
}

/// A `GlobalAlloc` façade over [`Heap`].
///
/// Single-threaded or externally-synchronized use only (spec §1/§5's
/// Non-goal on multi-threaded concurrent allocation still holds): the inner
/// `Mutex` exists to make the type `Sync` so it can sit behind
/// `#[global_allocator]`, not to provide scalable concurrent allocation.
/// Alignment beyond the core's fixed doubleword (8-byte) alignment is
/// rejected by returning a null pointer, per `GlobalAlloc`'s contract for
/// requests it cannot satisfy.
pub struct GlobalRbAllocator {
  heap: OnceLock<Mutex<Heap>>,
}

impl GlobalRbAllocator {
  /// Creates an allocator with no heap yet; the heap is brought up lazily
  /// on first `alloc`/`dealloc` call, matching "no persisted state" (spec
  /// §6.3) -- nothing survives a process restart to initialize eagerly.
  pub const fn new() -> Self {
    GlobalRbAllocator { heap: OnceLock::new() }
  }

  fn heap(&self) -> &Mutex<Heap> {
    self.heap.get_or_init(|| Mutex::new(Heap::init().expect("region provider exhausted on init")))
  }

  /// Panics if called while this thread is already inside an
  /// allocator call (spec §5: "a user callback invoked during allocation
  /// must not re-enter the allocator"). Compiles to nothing in release
  /// builds, matching the teacher's zero-overhead non-debug path.
  fn guard_reentrancy<R>(&self, f: impl FnOnce() -> R) -> R {
    if cfg!(debug_assertions) {
      IN_ALLOCATOR.with(|flag| {
        assert!(!flag.get(), "GlobalRbAllocator re-entered from within its own call");
        flag.set(true);
      });
      let result = f();
      IN_ALLOCATOR.with(|flag| flag.set(false));
      result
    } else {
      f()
    }
  }
}

impl Default for GlobalRbAllocator {
  fn default() -> Self {
    Self::new()
  }
}

unsafe impl GlobalAlloc for GlobalRbAllocator {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > DWORD {
      return ptr::null_mut();
    }
    self.guard_reentrancy(|| {
      let mut heap = self.heap().lock().unwrap();
      heap.allocate(layout.size()).map_or(ptr::null_mut(), |p| p.as_ptr())
    })
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    let Some(ptr) = NonNull::new(ptr) else { return };
    self.guard_reentrancy(|| {
      let mut heap = self.heap().lock().unwrap();
      unsafe { heap.free(ptr) };
    })
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    if layout.align() > DWORD {
      return ptr::null_mut();
    }
    self.guard_reentrancy(|| {
      let mut heap = self.heap().lock().unwrap();
      let old = NonNull::new(ptr);
      unsafe { heap.reallocate(old, new_size) }.map_or(ptr::null_mut(), |p| p.as_ptr())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn alloc_then_dealloc_round_trips() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let alloc = GlobalRbAllocator::new();
    let layout = Layout::from_size_align(64, 8).unwrap();
    unsafe {
      let p = alloc.alloc(layout);
      assert!(!p.is_null());
      assert_eq!(p as usize % DWORD, 0);
      alloc.dealloc(p, layout);
    }
  }

  #[test]
  fn over_aligned_request_returns_null() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let alloc = GlobalRbAllocator::new();
    let layout = Layout::from_size_align(64, 64).unwrap();
    let p = unsafe { alloc.alloc(layout) };
    assert!(p.is_null());
  }
}
