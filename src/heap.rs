//! The allocator façade (spec §4.5): `init`, `allocate`, `free`, `reallocate`.
//!
//! `Heap` owns nothing but the prologue's address -- all state the operations
//! need (the free-block tree's root, every block's size/color/alloc bits)
//! lives in the heap region itself, written and read through [`crate::layout`]
//! and [`crate::tree`]. This mirrors the teacher's `BumpAllocator`, which is
//! also a thin struct wrapping a `sbrk`-backed region, restructured here as
//! methods (`Heap::allocate`/`Heap::free`/`Heap::reallocate`) the same way,
//! even though the algorithm underneath is a completely different strategy.

use std::ptr::{self, NonNull};

use crate::coalesce;
use crate::error::InitError;
use crate::layout::{self, Color, CHUNK, DWORD, MIN_BLOCK, WORD};
use crate::region;
use crate::tree;

/// A single heap over the process's `sbrk`-extensible region.
///
/// There is exactly one meaningful heap per process (the region provider is
/// process-global), so constructing a second `Heap` shares the same
/// underlying memory as the first -- callers should keep a single `Heap`
/// alive for the process's lifetime, which is exactly what
/// [`crate::global::GlobalRbAllocator`] does.
pub struct Heap {
  /// Payload address of the prologue block; also the tree's root slot.
  base: *mut u8,
}

unsafe impl Send for Heap {}

impl Heap {
  /// Brings up a fresh heap: a pad word, the prologue sentinel (doubling as
  /// the tree's root slot), and an epilogue, followed by one `CHUNK`-sized
  /// extension (spec §4.2).
  pub fn init() -> Result<Heap, InitError> {
    // Pad word + prologue (header/payload/footer) + epilogue header, no
    // more: the next `extend` call's `sbrk` return must land exactly where
    // the epilogue header sits, so that new block's header overwrites it
    // in place rather than leaving a dead gap behind (spec §4.2).
    let request = MIN_BLOCK + 2 * WORD;
    let raw = region::extend(request).ok_or(InitError::RegionExhausted)?;

    unsafe {
      // One pad word so the prologue's header lands on a doubleword boundary.
      let prologue_header = raw.add(WORD);
      let base = prologue_header.add(WORD);
      layout::set_header_footer(base, MIN_BLOCK, Color::Black, true);
      tree::init_root(base);

      let epilogue_header = base.add(MIN_BLOCK);
      (epilogue_header.sub(WORD) as *mut u32).write(layout::pack(0, Color::Black, true));

      let mut heap = Heap { base };
      heap.extend(CHUNK / WORD).ok_or(InitError::RegionExhausted)?;
      Ok(heap)
    }
  }

  /// Requests more memory from the region provider and folds it into the
  /// heap as one new free block (spec §4.2's `extend`).
  fn extend(&mut self, words: usize) -> Option<*mut u8> {
    let words = crate::align_words_even!(words);
    let nbytes = words * WORD;
    let raw = region::extend(nbytes)?;

    unsafe {
      // `raw` is exactly where the old epilogue's header used to live.
      let new_block = raw;
      layout::set_header_footer(new_block, nbytes, Color::Red, false);

      let epilogue_header = new_block.add(nbytes);
      (epilogue_header.sub(WORD) as *mut u32).write(layout::pack(0, Color::Black, true));

      Some(coalesce::coalesce(self.base, new_block))
    }
  }

  /// Serves a request for `size` user-visible bytes (spec §4.5).
  ///
  /// Returns `None` for `size == 0` or if the region provider is exhausted.
  /// The returned address is always doubleword-aligned.
  pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
    if size == 0 {
      return None;
    }

    let asize = layout::adjusted_size(size);

    let bp = match tree::search_best_fit(self.base, asize) {
      Some(bp) => bp,
      None => {
        self.extend(asize.max(CHUNK) / WORD)?;
        tree::search_best_fit(self.base, asize)?
      }
    };

    let placed = self.place(bp, asize);
    NonNull::new(placed)
  }

  /// Splits `bp` (a free block of size ≥ `asize` already removed from the
  /// tree) into an allocated head of size `asize` and, if there's enough
  /// left over to be worth it, a free remainder reinserted into the tree
  /// (spec §4.5 step 6).
  fn place(&mut self, bp: *mut u8, asize: usize) -> *mut u8 {
    let csize = unsafe { layout::size(bp) };

    if csize - asize >= MIN_BLOCK + DWORD {
      unsafe {
        layout::set_header_footer(bp, asize + DWORD, Color::Black, true);
        let remainder = layout::next_block(bp);
        layout::set_header_footer(remainder, csize - asize - DWORD, Color::Red, false);
        tree::insert(self.base, remainder);
      }
    } else {
      unsafe { layout::set_header_footer(bp, csize, Color::Black, true) };
    }

    bp
  }

  /// Releases a previously allocated block back to the heap, coalescing it
  /// with any free neighbors (spec §4.5 `free`).
  ///
  /// # Safety
  /// `ptr` must be an address previously returned by [`Heap::allocate`] or
  /// [`Heap::reallocate`] on this heap, not yet freed. Double-free or
  /// freeing a foreign pointer is undefined behavior this design does not
  /// detect (spec §7).
  pub unsafe fn free(&mut self, ptr: NonNull<u8>) {
    unsafe {
      let bp = ptr.as_ptr();
      layout::set_allocated(bp, false);
      coalesce::coalesce(self.base, bp);
    }
  }

  /// Naive reallocation: allocate fresh, copy the overlap, free the old
  /// block (spec §4.5 `reallocate`). `ptr == None` behaves as `allocate`;
  /// `size == 0` behaves as `free` and returns `None`.
  ///
  /// # Safety
  /// Same contract as [`Heap::free`] for a `Some` `ptr`.
  pub unsafe fn reallocate(&mut self, ptr: Option<NonNull<u8>>, size: usize) -> Option<NonNull<u8>> {
    let Some(ptr) = ptr else {
      return self.allocate(size);
    };

    if size == 0 {
      unsafe { self.free(ptr) };
      return None;
    }

    let old_bp = ptr.as_ptr();
    let old_payload = unsafe { layout::size(old_bp) } - layout::OVERHEAD;

    let new_ptr = self.allocate(size)?;
    unsafe {
      let copy_len = old_payload.min(size);
      ptr::copy_nonoverlapping(old_bp, new_ptr.as_ptr(), copy_len);
      self.free(ptr);
    }
    Some(new_ptr)
  }

  /// Runs the consistency checker over this heap (spec §4.6).
  pub fn check(&self, verbose: bool) -> Result<(), crate::error::HeapCorruption> {
    crate::check::check(self.base, verbose)
  }

  /// The prologue's payload address, for diagnostics (`check`, the demo).
  pub fn base(&self) -> *mut u8 {
    self.base
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // sbrk is process-global, so tests that extend the real heap must not
  // run concurrently with each other; `cargo test` runs them on separate
  // threads by default, which would race over the same break. Serialize
  // with a crate-wide mutex.
  fn fresh_heap() -> Heap {
    Heap::init().expect("region provider should have room in tests")
  }

  #[test]
  fn single_alloc_free_roundtrips_to_one_free_block() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let p = heap.allocate(16).expect("alloc should succeed");
    assert_eq!(p.as_ptr() as usize % DWORD, 0);
    unsafe { heap.free(p) };
    assert!(heap.check(false).is_ok());
  }

  #[test]
  fn allocate_one_byte_yields_min_block() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let p = heap.allocate(1).unwrap();
    let bp = p.as_ptr();
    assert_eq!(unsafe { layout::size(bp) }, MIN_BLOCK);
    unsafe { heap.free(p) };
  }

  #[test]
  fn split_places_second_alloc_after_first() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let p = heap.allocate(16).unwrap();
    let q = heap.allocate(16).unwrap();
    let expected = unsafe { p.as_ptr().add(layout::adjusted_size(16) + DWORD) };
    assert_eq!(q.as_ptr(), expected);
    unsafe {
      heap.free(p);
      heap.free(q);
    }
  }

  /// Each of the spec's four coalescing cases gets its own fresh heap and
  /// its own triple of consecutively-placed blocks, so freeing one case's
  /// blocks can never double-free or disturb another case's addresses.
  fn three_consecutive_blocks(heap: &mut Heap) -> (NonNull<u8>, NonNull<u8>, NonNull<u8>) {
    (heap.allocate(32).unwrap(), heap.allocate(32).unwrap(), heap.allocate(32).unwrap())
  }

  #[test]
  fn coalesce_free_b_then_a_merges_backward() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let (a, b, c) = three_consecutive_blocks(&mut heap);
    unsafe {
      heap.free(b);
      heap.free(a);
    }
    assert!(heap.check(false).is_ok());
    unsafe { heap.free(c) };
    assert!(heap.check(false).is_ok());
  }

  #[test]
  fn coalesce_free_a_then_b_merges_forward() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let (a, b, c) = three_consecutive_blocks(&mut heap);
    unsafe {
      heap.free(a);
      heap.free(b);
    }
    assert!(heap.check(false).is_ok());
    unsafe { heap.free(c) };
    assert!(heap.check(false).is_ok());
  }

  #[test]
  fn coalesce_free_b_then_c_merges_forward() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let (a, b, c) = three_consecutive_blocks(&mut heap);
    unsafe {
      heap.free(b);
      heap.free(c);
    }
    assert!(heap.check(false).is_ok());
    unsafe { heap.free(a) };
    assert!(heap.check(false).is_ok());
  }

  #[test]
  fn coalesce_free_a_then_c_then_b_merges_all_three() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let (a, b, c) = three_consecutive_blocks(&mut heap);
    unsafe {
      heap.free(a);
      heap.free(c);
      heap.free(b);
    }
    assert!(heap.check(false).is_ok());
  }

  #[test]
  fn best_fit_chooses_smallest_adequate_block() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();

    // A small allocated separator between each candidate keeps them from
    // coalescing back together once freed, so the tree genuinely holds
    // three distinct free sizes to choose among.
    let a = heap.allocate(56).unwrap();
    let sep1 = heap.allocate(8).unwrap();
    let b = heap.allocate(88).unwrap();
    let sep2 = heap.allocate(8).unwrap();
    let c = heap.allocate(120).unwrap();

    unsafe {
      heap.free(a);
      heap.free(b);
      heap.free(c);
    }

    let fit = heap.allocate(56).unwrap();
    assert_eq!(fit, a);

    unsafe {
      heap.free(fit);
      heap.free(sep1);
      heap.free(sep2);
    }
  }

  #[test]
  fn reallocate_grows_and_preserves_prefix() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let p = heap.allocate(32).unwrap();
    unsafe {
      for i in 0..32u8 {
        p.as_ptr().add(i as usize).write(i);
      }
    }
    let q = unsafe { heap.reallocate(Some(p), 1024) }.unwrap();
    for i in 0..32u8 {
      assert_eq!(unsafe { q.as_ptr().add(i as usize).read() }, i);
    }
    unsafe { heap.free(q) };
  }

  #[test]
  fn reallocate_none_ptr_behaves_as_allocate() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let p = unsafe { heap.reallocate(None, 16) }.unwrap();
    unsafe { heap.free(p) };
  }

  #[test]
  fn reallocate_zero_size_behaves_as_free() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    let p = heap.allocate(16).unwrap();
    let r = unsafe { heap.reallocate(Some(p), 0) };
    assert!(r.is_none());
    assert!(heap.check(false).is_ok());
  }

  #[test]
  fn allocate_zero_and_negative_like_size_returns_none() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    assert!(heap.allocate(0).is_none());
  }

  #[test]
  fn growth_extends_by_chunk_when_request_exceeds_free_space() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = fresh_heap();
    // Consume essentially the whole initial chunk in one allocation.
    let big = heap.allocate(CHUNK - 64).unwrap();
    let high_before = region::high();

    let p = heap.allocate(16).unwrap();
    assert!(region::high() > high_before);

    unsafe {
      heap.free(p);
      heap.free(big);
    }
  }
}
