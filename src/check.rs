//! The consistency checker (spec §4.6): a forward walk over every block
//! between the prologue and the epilogue, verifying the invariants of §3.4.
//!
//! This is strictly a diagnostic: the production allocate/free/reallocate
//! paths never call it. Only epilogue damage is treated as fatal by the
//! `check` CLI contract (spec §6.1/§9's open-question resolution) -- the
//! caller decides what "fatal" means for the other findings, which are
//! returned rather than panicking inline.

use crate::error::HeapCorruption;
use crate::layout::{self, DWORD, MIN_BLOCK};
use crate::tree;

/// Walks the heap from the prologue to the epilogue, validating:
/// alignment, header/footer agreement, prologue/epilogue shape, and the
/// absence of two adjacent free blocks. With `verbose`, prints each block
/// as it's visited.
///
/// Returns the first violation found, if any. Callers that want the
/// documented "terminate with exit code 2 on epilogue damage" CLI behavior
/// (spec §6.1) should match on [`HeapCorruption::BadEpilogue`] themselves
/// and call `std::process::exit(2)`; this function only detects and
/// reports.
pub fn check(base: *mut u8, verbose: bool) -> Result<(), HeapCorruption> {
  unsafe {
    if layout::size(base) != MIN_BLOCK || !layout::is_allocated(base) {
      return Err(HeapCorruption::BadPrologue);
    }

    let mut bp = layout::next_block(base);
    let mut prev_free = false;

    loop {
      let size = layout::size(bp);

      if size == 0 {
        if !layout::is_allocated(bp) {
          return Err(HeapCorruption::BadEpilogue);
        }
        if verbose {
          println!("epilogue at {:p}", bp);
        }
        break;
      }

      if (bp as usize) % DWORD != 0 {
        return Err(HeapCorruption::Misaligned { at: bp as usize });
      }

      let header_word = layout::header(bp).read();
      let footer_word = layout::footer(bp, size).read();
      if header_word != footer_word {
        return Err(HeapCorruption::HeaderFooterMismatch { at: bp as usize });
      }

      let is_free = !layout::is_allocated(bp);
      if is_free && prev_free {
        return Err(HeapCorruption::AdjacentFreeBlocks { at: bp as usize });
      }

      if verbose {
        println!(
          "block at {:p}: size={} alloc={} color={:?}",
          bp,
          size,
          !is_free,
          layout::color(bp)
        );
      }

      prev_free = is_free;
      bp = layout::next_block(bp);
    }

    Ok(())
  }
}

/// Optional companion pass over the free-block tree (spec §4.6): validates
/// red-black invariants (no red-red, equal black-height, BST-by-size
/// ordering). Not required for `check`'s pass/fail contract but recommended
/// diagnostics.
pub fn check_tree(base: *mut u8) -> Result<(), &'static str> {
  tree::verify(base)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::heap::Heap;

  #[test]
  fn fresh_heap_passes_both_checks() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let heap = Heap::init().unwrap();
    assert!(check(heap.base(), false).is_ok());
    assert!(check_tree(heap.base()).is_ok());
  }

  #[test]
  fn heap_with_outstanding_allocations_still_passes() {
    let _g = crate::region::HEAP_TEST_LOCK.lock().unwrap();
    let mut heap = Heap::init().unwrap();
    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(64).unwrap();
    assert!(check(heap.base(), false).is_ok());
    unsafe {
      heap.free(a);
      heap.free(b);
    }
    assert!(check(heap.base(), false).is_ok());
  }
}
