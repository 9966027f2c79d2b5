//! Typed diagnostics for the paths that are allowed to fail loudly.
//!
//! The public allocate/free/reallocate contract never uses these: every
//! failure there is a `None`/no-op, per the allocator's error-handling
//! design. These types exist only for `Heap::init` (which has nowhere softer
//! to fail to) and `Heap::check` (an explicit diagnostic, not a production
//! code path).

use core::fmt;

/// Failure to obtain the initial heap grant from the region provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
  /// The region provider refused the initial extension request.
  RegionExhausted,
}

impl fmt::Display for InitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InitError::RegionExhausted => write!(f, "region provider refused initial heap grant"),
    }
  }
}

/// A consistency violation found by [`crate::heap::Heap::check`].
///
/// Only [`HeapCorruption::BadEpilogue`] is treated as fatal by the `check`
/// CLI contract (spec §6.1); the others are advisory findings a caller may
/// collect and report without terminating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapCorruption {
  /// The prologue is missing, misallocated, or not `MIN_BLOCK` bytes.
  BadPrologue,
  /// The epilogue is missing, has nonzero size, or is not allocated.
  BadEpilogue,
  /// A block's header and footer disagree, at the given payload address.
  HeaderFooterMismatch { at: usize },
  /// Two free blocks sit adjacent in the heap, at the given payload address.
  AdjacentFreeBlocks { at: usize },
  /// A block's payload address is not doubleword-aligned.
  Misaligned { at: usize },
}

impl fmt::Display for HeapCorruption {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HeapCorruption::BadPrologue => write!(f, "bad prologue block"),
      HeapCorruption::BadEpilogue => write!(f, "bad epilogue block"),
      HeapCorruption::HeaderFooterMismatch { at } => {
        write!(f, "header/footer mismatch at {:#x}", at)
      }
      HeapCorruption::AdjacentFreeBlocks { at } => {
        write!(f, "adjacent free blocks at {:#x}", at)
      }
      HeapCorruption::Misaligned { at } => write!(f, "block at {:#x} is not doubleword-aligned", at),
    }
  }
}
