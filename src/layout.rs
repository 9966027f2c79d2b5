//! Pure address arithmetic over the heap's block metadata.
//!
//! Every block (free or allocated) carries a one-word header immediately
//! before its payload and a one-word footer as the block's last word. Header
//! and footer are bit-for-bit identical and pack:
//!
//! ```text
//! bits 31..3 : size in bytes (multiple of 8)
//! bit  2     : reserved (zero)
//! bit  1     : color (0 = BLACK, 1 = RED) -- meaningful only for free blocks
//! bit  0     : allocated flag
//! ```
//!
//! Nothing here allocates or extends the heap; it only computes offsets and
//! packs/unpacks header words given a payload pointer the caller already
//! holds. All functions are `unsafe` because they dereference raw pointers
//! into heap memory whose validity the caller must guarantee.

use std::mem;

/// Header/footer field width.
pub const WORD: usize = 4;
/// Payload alignment; also the width of each tree-node pointer field.
pub const DWORD: usize = 8;
/// Bytes reserved in every free block's payload for `parent`/`left`/`right`.
pub const POINTER_TRIO: usize = 3 * DWORD;
/// Header + footer cost charged against every block.
pub const OVERHEAD: usize = 2 * WORD;
/// Smallest legal block: header, three tree pointers, footer.
pub const MIN_BLOCK: usize = OVERHEAD + POINTER_TRIO;
/// Default growth quantum requested from the region provider.
pub const CHUNK: usize = 4096;

const ALLOC_BIT: u32 = 0b001;
const COLOR_BIT: u32 = 0b010;
const SIZE_MASK: u32 = !0b111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
  Black,
  Red,
}

impl Color {
  fn from_bit(word: u32) -> Self {
    if word & COLOR_BIT != 0 { Color::Red } else { Color::Black }
  }

  fn bit(self) -> u32 {
    match self {
      Color::Red => COLOR_BIT,
      Color::Black => 0,
    }
  }
}

/// Packs a size/color/alloc triple into a header or footer word.
///
/// `size` must already be a multiple of 8; the low three bits of `size` are
/// clobbered regardless, matching the original encoding's reuse of those
/// bits.
pub fn pack(size: usize, color: Color, alloc: bool) -> u32 {
  debug_assert_eq!(size & 0b111, 0, "block size must be a multiple of 8");
  (size as u32 & SIZE_MASK) | color.bit() | if alloc { ALLOC_BIT } else { 0 }
}

pub fn size_of_word(word: u32) -> usize {
  (word & SIZE_MASK) as usize
}

pub fn alloc_of_word(word: u32) -> bool {
  word & ALLOC_BIT != 0
}

pub fn color_of_word(word: u32) -> Color {
  Color::from_bit(word)
}

/// Address of the header word for the block whose payload starts at `bp`.
pub fn header(bp: *mut u8) -> *mut u32 {
  unsafe { bp.sub(WORD) as *mut u32 }
}

/// Address of the footer word for the block whose payload starts at `bp`,
/// given that block's total size (header + payload + footer).
///
/// # Safety
/// `bp`'s header must already hold `size`.
pub unsafe fn footer(bp: *mut u8, size: usize) -> *mut u32 {
  unsafe { bp.add(size).sub(DWORD) as *mut u32 }
}

/// Reads the current block's size straight from its header.
///
/// # Safety
/// `bp` must point at a live block's payload.
pub unsafe fn size(bp: *mut u8) -> usize {
  unsafe { size_of_word(header(bp).read()) }
}

/// # Safety
/// `bp` must point at a live block's payload.
pub unsafe fn is_allocated(bp: *mut u8) -> bool {
  unsafe { alloc_of_word(header(bp).read()) }
}

/// # Safety
/// `bp` must point at a live free block's payload.
pub unsafe fn color(bp: *mut u8) -> Color {
  unsafe { color_of_word(header(bp).read()) }
}

/// Writes matching header and footer words for a block, preserving nothing:
/// callers own the full size/color/alloc triple at the call site.
///
/// # Safety
/// `bp` must have room for a block of `size` bytes.
pub unsafe fn set_header_footer(bp: *mut u8, size: usize, color: Color, alloc: bool) {
  unsafe {
    let word = pack(size, color, alloc);
    header(bp).write(word);
    footer(bp, size).write(word);
  }
}

/// Rewrites just the color bit of a block's header and footer, preserving
/// its size and allocated bit.
///
/// # Safety
/// `bp` must point at a live block's payload.
pub unsafe fn set_color(bp: *mut u8, color: Color) {
  unsafe {
    let sz = size(bp);
    let alloc = is_allocated(bp);
    set_header_footer(bp, sz, color, alloc);
  }
}

/// Rewrites just the allocated bit of a block's header and footer,
/// preserving its size and color.
///
/// # Safety
/// `bp` must point at a live block's payload.
pub unsafe fn set_allocated(bp: *mut u8, alloc: bool) {
  unsafe {
    let sz = size(bp);
    let c = color(bp);
    set_header_footer(bp, sz, c, alloc);
  }
}

/// Payload address of the block immediately following `bp`.
///
/// # Safety
/// `bp`'s header must hold a valid size and the following header must be
/// mapped (guaranteed by the epilogue sentinel for the last real block).
pub unsafe fn next_block(bp: *mut u8) -> *mut u8 {
  unsafe { bp.add(size(bp)) }
}

/// Payload address of the block immediately preceding `bp`, read via the
/// boundary tag (the previous block's footer, the word just before `bp`'s
/// header).
///
/// # Safety
/// The word at `bp - DWORD` must be a valid footer (guaranteed by the
/// prologue sentinel for the first real block).
pub unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
  unsafe {
    let prev_footer = bp.sub(DWORD) as *mut u32;
    let prev_size = size_of_word(prev_footer.read());
    bp.sub(prev_size)
  }
}

/// Rounds `size` up to the next multiple of [`DWORD`].
///
/// `DWORD` and `mem::size_of::<usize>()` coincide on the 64-bit hosts this
/// crate targets (enforced below), so this is exactly [`crate::align!`].
pub fn round_to_dword(size: usize) -> usize {
  crate::align!(size)
}

/// Computes the adjusted block size for a user request of `size` bytes
/// (spec §4.5 step 2): small requests are padded up to `MIN_BLOCK` so a
/// later free can host the tree-node fields without enlargement; larger
/// requests are padded for header/footer/tree-node overhead and rounded to
/// a doubleword.
pub fn adjusted_size(size: usize) -> usize {
  if size <= DWORD + POINTER_TRIO {
    MIN_BLOCK
  } else {
    round_to_dword(size + POINTER_TRIO + OVERHEAD)
  }
}

const _: () = assert!(mem::size_of::<usize>() == 8, "rballoc targets 64-bit hosts only");
