//! Freelist heap.
//!
//! Free memory is kept as an address-ascending singly-linked list of chunks.
//! Each free chunk stores its own header (`next`, `size`) in its first bytes,
//! so the heap needs no memory besides the arenas it manages.
//!
//! * Every size is rounded up to the header size, which is also the alignment
//!   of every block handed out.
//! * A partial allocation is taken from the *end* of the chosen chunk so the
//!   chunk's header stays where it is and the list does not need relinking.
//! * `free` coalesces with both neighbours, so two adjacent free chunks never
//!   stay separate.
//!
//! The heap is not interrupt-safe; the kernel only touches it with preemption
//! forbidden.

use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::{self, NonNull};

use num_integer::Integer;

use crate::{bk_panic, bk_assert};
use crate::memory::align_up;

//

/// Fill byte of memory sitting in the free list (debug builds).
pub const FREE_FILL: u8 = 0xF5;
/// Fill byte of memory just handed out (debug builds).
pub const ALLOC_FILL: u8 = 0xAA;

#[repr(C)]
struct MemChunk
{
    next: *mut MemChunk,
    size: usize
}

const UNIT: usize = size_of::<MemChunk>();

fn round(size: usize) -> usize
{
    if size == 0 {
        UNIT
    }
    else {
        align_up(size, UNIT)
    }
}

//

/// Freelist heap over one or more arenas
pub struct RKHeap<'a>
{
    free_list: *mut MemChunk,
    phantom: PhantomData<&'a mut [u8]>
}

impl<'a> RKHeap<'a>
{
    /// Granularity and alignment of every block.
    pub const UNIT: usize = UNIT;

    /// Creates an empty heap. `alloc` fails until an arena is added.
    pub const fn new() -> RKHeap<'a>
    {
        RKHeap {
            free_list: ptr::null_mut(),
            phantom: PhantomData
        }
    }

    /// Creates a heap over `buf`.
    /// * `buf` must be aligned to `RKHeap::UNIT`.
    /// * A trailing part shorter than `RKHeap::UNIT` is left unused.
    pub fn from_slice(buf: &'a mut [u8]) -> RKHeap<'a>
    {
        let mut heap = RKHeap::new();
        unsafe {
            heap.init(buf.as_mut_ptr(), buf.len());
        }
        heap
    }

    /// Installs one chunk spanning the whole buffer, dropping any previous arena.
    ///
    /// # Safety
    /// `buf .. buf + size` must be valid, writable and unused by anything else
    /// for `'a`.
    pub unsafe fn init(&mut self, buf: *mut u8, size: usize)
    {
        self.free_list = ptr::null_mut();
        self.add_arena(buf, size);
    }

    /// Adds another arena to the heap.
    /// * `buf` must be aligned to `RKHeap::UNIT`.
    ///
    /// # Safety
    /// Same as [`init`](Self::init); the arena must not overlap memory already
    /// managed by this heap.
    pub unsafe fn add_arena(&mut self, buf: *mut u8, size: usize)
    {
        bk_assert!(Integer::is_multiple_of(&(buf as usize), &UNIT),
                   "heap arena {:p} misaligned", buf);

        let size = size - size % UNIT;
        if size == 0 {
            return;
        }

        self.insert(buf, size);
    }

    /// Allocates `size` bytes.
    /// * Returns `None` when no single chunk is large enough.
    /// * The block is aligned to `RKHeap::UNIT`.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>>
    {
        let size = round(size);

        // best fit: a freed hole gets reused before the tail of a larger chunk
        // is split; an exact fit wins at once
        let mut best: *mut *mut MemChunk = ptr::null_mut();
        let mut best_size = usize::MAX;

        let mut prev: *mut *mut MemChunk = &mut self.free_list;
        unsafe {
            while !(*prev).is_null() {
                let chunk = *prev;
                let chunk_size = (*chunk).size;

                if chunk_size == size {
                    *prev = (*chunk).next;

                    let block = chunk as *mut u8;
                    check_fill(block.add(UNIT), size - UNIT);
                    fill(block, size, ALLOC_FILL);
                    return NonNull::new(block);
                }
                else if chunk_size > size && chunk_size < best_size {
                    best = prev;
                    best_size = chunk_size;
                }

                prev = &mut (*chunk).next;
            }

            if best.is_null() {
                return None;
            }

            let chunk = *best;
            (*chunk).size -= size;

            let block = (chunk as *mut u8).add((*chunk).size);
            check_fill(block, size);
            fill(block, size, ALLOC_FILL);
            NonNull::new(block)
        }
    }

    /// Returns a block to the heap.
    ///
    /// # Safety
    /// `ptr` must come from `alloc` of this heap with the same `size`, and must
    /// not be used afterwards.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>, size: usize)
    {
        self.insert(ptr.as_ptr(), round(size));
    }

    /// Total free bytes.
    /// * Free space may be fragmented, so this is not the size of the largest
    ///   block `alloc` can return.
    pub fn free_space(&self) -> usize
    {
        self.chunks().map(|(_, size)| size).sum()
    }

    /// Size of the largest single chunk.
    pub fn largest_free(&self) -> usize
    {
        self.chunks().map(|(_, size)| size).max().unwrap_or(0)
    }

    /// Number of chunks in the free list.
    pub fn fragments(&self) -> usize
    {
        self.chunks().count()
    }

    fn chunks(&self) -> Chunks<'_>
    {
        Chunks {
            cur: self.free_list,
            phantom: PhantomData
        }
    }

    // address-ordered insertion with coalescing on both sides
    unsafe fn insert(&mut self, block: *mut u8, size: usize)
    {
        let start = block as usize;
        let end = start + size;

        let head = self.free_list;

        if head.is_null() || end <= head as usize {
            // becomes the new head
            fill(block, size, FREE_FILL);
            let chunk = block as *mut MemChunk;

            if !head.is_null() && end == head as usize {
                let merged = (*head).size;
                let next = (*head).next;
                fill(head as *mut u8, UNIT, FREE_FILL);
                chunk.write(MemChunk { next, size: size + merged });
            }
            else {
                chunk.write(MemChunk { next: head, size });
            }

            self.free_list = chunk;
            return;
        }

        // find the last chunk starting below the block
        let mut prev = head;
        while !(*prev).next.is_null() && ((*prev).next as usize) < start {
            prev = (*prev).next;
        }

        let prev_end = prev as usize + (*prev).size;
        if prev_end > start {
            bk_panic!("heap: freeing {:#x}+{} overlaps free chunk {:p}", start, size, prev);
        }

        let next = (*prev).next;
        if !next.is_null() && end > next as usize {
            bk_panic!("heap: freeing {:#x}+{} overlaps free chunk {:p}", start, size, next);
        }

        fill(block, size, FREE_FILL);

        // merge with the following chunk
        let (size, next) = if !next.is_null() && end == next as usize {
            let merged = (*next).size;
            let after = (*next).next;
            fill(next as *mut u8, UNIT, FREE_FILL);
            (size + merged, after)
        }
        else {
            (size, next)
        };

        // merge with the preceding chunk
        if prev_end == start {
            (*prev).size += size;
            (*prev).next = next;
        }
        else {
            let chunk = block as *mut MemChunk;
            chunk.write(MemChunk { next, size });
            (*prev).next = chunk;
        }
    }
}

impl Default for RKHeap<'_>
{
    fn default() -> Self
    {
        RKHeap::new()
    }
}

//

struct Chunks<'h>
{
    cur: *mut MemChunk,
    phantom: PhantomData<&'h MemChunk>
}

impl Iterator for Chunks<'_>
{
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item>
    {
        if self.cur.is_null() {
            None
        }
        else {
            let chunk = unsafe { &*self.cur };
            let item = (self.cur as usize, chunk.size);
            self.cur = chunk.next;
            Some(item)
        }
    }
}

//

unsafe fn fill(p: *mut u8, len: usize, pattern: u8)
{
    if cfg!(debug_assertions) {
        ptr::write_bytes(p, pattern, len);
    }
}

unsafe fn check_fill(p: *const u8, len: usize)
{
    if cfg!(debug_assertions) {
        for i in 0..len {
            if *p.add(i) != FREE_FILL {
                bk_panic!("heap: free memory at {:p} written after free", p.add(i));
            }
        }
    }
}
