use core::mem::{MaybeUninit, size_of, align_of};
use core::marker::PhantomData;

use num_integer::Integer;

use crate::bk_assert;
use crate::bkptpanic::BKUnwrap;

//

pub(crate) fn align_up(x: usize, align: usize) -> usize
{
    Integer::div_ceil(&x, &align) * align
}

pub(crate) fn align_down(x: usize, align: usize) -> usize
{
    Integer::div_floor(&x, &align) * align
}

//

/// Memory block reserved for a kernel instance
///
/// The kernel object and its process table are carved from the head of the
/// block; whatever remains becomes the kernel heap for process stacks and
/// message queues.
pub struct RKMemBlk<B>(MaybeUninit<B>);

impl<B> RKMemBlk<B>
{
    pub(crate) const fn new() -> RKMemBlk<B>
    {
        RKMemBlk(MaybeUninit::<B>::uninit())
    }

    fn size(&self) -> usize
    {
        size_of::<B>()
    }

    fn head(&mut self) -> usize
    {
        self.0.as_mut_ptr() as usize
    }
}

//

pub(crate) struct RKRawArray<V>
{
    head: *mut V,
    len: usize
}

impl<V> RKRawArray<V>
{
    /// # Safety
    /// `head` must point to `len` writable elements that stay valid while the
    /// array is used.
    pub(crate) unsafe fn from_raw(head: *mut V, len: usize) -> RKRawArray<V>
    {
        RKRawArray {
            head,
            len
        }
    }

    #[allow(clippy::mut_from_ref)]
    pub(crate) fn refer<I>(&self, i: I) -> &mut V
    where I: Into<usize>
    {
        let i = i.into();
        bk_assert!(i < self.len);

        let ptr = self.head;
        let ptr = unsafe { ptr.add(i) };

        unsafe { ptr.as_mut().bk_unwrap() }
    }

    pub(crate) fn write<I>(&self, i: I, v: V)
    where I: Into<usize>
    {
        let i = i.into();
        bk_assert!(i < self.len);

        let ptr = self.head;
        let ptr = unsafe { ptr.add(i) };

        unsafe { ptr.write(v); }
    }

    pub(crate) fn len(&self) -> usize
    {
        self.len
    }
}

//

pub(crate) struct RKAlloc<'a>
{
    cur_pos: usize,
    end_cap: usize,
    phantom: PhantomData<&'a mut ()>
}

impl<'a> RKAlloc<'a>
{
    pub(crate) fn new<B>(mem: &'a mut RKMemBlk<B>) -> RKAlloc<'a>
    {
        RKAlloc {
            cur_pos: mem.head(),
            end_cap: mem.head() + mem.size(),
            phantom: PhantomData
        }
    }

    pub(crate) fn array<V>(&mut self, len: usize) -> RKRawArray<V>
    {
        let size = size_of::<V>() * len;

        let p = align_up(self.cur_pos, align_of::<V>());
        let e = p + size;

        assert!(e <= self.end_cap,
                "{} bytes shortage of memory block", size);

        self.cur_pos = e;

        RKRawArray {
            head: p as *mut V,
            len
        }
    }

    pub(crate) fn one<V>(&mut self) -> *mut V
    {
        self.array::<V>(1).head
    }

    /// Hands out everything left, starting at an `align` boundary.
    pub(crate) fn rest(self, align: usize) -> (*mut u8, usize)
    {
        let p = align_up(self.cur_pos, align);
        let len = align_down(self.end_cap.saturating_sub(p), align);

        (p as *mut u8, len)
    }
}
