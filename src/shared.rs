use core::cell::UnsafeCell;
use core::marker::PhantomData;

use crate::kernel::RKKernel;
use crate::sem::RKSemaphore;
use crate::port::RKPort;

/// Shared variable among processes
///
/// Owns a value and an `RKSemaphore` guarding it, so the value can only be
/// reached while the semaphore is held.
pub struct RKShared<T>
{
    sem: RKSemaphore,
    holder: UnsafeCell<T>
}

unsafe impl<T: Send> Sync for RKShared<T> {}

impl<T> RKShared<T>
{
    /// Creates a shared variable.
    pub const fn new(holder: T) -> RKShared<T>
    {
        RKShared {
            sem: RKSemaphore::new(),
            holder: UnsafeCell::new(holder)
        }
    }

    /// Makes an exclusive access to a shared variable.
    /// * `k` - kernel the calling process runs on.
    /// * Returns a `DerefMut`-able wrapper of the shared variable.
    /// * Blocks while another process accesses it.
    pub fn lock<'g, 'a, P: RKPort>(&'g self, k: &'g RKKernel<'a, P>) -> RKSharedGuard<'g, 'a, P, T>
    {
        self.sem.obtain(k);

        RKSharedGuard {
            s: self,
            k,
            phantom: PhantomData
        }
    }

    /// Tries to make an exclusive access to a shared variable.
    /// * Returns a `DerefMut`-able wrapper of the shared variable in `Option`.
    /// * Gets `None` if another process accesses it.
    pub fn try_lock<'g, 'a, P: RKPort>(&'g self, k: &'g RKKernel<'a, P>) -> Option<RKSharedGuard<'g, 'a, P, T>>
    {
        if self.sem.attempt(k) {
            Some(RKSharedGuard {
                s: self,
                k,
                phantom: PhantomData
            })
        }
        else {
            None
        }
    }

    /// Gets a mutable reference without locking, since `&mut self` is exclusive.
    pub fn get_mut(&mut self) -> &mut T
    {
        self.holder.get_mut()
    }

    /// Consumes the shared variable and returns the value.
    pub fn into_inner(self) -> T
    {
        self.holder.into_inner()
    }
}

//

/// Shared variable's access scope wrapper
///
/// Releases the access when dropped, from the process that made it.
pub struct RKSharedGuard<'g, 'a, P: RKPort, T>
{
    s: &'g RKShared<T>,
    k: &'g RKKernel<'a, P>,
    // stays with the process that locked
    phantom: PhantomData<*const ()>
}

impl<P: RKPort, T> core::ops::Deref for RKSharedGuard<'_, '_, P, T>
{
    type Target = T;

    fn deref(&self) -> &Self::Target
    {
        unsafe { &*self.s.holder.get() }
    }
}

impl<P: RKPort, T> core::ops::DerefMut for RKSharedGuard<'_, '_, P, T>
{
    fn deref_mut(&mut self) -> &mut Self::Target
    {
        unsafe { &mut *self.s.holder.get() }
    }
}

impl<P: RKPort, T> Drop for RKSharedGuard<'_, '_, P, T>
{
    fn drop(&mut self)
    {
        self.s.sem.release(self.k);
    }
}
