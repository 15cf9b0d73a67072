/// Fatal path for broken kernel invariants.
///
/// Panics in debug builds. Release builds on the target halt on a breakpoint
/// so that an attached debugger stops right at the offending call.
#[doc(hidden)]
#[macro_export]
macro_rules! bk_panic {
    ($($arg:tt)*) => ({
        if cfg!(debug_assertions) {
            panic!($($arg)*);
        }
        else {
            $crate::port::halt()
        }
    });
}

#[doc(hidden)]
#[macro_export]
macro_rules! bk_assert {
    ($cond:expr) => ({
        if !$cond {
            $crate::bk_panic!("{}", concat!("assertion failed: ", stringify!($cond)));
        }
    });
    ($cond:expr, $($arg:tt)+) => ({
        if !$cond {
            $crate::bk_panic!($($arg)+);
        }
    });
}

pub(crate) trait BKUnwrap<T>
{
    fn bk_unwrap(self) -> T;
}

impl<T> BKUnwrap<T> for Option<T>
{
    fn bk_unwrap(self) -> T
    {
        match self {
            Some(v) => v,
            None => bk_panic!("Unwrapping on `None`")
        }
    }
}
