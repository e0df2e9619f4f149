mod swizzle;
pub use self::swizzle::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub t: T,
    pub line: usize,
    pub col: usize,
}
impl<T: core::fmt::Display> core::fmt::Display for Located<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // positions are stored zero-based
        write!(f, "{}:{}: {}", self.line + 1, self.col + 1, self.t)
    }
}
impl<T: std::error::Error> std::error::Error for Located<T> {}

pub trait BoolToErrorHelper {
    fn or_err<E>(self, f: impl FnOnce() -> E) -> Result<(), E>;
}
impl BoolToErrorHelper for bool {
    #[inline(always)]
    fn or_err<E>(self, f: impl FnOnce() -> E) -> Result<(), E> {
        if !self {
            Err(f())
        } else {
            Ok(())
        }
    }
}
