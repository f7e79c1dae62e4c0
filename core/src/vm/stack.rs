use alloc::fmt;

use crate::{Vec, vm::RuntimeError};

/// Operand stack of the machine.
///
/// Underflow is reported as a [`RuntimeError`] carrying the offending
/// instruction index, since hand-assembled or spliced code can get the
/// stack discipline wrong.
///
/// # Examples
///
/// ```ignore
/// let mut stack = Stack::new(16);
/// stack.push(42);
/// stack.push(17);
/// assert_eq!(stack.pop(), Ok(17));
/// assert_eq!(stack.peek(), Some(&42));
/// ```
pub struct Stack<T> {
    items: Vec<T>,
    /// Index of the instruction being executed, reported on underflow.
    ip: usize,
}

impl<T> Stack<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(256)),
            ip: 0,
        }
    }

    /// Record the instruction index used in underflow errors.
    #[inline]
    pub fn at(&mut self, ip: usize) {
        self.ip = ip;
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    #[inline]
    pub fn pop(&mut self) -> Result<T, RuntimeError> {
        self.items.pop().ok_or(RuntimeError::StackUnderflow(self.ip))
    }

    /// Pop two operands, returning them in push order.
    #[inline]
    pub fn pop2(&mut self) -> Result<(T, T), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        Ok((a, b))
    }

    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("items", &self.items)
            .field("len", &self.items.len())
            .finish()
    }
}
