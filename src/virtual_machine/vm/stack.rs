/// Fixed-capacity LIFO buffer backing the operand and return stacks.
///
/// Storage is allocated inline once; a push past `N` is rejected instead of
/// growing the buffer.
pub(super) struct BoundedStack<T, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> BoundedStack<T, N> {
    pub(super) fn new() -> Self {
        Self {
            items: [T::default(); N],
            len: 0,
        }
    }

    /// Pushes `value`, handing it back if the stack is full.
    #[inline(always)]
    pub(super) fn push(&mut self, value: T) -> Result<(), T> {
        match self.items.get_mut(self.len) {
            Some(slot) => {
                *slot = value;
                self.len += 1;
                Ok(())
            }
            None => Err(value),
        }
    }

    #[inline(always)]
    pub(super) fn pop(&mut self) -> Option<T> {
        self.len = self.len.checked_sub(1)?;
        Some(self.items[self.len])
    }

    /// Returns the value `depth` entries below the top (0 = top).
    #[inline(always)]
    pub(super) fn peek(&self, depth: usize) -> Option<T> {
        let idx = self.len.checked_sub(depth + 1)?;
        Some(self.items[idx])
    }

    /// Drops the top `count` values. Callers check the length first.
    #[inline(always)]
    pub(super) fn discard(&mut self, count: usize) {
        debug_assert!(count <= self.len);
        self.len -= count;
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Live values, bottom first.
    pub(super) fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = BoundedStack::<i32, 4>::new();
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        stack.push(3).unwrap();
        assert_eq!(stack.as_slice(), &[1, 2, 3]);
        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn push_rejects_past_capacity() {
        let mut stack = BoundedStack::<usize, 2>::new();
        stack.push(10).unwrap();
        stack.push(20).unwrap();
        assert_eq!(stack.push(30), Err(30));
        assert_eq!(stack.as_slice(), &[10, 20]);
    }

    #[test]
    fn pop_and_peek_on_empty() {
        let mut stack = BoundedStack::<i32, 2>::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.peek(0), None);
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn peek_by_depth_and_discard() {
        let mut stack = BoundedStack::<i32, 8>::new();
        for v in [4, 5, 6] {
            stack.push(v).unwrap();
        }
        assert_eq!(stack.peek(0), Some(6));
        assert_eq!(stack.peek(2), Some(4));
        assert_eq!(stack.peek(3), None);
        stack.discard(2);
        assert_eq!(stack.as_slice(), &[4]);
    }
}
