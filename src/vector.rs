use crate::ErrorKind;
use heapless::Vec as HeaplessVec;

/// Output buffer abstraction, so register reads and frame encoding can fill either a growable
/// [`Vec`] or a fixed-capacity [`heapless::Vec`]
///
/// Pushing past the capacity of a fixed buffer fails with [`ErrorKind::PayloadTooLarge`].
pub trait VectorTrait<T: Copy> {
    fn push(&mut self, value: T) -> Result<(), ErrorKind>;
    fn extend(&mut self, other: &[T]) -> Result<(), ErrorKind>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn clear(&mut self);
    fn as_slice(&self) -> &[T];
}

impl<T: Copy> VectorTrait<T> for Vec<T> {
    #[inline]
    fn push(&mut self, value: T) -> Result<(), ErrorKind> {
        Vec::push(self, value);
        Ok(())
    }
    #[inline]
    fn extend(&mut self, values: &[T]) -> Result<(), ErrorKind> {
        Vec::extend_from_slice(self, values);
        Ok(())
    }
    #[inline]
    fn len(&self) -> usize {
        Vec::len(self)
    }
    #[inline]
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
    #[inline]
    fn clear(&mut self) {
        Vec::clear(self);
    }
    #[inline]
    fn as_slice(&self) -> &[T] {
        Vec::as_slice(self)
    }
}

impl<T: Copy, const N: usize> VectorTrait<T> for HeaplessVec<T, N> {
    #[inline]
    fn push(&mut self, value: T) -> Result<(), ErrorKind> {
        HeaplessVec::push(self, value).map_err(|_| ErrorKind::PayloadTooLarge(N + 1))
    }
    #[inline]
    fn extend(&mut self, values: &[T]) -> Result<(), ErrorKind> {
        let wanted = <[T]>::len(self) + values.len();
        self.extend_from_slice(values)
            .map_err(|_| ErrorKind::PayloadTooLarge(wanted))
    }
    #[inline]
    fn len(&self) -> usize {
        <[T]>::len(self)
    }
    #[inline]
    fn is_empty(&self) -> bool {
        <[T]>::is_empty(self)
    }
    #[inline]
    fn clear(&mut self) {
        HeaplessVec::clear(self);
    }
    #[inline]
    fn as_slice(&self) -> &[T] {
        HeaplessVec::as_slice(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heapless_capacity_is_enforced() {
        let mut buf: HeaplessVec<u8, 4> = HeaplessVec::new();
        VectorTrait::extend(&mut buf, &[1, 2, 3]).unwrap();
        VectorTrait::push(&mut buf, 4).unwrap();
        assert_eq!(VectorTrait::push(&mut buf, 5), Err(ErrorKind::PayloadTooLarge(5)));
        assert_eq!(
            VectorTrait::extend(&mut buf, &[5, 6]),
            Err(ErrorKind::PayloadTooLarge(6))
        );
        assert_eq!(VectorTrait::as_slice(&buf), &[1, 2, 3, 4]);
    }
}
