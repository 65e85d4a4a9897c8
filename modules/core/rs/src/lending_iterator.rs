use ::impl_tools::autoimpl;
use higher_kinded_types::prelude::*;

/// An iterator whose items may borrow from the iterator itself.
///
/// Alignment readers use it to hand out batches that live in an internal, reusable buffer:
/// each call to `next` invalidates the previously returned batch.
#[autoimpl(for <T: trait + ?Sized> &mut T, Box <T>)]
pub trait LendingIterator {
    type Item: ForLt;

    fn next(&mut self) -> Option<<Self::Item as ForLt>::Of<'_>>;
}
