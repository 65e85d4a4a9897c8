use std::fmt::{Debug, Display};

/// T values are primitive integers
pub trait PrimInt: ::num::PrimInt + Debug + Display + Default {}
impl<T: ::num::PrimInt + Debug + Display + Default> PrimInt for T {}

/// T values are non-negative primitive integers
pub trait PrimUInt: PrimInt + ::num::Unsigned {}

impl<T: PrimInt + ::num::Unsigned> PrimUInt for T {}
