pub use lending_iterator::LendingIterator;

mod lending_iterator;
pub mod loc;
pub mod num;
pub mod parallelism;
