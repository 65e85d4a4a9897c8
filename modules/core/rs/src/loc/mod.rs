pub use interval::Interval;
pub use orientation::Orientation;

mod interval;
mod orientation;
