pub use builder::ReaderBuilder;
pub use loaded::Loaded;
pub use reader::Reader;
pub use record::{AlignmentRecord, FlagFilter};
pub use traits::{AlignmentSource, Batches};

mod builder;
mod indexed_reader;
mod loaded;
mod query;
mod reader;
mod record;
mod traits;
