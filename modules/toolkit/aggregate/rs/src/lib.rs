pub use config::{Config, ConfigBuilder};
pub use engine::{Aggregator, Canceller};
pub use error::{Error, Result};
pub use filter::{is_retained, AlignmentFilter, EXCLUDED_FLAGS};
pub use matrix::ProfileBuilder;
pub use profile::{GeneProfile, Matrix, Summary, Tally};
pub use resolver::GeneModelResolver;
pub use store::ProfileStore;
pub use validator::{Mismatch, ValidationReport, Validator};
pub use window::{Convention, GeneWindow};
pub use writer::ProfileWriter;

mod config;
mod engine;
mod error;
mod filter;
pub mod layout;
mod matrix;
mod profile;
mod resolver;
mod store;
mod validator;
mod window;
mod worker;
mod writer;
