pub mod bam;
pub mod compression;
pub mod gff;
pub mod store;
