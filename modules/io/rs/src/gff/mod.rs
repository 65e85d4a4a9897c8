// Format specification: https://github.com/The-Sequence-Ontology/Specifications/blob/master/gff3.md

// Columns (tab-separated):
// 1. seqid
// 2. source
// 3. type
// 4. start: 1-based, inclusive
// 5. end: 1-based, inclusive, start <= end
// 6. score: float | .
// 7. strand: [+|-|.|?]
// 8. phase: [0|1|2|.]
// 9. attributes: key=value pairs separated by ';', values may be %-escaped

// Lines starting with '#' are comments or directives; '##FASTA' ends the feature section.

mod reader;
mod record;

pub use reader::Reader;
pub use record::Record;
