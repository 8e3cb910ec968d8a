pub mod accumulator;
pub mod collector;
pub mod corpus;
pub mod export;

pub use accumulator::{ReadingAccumulator, ReadingFlags, ReadingStats};
pub use collector::{BookEvidence, ChapterEvidence, RubyPair, collect_chapter};
pub use corpus::{CorpusDictionary, CorpusEntry, CorpusError};
pub use export::{RubyEvidenceEntry, export_evidence, write_evidence};
