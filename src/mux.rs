/*!
 * Sample multiplexing for the writer paths.
 *
 * A [`SampleStore`] accepts samples from any number of tracks in arrival
 * order, appends their payload to a [`SampleSink`] immediately, and defers
 * reordering to query time. Flat-file writers take the offset-rewritten
 * metadata table from [`SampleStore::sample_metadata`]; fragmented writers
 * drain payload per fragment through [`SampleStore::stored_samples`]. The
 * [`Interleaver`] decides the logical order in both cases.
 */

mod interleave;
mod sample;
mod sink;
mod store;

pub use interleave::Interleaver;
pub use sample::{Sample, SampleGroup, SampleGroupKind, SampleMetadata};
pub use sink::{FileSink, MemorySink, SampleSink, SinkError};
pub use store::{SampleStore, StoreError};
