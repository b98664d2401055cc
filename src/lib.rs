pub mod boxes;
pub mod fragment;
pub mod movie;
pub mod mux;
pub mod parser;
pub mod table;
pub mod writer;

pub use boxes::{BoxData, BoxHeader, FourCC, Mp4Box};
pub use fragment::FragmentWriter;
pub use movie::{MediaKind, MovieWriteError, MovieWriter, TrackConfig};
pub use mux::{
    FileSink, Interleaver, MemorySink, Sample, SampleGroup, SampleGroupKind, SampleMetadata,
    SampleSink, SampleStore, SinkError, StoreError,
};
pub use parser::{ParseError, ParseEvent, Parser};
pub use writer::{BoxWriter, SerializeBox, WriteError};
