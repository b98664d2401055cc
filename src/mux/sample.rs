use bon::Builder;

use crate::boxes::FourCC;

/// Kind of sample group a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleGroupKind {
    /// Audio roll recovery ('roll')
    Roll,
    /// Audio pre-roll ('prol')
    Prol,
    /// Stream access point ('sap ')
    Sap,
}

impl SampleGroupKind {
    pub fn grouping_type(&self) -> FourCC {
        match self {
            SampleGroupKind::Roll => FourCC(*b"roll"),
            SampleGroupKind::Prol => FourCC(*b"prol"),
            SampleGroupKind::Sap => FourCC(*b"sap "),
        }
    }
}

/// Sample group membership: the group kind plus its small integer payload
/// (roll distance for roll/prol, SAP type for sap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGroup {
    pub kind: SampleGroupKind,
    pub value: i16,
}

impl SampleGroup {
    pub fn new(kind: SampleGroupKind, value: i16) -> Self {
        Self { kind, value }
    }
}

/// One media sample as handed to [`crate::mux::SampleStore::add_sample`]:
/// its payload plus the per-sample timing and grouping metadata.
#[derive(Debug, Clone, Builder)]
pub struct Sample {
    /// The encoded payload bytes
    #[builder(into)]
    pub data: Vec<u8>,
    /// Duration in track timescale ticks
    pub duration: u64,
    /// Composition time offset (PTS - DTS) in track timescale ticks
    #[builder(default = 0)]
    pub cts_offset: i64,
    /// Whether this sample is a random access point
    #[builder(default = false)]
    pub is_sync: bool,
    /// 0 for non-fragmented output; fragments are numbered from 1 and a
    /// track's samples must advance through fragments monotonically
    #[builder(default = 0)]
    pub fragment_number: u32,
    /// Optional sample group membership
    pub sample_group: Option<SampleGroup>,
}

/// The per-sample record kept by the store: where the payload physically
/// lives plus everything needed to index it later.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMetadata {
    /// Byte offset of the payload within the sink. Strictly increasing and
    /// gap-free in arrival order; rewritten only when an interleaver is asked
    /// to pack records back-to-back in the new order.
    pub offset: u64,
    /// Payload byte length
    pub size: u64,
    /// Duration in track timescale ticks
    pub duration: u64,
    /// Composition time offset (PTS - DTS) in track timescale ticks
    pub cts_offset: i64,
    /// Annotation slot used by readers; the writer path always records 0
    pub extra: u64,
    /// 0 means not fragmented, otherwise the 1-based fragment number
    pub fragment_number: u32,
    pub is_sync: bool,
    pub track_id: u32,
    /// Track timescale, needed to convert durations to wall-clock time
    pub timescale: u32,
    pub sample_group: Option<SampleGroup>,
}
