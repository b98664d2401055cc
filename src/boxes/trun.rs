use futures_io::AsyncRead;
use std::fmt;

use crate::{
    boxes::{
        util::{read_to_end, DebugList},
        FourCC,
    },
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const TRUN: &[u8; 4] = b"trun";

pub const TRUN_DATA_OFFSET: u32 = 0x000001;
pub const TRUN_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
pub const TRUN_SAMPLE_DURATION: u32 = 0x000100;
pub const TRUN_SAMPLE_SIZE: u32 = 0x000200;
pub const TRUN_SAMPLE_FLAGS: u32 = 0x000400;
pub const TRUN_SAMPLE_CTS_OFFSET: u32 = 0x000800;

/// Sample flags value marking a non-sync sample (sample_depends_on = 1,
/// sample_is_non_sync_sample = 1).
pub const SAMPLE_FLAGS_NON_SYNC: u32 = 0x0101_0000;
/// Sample flags value marking a sync sample (sample_depends_on = 2).
pub const SAMPLE_FLAGS_SYNC: u32 = 0x0200_0000;

/// Per-sample values within a run. Each field is present when the matching
/// tr_flags bit is set; presence must be uniform across a run's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRunEntry {
    pub duration: Option<u32>,
    pub size: Option<u32>,
    pub flags: Option<u32>,
    /// Signed requires version 1
    pub cts_offset: Option<i64>,
}

#[derive(Default, Clone, PartialEq, Eq)]
pub struct TrackRunEntries(Vec<TrackRunEntry>);

impl From<Vec<TrackRunEntry>> for TrackRunEntries {
    fn from(entries: Vec<TrackRunEntry>) -> Self {
        Self(entries)
    }
}

impl std::ops::Deref for TrackRunEntries {
    type Target = Vec<TrackRunEntry>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for TrackRunEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Track Fragment Run Box (trun) - ISO/IEC 14496-12
/// A contiguous run of samples within a fragment. The tr_flags bits are
/// derived from which optional fields are populated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackRunBox {
    pub version: u8,
    /// Offset from the fragment's base data offset (the start of the moof
    /// when default-base-is-moof is used) to this run's first sample byte
    pub data_offset: Option<i32>,
    /// Overrides the flags of the first sample only
    pub first_sample_flags: Option<u32>,
    pub entries: TrackRunEntries,
}

impl TrackRunBox {
    pub fn sample_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn tr_flags(&self) -> u32 {
        let mut flags = 0;
        if self.data_offset.is_some() {
            flags |= TRUN_DATA_OFFSET;
        }
        if self.first_sample_flags.is_some() {
            flags |= TRUN_FIRST_SAMPLE_FLAGS;
        }
        if let Some(first) = self.entries.first() {
            if first.duration.is_some() {
                flags |= TRUN_SAMPLE_DURATION;
            }
            if first.size.is_some() {
                flags |= TRUN_SAMPLE_SIZE;
            }
            if first.flags.is_some() {
                flags |= TRUN_SAMPLE_FLAGS;
            }
            if first.cts_offset.is_some() {
                flags |= TRUN_SAMPLE_CTS_OFFSET;
            }
        }
        flags
    }

    /// Total payload bytes covered by this run.
    pub fn total_sample_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.size.unwrap_or(0) as u64)
            .sum()
    }
}

impl ParseBox for TrackRunBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != TRUN {
            return Err(ParseError::new_unexpected_box(box_type, TRUN));
        }
        let data = read_to_end(reader).await?;
        parser::parse_trun_data(&data)
    }
}

impl SerializeBox for TrackRunBox {
    fn box_type(&self) -> FourCC {
        FourCC(*TRUN)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let flags = self.tr_flags();
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(&flags.to_be_bytes()[1..4]);
        data.extend(self.sample_count().to_be_bytes());

        if let Some(data_offset) = self.data_offset {
            data.extend(data_offset.to_be_bytes());
        }
        if let Some(first_sample_flags) = self.first_sample_flags {
            data.extend(first_sample_flags.to_be_bytes());
        }

        let version = self.version;
        for entry in self.entries.0.into_iter() {
            if let Some(duration) = entry.duration {
                data.extend(duration.to_be_bytes());
            }
            if let Some(size) = entry.size {
                data.extend(size.to_be_bytes());
            }
            if let Some(sample_flags) = entry.flags {
                data.extend(sample_flags.to_be_bytes());
            }
            if let Some(cts_offset) = entry.cts_offset {
                if version == 0 {
                    data.extend(
                        u32::try_from(cts_offset)
                            .expect("version 0 trun cts offsets must be unsigned")
                            .to_be_bytes(),
                    );
                } else {
                    data.extend(
                        i32::try_from(cts_offset)
                            .expect("trun cts offset must fit in i32")
                            .to_be_bytes(),
                    );
                }
            }
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_i32, be_u32},
        combinator::{cond, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::*;
    use crate::boxes::util::parser::{flags3, stream, version_0_or_1, Stream};

    pub fn parse_trun_data(input: &[u8]) -> Result<TrackRunBox, crate::ParseError> {
        parse_trun_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_trun_data_inner(input: &mut Stream<'_>) -> ModalResult<TrackRunBox> {
        trace("trun", move |input: &mut Stream<'_>| {
            let version = version_0_or_1.parse_next(input)?;
            let flags3 = flags3.parse_next(input)?;
            let flags = u32::from_be_bytes([0, flags3[0], flags3[1], flags3[2]]);
            let sample_count = be_u32
                .context(StrContext::Label("sample_count"))
                .parse_next(input)?;
            let data_offset = cond(flags & TRUN_DATA_OFFSET != 0, be_i32)
                .context(StrContext::Label("data_offset"))
                .parse_next(input)?;
            let first_sample_flags = cond(flags & TRUN_FIRST_SAMPLE_FLAGS != 0, be_u32)
                .context(StrContext::Label("first_sample_flags"))
                .parse_next(input)?;

            let mut entries = Vec::with_capacity(sample_count as usize);
            for _ in 0..sample_count {
                let duration = cond(flags & TRUN_SAMPLE_DURATION != 0, be_u32)
                    .context(StrContext::Label("sample_duration"))
                    .parse_next(input)?;
                let size = cond(flags & TRUN_SAMPLE_SIZE != 0, be_u32)
                    .context(StrContext::Label("sample_size"))
                    .parse_next(input)?;
                let sample_flags = cond(flags & TRUN_SAMPLE_FLAGS != 0, be_u32)
                    .context(StrContext::Label("sample_flags"))
                    .parse_next(input)?;
                let cts_offset = if flags & TRUN_SAMPLE_CTS_OFFSET != 0 {
                    if version == 0 {
                        Some(be_u32.map(|v| v as i64).parse_next(input)?)
                    } else {
                        Some(be_i32.map(|v| v as i64).parse_next(input)?)
                    }
                } else {
                    None
                };
                entries.push(TrackRunEntry {
                    duration,
                    size,
                    flags: sample_flags,
                    cts_offset,
                });
            }

            Ok(TrackRunBox {
                version,
                data_offset,
                first_sample_flags,
                entries: TrackRunEntries(entries),
            })
        })
        .parse_next(input)
    }
}
