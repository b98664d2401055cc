use bon::Builder;
use derive_more::{Deref, DerefMut};
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

pub const STTS: &[u8; 4] = b"stts";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct TimeToSampleEntries(Vec<TimeToSampleEntry>);

impl From<Vec<TimeToSampleEntry>> for TimeToSampleEntries {
    fn from(entries: Vec<TimeToSampleEntry>) -> Self {
        Self(entries)
    }
}

impl TimeToSampleEntries {
    pub fn inner(&self) -> &[TimeToSampleEntry] {
        &self.0
    }
}

impl fmt::Debug for TimeToSampleEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Defines duration for a consecutive group of samples
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct TimeToSampleEntry {
    /// Number of consecutive samples with the same duration
    pub sample_count: u32,
    /// Duration of each sample in timescale units (see the mdhd box)
    pub sample_duration: u32,
}

/// Time-to-Sample Box (stts) - ISO/IEC 14496-12
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct TimeToSampleBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub entries: TimeToSampleEntries,
}

impl TimeToSampleBox {
    /// Total duration covered by all entries, in timescale units.
    pub fn total_duration(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.sample_count as u64 * entry.sample_duration as u64)
            .sum()
    }

    /// Total number of samples covered by all entries.
    pub fn sample_count(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.sample_count as u64)
            .sum()
    }
}

impl From<Vec<TimeToSampleEntry>> for TimeToSampleBox {
    fn from(entries: Vec<TimeToSampleEntry>) -> Self {
        TimeToSampleBox {
            version: 0,
            flags: [0u8; 3],
            entries: entries.into(),
        }
    }
}

impl ParseBox for TimeToSampleBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != STTS {
            return Err(ParseError::new_unexpected_box(box_type, STTS));
        }
        let data = read_to_end(reader).await?;
        parser::parse_stts_data(&data)
    }
}

impl SerializeBox for TimeToSampleBox {
    fn box_type(&self) -> FourCC {
        FourCC(*STTS)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.entries.len())
                .expect("stts entries len must fit in u32")
                .to_be_bytes(),
        );

        for entry in self.entries.0.into_iter() {
            data.extend(entry.sample_count.to_be_bytes());
            data.extend(entry.sample_duration.to_be_bytes());
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_u32, length_repeat},
        combinator::{seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::{TimeToSampleBox, TimeToSampleEntries, TimeToSampleEntry};
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_stts_data(input: &[u8]) -> Result<TimeToSampleBox, crate::ParseError> {
        parse_stts_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_stts_data_inner(input: &mut Stream<'_>) -> ModalResult<TimeToSampleBox> {
        trace(
            "stts",
            seq!(TimeToSampleBox {
                version: version,
                flags: flags3,
                entries: length_repeat(be_u32, entry)
                    .map(TimeToSampleEntries)
                    .context(StrContext::Label("entries")),
            })
            .context(StrContext::Label("stts")),
        )
        .parse_next(input)
    }

    fn entry(input: &mut Stream<'_>) -> ModalResult<TimeToSampleEntry> {
        trace(
            "entry",
            seq!(TimeToSampleEntry {
                sample_count: be_u32.context(StrContext::Label("sample_count")),
                sample_duration: be_u32.context(StrContext::Label("sample_duration")),
            })
            .context(StrContext::Label("entry")),
        )
        .parse_next(input)
    }
}
