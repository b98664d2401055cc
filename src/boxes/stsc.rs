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

pub const STSC: &[u8; 4] = b"stsc";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct SampleToChunkEntries(Vec<SampleToChunkEntry>);

impl From<Vec<SampleToChunkEntry>> for SampleToChunkEntries {
    fn from(entries: Vec<SampleToChunkEntry>) -> Self {
        Self(entries)
    }
}

impl fmt::Debug for SampleToChunkEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Describes a run of chunks sharing the same sample count
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct SampleToChunkEntry {
    /// 1-based number of the first chunk in this run
    pub first_chunk: u32,
    /// Number of samples in each chunk of this run
    pub samples_per_chunk: u32,
    /// 1-based index into the sample description table
    #[builder(default = 1)]
    pub sample_description_index: u32,
}

/// Sample-to-Chunk Box (stsc) - ISO/IEC 14496-12
/// Maps samples to the chunks that contain them, run-length compressed.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SampleToChunkBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub entries: SampleToChunkEntries,
}

impl From<Vec<SampleToChunkEntry>> for SampleToChunkBox {
    fn from(entries: Vec<SampleToChunkEntry>) -> Self {
        SampleToChunkBox {
            version: 0,
            flags: [0u8; 3],
            entries: entries.into(),
        }
    }
}

impl ParseBox for SampleToChunkBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != STSC {
            return Err(ParseError::new_unexpected_box(box_type, STSC));
        }
        let data = read_to_end(reader).await?;
        parser::parse_stsc_data(&data)
    }
}

impl SerializeBox for SampleToChunkBox {
    fn box_type(&self) -> FourCC {
        FourCC(*STSC)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.entries.len())
                .expect("stsc entries len must fit in u32")
                .to_be_bytes(),
        );

        for entry in self.entries.0.into_iter() {
            data.extend(entry.first_chunk.to_be_bytes());
            data.extend(entry.samples_per_chunk.to_be_bytes());
            data.extend(entry.sample_description_index.to_be_bytes());
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

    use super::{SampleToChunkBox, SampleToChunkEntries, SampleToChunkEntry};
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_stsc_data(input: &[u8]) -> Result<SampleToChunkBox, crate::ParseError> {
        parse_stsc_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_stsc_data_inner(input: &mut Stream<'_>) -> ModalResult<SampleToChunkBox> {
        trace(
            "stsc",
            seq!(SampleToChunkBox {
                version: version,
                flags: flags3,
                entries: length_repeat(be_u32, entry)
                    .map(SampleToChunkEntries)
                    .context(StrContext::Label("entries")),
            })
            .context(StrContext::Label("stsc")),
        )
        .parse_next(input)
    }

    fn entry(input: &mut Stream<'_>) -> ModalResult<SampleToChunkEntry> {
        trace(
            "entry",
            seq!(SampleToChunkEntry {
                first_chunk: be_u32.context(StrContext::Label("first_chunk")),
                samples_per_chunk: be_u32.context(StrContext::Label("samples_per_chunk")),
                sample_description_index: be_u32
                    .context(StrContext::Label("sample_description_index")),
            })
            .context(StrContext::Label("entry")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_stsc_roundtrip() {
        let stsc = SampleToChunkBox::from(vec![
            SampleToChunkEntry {
                first_chunk: 1,
                samples_per_chunk: 2,
                sample_description_index: 1,
            },
            SampleToChunkEntry {
                first_chunk: 3,
                samples_per_chunk: 3,
                sample_description_index: 1,
            },
        ]);
        assert_eq!(roundtrip_body(stsc.clone()), stsc);
    }
}
