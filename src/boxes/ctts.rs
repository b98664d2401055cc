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

pub const CTTS: &[u8; 4] = b"ctts";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct CompositionOffsetEntries(Vec<CompositionOffsetEntry>);

impl From<Vec<CompositionOffsetEntry>> for CompositionOffsetEntries {
    fn from(entries: Vec<CompositionOffsetEntry>) -> Self {
        Self(entries)
    }
}

impl fmt::Debug for CompositionOffsetEntries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Composition offset for a consecutive group of samples
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct CompositionOffsetEntry {
    /// Number of consecutive samples with the same composition offset
    pub sample_count: u32,
    /// Composition time offset (CT - DT) in timescale units.
    /// Negative values require version 1.
    pub sample_offset: i64,
}

/// Composition Offset Box (ctts) - ISO/IEC 14496-12
/// Maps decode order to composition order when they differ.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct CompositionOffsetBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub entries: CompositionOffsetEntries,
}

impl CompositionOffsetBox {
    /// Builds a version 0 or version 1 box depending on whether any offset is
    /// negative.
    pub fn from_entries(entries: Vec<CompositionOffsetEntry>) -> Self {
        let version = if entries.iter().any(|entry| entry.sample_offset < 0) {
            1
        } else {
            0
        };
        Self {
            version,
            flags: [0u8; 3],
            entries: entries.into(),
        }
    }
}

impl ParseBox for CompositionOffsetBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != CTTS {
            return Err(ParseError::new_unexpected_box(box_type, CTTS));
        }
        let data = read_to_end(reader).await?;
        parser::parse_ctts_data(&data)
    }
}

impl SerializeBox for CompositionOffsetBox {
    fn box_type(&self) -> FourCC {
        FourCC(*CTTS)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.entries.len())
                .expect("ctts entries len must fit in u32")
                .to_be_bytes(),
        );

        for entry in self.entries.0.into_iter() {
            data.extend(entry.sample_count.to_be_bytes());
            if self.version == 0 {
                data.extend(
                    u32::try_from(entry.sample_offset)
                        .expect("version 0 ctts offsets must be unsigned")
                        .to_be_bytes(),
                );
            } else {
                data.extend(
                    i32::try_from(entry.sample_offset)
                        .expect("ctts offset must fit in i32")
                        .to_be_bytes(),
                );
            }
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_u32, length_repeat},
        combinator::trace,
        error::{ContextError, ErrMode, StrContext},
        ModalResult, Parser,
    };

    use super::{CompositionOffsetBox, CompositionOffsetEntries, CompositionOffsetEntry};
    use crate::boxes::util::parser::{
        be_i32_as_i64, be_u32_as_u64, flags3, stream, version_0_or_1, Stream,
    };

    pub fn parse_ctts_data(input: &[u8]) -> Result<CompositionOffsetBox, crate::ParseError> {
        parse_ctts_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_ctts_data_inner(input: &mut Stream<'_>) -> ModalResult<CompositionOffsetBox> {
        trace("ctts", move |input: &mut Stream<'_>| {
            let version = version_0_or_1.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let entries = length_repeat(be_u32, entry(version))
                .context(StrContext::Label("entries"))
                .parse_next(input)?;
            Ok(CompositionOffsetBox {
                version,
                flags,
                entries: CompositionOffsetEntries(entries),
            })
        })
        .parse_next(input)
    }

    fn entry<'i>(
        version: u8,
    ) -> impl Parser<Stream<'i>, CompositionOffsetEntry, ErrMode<ContextError>> {
        trace("entry", move |input: &mut Stream<'i>| {
            let sample_count = be_u32.parse_next(input)?;
            let sample_offset = if version == 0 {
                be_u32_as_u64.map(|v| v as i64).parse_next(input)?
            } else {
                be_i32_as_i64.parse_next(input)?
            };
            Ok(CompositionOffsetEntry {
                sample_count,
                sample_offset,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_ctts_roundtrip_unsigned() {
        let ctts = CompositionOffsetBox::from_entries(vec![
            CompositionOffsetEntry {
                sample_count: 2,
                sample_offset: 1024,
            },
            CompositionOffsetEntry {
                sample_count: 1,
                sample_offset: 0,
            },
        ]);
        assert_eq!(ctts.version, 0);
        assert_eq!(roundtrip_body(ctts.clone()), ctts);
    }

    #[test]
    fn test_ctts_roundtrip_signed() {
        let ctts = CompositionOffsetBox::from_entries(vec![
            CompositionOffsetEntry {
                sample_count: 1,
                sample_offset: -512,
            },
            CompositionOffsetEntry {
                sample_count: 3,
                sample_offset: 512,
            },
        ]);
        assert_eq!(ctts.version, 1);
        assert_eq!(roundtrip_body(ctts.clone()), ctts);
    }
}
