use futures_io::AsyncRead;
use std::fmt;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const STSD: &[u8; 4] = b"stsd";

/// Sample Description Box (stsd) - ISO/IEC 14496-12
/// One description per sample entry format used by the track. Entry bodies
/// (codec configuration and the like) are carried opaquely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleDescriptionBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub entries: Vec<SampleEntry>,
}

/// A single sample description entry: its format fourcc plus the opaque body
/// bytes following the entry header.
#[derive(Clone, PartialEq, Eq)]
pub struct SampleEntry {
    pub format: FourCC,
    pub body: Vec<u8>,
}

impl SampleEntry {
    pub fn new(format: FourCC, body: Vec<u8>) -> Self {
        Self { format, body }
    }
}

impl fmt::Debug for SampleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SampleEntry({}, {} bytes)", self.format, self.body.len())
    }
}

impl From<Vec<SampleEntry>> for SampleDescriptionBox {
    fn from(entries: Vec<SampleEntry>) -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            entries,
        }
    }
}

impl ParseBox for SampleDescriptionBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != STSD {
            return Err(ParseError::new_unexpected_box(box_type, STSD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_stsd_data(&data)
    }
}

impl SerializeBox for SampleDescriptionBox {
    fn box_type(&self) -> FourCC {
        FourCC(*STSD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.entries.len())
                .expect("stsd entries len must fit in u32")
                .to_be_bytes(),
        );

        for entry in self.entries {
            let entry_size = 8 + entry.body.len();
            data.extend(
                u32::try_from(entry_size)
                    .expect("stsd entry size must fit in u32")
                    .to_be_bytes(),
            );
            data.extend(entry.format.into_bytes());
            data.extend(entry.body);
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::trace,
        error::StrContext,
        token::take,
        ModalResult, Parser,
    };

    use super::{SampleDescriptionBox, SampleEntry};
    use crate::boxes::util::parser::{flags3, fourcc, stream, version, Stream};

    pub fn parse_stsd_data(input: &[u8]) -> Result<SampleDescriptionBox, crate::ParseError> {
        parse_stsd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_stsd_data_inner(input: &mut Stream<'_>) -> ModalResult<SampleDescriptionBox> {
        trace("stsd", move |input: &mut Stream<'_>| {
            let box_version = version.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let entry_count = be_u32
                .context(StrContext::Label("entry_count"))
                .parse_next(input)?;

            let mut entries = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let size = be_u32
                    .verify(|size| *size >= 8)
                    .context(StrContext::Label("entry_size"))
                    .parse_next(input)?;
                let format = fourcc
                    .context(StrContext::Label("format"))
                    .parse_next(input)?;
                let body = take(size as usize - 8).parse_next(input)?.to_vec();
                entries.push(SampleEntry { format, body });
            }

            Ok(SampleDescriptionBox {
                version: box_version,
                flags,
                entries,
            })
        })
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_stsd_roundtrip() {
        let stsd = SampleDescriptionBox::from(vec![SampleEntry::new(
            FourCC(*b"mp4a"),
            vec![0u8; 28],
        )]);
        assert_eq!(roundtrip_body(stsd.clone()), stsd);
    }

    #[test]
    fn test_stsd_roundtrip_multiple_entries() {
        let stsd = SampleDescriptionBox::from(vec![
            SampleEntry::new(FourCC(*b"avc1"), vec![1u8; 70]),
            SampleEntry::new(FourCC(*b"avc1"), vec![2u8; 70]),
        ]);
        assert_eq!(roundtrip_body(stsd.clone()), stsd);
    }
}
