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

pub const STSS: &[u8; 4] = b"stss";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct SyncSampleNumbers(Vec<u32>);

impl From<Vec<u32>> for SyncSampleNumbers {
    fn from(value: Vec<u32>) -> Self {
        Self(value)
    }
}

impl SyncSampleNumbers {
    pub fn inner(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Debug for SyncSampleNumbers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Sync Sample Box (stss) - ISO/IEC 14496-12
/// Lists the 1-based numbers of samples that are random access points.
/// When absent, every sample is a sync sample.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SyncSampleBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub sample_numbers: SyncSampleNumbers,
}

impl SyncSampleBox {
    pub fn new(sample_numbers: Vec<u32>) -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            sample_numbers: sample_numbers.into(),
        }
    }
}

impl ParseBox for SyncSampleBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != STSS {
            return Err(ParseError::new_unexpected_box(box_type, STSS));
        }
        let data = read_to_end(reader).await?;
        parser::parse_stss_data(&data)
    }
}

impl SerializeBox for SyncSampleBox {
    fn box_type(&self) -> FourCC {
        FourCC(*STSS)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.sample_numbers.len())
                .expect("stss entries len must fit in u32")
                .to_be_bytes(),
        );
        for sample_number in self.sample_numbers.0.into_iter() {
            data.extend(sample_number.to_be_bytes());
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

    use super::{SyncSampleBox, SyncSampleNumbers};
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_stss_data(input: &[u8]) -> Result<SyncSampleBox, crate::ParseError> {
        parse_stss_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_stss_data_inner(input: &mut Stream<'_>) -> ModalResult<SyncSampleBox> {
        trace(
            "stss",
            seq!(SyncSampleBox {
                version: version,
                flags: flags3,
                sample_numbers: length_repeat(be_u32, be_u32)
                    .map(SyncSampleNumbers)
                    .context(StrContext::Label("sample_numbers")),
            })
            .context(StrContext::Label("stss")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_stss_roundtrip() {
        let stss = SyncSampleBox::new(vec![1, 31, 61, 91]);
        assert_eq!(roundtrip_body(stss.clone()), stss);
    }

    #[test]
    fn test_stss_empty_roundtrip() {
        let stss = SyncSampleBox::default();
        assert_eq!(roundtrip_body(stss.clone()), stss);
    }
}
