use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const MFHD: &[u8; 4] = b"mfhd";

/// Movie Fragment Header Box (mfhd) - ISO/IEC 14496-12
/// Carries the sequence number of a movie fragment, increasing per fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieFragmentHeaderBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub sequence_number: u32,
}

impl MovieFragmentHeaderBox {
    pub fn new(sequence_number: u32) -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            sequence_number,
        }
    }
}

impl ParseBox for MovieFragmentHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != MFHD {
            return Err(ParseError::new_unexpected_box(box_type, MFHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_mfhd_data(&data)
    }
}

impl SerializeBox for MovieFragmentHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*MFHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(self.sequence_number.to_be_bytes());

        data
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::MovieFragmentHeaderBox;
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_mfhd_data(input: &[u8]) -> Result<MovieFragmentHeaderBox, crate::ParseError> {
        parse_mfhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_mfhd_data_inner(input: &mut Stream<'_>) -> ModalResult<MovieFragmentHeaderBox> {
        trace(
            "mfhd",
            seq!(MovieFragmentHeaderBox {
                version: version,
                flags: flags3,
                sequence_number: be_u32.context(StrContext::Label("sequence_number")),
            })
            .context(StrContext::Label("mfhd")),
        )
        .parse_next(input)
    }
}
