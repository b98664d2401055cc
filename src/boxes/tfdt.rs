use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const TFDT: &[u8; 4] = b"tfdt";

/// Track Fragment Decode Time Box (tfdt) - ISO/IEC 14496-12
/// The decode time of the first sample in a track fragment, in the track's
/// media timescale, summed over all preceding fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFragmentDecodeTimeBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub base_media_decode_time: u64,
}

impl TrackFragmentDecodeTimeBox {
    pub fn new(base_media_decode_time: u64) -> Self {
        let version = if base_media_decode_time > u32::MAX as u64 {
            1
        } else {
            0
        };
        Self {
            version,
            flags: [0u8; 3],
            base_media_decode_time,
        }
    }
}

impl ParseBox for TrackFragmentDecodeTimeBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != TFDT {
            return Err(ParseError::new_unexpected_box(box_type, TFDT));
        }
        let data = read_to_end(reader).await?;
        parser::parse_tfdt_data(&data)
    }
}

impl SerializeBox for TrackFragmentDecodeTimeBox {
    fn box_type(&self) -> FourCC {
        FourCC(*TFDT)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(crate::boxes::util::serializer::versioned_be_u64(
            self.version,
            self.base_media_decode_time,
        ));

        data
    }
}

mod parser {
    use winnow::{combinator::trace, ModalResult, Parser};

    use super::TrackFragmentDecodeTimeBox;
    use crate::boxes::util::parser::{flags3, stream, version_0_or_1, versioned_be_u64, Stream};

    pub fn parse_tfdt_data(input: &[u8]) -> Result<TrackFragmentDecodeTimeBox, crate::ParseError> {
        parse_tfdt_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_tfdt_data_inner(input: &mut Stream<'_>) -> ModalResult<TrackFragmentDecodeTimeBox> {
        trace("tfdt", move |input: &mut Stream<'_>| {
            let version = version_0_or_1.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let base_media_decode_time = versioned_be_u64(version).parse_next(input)?;
            Ok(TrackFragmentDecodeTimeBox {
                version,
                flags,
                base_media_decode_time,
            })
        })
        .parse_next(input)
    }
}
