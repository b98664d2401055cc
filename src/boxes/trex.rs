use bon::Builder;
use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const TREX: &[u8; 4] = b"trex";

/// Track Extends Box (trex) - ISO/IEC 14496-12
/// Per-track defaults used by track fragments, carried inside `mvex`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct TrackExtendsBox {
    #[builder(default = 0)]
    pub version: u8,
    #[builder(default = [0u8; 3])]
    pub flags: [u8; 3],
    pub track_id: u32,
    #[builder(default = 1)]
    pub default_sample_description_index: u32,
    #[builder(default = 0)]
    pub default_sample_duration: u32,
    #[builder(default = 0)]
    pub default_sample_size: u32,
    #[builder(default = 0)]
    pub default_sample_flags: u32,
}

impl ParseBox for TrackExtendsBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != TREX {
            return Err(ParseError::new_unexpected_box(box_type, TREX));
        }
        let data = read_to_end(reader).await?;
        parser::parse_trex_data(&data)
    }
}

impl SerializeBox for TrackExtendsBox {
    fn box_type(&self) -> FourCC {
        FourCC(*TREX)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(self.track_id.to_be_bytes());
        data.extend(self.default_sample_description_index.to_be_bytes());
        data.extend(self.default_sample_duration.to_be_bytes());
        data.extend(self.default_sample_size.to_be_bytes());
        data.extend(self.default_sample_flags.to_be_bytes());

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

    use super::TrackExtendsBox;
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_trex_data(input: &[u8]) -> Result<TrackExtendsBox, crate::ParseError> {
        parse_trex_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_trex_data_inner(input: &mut Stream<'_>) -> ModalResult<TrackExtendsBox> {
        trace(
            "trex",
            seq!(TrackExtendsBox {
                version: version,
                flags: flags3,
                track_id: be_u32.context(StrContext::Label("track_id")),
                default_sample_description_index: be_u32
                    .context(StrContext::Label("default_sample_description_index")),
                default_sample_duration: be_u32
                    .context(StrContext::Label("default_sample_duration")),
                default_sample_size: be_u32.context(StrContext::Label("default_sample_size")),
                default_sample_flags: be_u32.context(StrContext::Label("default_sample_flags")),
            })
            .context(StrContext::Label("trex")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_trex_roundtrip() {
        let trex = TrackExtendsBox::builder()
            .track_id(2)
            .default_sample_duration(1024)
            .build();
        assert_eq!(roundtrip_body(trex.clone()), trex);
    }
}
