use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const SMHD: &[u8; 4] = b"smhd";

/// Sound Media Header Box (smhd) - ISO/IEC 14496-12
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoundMediaHeaderBox {
    pub version: u8,
    pub flags: [u8; 3],
    /// Stereo balance: 0.0 is centred, -1.0 full left, 1.0 full right
    pub balance: f32,
}

impl ParseBox for SoundMediaHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != SMHD {
            return Err(ParseError::new_unexpected_box(box_type, SMHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_smhd_data(&data)
    }
}

impl SerializeBox for SoundMediaHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*SMHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(crate::boxes::util::serializer::signed_fixed_point_8x8(
            self.balance,
        ));
        data.extend([0u8; 2]); // reserved

        data
    }
}

mod parser {
    use winnow::{combinator::trace, error::StrContext, token::take, ModalResult, Parser};

    use super::SoundMediaHeaderBox;
    use crate::boxes::util::parser::{flags3, signed_fixed_point_8x8, stream, version, Stream};

    pub fn parse_smhd_data(input: &[u8]) -> Result<SoundMediaHeaderBox, crate::ParseError> {
        parse_smhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_smhd_data_inner(input: &mut Stream<'_>) -> ModalResult<SoundMediaHeaderBox> {
        trace("smhd", move |input: &mut Stream<'_>| {
            let version = version.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let balance = signed_fixed_point_8x8
                .context(StrContext::Label("balance"))
                .parse_next(input)?;
            let _ = take(2usize).parse_next(input)?; // reserved

            Ok(SoundMediaHeaderBox {
                version,
                flags,
                balance,
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
    fn test_smhd_roundtrip() {
        let smhd = SoundMediaHeaderBox {
            balance: -0.5,
            ..Default::default()
        };
        assert_eq!(roundtrip_body(smhd.clone()), smhd);
    }
}
