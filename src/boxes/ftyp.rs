use bon::Builder;
use futures_io::AsyncRead;
use std::ops::Deref;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const FTYP: &[u8; 4] = b"ftyp";
pub const STYP: &[u8; 4] = b"styp";

/// File Type Box (ftyp) - ISO/IEC 14496-12
/// Identifies the specifications to which this file complies. The same layout
/// doubles as the Segment Type Box (styp) at the start of a media segment.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct FileTypeBox {
    /// Major brand - identifies the 'best use' of the file
    #[builder(into)]
    pub major_brand: FourCC,
    /// Minor version - an informative integer for the minor version of the major brand
    #[builder(default = Default::default())]
    pub minor_version: u32,
    /// Compatible brands - a list of brands compatible with this file
    #[builder(default = vec![major_brand], into)]
    pub compatible_brands: Vec<FourCC>,
    /// Whether this serializes as a segment type box (styp) instead of ftyp
    #[builder(default = false)]
    pub is_segment: bool,
}

impl Default for FileTypeBox {
    fn default() -> Self {
        Self {
            major_brand: FourCC(*b"isom"),
            minor_version: 512,
            compatible_brands: vec![FourCC(*b"isom"), FourCC(*b"iso2")],
            is_segment: false,
        }
    }
}

impl ParseBox for FileTypeBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        let data = read_to_end(reader).await?;
        match box_type.deref() {
            FTYP => parser::parse_ftyp_data(&data, false),
            STYP => parser::parse_ftyp_data(&data, true),
            _ => Err(ParseError::new_unexpected_box(box_type, FTYP)),
        }
    }
}

impl SerializeBox for FileTypeBox {
    fn box_type(&self) -> FourCC {
        if self.is_segment {
            FourCC(*STYP)
        } else {
            FourCC(*FTYP)
        }
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&self.major_brand.0);
        data.extend_from_slice(&self.minor_version.to_be_bytes());
        for brand in self.compatible_brands {
            data.extend_from_slice(&brand.0);
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{empty, repeat, seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::FileTypeBox;
    use crate::boxes::util::parser::{fourcc, stream, Stream};

    pub fn parse_ftyp_data(input: &[u8], is_segment: bool) -> Result<FileTypeBox, crate::ParseError> {
        (move |input: &mut Stream<'_>| parse_ftyp_data_inner(input, is_segment))
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_ftyp_data_inner(input: &mut Stream<'_>, is_segment: bool) -> ModalResult<FileTypeBox> {
        trace(
            "ftyp",
            seq!(FileTypeBox {
                major_brand: fourcc.context(StrContext::Label("major_brand")),
                minor_version: be_u32.context(StrContext::Label("minor_version")),
                compatible_brands: repeat(0.., fourcc)
                    .context(StrContext::Label("compatible_brands")),
                is_segment: empty.value(is_segment),
            })
            .context(StrContext::Label("ftyp")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_ftyp_roundtrip() {
        let ftyp = FileTypeBox::builder()
            .major_brand(*b"isom")
            .minor_version(512)
            .compatible_brands(vec![FourCC(*b"isom"), FourCC(*b"avc1")])
            .build();
        assert_eq!(roundtrip_body(ftyp.clone()), ftyp);
    }

    #[test]
    fn test_styp_roundtrip() {
        let styp = FileTypeBox::builder()
            .major_brand(*b"msdh")
            .is_segment(true)
            .build();
        assert_eq!(styp.box_type(), b"styp");
        assert_eq!(roundtrip_body(styp.clone()), styp);
    }

    #[test]
    fn test_parse_hand_built_bytes() {
        let mut data = Vec::new();
        data.extend_from_slice(b"mp41");
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(b"mp41");
        data.extend_from_slice(b"isom");

        let ftyp =
            futures_executor::block_on(FileTypeBox::parse(FourCC(*FTYP), data.as_slice()))
                .unwrap();
        assert_eq!(ftyp.major_brand, b"mp41");
        assert_eq!(ftyp.minor_version, 0);
        assert_eq!(ftyp.compatible_brands.len(), 2);
    }
}
