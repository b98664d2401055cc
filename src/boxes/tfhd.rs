use bon::Builder;
use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const TFHD: &[u8; 4] = b"tfhd";

pub const TFHD_BASE_DATA_OFFSET: u32 = 0x000001;
pub const TFHD_SAMPLE_DESCRIPTION_INDEX: u32 = 0x000002;
pub const TFHD_DEFAULT_SAMPLE_DURATION: u32 = 0x000008;
pub const TFHD_DEFAULT_SAMPLE_SIZE: u32 = 0x000010;
pub const TFHD_DEFAULT_SAMPLE_FLAGS: u32 = 0x000020;
pub const TFHD_DURATION_IS_EMPTY: u32 = 0x010000;
pub const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

/// Track Fragment Header Box (tfhd) - ISO/IEC 14496-12
/// Identifies the track a fragment belongs to and carries per-fragment
/// defaults. The tf_flags bits are derived from which optional fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
pub struct TrackFragmentHeaderBox {
    #[builder(default = 0)]
    pub version: u8,
    pub track_id: u32,
    pub base_data_offset: Option<u64>,
    pub sample_description_index: Option<u32>,
    pub default_sample_duration: Option<u32>,
    pub default_sample_size: Option<u32>,
    pub default_sample_flags: Option<u32>,
    #[builder(default = false)]
    pub duration_is_empty: bool,
    /// Offsets are relative to the start of the enclosing moof
    #[builder(default = true)]
    pub default_base_is_moof: bool,
}

impl TrackFragmentHeaderBox {
    pub fn tf_flags(&self) -> u32 {
        let mut flags = 0;
        if self.base_data_offset.is_some() {
            flags |= TFHD_BASE_DATA_OFFSET;
        }
        if self.sample_description_index.is_some() {
            flags |= TFHD_SAMPLE_DESCRIPTION_INDEX;
        }
        if self.default_sample_duration.is_some() {
            flags |= TFHD_DEFAULT_SAMPLE_DURATION;
        }
        if self.default_sample_size.is_some() {
            flags |= TFHD_DEFAULT_SAMPLE_SIZE;
        }
        if self.default_sample_flags.is_some() {
            flags |= TFHD_DEFAULT_SAMPLE_FLAGS;
        }
        if self.duration_is_empty {
            flags |= TFHD_DURATION_IS_EMPTY;
        }
        if self.default_base_is_moof {
            flags |= TFHD_DEFAULT_BASE_IS_MOOF;
        }
        flags
    }
}

impl ParseBox for TrackFragmentHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != TFHD {
            return Err(ParseError::new_unexpected_box(box_type, TFHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_tfhd_data(&data)
    }
}

impl SerializeBox for TrackFragmentHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*TFHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let flags = self.tf_flags();
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(&flags.to_be_bytes()[1..4]);
        data.extend(self.track_id.to_be_bytes());

        if let Some(base_data_offset) = self.base_data_offset {
            data.extend(base_data_offset.to_be_bytes());
        }
        if let Some(index) = self.sample_description_index {
            data.extend(index.to_be_bytes());
        }
        if let Some(duration) = self.default_sample_duration {
            data.extend(duration.to_be_bytes());
        }
        if let Some(size) = self.default_sample_size {
            data.extend(size.to_be_bytes());
        }
        if let Some(sample_flags) = self.default_sample_flags {
            data.extend(sample_flags.to_be_bytes());
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_u32, be_u64},
        combinator::{cond, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::*;
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_tfhd_data(input: &[u8]) -> Result<TrackFragmentHeaderBox, crate::ParseError> {
        parse_tfhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_tfhd_data_inner(input: &mut Stream<'_>) -> ModalResult<TrackFragmentHeaderBox> {
        trace("tfhd", move |input: &mut Stream<'_>| {
            let version = version.parse_next(input)?;
            let flags3 = flags3.parse_next(input)?;
            let flags = u32::from_be_bytes([0, flags3[0], flags3[1], flags3[2]]);
            let track_id = be_u32
                .context(StrContext::Label("track_id"))
                .parse_next(input)?;
            let base_data_offset = cond(flags & TFHD_BASE_DATA_OFFSET != 0, be_u64)
                .context(StrContext::Label("base_data_offset"))
                .parse_next(input)?;
            let sample_description_index =
                cond(flags & TFHD_SAMPLE_DESCRIPTION_INDEX != 0, be_u32)
                    .context(StrContext::Label("sample_description_index"))
                    .parse_next(input)?;
            let default_sample_duration = cond(flags & TFHD_DEFAULT_SAMPLE_DURATION != 0, be_u32)
                .context(StrContext::Label("default_sample_duration"))
                .parse_next(input)?;
            let default_sample_size = cond(flags & TFHD_DEFAULT_SAMPLE_SIZE != 0, be_u32)
                .context(StrContext::Label("default_sample_size"))
                .parse_next(input)?;
            let default_sample_flags = cond(flags & TFHD_DEFAULT_SAMPLE_FLAGS != 0, be_u32)
                .context(StrContext::Label("default_sample_flags"))
                .parse_next(input)?;

            Ok(TrackFragmentHeaderBox {
                version,
                track_id,
                base_data_offset,
                sample_description_index,
                default_sample_duration,
                default_sample_size,
                default_sample_flags,
                duration_is_empty: flags & TFHD_DURATION_IS_EMPTY != 0,
                default_base_is_moof: flags & TFHD_DEFAULT_BASE_IS_MOOF != 0,
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
    fn test_tfhd_roundtrip_minimal() {
        let tfhd = TrackFragmentHeaderBox::builder().track_id(1).build();
        assert_eq!(tfhd.tf_flags(), TFHD_DEFAULT_BASE_IS_MOOF);
        assert_eq!(roundtrip_body(tfhd.clone()), tfhd);
    }

    #[test]
    fn test_tfhd_roundtrip_with_defaults() {
        let tfhd = TrackFragmentHeaderBox::builder()
            .track_id(2)
            .default_sample_duration(1024)
            .default_sample_flags(0x0101_0000)
            .build();
        assert_eq!(roundtrip_body(tfhd.clone()), tfhd);
    }
}
