use bon::Builder;
use futures_io::AsyncRead;

use crate::{
    boxes::{mvhd::UNITY_MATRIX, util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const TKHD: &[u8; 4] = b"tkhd";

/// Track is enabled
pub const TKHD_FLAG_ENABLED: u32 = 0x000001;
/// Track is used in the presentation
pub const TKHD_FLAG_IN_MOVIE: u32 = 0x000002;

/// Track Header Box (tkhd) - ISO/IEC 14496-12
/// Characteristics of a single track within the presentation.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct TrackHeaderBox {
    #[builder(default = 0)]
    pub version: u8,
    /// Defaults to enabled + in-movie
    #[builder(default = [0, 0, (TKHD_FLAG_ENABLED | TKHD_FLAG_IN_MOVIE) as u8])]
    pub flags: [u8; 3],
    #[builder(default = 0)]
    pub creation_time: u64,
    #[builder(default = 0)]
    pub modification_time: u64,
    /// Unique, non-zero track identifier
    pub track_id: u32,
    /// Track duration in movie timescale units
    #[builder(default = 0)]
    pub duration: u64,
    /// Front-to-back ordering for video tracks; 0 is the normal value
    #[builder(default = 0)]
    pub layer: i16,
    /// Group of alternate tracks this track belongs to (0 = none)
    #[builder(default = 0)]
    pub alternate_group: i16,
    /// Track volume: 1.0 for audio tracks, 0.0 otherwise
    #[builder(default = 0.0)]
    pub volume: f32,
    #[builder(default = UNITY_MATRIX)]
    pub matrix: [u32; 9],
    /// Visual presentation width in pixels (0 for non-visual tracks)
    #[builder(default = 0.0)]
    pub width: f32,
    /// Visual presentation height in pixels (0 for non-visual tracks)
    #[builder(default = 0.0)]
    pub height: f32,
}

impl TrackHeaderBox {
    fn required_version(&self) -> u8 {
        let max = self
            .creation_time
            .max(self.modification_time)
            .max(self.duration);
        if max > u32::MAX as u64 {
            1
        } else {
            self.version
        }
    }
}

impl ParseBox for TrackHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != TKHD {
            return Err(ParseError::new_unexpected_box(box_type, TKHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_tkhd_data(&data)
    }
}

impl SerializeBox for TrackHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*TKHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        use crate::boxes::util::serializer::{fixed_point_16x16, fixed_point_8x8, versioned_be_u64};

        let version = self.required_version();
        let mut data = Vec::new();

        data.push(version);
        data.extend(self.flags);
        data.extend(versioned_be_u64(version, self.creation_time));
        data.extend(versioned_be_u64(version, self.modification_time));
        data.extend(self.track_id.to_be_bytes());
        data.extend([0u8; 4]); // reserved
        data.extend(versioned_be_u64(version, self.duration));
        data.extend([0u8; 8]); // reserved
        data.extend(self.layer.to_be_bytes());
        data.extend(self.alternate_group.to_be_bytes());
        data.extend(fixed_point_8x8(self.volume));
        data.extend([0u8; 2]); // reserved
        for value in self.matrix {
            data.extend(value.to_be_bytes());
        }
        data.extend(fixed_point_16x16(self.width));
        data.extend(fixed_point_16x16(self.height));

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_i16, be_u32},
        combinator::trace,
        error::StrContext,
        token::take,
        ModalResult, Parser,
    };

    use super::TrackHeaderBox;
    use crate::boxes::util::parser::{
        fixed_array, fixed_point_16x16, fixed_point_8x8, flags3, stream, version_0_or_1,
        versioned_be_u64, Stream,
    };

    pub fn parse_tkhd_data(input: &[u8]) -> Result<TrackHeaderBox, crate::ParseError> {
        parse_tkhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_tkhd_data_inner(input: &mut Stream<'_>) -> ModalResult<TrackHeaderBox> {
        trace("tkhd", move |input: &mut Stream<'_>| {
            let version = version_0_or_1.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let creation_time = versioned_be_u64(version)
                .context(StrContext::Label("creation_time"))
                .parse_next(input)?;
            let modification_time = versioned_be_u64(version)
                .context(StrContext::Label("modification_time"))
                .parse_next(input)?;
            let track_id = be_u32
                .context(StrContext::Label("track_id"))
                .parse_next(input)?;
            let _ = take(4usize).parse_next(input)?; // reserved
            let duration = versioned_be_u64(version)
                .context(StrContext::Label("duration"))
                .parse_next(input)?;
            let _ = take(8usize).parse_next(input)?; // reserved
            let layer = be_i16
                .context(StrContext::Label("layer"))
                .parse_next(input)?;
            let alternate_group = be_i16
                .context(StrContext::Label("alternate_group"))
                .parse_next(input)?;
            let volume = fixed_point_8x8
                .context(StrContext::Label("volume"))
                .parse_next(input)?;
            let _ = take(2usize).parse_next(input)?; // reserved
            let matrix = fixed_array(be_u32)
                .context(StrContext::Label("matrix"))
                .parse_next(input)?;
            let width = fixed_point_16x16
                .context(StrContext::Label("width"))
                .parse_next(input)?;
            let height = fixed_point_16x16
                .context(StrContext::Label("height"))
                .parse_next(input)?;

            Ok(TrackHeaderBox {
                version,
                flags,
                creation_time,
                modification_time,
                track_id,
                duration,
                layer,
                alternate_group,
                volume,
                matrix,
                width,
                height,
            })
        })
        .parse_next(input)
    }
}
