use bon::Builder;
use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const MVHD: &[u8; 4] = b"mvhd";

/// Identity transformation matrix shared by mvhd and tkhd.
pub const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// Movie Header Box (mvhd) - ISO/IEC 14496-12
/// Media-independent information about the whole presentation.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct MovieHeaderBox {
    #[builder(default = 0)]
    pub version: u8,
    #[builder(default = [0u8; 3])]
    pub flags: [u8; 3],
    #[builder(default = 0)]
    pub creation_time: u64,
    #[builder(default = 0)]
    pub modification_time: u64,
    /// Number of time units per second for the whole movie
    pub timescale: u32,
    /// Presentation duration in movie timescale units
    #[builder(default = 0)]
    pub duration: u64,
    /// Preferred playback rate (1.0 = normal)
    #[builder(default = 1.0)]
    pub rate: f32,
    /// Preferred playback volume (1.0 = full)
    #[builder(default = 1.0)]
    pub volume: f32,
    #[builder(default = UNITY_MATRIX)]
    pub matrix: [u32; 9],
    /// Track id one higher than the largest in use
    pub next_track_id: u32,
}

impl Default for MovieHeaderBox {
    fn default() -> Self {
        Self::builder().timescale(1000).next_track_id(1).build()
    }
}

impl MovieHeaderBox {
    /// The version required to represent the times and duration.
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

impl ParseBox for MovieHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != MVHD {
            return Err(ParseError::new_unexpected_box(box_type, MVHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_mvhd_data(&data)
    }
}

impl SerializeBox for MovieHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*MVHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        use crate::boxes::util::serializer::{fixed_point_16x16, fixed_point_8x8, versioned_be_u64};

        let version = self.required_version();
        let mut data = Vec::new();

        data.push(version);
        data.extend(self.flags);
        data.extend(versioned_be_u64(version, self.creation_time));
        data.extend(versioned_be_u64(version, self.modification_time));
        data.extend(self.timescale.to_be_bytes());
        data.extend(versioned_be_u64(version, self.duration));
        data.extend(fixed_point_16x16(self.rate));
        data.extend(fixed_point_8x8(self.volume));
        data.extend([0u8; 2]); // reserved
        data.extend([0u8; 8]); // reserved
        for value in self.matrix {
            data.extend(value.to_be_bytes());
        }
        data.extend([0u8; 24]); // pre_defined
        data.extend(self.next_track_id.to_be_bytes());

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

    use super::MovieHeaderBox;
    use crate::boxes::util::parser::{
        fixed_array, fixed_point_16x16, fixed_point_8x8, flags3, stream, version_0_or_1,
        versioned_be_u64, Stream,
    };

    pub fn parse_mvhd_data(input: &[u8]) -> Result<MovieHeaderBox, crate::ParseError> {
        parse_mvhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_mvhd_data_inner(input: &mut Stream<'_>) -> ModalResult<MovieHeaderBox> {
        trace("mvhd", move |input: &mut Stream<'_>| {
            let version = version_0_or_1.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let creation_time = versioned_be_u64(version)
                .context(StrContext::Label("creation_time"))
                .parse_next(input)?;
            let modification_time = versioned_be_u64(version)
                .context(StrContext::Label("modification_time"))
                .parse_next(input)?;
            let timescale = be_u32
                .context(StrContext::Label("timescale"))
                .parse_next(input)?;
            let duration = versioned_be_u64(version)
                .context(StrContext::Label("duration"))
                .parse_next(input)?;
            let rate = fixed_point_16x16
                .context(StrContext::Label("rate"))
                .parse_next(input)?;
            let volume = fixed_point_8x8
                .context(StrContext::Label("volume"))
                .parse_next(input)?;
            let _ = take(10usize).parse_next(input)?; // reserved
            let matrix = fixed_array(be_u32)
                .context(StrContext::Label("matrix"))
                .parse_next(input)?;
            let _ = take(24usize).parse_next(input)?; // pre_defined
            let next_track_id = be_u32
                .context(StrContext::Label("next_track_id"))
                .parse_next(input)?;

            Ok(MovieHeaderBox {
                version,
                flags,
                creation_time,
                modification_time,
                timescale,
                duration,
                rate,
                volume,
                matrix,
                next_track_id,
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
    fn test_mvhd_roundtrip_v0() {
        let mvhd = MovieHeaderBox::builder()
            .timescale(600)
            .duration(6000)
            .next_track_id(3)
            .build();
        assert_eq!(roundtrip_body(mvhd.clone()), mvhd);
    }

    #[test]
    fn test_mvhd_upgrades_to_v1() {
        let mvhd = MovieHeaderBox::builder()
            .timescale(90_000)
            .duration(u32::MAX as u64 + 1)
            .next_track_id(2)
            .build();
        let parsed = roundtrip_body(mvhd.clone());
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.duration, mvhd.duration);
    }
}
