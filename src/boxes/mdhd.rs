use bon::Builder;
use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const MDHD: &[u8; 4] = b"mdhd";

/// Packs an ISO-639-2/T language code into the 15-bit mdhd representation.
/// Codes that are not three lowercase letters fall back to "und".
pub fn pack_language(code: &str) -> u16 {
    let bytes = code.as_bytes();
    if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_lowercase()) {
        return pack_language("und");
    }
    ((bytes[0] as u16 - 0x60) << 10) | ((bytes[1] as u16 - 0x60) << 5) | (bytes[2] as u16 - 0x60)
}

/// Unpacks the 15-bit mdhd language representation into a three-letter code.
pub fn unpack_language(packed: u16) -> String {
    let chars = [
        ((packed >> 10) & 0x1f) as u8 + 0x60,
        ((packed >> 5) & 0x1f) as u8 + 0x60,
        (packed & 0x1f) as u8 + 0x60,
    ];
    String::from_utf8_lossy(&chars).into_owned()
}

/// Media Header Box (mdhd) - ISO/IEC 14496-12
/// Media-independent information about a track's media, most importantly the
/// media timescale every sample duration in the track is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct MediaHeaderBox {
    #[builder(default = 0)]
    pub version: u8,
    #[builder(default = [0u8; 3])]
    pub flags: [u8; 3],
    #[builder(default = 0)]
    pub creation_time: u64,
    #[builder(default = 0)]
    pub modification_time: u64,
    /// Number of time units per second in this track's media
    pub timescale: u32,
    /// Media duration in media timescale units
    #[builder(default = 0)]
    pub duration: u64,
    /// Packed ISO-639-2/T language code
    #[builder(default = pack_language("und"))]
    pub language: u16,
}

impl MediaHeaderBox {
    pub fn language_code(&self) -> String {
        unpack_language(self.language)
    }

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

impl ParseBox for MediaHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != MDHD {
            return Err(ParseError::new_unexpected_box(box_type, MDHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_mdhd_data(&data)
    }
}

impl SerializeBox for MediaHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*MDHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        use crate::boxes::util::serializer::versioned_be_u64;

        let version = self.required_version();
        let mut data = Vec::new();

        data.push(version);
        data.extend(self.flags);
        data.extend(versioned_be_u64(version, self.creation_time));
        data.extend(versioned_be_u64(version, self.modification_time));
        data.extend(self.timescale.to_be_bytes());
        data.extend(versioned_be_u64(version, self.duration));
        data.extend(self.language.to_be_bytes());
        data.extend([0u8; 2]); // pre_defined

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_u16, be_u32},
        combinator::trace,
        error::StrContext,
        token::take,
        ModalResult, Parser,
    };

    use super::MediaHeaderBox;
    use crate::boxes::util::parser::{flags3, stream, version_0_or_1, versioned_be_u64, Stream};

    pub fn parse_mdhd_data(input: &[u8]) -> Result<MediaHeaderBox, crate::ParseError> {
        parse_mdhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_mdhd_data_inner(input: &mut Stream<'_>) -> ModalResult<MediaHeaderBox> {
        trace("mdhd", move |input: &mut Stream<'_>| {
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
            let language = be_u16
                .context(StrContext::Label("language"))
                .parse_next(input)?;
            let _ = take(2usize).parse_next(input)?; // pre_defined

            Ok(MediaHeaderBox {
                version,
                flags,
                creation_time,
                modification_time,
                timescale,
                duration,
                language,
            })
        })
        .parse_next(input)
    }
}
