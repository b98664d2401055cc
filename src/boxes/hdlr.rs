use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const HDLR: &[u8; 4] = b"hdlr";

pub const HANDLER_AUDIO: &[u8; 4] = b"soun";
pub const HANDLER_VIDEO: &[u8; 4] = b"vide";
pub const HANDLER_METADATA: &[u8; 4] = b"meta";

/// Handler Reference Box (hdlr) - ISO/IEC 14496-12
/// Declares how the media in a track is to be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBox {
    pub version: u8,
    pub flags: [u8; 3],
    /// Handler type: soun, vide, ...
    pub handler_type: FourCC,
    /// Human-readable name for the track type, for debugging
    pub name: String,
}

impl HandlerBox {
    pub fn new(handler_type: FourCC, name: impl Into<String>) -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            handler_type,
            name: name.into(),
        }
    }

    pub fn audio() -> Self {
        Self::new(FourCC(*HANDLER_AUDIO), "SoundHandler")
    }

    pub fn video() -> Self {
        Self::new(FourCC(*HANDLER_VIDEO), "VideoHandler")
    }
}

impl ParseBox for HandlerBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != HDLR {
            return Err(ParseError::new_unexpected_box(box_type, HDLR));
        }
        let data = read_to_end(reader).await?;
        parser::parse_hdlr_data(&data)
    }
}

impl SerializeBox for HandlerBox {
    fn box_type(&self) -> FourCC {
        FourCC(*HDLR)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend([0u8; 4]); // pre_defined
        data.extend(self.handler_type.into_bytes());
        data.extend([0u8; 12]); // reserved
        data.extend(self.name.into_bytes());
        data.push(0); // NUL terminator

        data
    }
}

mod parser {
    use winnow::{
        combinator::trace,
        error::StrContext,
        token::{rest, take},
        ModalResult, Parser,
    };

    use super::HandlerBox;
    use crate::boxes::util::parser::{flags3, fourcc, stream, version, Stream};

    pub fn parse_hdlr_data(input: &[u8]) -> Result<HandlerBox, crate::ParseError> {
        parse_hdlr_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_hdlr_data_inner(input: &mut Stream<'_>) -> ModalResult<HandlerBox> {
        trace("hdlr", move |input: &mut Stream<'_>| {
            let version = version.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let _ = take(4usize).parse_next(input)?; // pre_defined
            let handler_type = fourcc
                .context(StrContext::Label("handler_type"))
                .parse_next(input)?;
            let _ = take(12usize).parse_next(input)?; // reserved
            let name = rest
                .try_map(|data: &[u8]| {
                    // strip the NUL terminator if present
                    let data = data.strip_suffix(&[0]).unwrap_or(data);
                    String::from_utf8(data.to_vec())
                })
                .context(StrContext::Label("name"))
                .parse_next(input)?;

            Ok(HandlerBox {
                version,
                flags,
                handler_type,
                name,
            })
        })
        .parse_next(input)
    }
}
