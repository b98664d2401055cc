use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const VMHD: &[u8; 4] = b"vmhd";

/// Video Media Header Box (vmhd) - ISO/IEC 14496-12
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMediaHeaderBox {
    pub version: u8,
    /// Always 1 for vmhd
    pub flags: [u8; 3],
    /// Composition mode; 0 is copy
    pub graphics_mode: u16,
    /// RGB color for compositing modes that use one
    pub op_color: [u16; 3],
}

impl Default for VideoMediaHeaderBox {
    fn default() -> Self {
        Self {
            version: 0,
            flags: [0, 0, 1],
            graphics_mode: 0,
            op_color: [0, 0, 0],
        }
    }
}

impl ParseBox for VideoMediaHeaderBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != VMHD {
            return Err(ParseError::new_unexpected_box(box_type, VMHD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_vmhd_data(&data)
    }
}

impl SerializeBox for VideoMediaHeaderBox {
    fn box_type(&self) -> FourCC {
        FourCC(*VMHD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(self.graphics_mode.to_be_bytes());
        for component in self.op_color {
            data.extend(component.to_be_bytes());
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::be_u16,
        combinator::{seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::VideoMediaHeaderBox;
    use crate::boxes::util::parser::{fixed_array, flags3, stream, version, Stream};

    pub fn parse_vmhd_data(input: &[u8]) -> Result<VideoMediaHeaderBox, crate::ParseError> {
        parse_vmhd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_vmhd_data_inner(input: &mut Stream<'_>) -> ModalResult<VideoMediaHeaderBox> {
        trace(
            "vmhd",
            seq!(VideoMediaHeaderBox {
                version: version,
                flags: flags3,
                graphics_mode: be_u16.context(StrContext::Label("graphics_mode")),
                op_color: fixed_array(be_u16).context(StrContext::Label("op_color")),
            })
            .context(StrContext::Label("vmhd")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_vmhd_roundtrip() {
        let vmhd = VideoMediaHeaderBox::default();
        assert_eq!(roundtrip_body(vmhd.clone()), vmhd);
    }
}
