use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const DREF: &[u8; 4] = b"dref";
pub const URL: &[u8; 4] = b"url ";

/// Media data is in the same file as the box structure
pub const DATA_ENTRY_FLAG_SELF_CONTAINED: u32 = 0x000001;

/// Data Reference Box (dref) - ISO/IEC 14496-12
/// Declares the location(s) of a track's media data. Every entry is itself a
/// full box; entry bodies beyond the version/flags prefix are kept opaque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataReferenceBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub entries: Vec<DataEntry>,
}

/// A single data reference entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEntry {
    pub entry_type: FourCC,
    pub version: u8,
    pub flags: [u8; 3],
    pub body: Vec<u8>,
}

impl DataReferenceBox {
    /// The usual case: one `url ` entry flagged self-contained.
    pub fn self_contained() -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            entries: vec![DataEntry {
                entry_type: FourCC(*URL),
                version: 0,
                flags: [0, 0, DATA_ENTRY_FLAG_SELF_CONTAINED as u8],
                body: Vec::new(),
            }],
        }
    }
}

impl ParseBox for DataReferenceBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != DREF {
            return Err(ParseError::new_unexpected_box(box_type, DREF));
        }
        let data = read_to_end(reader).await?;
        parser::parse_dref_data(&data)
    }
}

impl SerializeBox for DataReferenceBox {
    fn box_type(&self) -> FourCC {
        FourCC(*DREF)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.entries.len())
                .expect("dref entries len must fit in u32")
                .to_be_bytes(),
        );

        for entry in self.entries {
            let entry_size = 12 + entry.body.len();
            data.extend(
                u32::try_from(entry_size)
                    .expect("dref entry size must fit in u32")
                    .to_be_bytes(),
            );
            data.extend(entry.entry_type.into_bytes());
            data.push(entry.version);
            data.extend(entry.flags);
            data.extend(entry.body);
        }

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

    use super::{DataEntry, DataReferenceBox};
    use crate::boxes::util::parser::{flags3, fourcc, stream, version, Stream};

    pub fn parse_dref_data(input: &[u8]) -> Result<DataReferenceBox, crate::ParseError> {
        parse_dref_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_dref_data_inner(input: &mut Stream<'_>) -> ModalResult<DataReferenceBox> {
        trace("dref", move |input: &mut Stream<'_>| {
            let box_version = version.parse_next(input)?;
            let box_flags = flags3.parse_next(input)?;
            let entry_count = be_u32
                .context(StrContext::Label("entry_count"))
                .parse_next(input)?;

            let mut entries = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let size = be_u32
                    .verify(|size| *size >= 12)
                    .context(StrContext::Label("entry_size"))
                    .parse_next(input)?;
                let entry_type = fourcc
                    .context(StrContext::Label("entry_type"))
                    .parse_next(input)?;
                let entry_version = version.parse_next(input)?;
                let entry_flags = flags3.parse_next(input)?;
                let body = take(size as usize - 12).parse_next(input)?.to_vec();
                entries.push(DataEntry {
                    entry_type,
                    version: entry_version,
                    flags: entry_flags,
                    body,
                });
            }

            Ok(DataReferenceBox {
                version: box_version,
                flags: box_flags,
                entries,
            })
        })
        .parse_next(input)
    }
}
