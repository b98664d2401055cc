use derive_more::{Deref, DerefMut};
use futures_io::AsyncRead;
use std::{fmt, ops::Deref};

use crate::{
    boxes::{
        util::{read_to_end, DebugList},
        FourCC,
    },
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const STCO: &[u8; 4] = b"stco";
pub const CO64: &[u8; 4] = b"co64";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct ChunkOffsets(Vec<u64>);

impl ChunkOffsets {
    pub fn into_inner(self) -> Vec<u64> {
        self.0
    }

    pub fn inner(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for ChunkOffsets {
    fn from(value: Vec<u64>) -> Self {
        Self(value)
    }
}

impl FromIterator<u64> for ChunkOffsets {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Self(Vec::from_iter(iter))
    }
}

impl fmt::Debug for ChunkOffsets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Chunk Offset Box (stco / co64) - ISO/IEC 14496-12
/// File offsets of each chunk, 32-bit (stco) or 64-bit (co64).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct ChunkOffsetBox {
    pub version: u8,
    pub flags: [u8; 3],
    pub chunk_offsets: ChunkOffsets,
    /// Whether this serializes as co64 (64-bit offsets) instead of stco
    pub is_64bit: bool,
}

impl ChunkOffsetBox {
    /// Builds an stco, upgrading to co64 when any offset exceeds 32 bits.
    pub fn from_offsets(chunk_offsets: Vec<u64>) -> Self {
        let is_64bit = chunk_offsets
            .iter()
            .any(|&offset| offset > u32::MAX as u64);
        Self {
            version: 0,
            flags: [0u8; 3],
            chunk_offsets: chunk_offsets.into(),
            is_64bit,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }
}

impl ParseBox for ChunkOffsetBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        let data = read_to_end(reader).await?;
        match box_type.deref() {
            STCO => parser::parse_stco_data(&data),
            CO64 => parser::parse_co64_data(&data),
            _ => Err(ParseError::new_unexpected_box(box_type, STCO)),
        }
    }
}

impl SerializeBox for ChunkOffsetBox {
    fn box_type(&self) -> FourCC {
        if self.is_64bit {
            FourCC(*CO64)
        } else {
            FourCC(*STCO)
        }
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(
            u32::try_from(self.chunk_offsets.len())
                .expect("chunk offsets length must fit in u32")
                .to_be_bytes(),
        );

        let is_64bit = self.is_64bit;
        self.chunk_offsets.0.into_iter().for_each(|offset| {
            if is_64bit {
                data.extend(offset.to_be_bytes());
            } else {
                data.extend(
                    u32::try_from(offset)
                        .expect("chunk offset must fit in u32")
                        .to_be_bytes(),
                );
            }
        });

        data
    }
}

mod parser {
    use winnow::{
        binary::{be_u32, be_u64},
        combinator::{empty, seq, trace},
        error::{ContextError, ErrMode, StrContext},
        Parser,
    };

    use super::{ChunkOffsetBox, ChunkOffsets};
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_stco_data(input: &[u8]) -> Result<ChunkOffsetBox, crate::ParseError> {
        parse_stco_co64_data_inner(false)
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    pub fn parse_co64_data(input: &[u8]) -> Result<ChunkOffsetBox, crate::ParseError> {
        parse_stco_co64_data_inner(true)
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_stco_co64_data_inner<'i>(
        is_64bit: bool,
    ) -> impl Parser<Stream<'i>, ChunkOffsetBox, ErrMode<ContextError>> {
        trace(
            if is_64bit { "co64" } else { "stco" },
            move |input: &mut Stream<'_>| {
                seq!(ChunkOffsetBox {
                    version: version,
                    flags: flags3,
                    chunk_offsets: chunk_offsets(is_64bit)
                        .map(ChunkOffsets)
                        .context(StrContext::Label("chunk_offsets")),
                    is_64bit: empty.value(is_64bit),
                })
                .parse_next(input)
            },
        )
    }

    fn chunk_offsets<'i>(
        is_64bit: bool,
    ) -> impl Parser<Stream<'i>, Vec<u64>, ErrMode<ContextError>> {
        trace("chunk_offsets", move |input: &mut Stream<'_>| {
            let entry_count = be_u32.parse_next(input)?;
            winnow::combinator::repeat(entry_count as usize, chunk_offset(is_64bit))
                .parse_next(input)
        })
    }

    fn chunk_offset<'i>(is_64bit: bool) -> impl Parser<Stream<'i>, u64, ErrMode<ContextError>> {
        trace("chunk_offset", move |input: &mut Stream<'_>| {
            if is_64bit {
                be_u64.parse_next(input)
            } else {
                be_u32.map(|v| v as u64).parse_next(input)
            }
        })
    }
}
