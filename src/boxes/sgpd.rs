use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const SGPD: &[u8; 4] = b"sgpd";

/// Sample Group Description Box (sgpd) - ISO/IEC 14496-12
/// Defines the characteristics of sample groups of one grouping type.
/// Description payloads are kept opaque; their layout depends on the
/// grouping type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroupDescriptionBox {
    /// Version of the sgpd box format (this crate writes version 1)
    pub version: u8,
    pub flags: [u8; 3],
    /// Grouping type this description table applies to
    pub grouping_type: FourCC,
    /// Default length of description entries (version 1 only; 0 means
    /// per-entry lengths)
    pub default_length: Option<u32>,
    /// Default sample description index (version >= 2 only)
    pub default_sample_description_index: Option<u32>,
    /// Description entries, 1-indexed from sbgp
    pub entries: Vec<SampleGroupDescriptionEntry>,
}

/// A single sample group description entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleGroupDescriptionEntry {
    /// The opaque description payload
    pub description_data: Vec<u8>,
}

impl SampleGroupDescriptionBox {
    /// Builds a version 1 box with a fixed per-entry length, which every
    /// entry must match.
    pub fn with_fixed_length(
        grouping_type: FourCC,
        entries: Vec<SampleGroupDescriptionEntry>,
    ) -> Self {
        let default_length = entries
            .first()
            .map(|entry| entry.description_data.len() as u32)
            .unwrap_or(0);
        debug_assert!(entries
            .iter()
            .all(|entry| entry.description_data.len() as u32 == default_length));
        Self {
            version: 1,
            flags: [0u8; 3],
            grouping_type,
            default_length: Some(default_length),
            default_sample_description_index: None,
            entries,
        }
    }
}

impl ParseBox for SampleGroupDescriptionBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != SGPD {
            return Err(ParseError::new_unexpected_box(box_type, SGPD));
        }
        let data = read_to_end(reader).await?;
        parser::parse_sgpd_data(&data)
    }
}

impl SerializeBox for SampleGroupDescriptionBox {
    fn box_type(&self) -> FourCC {
        FourCC(*SGPD)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(self.grouping_type.into_bytes());

        if self.version == 1 {
            data.extend(self.default_length.unwrap_or(0).to_be_bytes());
        } else if self.version >= 2 {
            data.extend(
                self.default_sample_description_index
                    .unwrap_or(0)
                    .to_be_bytes(),
            );
        }

        data.extend(
            u32::try_from(self.entries.len())
                .expect("sgpd entries len must fit in u32")
                .to_be_bytes(),
        );

        let per_entry_lengths = self.version == 1 && self.default_length == Some(0);
        for entry in self.entries {
            if per_entry_lengths {
                data.extend(
                    u32::try_from(entry.description_data.len())
                        .expect("description length must fit in u32")
                        .to_be_bytes(),
                );
            }
            data.extend(entry.description_data);
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::trace,
        error::StrContext,
        token::{rest, take},
        ModalResult, Parser,
    };

    use super::{SampleGroupDescriptionBox, SampleGroupDescriptionEntry};
    use crate::boxes::util::parser::{flags3, fourcc, stream, version, Stream};

    pub fn parse_sgpd_data(input: &[u8]) -> Result<SampleGroupDescriptionBox, crate::ParseError> {
        parse_sgpd_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_sgpd_data_inner(input: &mut Stream<'_>) -> ModalResult<SampleGroupDescriptionBox> {
        trace("sgpd", move |input: &mut Stream<'_>| {
            let version = version.parse_next(input)?;
            let flags = flags3.parse_next(input)?;
            let grouping_type = fourcc
                .context(StrContext::Label("grouping_type"))
                .parse_next(input)?;

            let mut default_length = None;
            let mut default_sample_description_index = None;
            match version {
                0 => {}
                1 => {
                    default_length = Some(
                        be_u32
                            .context(StrContext::Label("default_length"))
                            .parse_next(input)?,
                    );
                }
                _ => {
                    default_sample_description_index = Some(
                        be_u32
                            .context(StrContext::Label("default_sample_description_index"))
                            .parse_next(input)?,
                    );
                }
            }

            let entry_count = be_u32
                .context(StrContext::Label("entry_count"))
                .parse_next(input)?;

            let mut entries = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let description_data = match (version, default_length) {
                    // Version 1 with explicit per-entry lengths
                    (1, Some(0)) => {
                        let length = be_u32
                            .context(StrContext::Label("description_length"))
                            .parse_next(input)?;
                        take(length as usize).parse_next(input)?.to_vec()
                    }
                    // Version 1 with a fixed default length
                    (1, Some(length)) => take(length as usize).parse_next(input)?.to_vec(),
                    // Other versions carry no length information; only a
                    // single entry consuming the remainder is unambiguous
                    _ if entry_count == 1 => rest.parse_next(input)?.to_vec(),
                    _ => {
                        return Err(winnow::error::ErrMode::Cut(
                            winnow::error::ContextError::new(),
                        ))
                    }
                };
                entries.push(SampleGroupDescriptionEntry { description_data });
            }

            Ok(SampleGroupDescriptionBox {
                version,
                flags,
                grouping_type,
                default_length,
                default_sample_description_index,
                entries,
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
    fn test_sgpd_roundtrip_fixed_length() {
        let sgpd = SampleGroupDescriptionBox::with_fixed_length(
            FourCC(*b"roll"),
            vec![
                SampleGroupDescriptionEntry {
                    description_data: (-1i16).to_be_bytes().to_vec(),
                },
                SampleGroupDescriptionEntry {
                    description_data: 2i16.to_be_bytes().to_vec(),
                },
            ],
        );
        assert_eq!(roundtrip_body(sgpd.clone()), sgpd);
    }

    #[test]
    fn test_sgpd_roundtrip_per_entry_lengths() {
        let sgpd = SampleGroupDescriptionBox {
            version: 1,
            flags: [0u8; 3],
            grouping_type: FourCC(*b"test"),
            default_length: Some(0),
            default_sample_description_index: None,
            entries: vec![
                SampleGroupDescriptionEntry {
                    description_data: vec![1, 2, 3],
                },
                SampleGroupDescriptionEntry {
                    description_data: vec![4, 5, 6, 7, 8],
                },
            ],
        };
        assert_eq!(roundtrip_body(sgpd.clone()), sgpd);
    }

    #[test]
    fn test_sgpd_roundtrip_version_0_single_entry() {
        let sgpd = SampleGroupDescriptionBox {
            version: 0,
            flags: [0u8; 3],
            grouping_type: FourCC(*b"sap "),
            default_length: None,
            default_sample_description_index: None,
            entries: vec![SampleGroupDescriptionEntry {
                description_data: vec![0x80],
            }],
        };
        assert_eq!(roundtrip_body(sgpd.clone()), sgpd);
    }
}
