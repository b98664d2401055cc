use futures_io::AsyncRead;

use crate::{
    boxes::{util::read_to_end, FourCC},
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const SBGP: &[u8; 4] = b"sbgp";

/// Sample-to-Group Box (sbgp) - ISO/IEC 14496-12
/// Maps runs of samples to entries of the matching sgpd box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleToGroupBox {
    /// Version of the sbgp box format (0 or 1+)
    pub version: u8,
    pub flags: [u8; 3],
    /// Grouping type, matching the corresponding sgpd
    pub grouping_type: FourCC,
    /// Grouping type parameter (version >= 1 only)
    pub grouping_type_parameter: Option<u32>,
    /// Sample-to-group mapping entries
    pub entries: Vec<SampleToGroupEntry>,
}

/// A single sample-to-group mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleToGroupEntry {
    /// Number of consecutive samples that belong to the same group
    pub sample_count: u32,
    /// 1-based index into the sample group description table; 0 means no
    /// group assignment
    pub group_description_index: u32,
}

impl SampleToGroupBox {
    pub fn new(grouping_type: FourCC, entries: Vec<SampleToGroupEntry>) -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            grouping_type,
            grouping_type_parameter: None,
            entries,
        }
    }
}

impl ParseBox for SampleToGroupBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != SBGP {
            return Err(ParseError::new_unexpected_box(box_type, SBGP));
        }
        let data = read_to_end(reader).await?;
        parser::parse_sbgp_data(&data)
    }
}

impl SerializeBox for SampleToGroupBox {
    fn box_type(&self) -> FourCC {
        FourCC(*SBGP)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(
            // grouping_type_parameter requires version >= 1
            if self.version == 0 && self.grouping_type_parameter.is_some() {
                1
            } else {
                self.version
            },
        );
        data.extend(self.flags);
        data.extend(self.grouping_type.into_bytes());

        if let Some(param) = self.grouping_type_parameter {
            data.extend(param.to_be_bytes());
        }

        data.extend(
            u32::try_from(self.entries.len())
                .expect("sbgp entries len must fit in u32")
                .to_be_bytes(),
        );

        for entry in self.entries {
            data.extend(entry.sample_count.to_be_bytes());
            data.extend(entry.group_description_index.to_be_bytes());
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

    use super::{SampleToGroupBox, SampleToGroupEntry};
    use crate::boxes::util::parser::{be_u32_as_usize, flags3, fourcc, stream, version, Stream};

    pub fn parse_sbgp_data(input: &[u8]) -> Result<SampleToGroupBox, crate::ParseError> {
        parse_sbgp_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_sbgp_data_inner(input: &mut Stream<'_>) -> ModalResult<SampleToGroupBox> {
        let maybe_group_type_parameter = |version: u8| {
            let with_parameter = |input: &mut Stream<'_>| -> ModalResult<Option<u32>> {
                be_u32.map(Some).parse_next(input)
            };
            let without_parameter = |input: &mut Stream<'_>| -> ModalResult<Option<u32>> {
                empty.value(None).parse_next(input)
            };

            if version >= 1 {
                with_parameter
            } else {
                without_parameter
            }
        };

        trace(
            "sbgp",
            seq!(SampleToGroupBox {
                version: version,
                flags: flags3,
                grouping_type: fourcc.context(StrContext::Label("grouping_type")),
                grouping_type_parameter: maybe_group_type_parameter(version)
                    .context(StrContext::Label("grouping_type_parameter")),
                entries: entries.context(StrContext::Label("entries")),
            }),
        )
        .parse_next(input)
    }

    fn entries(input: &mut Stream<'_>) -> ModalResult<Vec<SampleToGroupEntry>> {
        trace("entries", move |input: &mut Stream<'_>| {
            let count = be_u32_as_usize
                .context(StrContext::Label("entry_count"))
                .parse_next(input)?;
            repeat(
                count,
                seq!(SampleToGroupEntry {
                    sample_count: be_u32.context(StrContext::Label("sample_count")),
                    group_description_index: be_u32
                        .context(StrContext::Label("group_description_index")),
                }),
            )
            .parse_next(input)
        })
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_sbgp_roundtrip() {
        let sbgp = SampleToGroupBox::new(
            FourCC(*b"roll"),
            vec![
                SampleToGroupEntry {
                    sample_count: 10,
                    group_description_index: 1,
                },
                SampleToGroupEntry {
                    sample_count: 5,
                    group_description_index: 0,
                },
            ],
        );
        assert_eq!(roundtrip_body(sbgp.clone()), sbgp);
    }

    #[test]
    fn test_sbgp_roundtrip_with_parameter() {
        let mut sbgp = SampleToGroupBox::new(FourCC(*b"sap "), Vec::new());
        sbgp.version = 1;
        sbgp.grouping_type_parameter = Some(7);
        assert_eq!(roundtrip_body(sbgp.clone()), sbgp);
    }
}
