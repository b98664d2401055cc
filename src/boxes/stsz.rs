use derive_more::{Deref, DerefMut};
use either::Either;
use futures_io::AsyncRead;
use std::fmt;

use crate::{
    boxes::{
        util::{read_to_end, DebugList},
        FourCC,
    },
    parser::ParseBox,
    writer::SerializeBox,
    ParseError,
};

pub const STSZ: &[u8; 4] = b"stsz";

#[derive(Default, Clone, PartialEq, Eq, Deref, DerefMut)]
pub struct SampleEntrySizes(Vec<u32>);

impl From<Vec<u32>> for SampleEntrySizes {
    fn from(value: Vec<u32>) -> Self {
        SampleEntrySizes(value)
    }
}

impl SampleEntrySizes {
    pub fn inner(&self) -> &[u32] {
        &self.0
    }
}

impl fmt::Debug for SampleEntrySizes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&DebugList::new(self.0.iter(), 10), f)
    }
}

/// Sample Size Box (stsz) - ISO/IEC 14496-12
/// Contains the sample count and a table giving the size in bytes of each
/// sample, or a single constant size covering every sample.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SampleSizeBox {
    pub version: u8,
    pub flags: [u8; 3],
    /// If non-zero, the constant size of every sample in the track; if zero,
    /// the sizes are stored in `entry_sizes`.
    pub sample_size: u32,
    /// Number of samples in the track
    pub sample_count: u32,
    /// Per-sample sizes when `sample_size` is 0, empty otherwise.
    pub entry_sizes: SampleEntrySizes,
}

impl SampleSizeBox {
    pub fn from_sizes(entry_sizes: Vec<u32>) -> Self {
        let sample_count =
            u32::try_from(entry_sizes.len()).expect("entry_sizes len must fit in u32");
        Self {
            version: 0,
            flags: [0u8; 3],
            sample_size: 0,
            sample_count,
            entry_sizes: entry_sizes.into(),
        }
    }

    pub fn with_constant_size(sample_size: u32, sample_count: u32) -> Self {
        Self {
            version: 0,
            flags: [0u8; 3],
            sample_size,
            sample_count,
            entry_sizes: SampleEntrySizes::default(),
        }
    }

    /// Returns an iterator over _all_ sample sizes.
    ///
    /// If `sample_size != 0` this repeats that value `sample_count` times;
    /// otherwise it yields the values from `entry_sizes`.
    pub fn sample_sizes(&self) -> impl Iterator<Item = &u32> + '_ {
        if self.sample_size != 0 {
            Either::Left(std::iter::repeat_n(
                &self.sample_size,
                self.sample_count as usize,
            ))
        } else {
            Either::Right(self.entry_sizes.iter())
        }
    }

    /// Returns the total size of all samples in bytes
    pub fn total_sample_size(&self) -> u64 {
        self.sample_sizes().map(|&size| size as u64).sum()
    }
}

impl ParseBox for SampleSizeBox {
    async fn parse<R: AsyncRead + Unpin + Send>(
        box_type: FourCC,
        reader: R,
    ) -> Result<Self, ParseError> {
        if box_type != STSZ {
            return Err(ParseError::new_unexpected_box(box_type, STSZ));
        }
        let data = read_to_end(reader).await?;
        parser::parse_stsz_data(&data)
    }
}

impl fmt::Display for SampleSizeBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SampleSize(count: {}, ", self.sample_count)?;

        if self.sample_size != 0 {
            write!(f, "constant_size: {})", self.sample_size)
        } else {
            write!(f, "variable_sizes: {} entries)", self.entry_sizes.len())
        }
    }
}

impl SerializeBox for SampleSizeBox {
    fn box_type(&self) -> FourCC {
        FourCC(*STSZ)
    }

    fn into_body_bytes(self) -> Vec<u8> {
        let mut data = Vec::new();

        data.push(self.version);
        data.extend(self.flags);
        data.extend(self.sample_size.to_be_bytes());
        data.extend(self.sample_count.to_be_bytes());

        // The size table is only present for variable sample sizes
        if self.sample_size == 0 {
            for size in self.entry_sizes.0.into_iter() {
                data.extend(size.to_be_bytes());
            }
        }

        data
    }
}

mod parser {
    use winnow::{
        binary::be_u32,
        combinator::{repeat, seq, trace},
        error::StrContext,
        ModalResult, Parser,
    };

    use super::{SampleEntrySizes, SampleSizeBox};
    use crate::boxes::util::parser::{flags3, stream, version, Stream};

    pub fn parse_stsz_data(input: &[u8]) -> Result<SampleSizeBox, crate::ParseError> {
        parse_stsz_data_inner
            .parse(stream(input))
            .map_err(crate::ParseError::from_winnow)
    }

    fn parse_stsz_data_inner(input: &mut Stream<'_>) -> ModalResult<SampleSizeBox> {
        trace(
            "stsz",
            seq!(SampleSizeBox {
                version: version,
                flags: flags3,
                sample_size: be_u32.context(StrContext::Label("sample_size")),
                sample_count: be_u32.context(StrContext::Label("sample_count")),
                entry_sizes: repeat(0.., be_u32.context(StrContext::Label("entry_size")))
                    .map(SampleEntrySizes)
                    .context(StrContext::Label("entry_sizes")),
            })
            .context(StrContext::Label("stsz")),
        )
        .parse_next(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boxes::test_utils::roundtrip_body;

    #[test]
    fn test_stsz_roundtrip_variable() {
        let stsz = SampleSizeBox::from_sizes(vec![512, 1024, 768]);
        assert_eq!(roundtrip_body(stsz.clone()), stsz);
    }

    #[test]
    fn test_stsz_roundtrip_constant() {
        let stsz = SampleSizeBox::with_constant_size(1024, 100);
        assert_eq!(roundtrip_body(stsz.clone()), stsz);
    }

    #[test]
    fn test_sample_sizes_iterator() {
        let constant = SampleSizeBox::with_constant_size(640, 3);
        assert_eq!(
            constant.sample_sizes().copied().collect::<Vec<_>>(),
            vec![640, 640, 640]
        );
        assert_eq!(constant.total_sample_size(), 1920);

        let variable = SampleSizeBox::from_sizes(vec![1, 2, 3]);
        assert_eq!(
            variable.sample_sizes().copied().collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(variable.total_sample_size(), 6);
    }
}
