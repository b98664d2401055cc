use winnow::{
    binary::{be_i16, be_u16, be_u32, be_u64, u8},
    combinator::trace,
    error::{ParserError, StrContext, StrContextValue},
    Bytes, LocatingSlice, ModalResult, Parser,
};

use crate::FourCC;

pub type Stream<'i> = LocatingSlice<&'i Bytes>;

pub fn stream(b: &[u8]) -> Stream<'_> {
    LocatingSlice::new(Bytes::new(b))
}

pub fn fourcc(input: &mut Stream<'_>) -> ModalResult<FourCC> {
    trace(
        "fourcc",
        byte_array.map(FourCC).context(StrContext::Label("fourcc")),
    )
    .parse_next(input)
}

pub fn version(input: &mut Stream<'_>) -> ModalResult<u8> {
    trace("version", u8)
        .context(StrContext::Label("version"))
        .parse_next(input)
}

pub fn version_0_or_1(input: &mut Stream<'_>) -> ModalResult<u8> {
    trace(
        "version_0_or_1",
        version
            .verify(|version| *version <= 1)
            .context(StrContext::Expected(StrContextValue::Description(
                "expected version 0 or 1",
            ))),
    )
    .parse_next(input)
}

pub fn flags3(input: &mut Stream<'_>) -> ModalResult<[u8; 3]> {
    trace("flags", byte_array)
        .context(StrContext::Label("flags"))
        .parse_next(input)
}

pub fn be_u32_as_usize(input: &mut Stream<'_>) -> ModalResult<usize> {
    trace(
        "be_u32_as_usize",
        be_u32
            .map(|s| s as usize)
            .context(StrContext::Expected(StrContextValue::Description("be u32"))),
    )
    .parse_next(input)
}

pub fn be_u32_as_u64(input: &mut Stream<'_>) -> ModalResult<u64> {
    trace(
        "be_u32_as_u64",
        be_u32
            .map(|s| s as u64)
            .context(StrContext::Expected(StrContextValue::Description("be u32"))),
    )
    .parse_next(input)
}

pub fn be_i32_as_i64(input: &mut Stream<'_>) -> ModalResult<i64> {
    trace(
        "be_i32_as_i64",
        winnow::binary::be_i32
            .map(|s| s as i64)
            .context(StrContext::Expected(StrContextValue::Description("be i32"))),
    )
    .parse_next(input)
}

/// Parses a 32-bit (version 0) or 64-bit (version 1) unsigned field.
pub fn versioned_be_u64<'i>(version: u8) -> impl Parser<Stream<'i>, u64, winnow::error::ErrMode<winnow::error::ContextError>> {
    trace("versioned_be_u64", move |input: &mut Stream<'i>| {
        if version == 1 {
            be_u64.parse_next(input)
        } else {
            be_u32_as_u64.parse_next(input)
        }
    })
}

pub fn byte_array<const N: usize>(input: &mut Stream<'_>) -> ModalResult<[u8; N]> {
    trace("byte_array", fixed_array(u8)).parse_next(input)
}

pub fn fixed_array<'i, const N: usize, Input, Output, Error, ParseNext>(
    mut parser: ParseNext,
) -> impl Parser<Input, [Output; N], Error> + 'i
where
    Input: winnow::stream::Stream + 'i,
    ParseNext: Parser<Input, Output, Error> + 'i,
    Error: ParserError<Input> + 'i,
    Output: std::fmt::Debug + 'i,
{
    trace("fixed_array", move |input: &mut Input| {
        let mut list: Vec<Output> = Vec::with_capacity(N);
        for _ in 0..N {
            list.push(parser.by_ref().complete_err().parse_next(input)?);
        }
        let out: [Output; N] = list.try_into().unwrap();
        Ok(out)
    })
}

pub const FIXED_POINT_16X16_SCALE: f32 = 65536.0;

pub fn fixed_point_16x16(input: &mut Stream<'_>) -> ModalResult<f32> {
    trace(
        "fixed_point_16x16",
        be_u32.map(|v| (v as f32) / FIXED_POINT_16X16_SCALE),
    )
    .parse_next(input)
}

pub const FIXED_POINT_8X8_SCALE: f32 = 256.0;

pub fn fixed_point_8x8(input: &mut Stream<'_>) -> ModalResult<f32> {
    trace(
        "fixed_point_8x8",
        be_u16.map(|v| (v as f32) / FIXED_POINT_8X8_SCALE),
    )
    .parse_next(input)
}

pub fn signed_fixed_point_8x8(input: &mut Stream<'_>) -> ModalResult<f32> {
    trace(
        "signed_fixed_point_8x8",
        be_i16.map(|v| (v as f32) / FIXED_POINT_8X8_SCALE),
    )
    .parse_next(input)
}
