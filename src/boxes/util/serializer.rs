use crate::boxes::util::parser::{FIXED_POINT_16X16_SCALE, FIXED_POINT_8X8_SCALE};

pub fn fixed_point_16x16(val: f32) -> Vec<u8> {
    let fixed = (val * FIXED_POINT_16X16_SCALE) as u32;
    fixed.to_be_bytes().to_vec()
}

pub fn fixed_point_8x8(val: f32) -> Vec<u8> {
    let fixed = (val * FIXED_POINT_8X8_SCALE) as u16;
    fixed.to_be_bytes().to_vec()
}

pub fn signed_fixed_point_8x8(val: f32) -> Vec<u8> {
    let fixed = (val * FIXED_POINT_8X8_SCALE) as i16;
    fixed.to_be_bytes().to_vec()
}

/// Serializes a 32-bit (version 0) or 64-bit (version 1) unsigned field.
pub fn versioned_be_u64(version: u8, value: u64) -> Vec<u8> {
    if version == 1 {
        value.to_be_bytes().to_vec()
    } else {
        u32::try_from(value)
            .expect("value must fit in u32 for version 0")
            .to_be_bytes()
            .to_vec()
    }
}
