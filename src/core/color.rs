//! Fixed-width color encodings.
//!
//! Input clouds carry their color as a `f32` whose bit pattern is
//! `0x??RRGGBB`. Augmented clouds carry a `u32` whose little-endian bytes
//! are `[b, g, r, label * 7]`.

/// Multiplier spreading class ids across the label byte for display.
pub const LABEL_SCALE: u8 = 7;

/// Decode a packed color float into `[r, g, b]`.
#[inline]
pub fn unpack_rgb(packed: f32) -> [u8; 3] {
    let bits = packed.to_bits();
    [
        ((bits >> 16) & 0xff) as u8,
        ((bits >> 8) & 0xff) as u8,
        (bits & 0xff) as u8,
    ]
}

/// Pack `[r, g, b]` into the float form used by input clouds.
#[inline]
pub fn pack_rgb(rgb: [u8; 3]) -> f32 {
    let [r, g, b] = rgb;
    f32::from_bits(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
}

/// The label byte for a class id, `id * 7` truncated to eight bits.
#[inline]
pub fn label_byte(label: u8) -> u8 {
    label.wrapping_mul(LABEL_SCALE)
}

/// Encode a point color and its class id as `u32::from_le_bytes([b, g, r, id * 7])`.
#[inline]
pub fn encode_rgba(rgb: [u8; 3], label: u8) -> u32 {
    let [r, g, b] = rgb;
    u32::from_le_bytes([b, g, r, label_byte(label)])
}

/// Split an encoded color back into `[b, g, r, label_byte]`.
#[inline]
pub fn decode_rgba(rgba: u32) -> [u8; 4] {
    rgba.to_le_bytes()
}
