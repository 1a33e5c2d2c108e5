//! Strict UTF-8 encoding from UTF-16 code units and validating decoding.

use crate::error::CodecError;

const SURROGATES: std::ops::RangeInclusive<u32> = 0xd800..=0xdfff;
const LEAD_SURROGATES: std::ops::RangeInclusive<u32> = 0xd800..=0xdbff;
const TRAIL_SURROGATES: std::ops::RangeInclusive<u32> = 0xdc00..=0xdfff;

/// Encodes a sequence of UTF-16 code units as UTF-8.
///
/// Surrogate pairs become one 4-byte sequence. A lead surrogate that is not
/// followed by a trail surrogate, or a trail surrogate on its own, fails with
/// [`CodecError::InvalidUtf16`].
///
/// ```ignore
/// let bytes = utf8::encode("héllo".encode_utf16())?;
/// ```
pub fn encode<I>(units: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = u16>,
{
    let mut units = units.into_iter();
    // at most 3 bytes per unit, so the buffer never reallocates
    let mut out = Vec::with_capacity(units.size_hint().0.saturating_mul(3));

    while let Some(unit) = units.next() {
        let c = u32::from(unit);
        if c < 0x80 {
            out.push(c as u8);
        } else if c < 0x800 {
            out.push(0xc0 | (c >> 6) as u8);
            out.push(0x80 | (c & 0x3f) as u8);
        } else if LEAD_SURROGATES.contains(&c) {
            let trail = units
                .next()
                .map(u32::from)
                .filter(|t| TRAIL_SURROGATES.contains(t))
                .ok_or(CodecError::InvalidUtf16)?;
            let scalar = 0x10000 + (((c & 0x3ff) << 10) | (trail & 0x3ff));
            out.push(0xf0 | (scalar >> 18) as u8);
            out.push(0x80 | ((scalar >> 12) & 0x3f) as u8);
            out.push(0x80 | ((scalar >> 6) & 0x3f) as u8);
            out.push(0x80 | (scalar & 0x3f) as u8);
        } else if TRAIL_SURROGATES.contains(&c) {
            return Err(CodecError::InvalidUtf16);
        } else {
            out.push(0xe0 | (c >> 12) as u8);
            out.push(0x80 | ((c >> 6) & 0x3f) as u8);
            out.push(0x80 | (c & 0x3f) as u8);
        }
    }

    Ok(out)
}

/// Decodes UTF-8, rejecting truncated sequences, bad continuation bytes,
/// overlong forms, encoded surrogates and scalars above U+10FFFF.
pub fn decode(bytes: &[u8]) -> Result<String, CodecError> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let lead = bytes[i];
        let (width, min, mut scalar) = match lead {
            0x00..=0x7f => {
                out.push(char::from(lead));
                i += 1;
                continue;
            }
            0xc0..=0xdf => (2, 0x80, u32::from(lead & 0x1f)),
            0xe0..=0xef => (3, 0x800, u32::from(lead & 0x0f)),
            0xf0..=0xf7 => (4, 0x10000, u32::from(lead & 0x07)),
            // stray continuation byte or 5+ byte lead
            _ => return Err(CodecError::InvalidUtf8),
        };

        let tail = bytes.get(i + 1..i + width).ok_or(CodecError::InvalidUtf8)?;
        for &b in tail {
            if b & 0xc0 != 0x80 {
                return Err(CodecError::InvalidUtf8);
            }
            scalar = (scalar << 6) | u32::from(b & 0x3f);
        }

        if scalar < min || SURROGATES.contains(&scalar) || scalar > 0x10ffff {
            return Err(CodecError::InvalidUtf8);
        }
        out.push(char::from_u32(scalar).ok_or(CodecError::InvalidUtf8)?);
        i += width;
    }

    Ok(out)
}
