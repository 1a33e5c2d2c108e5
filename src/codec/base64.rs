//! Standard Base64 (RFC 4648 alphabet, `=` padding) in constant time.
//!
//! Symbol lookup never branches on or indexes by the value being encoded or
//! decoded, so secret-derived bytes do not leak through timing. Alphabet
//! ranges:
//!
//! ```text
//! ABCDEFGHIJKLMNOPQRSTUVWXYZ abcdefghijklmnopqrstuvwxyz 0123456789  +   /
//! Index:   0 - 25            26 - 51                    52 - 61     62  63
//! ASCII:  65 - 90            97 - 122                   48 - 57     43  47
//! ```

use crate::error::CodecError;

const PADDING: u8 = b'=';

/// Marker returned by [`decode_symbol`] for characters outside the alphabet.
const INVALID_BYTE: i32 = 256;

/// Encodes `data` as padded standard Base64.
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);

    let mut groups = data.chunks_exact(3);
    for group in &mut groups {
        let c = (u32::from(group[0]) << 16) | (u32::from(group[1]) << 8) | u32::from(group[2]);
        out.push(encode_sextet(c >> 18));
        out.push(encode_sextet(c >> 12));
        out.push(encode_sextet(c >> 6));
        out.push(encode_sextet(c));
    }

    let rest = groups.remainder();
    if !rest.is_empty() {
        let c = (u32::from(rest[0]) << 16) | rest.get(1).map_or(0, |&b| u32::from(b) << 8);
        out.push(encode_sextet(c >> 18));
        out.push(encode_sextet(c >> 12));
        if rest.len() == 2 {
            out.push(encode_sextet(c >> 6));
        } else {
            out.push(char::from(PADDING));
        }
        out.push(char::from(PADDING));
    }

    out
}

/// Decodes padded standard Base64.
///
/// The input length must be a multiple of four with at most two trailing
/// `=`. Invalid symbols are accumulated and reported once the whole input
/// has been processed.
pub fn decode(s: &str) -> Result<Vec<u8>, CodecError> {
    let input = s.as_bytes();
    if input.is_empty() {
        return Ok(Vec::new());
    }

    let padding = padding_len(input)?;
    let symbols = &input[..input.len() - padding];

    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut bad = 0i32;

    for group in symbols.chunks(4) {
        let mut v = [0i32; 4];
        for (slot, &c) in v.iter_mut().zip(group) {
            *slot = decode_symbol(c);
            bad |= *slot & INVALID_BYTE;
        }

        // Truncation to u8 keeps exactly the bits of each output byte.
        out.push(((v[0] << 2) | (v[1] >> 4)) as u8);
        if group.len() > 2 {
            out.push(((v[1] << 4) | (v[2] >> 2)) as u8);
        }
        if group.len() > 3 {
            out.push(((v[2] << 6) | v[3]) as u8);
        }
    }

    if bad != 0 {
        return Err(CodecError::InvalidCharacter);
    }
    Ok(out)
}

/// Maps a 6-bit value to its alphabet symbol.
///
/// `(x - b) >> 8` is -1 when `b > x` and 0 otherwise (for the small operands
/// used here), which selects the offset that moves the result from one
/// alphabet range into the next.
fn encode_sextet(v: u32) -> char {
    let b = (v & 63) as i32;

    let mut result = b + 65;
    // b > 25
    result += ((25 - b) >> 8) & (-65 - 26 + 97);
    // b > 51
    result += ((51 - b) >> 8) & (26 - 97 - 52 + 48);
    // b > 61
    result += ((61 - b) >> 8) & (52 - 48 - 62 + 43);
    // b > 62
    result += ((62 - b) >> 8) & (62 - 43 - 63 + 47);

    char::from(result as u8)
}

/// Maps a symbol back to its 6-bit value, or to [`INVALID_BYTE`].
///
/// Starts from the invalid marker and adds the correction for whichever
/// range contains `c`. Every range test is evaluated.
fn decode_symbol(c: u8) -> i32 {
    let c = i32::from(c);
    let mut result = INVALID_BYTE;

    // c == 43
    result += (((42 - c) & (c - 44)) >> 8) & (-INVALID_BYTE + c - 43 + 62);
    // c == 47
    result += (((46 - c) & (c - 48)) >> 8) & (-INVALID_BYTE + c - 47 + 63);
    // 47 < c < 58
    result += (((47 - c) & (c - 58)) >> 8) & (-INVALID_BYTE + c - 48 + 52);
    // 64 < c < 91
    result += (((64 - c) & (c - 91)) >> 8) & (-INVALID_BYTE + c - 65);
    // 96 < c < 123
    result += (((96 - c) & (c - 123)) >> 8) & (-INVALID_BYTE + c - 97 + 26);

    result
}

fn padding_len(input: &[u8]) -> Result<usize, CodecError> {
    let padding = input.iter().rev().take_while(|&&c| c == PADDING).count();
    if input.len() < 4 || input.len() % 4 != 0 || padding > 2 {
        return Err(CodecError::InvalidPadding);
    }
    Ok(padding)
}

/// Serde adapter storing byte fields as Base64 strings.
///
/// ```ignore
/// #[serde(with = "crate::codec::base64::as_string")]
/// private: Vec<u8>,
/// ```
pub mod as_string {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&super::encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::decode(&s).map_err(D::Error::custom)
    }
}
