//! Stateless conversions between host values and on-calculator variable
//! records.
//!
//! TI reals are sign-magnitude decimal floats: a sign byte, a biased
//! exponent (one byte on the 82 family, two little-endian bytes on the 85
//! family) and a 14-digit packed-BCD mantissa, two digits per byte with
//! the most significant first. String variables are tokenized on the
//! 83-style models and stored nearly verbatim elsewhere. All layouts are
//! fixed by TI-OS; none of this is design freedom.
//!
//! Every function is pure and keyed by an [`Endpoint`], resolved once to a
//! format family. The 89/92 family is not implemented and fails
//! distinctly instead of producing wrong bytes.

use crate::types::{put_size_word, size_word, Endpoint, Error, Family, VarType};

/// Largest encoded real across the supported families.
pub const REAL_MAX_LEN: usize = 10;

struct RealLayout {
    exp_bytes: usize,
    bias: i32,
    mantissa: usize,
    total: usize,
}

fn real_layout(model: Endpoint) -> Result<RealLayout, Error> {
    match model.family() {
        Family::Ti82 => Ok(RealLayout {
            exp_bytes: 1,
            bias: 0x80,
            mantissa: 2,
            total: 9,
        }),
        Family::Ti85 => Ok(RealLayout {
            exp_bytes: 2,
            bias: 0xFC00,
            mantissa: 3,
            total: 10,
        }),
        Family::Ti89 => Err(Error::Invalid),
    }
}

/// Encoded length of a real for `model`: 9 or 10 bytes.
pub fn real_size(model: Endpoint) -> Result<usize, Error> {
    Ok(real_layout(model)?.total)
}

fn raw_exponent(real: &[u8], layout: &RealLayout) -> i32 {
    if layout.exp_bytes == 1 {
        i32::from(real[1])
    } else {
        i32::from(real[1]) | i32::from(real[2]) << 8
    }
}

/// Decode a real record into a double.
pub fn real_to_f64(real: &[u8], model: Endpoint) -> Result<f64, Error> {
    let layout = real_layout(model)?;
    if real.len() < layout.total {
        return Err(Error::Invalid);
    }

    // The mantissa is read as a 14-digit integer, so the decimal exponent
    // is rebased by the digit count.
    let mut dec_exp = raw_exponent(real, &layout) - layout.bias - 13;

    let mut acc = 0.0f64;
    for idx in 0..14 {
        let byte = real[layout.mantissa + idx / 2];
        let digit = if idx % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        acc = 10.0 * acc + f64::from(digit);
    }

    // Repeated multiply/divide instead of powi: keeps the rounding in
    // step with the calculator's own decimal arithmetic.
    while dec_exp > 0 {
        acc *= 10.0;
        dec_exp -= 1;
    }
    while dec_exp < 0 {
        acc /= 10.0;
        dec_exp += 1;
    }

    if real[0] & 0x80 != 0 {
        acc = -acc;
    }
    Ok(acc)
}

/// Decode a real record the caller knows to be integral.
pub fn real_to_i64(real: &[u8], model: Endpoint) -> Result<i64, Error> {
    let layout = real_layout(model)?;
    if real.len() < layout.total {
        return Err(Error::Invalid);
    }

    let mut dec_exp = raw_exponent(real, &layout) - layout.bias - 13;

    let mut acc: i64 = 0;
    for idx in 0..14 {
        let byte = real[layout.mantissa + idx / 2];
        let digit = if idx % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        acc = 10 * acc + i64::from(digit);
    }

    while dec_exp > 0 {
        acc *= 10;
        dec_exp -= 1;
    }
    while dec_exp < 0 {
        acc /= 10;
        dec_exp += 1;
    }

    if real[0] & 0x80 != 0 {
        acc = -acc;
    }
    Ok(acc)
}

/// fmod drift can leave a remainder like 3.9999…; count it back up to the
/// nearest digit, clamped to one BCD nibble.
fn bcd_digit(rem: f64) -> u8 {
    let mut rem = rem;
    let mut digit = 0u8;
    while rem > 0.5 && digit < 9 {
        digit += 1;
        rem -= 1.0;
    }
    digit
}

/// Encode a double as a real record, returning the encoded length.
///
/// # Errors
/// [`Error::Invalid`] for the unsupported 89/92 family (nothing is
/// written), [`Error::BufferOverflow`] if `real` is too small.
pub fn f64_to_real(value: f64, real: &mut [u8], model: Endpoint) -> Result<usize, Error> {
    let layout = real_layout(model)?;
    if real.len() < layout.total {
        return Err(Error::BufferOverflow);
    }

    for slot in real[..layout.total].iter_mut() {
        *slot = 0;
    }
    if value < 0.0 {
        real[0] = 0x80;
    }

    // Normalize the magnitude into [1e13, 1e14) so all 14 digits sit left
    // of the decimal point.
    let mut mag = if value < 0.0 { -value } else { value };
    let mut exp: i32 = 13;
    while mag != 0.0 && mag >= 1e14 {
        mag /= 10.0;
        exp += 1;
    }
    while mag != 0.0 && mag < 1e13 {
        mag *= 10.0;
        exp -= 1;
    }

    for idx in (0..14).rev() {
        let rem = mag % 10.0;
        let digit = bcd_digit(rem);
        real[layout.mantissa + idx / 2] |= if idx % 2 == 0 { digit << 4 } else { digit };
        mag = (mag - rem) / 10.0;
    }

    let biased = exp + layout.bias;
    real[1] = biased as u8;
    if layout.exp_bytes == 2 {
        real[2] = (biased >> 8) as u8;
    }
    Ok(layout.total)
}

/// Encode a signed integer as a real record, returning the encoded
/// length. Magnitudes beyond 14 digits lose their lowest digits, as on
/// the calculator.
pub fn i64_to_real(value: i64, real: &mut [u8], model: Endpoint) -> Result<usize, Error> {
    let layout = real_layout(model)?;
    if real.len() < layout.total {
        return Err(Error::BufferOverflow);
    }

    for slot in real[..layout.total].iter_mut() {
        *slot = 0;
    }
    if value < 0 {
        real[0] = 0x80;
    }

    let mut mag = value.unsigned_abs();
    let mut exp: i32 = 13;
    while mag != 0 && mag >= 100_000_000_000_000 {
        mag /= 10;
        exp += 1;
    }
    while mag != 0 && mag < 10_000_000_000_000 {
        mag *= 10;
        exp -= 1;
    }

    for idx in (0..14).rev() {
        let digit = (mag % 10) as u8;
        real[layout.mantissa + idx / 2] |= if idx % 2 == 0 { digit << 4 } else { digit };
        mag /= 10;
    }

    let biased = exp + layout.bias;
    real[1] = biased as u8;
    if layout.exp_bytes == 2 {
        real[2] = (biased >> 8) as u8;
    }
    Ok(layout.total)
}

enum StrFormat {
    /// 83-style: leading size word, tokenized text.
    Tokens83,
    /// 82-style: leading size word, verbatim text, NUL + type marker.
    Plain82,
    /// 85/86-style: fixed type-byte prefix, verbatim text, NUL + marker.
    Plain85,
}

fn str_format(model: Endpoint) -> Result<StrFormat, Error> {
    use Endpoint::*;
    match model {
        Comp83 | Comp83p | Calc83p | Calc83 => Ok(StrFormat::Tokens83),
        Comp82 | Cbl82 | Calc82 => Ok(StrFormat::Plain82),
        Comp85 | Comp86 | Cbl85 | Calc85a | Calc85b => Ok(StrFormat::Plain85),
        _ => Err(Error::Invalid),
    }
}

/// String type marker trailing a Plain82 record.
const STR82_MARKER: u8 = VarType::String as u8;
/// Type byte prefixing (and trailing) a Plain85 record.
const STR85_MARKER: u8 = 0x0C;

/// Leading bytes that start a two-byte token.
const TWO_BYTE_LEADS: [u8; 11] = [
    0x5C, 0x5D, 0x5E, 0x60, 0x61, 0x62, 0x63, 0x7E, 0xAA, 0xBB, 0xEF,
];

/// Printable characters without an identity mapping into the token space.
/// Values above 0xFF are two-byte tokens.
const PUNCT_TOKENS: [(char, u16); 24] = [
    (' ', 0x0029),
    ('!', 0x002D),
    ('"', 0x002A),
    ('#', 0xBBD1),
    ('$', 0xBBD3),
    ('%', 0xBBDA),
    ('&', 0xBBD4),
    ('\'', 0x00AE),
    ('(', 0x0010),
    (')', 0x0011),
    ('*', 0x0082),
    ('+', 0x0070),
    (',', 0x002B),
    ('-', 0x0071),
    ('.', 0x003A),
    ('/', 0x0083),
    (':', 0x003E),
    (';', 0xBBD6),
    ('<', 0x006B),
    ('=', 0x006A),
    ('>', 0x006C),
    ('?', 0x00AF),
    ('@', 0xBBD0),
    ('^', 0x00F0),
];

fn token_for(c: char) -> Option<u16> {
    match c {
        '0'..='9' | 'A'..='Z' => Some(c as u16),
        // Lowercase letters live in two contiguous high-token runs.
        'a'..='n' => Some(0xBBB0 + (c as u16 - 'a' as u16)),
        'o'..='z' => Some(0xBBBF + (c as u16 - 'o' as u16)),
        _ => PUNCT_TOKENS.iter().find(|&&(p, _)| p == c).map(|&(_, t)| t),
    }
}

fn char_for(token: u16) -> char {
    match token {
        0x0030..=0x0039 | 0x0041..=0x005A => (token as u8) as char,
        0xBBB0..=0xBBBD => (b'a' + (token - 0xBBB0) as u8) as char,
        0xBBBF..=0xBBCA => (b'o' + (token - 0xBBBF) as u8) as char,
        _ => PUNCT_TOKENS
            .iter()
            .find(|&&(_, t)| t == token)
            .map_or('?', |&(c, _)| c),
    }
}

/// Encode `text` as a string variable record for `model`, returning the
/// total record length.
///
/// On the tokenized 83 family, bytes with no token mapping (control
/// characters, non-ASCII) are silently dropped and the embedded size word
/// counts tokens. The other families store the text verbatim.
pub fn string_to_var(text: &str, out: &mut [u8], model: Endpoint) -> Result<usize, Error> {
    match str_format(model)? {
        StrFormat::Tokens83 => {
            let mut count: u16 = 0;
            let mut offset = 2;
            for c in text.chars() {
                let token = match token_for(c) {
                    Some(token) => token,
                    None => continue,
                };
                let needed = if token > 0xFF { 2 } else { 1 };
                if offset + needed > out.len() {
                    return Err(Error::BufferOverflow);
                }
                if token > 0xFF {
                    out[offset] = (token >> 8) as u8;
                    offset += 1;
                }
                out[offset] = token as u8;
                offset += 1;
                count += 1;
            }
            if out.len() < 2 {
                return Err(Error::BufferOverflow);
            }
            put_size_word(out, count);
            Ok(offset)
        }
        StrFormat::Plain82 => {
            let bytes = printable(text);
            let total = 2 + bytes.clone().count() + 2;
            if out.len() < total {
                return Err(Error::BufferOverflow);
            }
            put_size_word(out, (total - 2) as u16);
            let mut offset = 2;
            for b in bytes {
                out[offset] = b;
                offset += 1;
            }
            out[offset] = 0x00;
            out[offset + 1] = STR82_MARKER;
            Ok(total)
        }
        StrFormat::Plain85 => {
            let bytes = printable(text);
            let total = 1 + bytes.clone().count() + 2;
            if out.len() < total {
                return Err(Error::BufferOverflow);
            }
            out[0] = STR85_MARKER;
            let mut offset = 1;
            for b in bytes {
                out[offset] = b;
                offset += 1;
            }
            out[offset] = 0x00;
            out[offset + 1] = STR85_MARKER;
            Ok(total)
        }
    }
}

fn printable(text: &str) -> impl Iterator<Item = u8> + Clone + '_ {
    text.bytes().filter(|b| b.is_ascii() && !b.is_ascii_control())
}

/// Decode a string variable record back into text. Tokens with no
/// character mapping decode to `?`.
pub fn var_to_string(var: &[u8], model: Endpoint) -> Result<String, Error> {
    match str_format(model)? {
        StrFormat::Tokens83 => {
            if var.len() < 2 {
                return Err(Error::Invalid);
            }
            let count = size_word(var);
            let mut pos = 2;
            let mut text = String::new();
            for _ in 0..count {
                if pos >= var.len() {
                    return Err(Error::Invalid);
                }
                let lead = var[pos];
                pos += 1;
                let token = if TWO_BYTE_LEADS.contains(&lead) {
                    if pos >= var.len() {
                        return Err(Error::Invalid);
                    }
                    let token = u16::from(lead) << 8 | u16::from(var[pos]);
                    pos += 1;
                    token
                } else {
                    u16::from(lead)
                };
                text.push(char_for(token));
            }
            Ok(text)
        }
        StrFormat::Plain82 => {
            if var.len() < 2 {
                return Err(Error::Invalid);
            }
            let len = usize::from(size_word(var));
            if var.len() < 2 + len {
                return Err(Error::Invalid);
            }
            let mut body = &var[2..2 + len];
            if body.len() >= 2 && body[body.len() - 2] == 0x00 {
                body = &body[..body.len() - 2];
            }
            Ok(plain_text(body))
        }
        StrFormat::Plain85 => {
            if var.is_empty() {
                return Err(Error::Invalid);
            }
            let body = &var[1..];
            let end = body.iter().position(|&b| b == 0x00).unwrap_or(body.len());
            Ok(plain_text(&body[..end]))
        }
    }
}

fn plain_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii() && !b.is_ascii_control() {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}

/// Rewrite a received variable header's type tag in place to the
/// canonical numbering, keyed by the sender's family and the primary and
/// secondary tag bytes. Runs exactly once per inbound `DATA`/`REQ`, before
/// any host callback sees the header.
pub fn normalize_var_header(header: &mut [u8], model: Endpoint) {
    if header.len() < 4 {
        return;
    }
    let primary = header[2];
    let secondary = header[3];
    header[2] = match (model.family(), primary, secondary) {
        // 82-family string-likes arrive tagged as reals; the first name
        // byte tells the subtypes apart.
        (Family::Ti82, 0x00, 0xAA) => VarType::String as u8,
        (Family::Ti82, 0x00, 0x5E) => VarType::YVar as u8,
        (Family::Ti82, 0x00, 0x60) => VarType::Picture as u8,
        // The 85 family numbers its types differently; note its real-list
        // tag is the canonical string value.
        (Family::Ti85, 0x01, _) => VarType::Complex as u8,
        (Family::Ti85, 0x04, _) => VarType::RealList as u8,
        (Family::Ti85, 0x06, _) => VarType::Matrix as u8,
        (Family::Ti85, 0x0A, _) => VarType::YVar as u8,
        (Family::Ti85, 0x0C, _) => VarType::String as u8,
        _ => primary,
    };
}
