//! Hand-rolled BER (Basic Encoding Rules) primitives for the LDAPv3 ASN.1
//! subset this server speaks (RFC 4511 §4.1, RFC 4511 Appendix B). Every tag
//! this server decodes or encodes has a tag number under 31, so only the
//! short (single-byte) tag form is implemented; the high-tag-number form is
//! out of scope.

use crate::errors::{HeraclesError, Result};

pub const CLASS_UNIVERSAL: u8 = 0b00;
pub const CLASS_APPLICATION: u8 = 0b01;
pub const CLASS_CONTEXT: u8 = 0b10;

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_ENUMERATED: u8 = 0x0A;
pub const TAG_SEQUENCE: u8 = 0x10;
pub const TAG_SET: u8 = 0x11;

/// One decoded tag-length-value unit. `content` borrows from the input
/// buffer the TLV was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub class: u8,
    pub constructed: bool,
    pub number: u8,
    pub content: &'a [u8],
}

impl<'a> Tlv<'a> {
    fn tag_description(&self) -> String {
        format!(
            "class={} constructed={} number={}",
            self.class, self.constructed, self.number
        )
    }

    /// Verifies this TLV's class and tag number, returning its content.
    pub fn expect(&self, class: u8, number: u8) -> Result<&'a [u8]> {
        if self.class != class || self.number != number {
            return Err(HeraclesError::Protocol(format!(
                "expected class={class} number={number}, found {}",
                self.tag_description()
            )));
        }
        Ok(self.content)
    }
}

/// Computes the byte tag for `(class, constructed, number)` (numbers 0..=30).
pub fn tag_byte(class: u8, constructed: bool, number: u8) -> u8 {
    debug_assert!(number <= 30, "high-tag-number form is not implemented");
    (class << 6) | (if constructed { 0b0010_0000 } else { 0 }) | number
}

/// Reads one full TLV from the front of `input`, returning the decoded
/// `Tlv` and the remaining bytes after it.
pub fn read_tlv(input: &[u8]) -> Result<(Tlv<'_>, &[u8])> {
    let tag = *input
        .first()
        .ok_or_else(|| HeraclesError::Protocol("unexpected end of input reading tag".into()))?;
    let class = (tag >> 6) & 0b11;
    let constructed = tag & 0b0010_0000 != 0;
    let number = tag & 0b0001_1111;
    if number == 0b1_1111 {
        return Err(HeraclesError::Protocol(
            "high-tag-number form is not supported".into(),
        ));
    }

    let (len, len_consumed) = read_length(&input[1..])?;
    let header_len = 1 + len_consumed;
    if input.len() < header_len + len {
        return Err(HeraclesError::Protocol("truncated TLV content".into()));
    }
    let content = &input[header_len..header_len + len];
    let rest = &input[header_len + len..];
    Ok((
        Tlv {
            class,
            constructed,
            number,
            content,
        },
        rest,
    ))
}

/// Reads every top-level TLV in `input` until it is exhausted.
pub fn read_all_tlv(mut input: &[u8]) -> Result<Vec<Tlv<'_>>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        let (tlv, rest) = read_tlv(input)?;
        out.push(tlv);
        input = rest;
    }
    Ok(out)
}

/// Parses a BER length (short or long form), returning `(length, bytes
/// consumed)`.
pub fn read_length(input: &[u8]) -> Result<(usize, usize)> {
    let first = *input
        .first()
        .ok_or_else(|| HeraclesError::Protocol("unexpected end of input reading length".into()))?;
    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }
    let num_bytes = (first & 0x7F) as usize;
    if num_bytes == 0 || num_bytes > 4 {
        return Err(HeraclesError::Protocol(format!(
            "invalid long-form length: {num_bytes} length-of-length bytes"
        )));
    }
    if input.len() < 1 + num_bytes {
        return Err(HeraclesError::Protocol("truncated length bytes".into()));
    }
    let mut len: usize = 0;
    for &b in &input[1..1 + num_bytes] {
        len = (len << 8) | b as usize;
    }
    Ok((len, 1 + num_bytes))
}

/// Determines the total byte length of one PDU (header + content) sitting
/// at the front of `input`, or `None` if not enough bytes have arrived yet
/// to know — the caller should ask the socket for more bytes rather than
/// treating this as an error.
pub fn peek_total_len(input: &[u8]) -> Result<Option<usize>> {
    if input.len() < 2 {
        return Ok(None);
    }
    let first_len_byte = input[1];
    let len_of_len = if first_len_byte & 0x80 == 0 {
        0
    } else {
        let n = (first_len_byte & 0x7F) as usize;
        if n == 0 || n > 4 {
            return Err(HeraclesError::Protocol(format!(
                "invalid long-form length: {n} length-of-length bytes"
            )));
        }
        n
    };
    let header_len = 2 + len_of_len;
    if input.len() < header_len {
        return Ok(None);
    }
    let (len, consumed) = read_length(&input[1..])?;
    Ok(Some(1 + consumed + len))
}

/// Writes a BER length in minimal short/long form.
pub fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = len.to_be_bytes();
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len() - 1);
    let significant = &bytes[first_nonzero..];
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
}

/// Writes a complete TLV: tag byte, length, then `content` verbatim.
pub fn write_tlv(out: &mut Vec<u8>, class: u8, constructed: bool, number: u8, content: &[u8]) {
    out.push(tag_byte(class, constructed, number));
    write_length(out, content.len());
    out.extend_from_slice(content);
}

/// Wraps `content` (already-encoded child TLVs, concatenated) in a
/// constructed SEQUENCE of the given class/number.
pub fn wrap_sequence(out: &mut Vec<u8>, class: u8, number: u8, content: &[u8]) {
    write_tlv(out, class, true, number, content);
}

/// Encodes a universal OCTET STRING.
pub fn encode_octet_string(out: &mut Vec<u8>, value: &str) {
    write_tlv(out, CLASS_UNIVERSAL, false, TAG_OCTET_STRING, value.as_bytes());
}

/// Encodes a context-tagged primitive OCTET STRING (used by several
/// `[n] OCTET STRING` fields, e.g. Bind's simple password and Extended's
/// request/response name/value).
pub fn encode_context_octet_string(out: &mut Vec<u8>, number: u8, value: &str) {
    write_tlv(out, CLASS_CONTEXT, false, number, value.as_bytes());
}

/// Decodes OCTET STRING content as UTF-8 (lossily — LDAP values are
/// nominally arbitrary octets, but every attribute this server models is
/// textual).
pub fn decode_octet_string(content: &[u8]) -> String {
    String::from_utf8_lossy(content).into_owned()
}

/// Encodes a universal INTEGER or ENUMERATED value (same wire shape; the
/// tag number distinguishes them).
pub fn encode_integer_like(out: &mut Vec<u8>, tag: u8, value: i64) {
    write_tlv(out, CLASS_UNIVERSAL, false, tag, &encode_integer(value));
}

/// Encodes an integer as minimal-length big-endian two's complement.
pub fn encode_integer(value: i64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let b = bytes[start];
        let next = bytes[start + 1];
        let redundant_zero = b == 0x00 && next & 0x80 == 0;
        let redundant_ff = b == 0xFF && next & 0x80 != 0;
        if redundant_zero || redundant_ff {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

/// Decodes a minimal-length big-endian two's complement INTEGER/ENUMERATED.
pub fn decode_integer(content: &[u8]) -> Result<i64> {
    if content.is_empty() {
        return Err(HeraclesError::Protocol("empty INTEGER content".into()));
    }
    if content.len() > 8 {
        return Err(HeraclesError::Protocol("INTEGER too large to represent".into()));
    }
    let negative = content[0] & 0x80 != 0;
    let mut buf = [if negative { 0xFFu8 } else { 0u8 }; 8];
    let start = 8 - content.len();
    buf[start..].copy_from_slice(content);
    Ok(i64::from_be_bytes(buf))
}

/// Encodes a BOOLEAN.
pub fn encode_boolean(out: &mut Vec<u8>, value: bool) {
    write_tlv(
        out,
        CLASS_UNIVERSAL,
        false,
        TAG_BOOLEAN,
        &[if value { 0xFF } else { 0x00 }],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_length_roundtrips() {
        let mut out = Vec::new();
        write_length(&mut out, 5);
        assert_eq!(out, vec![5]);
        assert_eq!(read_length(&out).unwrap(), (5, 1));
    }

    #[test]
    fn long_form_length_roundtrips() {
        let mut out = Vec::new();
        write_length(&mut out, 300);
        assert_eq!(read_length(&out).unwrap(), (300, out.len()));
        assert_eq!(out[0], 0x82);
    }

    #[test]
    fn integer_encoding_is_minimal() {
        assert_eq!(encode_integer(0), vec![0]);
        assert_eq!(encode_integer(127), vec![0x7F]);
        assert_eq!(encode_integer(128), vec![0x00, 0x80]);
        assert_eq!(encode_integer(-1), vec![0xFF]);
        assert_eq!(decode_integer(&encode_integer(3)).unwrap(), 3);
        assert_eq!(decode_integer(&encode_integer(-129)).unwrap(), -129);
        assert_eq!(decode_integer(&encode_integer(65536)).unwrap(), 65536);
    }

    #[test]
    fn read_tlv_roundtrips_a_sequence() {
        let mut out = Vec::new();
        encode_octet_string(&mut out, "hi");
        let mut seq = Vec::new();
        wrap_sequence(&mut seq, CLASS_UNIVERSAL, TAG_SEQUENCE, &out);

        let (tlv, rest) = read_tlv(&seq).unwrap();
        assert!(rest.is_empty());
        assert_eq!(tlv.class, CLASS_UNIVERSAL);
        assert!(tlv.constructed);
        assert_eq!(tlv.number, TAG_SEQUENCE);

        let (inner, inner_rest) = read_tlv(tlv.content).unwrap();
        assert!(inner_rest.is_empty());
        assert_eq!(decode_octet_string(inner.content), "hi");
    }

    #[test]
    fn peek_total_len_waits_for_more_bytes() {
        let mut out = Vec::new();
        encode_octet_string(&mut out, "hello world");
        assert_eq!(peek_total_len(&out).unwrap(), Some(out.len()));
        assert_eq!(peek_total_len(&out[..out.len() - 1]).unwrap(), None);
        assert_eq!(peek_total_len(&[]).unwrap(), None);
    }

    #[test]
    fn rejects_high_tag_number_form() {
        assert!(read_tlv(&[0x1F, 0x01, 0x00]).is_err());
    }

    #[test]
    fn rejects_invalid_long_form_length() {
        assert!(read_length(&[0x84, 0x00, 0x00, 0x00]).is_err());
    }
}
