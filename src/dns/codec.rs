//! DNS query encoding and A-record response parsing
//!
//! Covers only what a single-address lookup needs: one question, type A,
//! class IN, datagrams of at most 512 bytes. Compression pointers in answers
//! are stepped over and never followed.

use std::net::Ipv4Addr;
use thiserror::Error;

pub const HEADER_LEN: usize = 12;
pub const MAX_DATAGRAM_LEN: usize = 512;
pub const MAX_LABEL_LEN: usize = 63;

const FLAGS_STANDARD_QUERY: u16 = 0x0100;
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;
/// Terminating zero byte plus QTYPE and QCLASS
const QUESTION_TRAILER_LEN: usize = 5;
/// TYPE, CLASS, TTL, RDLENGTH
const ANSWER_PREAMBLE_LEN: usize = 10;
const POINTER_MASK: u8 = 0xC0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Empty label in domain name")]
    EmptyLabel,
    #[error("Label of {len} bytes exceeds {MAX_LABEL_LEN}")]
    LabelTooLong { len: usize },
    #[error("Query of {len} bytes exceeds {MAX_DATAGRAM_LEN}")]
    QueryTooLong { len: usize },
}

/// Build a standard A/IN query for `domain` with transaction id `id`.
pub fn encode_query(id: u16, domain: &str) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(HEADER_LEN + domain.len() + 6);
    put_u16(&mut out, id);
    put_u16(&mut out, FLAGS_STANDARD_QUERY);
    put_u16(&mut out, 1); // questions
    put_u16(&mut out, 0); // answers
    put_u16(&mut out, 0); // authority
    put_u16(&mut out, 0); // additional

    for label in domain.split('.') {
        let len = label.len();
        if len == 0 {
            return Err(EncodeError::EmptyLabel);
        }
        if len > MAX_LABEL_LEN {
            return Err(EncodeError::LabelTooLong { len });
        }
        out.push(len as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);

    put_u16(&mut out, TYPE_A);
    put_u16(&mut out, CLASS_IN);

    if out.len() > MAX_DATAGRAM_LEN {
        return Err(EncodeError::QueryTooLong { len: out.len() });
    }
    Ok(out)
}

/// Extract the first A record from a response to query `expected_id`.
///
/// Short datagrams, foreign transaction ids, empty answer sections and any
/// out-of-bounds offset all yield `None`.
pub fn parse_response(expected_id: u16, datagram: &[u8]) -> Option<Ipv4Addr> {
    let len = datagram.len();
    if !(HEADER_LEN..=MAX_DATAGRAM_LEN).contains(&len) {
        return None;
    }
    if read_u16(datagram, 0)? != expected_id {
        return None;
    }
    let answer_count = read_u16(datagram, 6)?;
    if answer_count == 0 {
        return None;
    }

    let mut pos = HEADER_LEN;
    while pos < len && datagram[pos] != 0 {
        pos += 1;
    }
    pos += QUESTION_TRAILER_LEN;

    for _ in 0..answer_count {
        while pos < len && datagram[pos] & POINTER_MASK == POINTER_MASK {
            pos += 2;
        }
        if pos + ANSWER_PREAMBLE_LEN > len {
            return None;
        }

        let record_type = read_u16(datagram, pos)?;
        let data_len = usize::from(read_u16(datagram, pos + 8)?);
        pos += ANSWER_PREAMBLE_LEN;

        if record_type == TYPE_A && data_len == 4 {
            let octets = datagram.get(pos..pos + 4)?;
            return Some(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]));
        }
        pos += data_len;
    }

    None
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn read_u16(buf: &[u8], pos: usize) -> Option<u16> {
    let bytes = buf.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Response to `encode_query(id, "example.com")` with the given answers,
    /// each answer name a pointer back to the question.
    fn response(id: u16, answers: &[(u16, &[u8])]) -> Vec<u8> {
        let mut out = encode_query(id, "example.com").unwrap();
        out[2] = 0x81;
        out[3] = 0x80;
        out[6..8].copy_from_slice(&(answers.len() as u16).to_be_bytes());
        for (record_type, data) in answers {
            out.extend_from_slice(&[0xC0, 0x0C]);
            out.extend_from_slice(&record_type.to_be_bytes());
            out.extend_from_slice(&1u16.to_be_bytes());
            out.extend_from_slice(&300u32.to_be_bytes());
            out.extend_from_slice(&(data.len() as u16).to_be_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    #[test]
    fn test_encode_query_layout() {
        let query = encode_query(0x1234, "mqtt.example.com").unwrap();

        assert_eq!(&query[..HEADER_LEN], &[
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00
        ]);
        let mut name = vec![4];
        name.extend_from_slice(b"mqtt");
        name.push(7);
        name.extend_from_slice(b"example");
        name.push(3);
        name.extend_from_slice(b"com");
        name.push(0);
        assert_eq!(&query[HEADER_LEN..HEADER_LEN + name.len()], &name[..]);
        assert_eq!(&query[HEADER_LEN + name.len()..], &[0, 1, 0, 1]);
    }

    #[test]
    fn test_encode_rejects_bad_labels() {
        assert_eq!(encode_query(1, "a..b"), Err(EncodeError::EmptyLabel));
        assert_eq!(encode_query(1, ""), Err(EncodeError::EmptyLabel));
        let long = format!("{}.com", "x".repeat(64));
        assert_eq!(
            encode_query(1, &long),
            Err(EncodeError::LabelTooLong { len: 64 })
        );
        let max = format!("{}.com", "x".repeat(63));
        assert!(encode_query(1, &max).is_ok());
    }

    #[test]
    fn test_parse_single_a_record() {
        let datagram = response(7, &[(1, &[93, 184, 216, 34])]);
        assert_eq!(
            parse_response(7, &datagram),
            Some(Ipv4Addr::new(93, 184, 216, 34))
        );
    }

    #[test]
    fn test_parse_skips_non_a_records() {
        let cname: &[u8] = &[3, b'w', b'w', b'w', 0xC0, 0x0C];
        let datagram = response(9, &[(5, cname), (1, &[10, 0, 0, 5])]);
        assert_eq!(parse_response(9, &datagram), Some(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn test_parse_ignores_mismatched_id() {
        let datagram = response(7, &[(1, &[1, 2, 3, 4])]);
        assert_eq!(parse_response(8, &datagram), None);
    }

    #[test]
    fn test_parse_ignores_empty_answers_and_short_datagrams() {
        assert_eq!(parse_response(7, &response(7, &[])), None);
        assert_eq!(parse_response(0, &[0u8; 11]), None);
    }

    #[test]
    fn test_parse_rejects_truncated_record() {
        let mut datagram = response(7, &[(1, &[1, 2, 3, 4])]);
        datagram.truncate(datagram.len() - 2);
        assert_eq!(parse_response(7, &datagram), None);

        let mut datagram = response(7, &[(1, &[1, 2, 3, 4])]);
        datagram.truncate(datagram.len() - 8);
        assert_eq!(parse_response(7, &datagram), None);
    }

    #[test]
    fn test_parse_a_record_with_wrong_length_is_skipped() {
        let datagram = response(3, &[(1, &[1, 2, 3, 4, 5, 6])]);
        assert_eq!(parse_response(3, &datagram), None);
    }

    #[test]
    fn test_parse_never_panics_on_garbage() {
        let mut datagram = vec![0u8; 40];
        datagram[6] = 0xFF;
        datagram[7] = 0xFF;
        datagram[12..].fill(0xC0);
        assert_eq!(parse_response(0, &datagram), None);

        assert_eq!(parse_response(0, &[0u8; MAX_DATAGRAM_LEN + 1]), None);
    }
}
