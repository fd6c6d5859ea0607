// Copyright (c) 2023 Hemashushu <hippospark@gmail.com>, All rights reserved.
//
// This Source Code Form is subject to the terms of
// the Mozilla Public License version 2.0 and additional exceptions,
// more details in file LICENSE and CONTRIBUTING.

// COBS (consistent overhead byte stuffing)
//
// the payload is split into groups of at most 254 non-zero bytes;
// each group is preceded by one header byte holding the distance to
// the next header. a header of 0xff means "254 data bytes follow and
// no zero is implied"; any smaller header implies a zero byte after
// the group (except at the very end of the frame).
//
//   payload        encoded
//   []             [01]
//   [00]           [01 01]
//   [11 22 00 33]  [03 11 22 02 33]
//
// the encoded form never contains 0x00, so the receiver can treat
// every 0x00 on the wire as an end-of-frame marker.

use crate::WireError;

pub fn cobs_encode(payload: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(payload.len() + payload.len() / 254 + 2);

    let mut group_start = encoded.len();
    encoded.push(0); // header placeholder
    let mut group_len: u8 = 1;

    for &byte in payload {
        if byte == 0 {
            encoded[group_start] = group_len;
            group_start = encoded.len();
            encoded.push(0);
            group_len = 1;
        } else {
            encoded.push(byte);
            group_len += 1;
            if group_len == 0xff {
                encoded[group_start] = group_len;
                group_start = encoded.len();
                encoded.push(0);
                group_len = 1;
            }
        }
    }

    encoded[group_start] = group_len;
    encoded
}

pub fn cobs_decode(encoded: &[u8]) -> Result<Vec<u8>, WireError> {
    let mut payload = Vec::with_capacity(encoded.len());
    let mut position = 0;

    while position < encoded.len() {
        let header = encoded[position];
        if header == 0 {
            return Err(WireError::InvalidFrame);
        }
        let group_end = position + header as usize;
        if group_end > encoded.len() {
            return Err(WireError::InvalidFrame);
        }

        payload.extend_from_slice(&encoded[position + 1..group_end]);

        position = group_end;
        // a full group implies no zero; a shorter one implies a zero
        // byte unless the frame ends here
        if header != 0xff && position < encoded.len() {
            payload.push(0);
        }
    }

    Ok(payload)
}

/// a complete wire frame: the stuffed payload plus the terminator
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = cobs_encode(payload);
    frame.push(0);
    frame
}

/// the receive side: accumulates raw bytes and yields one decoded
/// payload per `0x00` terminator.
///
/// owns its input buffer; it never aliases VM memory.
#[derive(Default)]
pub struct FrameAccumulator {
    buffer: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// feeds received bytes, returning the payloads of all frames
    /// completed by this chunk.
    ///
    /// a malformed frame is dropped and reported, the accumulator
    /// stays usable for the following frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Vec<u8>, WireError>> {
        let mut payloads = Vec::new();
        for &byte in bytes {
            if byte == 0 {
                if !self.buffer.is_empty() {
                    payloads.push(cobs_decode(&self.buffer));
                    self.buffer.clear();
                }
            } else {
                self.buffer.push(byte);
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{cobs_decode, cobs_encode, encode_frame, FrameAccumulator};

    #[test]
    fn test_cobs_round_trip() {
        let cases: Vec<Vec<u8>> = vec![
            vec![],
            vec![0],
            vec![0, 0],
            vec![0x11, 0x22, 0x00, 0x33],
            vec![0x11, 0x00],
            vec![0x00, 0x11],
            (1..=255u8).collect(),
            vec![0xaa; 600],
            vec![0x00; 300],
        ];

        for payload in cases {
            let encoded = cobs_encode(&payload);
            assert!(!encoded.contains(&0), "encoded frame must be zero-free");
            assert_eq!(cobs_decode(&encoded).unwrap(), payload);
        }
    }

    #[test]
    fn test_cobs_known_vectors() {
        assert_eq!(cobs_encode(&[]), vec![0x01]);
        assert_eq!(cobs_encode(&[0x00]), vec![0x01, 0x01]);
        assert_eq!(
            cobs_encode(&[0x11, 0x22, 0x00, 0x33]),
            vec![0x03, 0x11, 0x22, 0x02, 0x33]
        );
    }

    #[test]
    fn test_accumulator_splits_frames() {
        let mut accumulator = FrameAccumulator::new();

        let mut stream = encode_frame(&[1, 2, 3]);
        stream.extend(encode_frame(&[0, 0, 9]));

        // deliver in two arbitrary chunks
        let (first, second) = stream.split_at(4);
        let mut payloads = accumulator.feed(first);
        payloads.extend(accumulator.feed(second));

        let payloads: Vec<Vec<u8>> =
            payloads.into_iter().map(|payload| payload.unwrap()).collect();
        assert_eq!(payloads, vec![vec![1, 2, 3], vec![0, 0, 9]]);
    }

    #[test]
    fn test_accumulator_recovers_after_bad_frame() {
        let mut accumulator = FrameAccumulator::new();

        // header claims 5 bytes but only 2 follow
        let mut stream = vec![0x05, 0x11, 0x22, 0x00];
        stream.extend(encode_frame(&[7]));

        let payloads = accumulator.feed(&stream);
        assert_eq!(payloads.len(), 2);
        assert!(payloads[0].is_err());
        assert_eq!(payloads[1], Ok(vec![7]));
    }
}
