use crate::error::CommandError;
use byteorder::{BigEndian, ByteOrder};
use log::trace;

/// Every trace read from the FIFO starts with this byte.
pub const SYNC_BYTE: u8 = 0xac;

const SAMPLE_MASK: u32 = 0x3ff;
const SAMPLE_OFFSET: f64 = 0.5;

fn sample(word: u32, shift: u32) -> f64 {
    ((word >> shift) & SAMPLE_MASK) as f64 / 1024.0 - SAMPLE_OFFSET
}

/// Unpacks a raw FIFO dump into samples centred on zero.
///
/// Each 32 bit big endian word holds three 10 bit samples, with the top two bits counting how
/// many of them were taken before the trigger. Words are skipped until the first one with a
/// post-trigger sample, from then on every sample is kept.
pub fn decode_trace_data(data: &[u8]) -> Result<Vec<f64>, CommandError> {
    match data.first() {
        Some(&SYNC_BYTE) => {}
        other => return Err(CommandError::Framing(other.copied())),
    }

    let words = data[1..].chunks_exact(4);
    let mut measurements = Vec::with_capacity(words.len() * 3);
    let mut triggered = false;

    for (index, chunk) in words.enumerate() {
        let word = BigEndian::read_u32(chunk);
        let samples = [sample(word, 0), sample(word, 10), sample(word, 20)];

        if triggered {
            measurements.extend_from_slice(&samples);
            continue;
        }

        let before = (word >> 30) as usize;
        if before == 3 {
            trace!("Skipping word {} ({:#010x}) before trigger", index, word);
            continue;
        }
        measurements.extend_from_slice(&samples[before..]);
        triggered = true;
    }

    Ok(measurements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(tag: u32, s1: u32, s2: u32, s3: u32) -> [u8; 4] {
        (tag << 30 | s3 << 20 | s2 << 10 | s1).to_be_bytes()
    }

    fn packet(words: &[[u8; 4]]) -> Vec<u8> {
        let mut data = vec![SYNC_BYTE];
        for word in words {
            data.extend_from_slice(word);
        }
        data
    }

    #[test]
    fn word_entirely_before_trigger_is_skipped() {
        let data = packet(&[word(3, 100, 200, 300)]);
        assert!(decode_trace_data(&data).unwrap().is_empty());
    }

    #[test]
    fn word_after_trigger_yields_three_samples_in_order() {
        let data = packet(&[word(0, 0, 512, 768)]);
        assert_eq!(decode_trace_data(&data).unwrap(), vec![-0.5, 0.0, 0.25]);
    }

    #[test]
    fn tag_keeps_only_post_trigger_samples() {
        let data = packet(&[word(2, 0, 0, 768)]);
        assert_eq!(decode_trace_data(&data).unwrap(), vec![0.25]);

        let data = packet(&[word(1, 0, 256, 768)]);
        assert_eq!(decode_trace_data(&data).unwrap(), vec![-0.25, 0.25]);
    }

    #[test]
    fn tag_is_ignored_once_triggered() {
        let data = packet(&[
            word(3, 1, 2, 3),
            word(2, 0, 0, 512),
            word(3, 256, 512, 768),
        ]);
        assert_eq!(
            decode_trace_data(&data).unwrap(),
            vec![0.0, -0.25, 0.0, 0.25]
        );
    }

    #[test]
    fn trailing_partial_word_is_dropped() {
        let mut data = packet(&[word(0, 512, 512, 512)]);
        data.extend_from_slice(&[0x12, 0x34]);
        assert_eq!(decode_trace_data(&data).unwrap().len(), 3);
    }

    #[test]
    fn wrong_sync_byte_is_a_framing_error() {
        let result = decode_trace_data(&[0xab, 0, 0, 0, 0]);
        assert!(matches!(result, Err(CommandError::Framing(Some(0xab)))));

        let result = decode_trace_data(&[]);
        assert!(matches!(result, Err(CommandError::Framing(None))));
    }
}
