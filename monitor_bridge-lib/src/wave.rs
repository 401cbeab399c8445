//! `ZMW` waveform payloads: 7-in-8 bit unstuffing, sample reconstruction
//! and display resampling.

use log::{debug, error};

use crate::error::DecodeError;

/// Number of points every published channel is reduced to.
pub const RESAMPLED_LEN: usize = 128;

const BLOCK_LEN: usize = 8;
const HEADER_LEN: usize = 8;

/// Header fields read from the unstuffed payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaveHeader {
    /// Offsets 0-1 carry a checksum the monitor never fills; always 0.
    pub check_sum: i32,
    pub wave_id: i32,
    pub data_size: u8,
    pub sample_rate: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedWave {
    pub header: WaveHeader,
    pub samples: Vec<i32>,
}

/// Undo the 7-in-8 stuffing.
///
/// Each 8-byte block holds seven data bytes followed by a control byte. Bit
/// `n` of the control byte (low bit first) restores the high bit of data
/// byte `n`; a clear bit keeps only the low 7 bits. Trailing bytes that do
/// not fill a block are discarded.
pub fn unstuff(src: &[u8]) -> Vec<u8> {
    let blocks = src.chunks_exact(BLOCK_LEN);
    let remainder = blocks.remainder().len();
    let mut out = Vec::with_capacity(src.len() / BLOCK_LEN * (BLOCK_LEN - 1));

    for block in blocks {
        let control = block[BLOCK_LEN - 1];
        for (n, &byte) in block[..BLOCK_LEN - 1].iter().enumerate() {
            out.push(if (control >> n) & 1 == 1 { byte } else { byte & 0x7F });
        }
    }
    if remainder > 0 {
        debug!("discarding {} trailing wave bytes outside a full block", remainder);
    }
    out
}

/// Decode the raw bytes of one `ZMW` segment (after `ZMW|`).
///
/// Width 1 yields one sample per byte, width 2 yields big-endian signed
/// 16-bit samples; any other width yields no samples. At most
/// `data_size * sample_rate` bytes are decoded, so the zero padding of the
/// last stuffed block never becomes samples. A shorter body is logged and
/// decoded as far as it goes.
pub fn decode(payload: &[u8]) -> Result<DecodedWave, DecodeError> {
    let data = unstuff(payload);
    if data.len() < HEADER_LEN {
        return Err(DecodeError::ShortWave(data.len()));
    }

    let header = WaveHeader {
        check_sum: 0,
        wave_id: i32::from(i16::from_be_bytes([data[2], data[3]])),
        data_size: data[4],
        sample_rate: i32::from(i16::from_be_bytes([data[5], data[6]])),
    };
    debug!(
        "wave: unstuffed={} wave_id={} data_size={} sample_rate={}",
        data.len(),
        header.wave_id,
        header.data_size,
        header.sample_rate
    );

    let body = &data[HEADER_LEN..];
    let expected = usize::from(header.data_size) * usize::try_from(header.sample_rate).unwrap_or(0);

    let samples = match header.data_size {
        1 | 2 if expected > body.len() => {
            error!(
                "wave {} length mismatch: expected {} bytes, got {}",
                header.wave_id,
                expected,
                body.len()
            );
            samples_of(header.data_size, body)
        }
        1 | 2 => samples_of(header.data_size, &body[..expected]),
        other => {
            debug!("wave {} has unsupported sample width {}", header.wave_id, other);
            Vec::new()
        }
    };

    Ok(DecodedWave { header, samples })
}

fn samples_of(data_size: u8, body: &[u8]) -> Vec<i32> {
    if data_size == 1 {
        body.iter().map(|&b| i32::from(b)).collect()
    } else {
        body.chunks_exact(2)
            .map(|pair| i32::from(i16::from_be_bytes([pair[0], pair[1]])))
            .collect()
    }
}

/// Reduce `src` to [`RESAMPLED_LEN`] points by nearest-index selection:
/// output `i` is `src[i * len / 128]`. Empty input stays empty.
pub fn resample(src: &[i32]) -> Vec<i32> {
    if src.is_empty() {
        return Vec::new();
    }
    (0..RESAMPLED_LEN)
        .map(|i| src[i * src.len() / RESAMPLED_LEN])
        .collect()
}

/// Published channel name for a wave id, `None` for channels not forwarded.
pub fn wave_name(wave_id: i32) -> Option<&'static str> {
    Some(match wave_id {
        1101 | 1113 => "I",
        1102 | 1114 => "II",
        1103 | 1115 => "III",
        1104 | 1116 => "I",
        1105 | 1117 => "aVL",
        1106 | 1118 => "aVF",
        1107 | 1119 => "V1",
        1108 | 1120 => "V2",
        1109 | 1121 => "V3",
        1110 | 1122 => "V4",
        1111 | 1123 => "V5",
        1112 | 1124 => "V6",
        1151 => "RESP",
        1152 => "PLETH",
        _ => return None,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use rstest::rstest;

    use super::*;

    /// Inverse of [`unstuff`]: pack bytes seven at a time behind a control byte.
    pub(crate) fn stuff(raw: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in raw.chunks(BLOCK_LEN - 1) {
            let mut control = 0u8;
            for (n, &byte) in chunk.iter().enumerate() {
                out.push(byte & 0x7F);
                if byte & 0x80 != 0 {
                    control |= 1 << n;
                }
            }
            out.extend(std::iter::repeat_n(0, BLOCK_LEN - 1 - chunk.len()));
            out.push(control);
        }
        out
    }

    pub(crate) fn header(wave_id: i16, data_size: u8, sample_rate: i16) -> Vec<u8> {
        let id = wave_id.to_be_bytes();
        let rate = sample_rate.to_be_bytes();
        vec![0, 0, id[0], id[1], data_size, rate[0], rate[1], 0]
    }

    #[test]
    fn unstuff_restores_high_bits_from_control_byte() {
        let block = [0x81, 0x81, 0x7F, 0, 0, 0, 0, 0b0000_0001];
        assert_eq!(unstuff(&block), vec![0x81, 0x01, 0x7F, 0, 0, 0, 0]);
    }

    #[test]
    fn unstuff_drops_partial_block() {
        let mut input = vec![1, 2, 3, 4, 5, 6, 7, 0];
        input.extend_from_slice(&[9, 9, 9]);
        assert_eq!(unstuff(&input), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn round_trips_byte_samples() {
        let samples: Vec<u8> = (0..=255).step_by(5).collect();
        let mut raw = header(1152, 1, samples.len() as i16);
        raw.extend_from_slice(&samples);

        let decoded = decode(&stuff(&raw)).expect("decode");
        assert_eq!(decoded.header.wave_id, 1152);
        assert_eq!(decoded.header.data_size, 1);
        assert_eq!(decoded.header.sample_rate, samples.len() as i32);
        assert_eq!(decoded.samples, samples.iter().map(|&b| i32::from(b)).collect::<Vec<_>>());
    }

    #[test]
    fn round_trips_word_samples() {
        let samples: Vec<i16> = vec![0, 1, -1, 300, -300, i16::MAX, i16::MIN];
        let mut raw = header(1102, 2, samples.len() as i16);
        for s in &samples {
            raw.extend_from_slice(&s.to_be_bytes());
        }
        let decoded = decode(&stuff(&raw)).expect("decode");
        assert_eq!(decoded.header.wave_id, 1102);
        assert_eq!(decoded.samples, samples.iter().map(|&s| i32::from(s)).collect::<Vec<_>>());
    }

    #[rstest]
    #[case(1, &[10, 20, 30, 40, 50], vec![10, 20, 30, 40, 50])]
    #[case(2, &[0, 10, 1, 0], vec![10, 256])]
    fn block_padding_is_not_a_sample(
        #[case] width: u8,
        #[case] body: &[u8],
        #[case] expected: Vec<i32>,
    ) {
        let rate = body.len() / usize::from(width);
        let mut raw = header(1101, width, rate as i16);
        raw.extend_from_slice(body);
        // Header plus body do not fill the last block, so it is zero-padded.
        assert_ne!(raw.len() % (BLOCK_LEN - 1), 0);

        let decoded = decode(&stuff(&raw)).expect("decode");
        assert_eq!(decoded.samples, expected);
        assert_eq!(resample(&decoded.samples).last(), expected.last());
    }

    #[test]
    fn short_body_still_decodes_available_region() {
        let mut raw = header(1101, 1, 100);
        raw.extend_from_slice(&[10, 20, 30, 40, 50, 60]);
        let decoded = decode(&stuff(&raw)).expect("decode");
        assert_eq!(decoded.samples, vec![10, 20, 30, 40, 50, 60]);
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    fn unsupported_width_decodes_nothing(#[case] width: u8) {
        let mut raw = header(1101, width, 4);
        raw.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        assert!(decode(&stuff(&raw)).expect("decode").samples.is_empty());
    }

    #[test]
    fn too_short_for_header() {
        assert!(matches!(
            decode(&[1, 2, 3, 4, 5, 6, 7, 0]),
            Err(DecodeError::ShortWave(7))
        ));
    }

    #[test]
    fn resample_halves_256_points() {
        let src: Vec<i32> = (0..256).collect();
        let expected: Vec<i32> = (0..256).step_by(2).collect();
        assert_eq!(resample(&src), expected);
    }

    #[test]
    fn resample_repeats_64_points() {
        let src: Vec<i32> = (0..64).collect();
        let out = resample(&src);
        assert_eq!(out.len(), RESAMPLED_LEN);
        for (i, v) in out.iter().enumerate() {
            assert_eq!(*v, (i * 64 / 128) as i32);
        }
        assert_eq!(&out[..4], &[0, 0, 1, 1]);
    }

    #[test]
    fn resample_empty() {
        assert!(resample(&[]).is_empty());
    }

    #[rstest]
    #[case(1114, Some("II"))]
    #[case(1151, Some("RESP"))]
    #[case(1152, Some("PLETH"))]
    #[case(1200, None)]
    fn names(#[case] id: i32, #[case] expected: Option<&str>) {
        assert_eq!(wave_name(id), expected);
    }
}
