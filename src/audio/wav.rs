//! WAV container encode/decode — the canonical wire format between the
//! Capture Stage and the Worker Stage (PCM, 16-bit signed LE, mono).

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::CaptureError;

pub fn encode(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut buf = Vec::new();
    {
        let cursor = Cursor::new(&mut buf);
        let mut writer =
            WavWriter::new(cursor, spec).map_err(|e| CaptureError::WavEncode(e.into()))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::WavEncode(e.into()))?;
        }
        writer.finalize().map_err(|e| CaptureError::WavEncode(e.into()))?;
    }
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> anyhow::Result<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let sample_rate = reader.spec().sample_rate;
    let samples: Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    Ok((samples?, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_bit_exact() {
        let samples: Vec<i16> = (-100..100).collect();
        let encoded = encode(&samples, 16_000).unwrap();
        let (decoded, rate) = decode(&encoded).unwrap();
        assert_eq!(decoded, samples);
        assert_eq!(rate, 16_000);
    }
}
