//! Capture Stage: owns the input device, the Ring Buffer, the VAD
//! Segmenter, and the in-progress utterance accumulator. Runs inside the
//! cpal device callback (T1, soft-realtime context).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};

use crate::audio::ring_buffer::RingBuffer;
use crate::audio::vad::VadSegmenter;
use crate::audio::wav;
use crate::config::{CaptureConfig, RingBufferConfig, VadConfig};
use crate::error::CaptureError;
use crate::queue::BoundedQueue;
use crate::session::SessionId;
use crate::telemetry::{StepEvent, TelemetryEvent, TelemetryHub, ThreadKind};
use crate::worker::UtteranceRecord;

/// Down-mix an interleaved multi-channel block to mono by averaging.
fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let channels = channels as usize;
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn to_i16(data: &[f32]) -> Vec<i16> {
    data.iter().map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).collect()
}

struct Accumulator {
    samples: Vec<i16>,
    capture_start: chrono::DateTime<chrono::Utc>,
}

struct Inner {
    ring: RingBuffer,
    vad: VadSegmenter,
    frame_len: usize,
    leftover: Vec<i16>,
    accumulator: Option<Accumulator>,
    pre_roll_secs: f32,
    max_blocking_ms: u64,
    max_duration_secs: Option<f32>,
    sample_rate: u32,
    device_rate: u32,
    device_channels: u16,

    queue: Arc<BoundedQueue<UtteranceRecord>>,
    telemetry: Arc<TelemetryHub>,
    session: SessionId,
}

impl Inner {
    fn process_device_block(&mut self, raw: &[f32]) {
        let mono = to_mono(raw, self.device_channels);
        let resampled = crate::audio::resample::linear(&mono, self.device_rate, self.sample_rate);
        let pcm = to_i16(&resampled);

        self.ring.append(&pcm, Instant::now());
        self.telemetry
            .counters
            .total_frames
            .fetch_add((pcm.len() / self.frame_len.max(1)) as u64, Ordering::Relaxed);

        self.leftover.extend_from_slice(&pcm);
        while self.leftover.len() >= self.frame_len {
            let frame: Vec<i16> = self.leftover.drain(..self.frame_len).collect();
            self.handle_frame(&frame);
        }

        if let Some(max_secs) = self.max_duration_secs {
            if let Some(acc) = &self.accumulator {
                let dur = acc.samples.len() as f32 / self.sample_rate as f32;
                if dur >= max_secs {
                    self.finish_utterance();
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &[i16]) {
        let decision = match self.vad.process_frame(frame) {
            Ok(d) => d,
            Err(CaptureError::FrameSizeMismatch { .. }) => return,
            Err(_) => return,
        };

        if decision.is_voice {
            self.telemetry.counters.voice_frames.fetch_add(1, Ordering::Relaxed);
        }

        if decision.should_start {
            let pre_roll = self.ring.tail(self.pre_roll_secs);
            self.accumulator = Some(Accumulator {
                samples: pre_roll,
                capture_start: chrono::Utc::now(),
            });
        }

        if let Some(acc) = &mut self.accumulator {
            acc.samples.extend_from_slice(frame);
        }

        if decision.should_stop {
            self.finish_utterance();
        }
    }

    fn finish_utterance(&mut self) {
        let Some(acc) = self.accumulator.take() else {
            return;
        };
        let sample_count = acc.samples.len();
        let duration_secs = sample_count as f32 / self.sample_rate as f32;
        let wav_bytes = match wav::encode(&acc.samples, self.sample_rate) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "WAV encode failed, dropping utterance");
                return;
            }
        };

        let record = UtteranceRecord {
            wav_bytes,
            sample_rate: self.sample_rate,
            channel_count: 1,
            sample_count,
            duration_secs,
            capture_start: acc.capture_start,
            session_id: self.session.clone(),
        };

        match self.queue.try_push(record, Duration::from_millis(self.max_blocking_ms)) {
            Ok(()) => {
                self.telemetry.counters.recordings_created.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.telemetry.counters.queue_timeouts.fetch_add(1, Ordering::Relaxed);
                self.telemetry.emit(TelemetryEvent::Step(StepEvent {
                    session_id: self.session.clone(),
                    thread: ThreadKind::Capture,
                    timestamp: chrono::Utc::now(),
                    step_kind: "audio_capture".to_string(),
                    channel: None,
                    message: Some("queue full, dropping recording".to_string()),
                    latency_ms: None,
                    model_used: None,
                    language: None,
                    errors: vec!["queue full — recording dropped".to_string()],
                    metadata: serde_json::Value::Null,
                }));
            }
        }
    }

    /// Flush any in-progress accumulator exactly once, used on shutdown.
    fn flush_on_stop(&mut self) {
        if self.accumulator.is_some() {
            self.finish_utterance();
        }
    }
}

pub struct CaptureStage {
    stream: Stream,
}

impl CaptureStage {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        device_name: Option<&str>,
        ring_cfg: &RingBufferConfig,
        vad_cfg: &VadConfig,
        capture_cfg: &CaptureConfig,
        queue: Arc<BoundedQueue<UtteranceRecord>>,
        telemetry: Arc<TelemetryHub>,
        session: SessionId,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| CaptureError::DeviceOpen(e.into()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false)),
            None => None,
        }
        .or_else(|| host.default_input_device())
        .ok_or_else(|| CaptureError::DeviceOpen(anyhow::anyhow!("no input device available")))?;

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::DeviceOpen(e.into()))?;
        let device_rate = supported.sample_rate().0;
        let device_channels = supported.channels();
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        let frame_len = (ring_cfg.sample_rate as usize * vad_cfg.frame_ms as usize) / 1000;
        let inner = Inner {
            ring: RingBuffer::new(ring_cfg.sample_rate, ring_cfg.duration_secs),
            vad: VadSegmenter::new(vad_cfg, ring_cfg.sample_rate),
            frame_len,
            leftover: Vec::new(),
            accumulator: None,
            pre_roll_secs: capture_cfg.pre_roll_ms as f32 / 1000.0,
            max_blocking_ms: capture_cfg.max_blocking_ms,
            max_duration_secs: capture_cfg.max_duration_secs,
            sample_rate: ring_cfg.sample_rate,
            device_rate,
            device_channels,
            queue,
            telemetry,
            session,
        };

        let stream = Self::build_stream(&device, &stream_config, sample_format, inner, stop)?;
        stream.play().map_err(|e| CaptureError::DeviceOpen(e.into()))?;
        Ok(Self { stream })
    }

    fn build_stream(
        device: &cpal::Device,
        config: &StreamConfig,
        format: SampleFormat,
        mut inner: Inner,
        stop: Arc<AtomicBool>,
    ) -> Result<Stream, CaptureError> {
        let err_fn = |err| tracing::warn!(error = %err, "input stream error");

        let stream = match format {
            SampleFormat::F32 => device.build_input_stream(
                config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if stop.load(Ordering::Relaxed) {
                        inner.flush_on_stop();
                        return;
                    }
                    inner.process_device_block(data);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(CaptureError::DeviceOpen(anyhow::anyhow!(
                    "unsupported input sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| CaptureError::DeviceOpen(e.into()))?;

        Ok(stream)
    }

    pub fn pause(&self) -> Result<(), CaptureError> {
        self.stream.pause().map_err(|e| CaptureError::DeviceOpen(e.into()))
    }
}

impl Drop for CaptureStage {
    fn drop(&mut self) {
        let _ = self.stream.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_mono_averages_stereo_frames() {
        let interleaved = vec![1.0, -1.0, 0.5, 0.5];
        let mono = to_mono(&interleaved, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn to_mono_passthrough_for_single_channel() {
        let mono_in = vec![0.1, 0.2, 0.3];
        assert_eq!(to_mono(&mono_in, 1), mono_in);
    }

    #[test]
    fn to_i16_clamps_out_of_range() {
        let pcm = to_i16(&[2.0, -2.0, 0.0]);
        assert_eq!(pcm, vec![i16::MAX, -i16::MAX, 0]);
    }
}
