//! Playback Stage: owns the output device on a dedicated thread (cpal
//! streams are not `Send`, mirroring the reference implementation's
//! dedicated sound-player thread), drains the Jitter Buffer, and writes
//! fixed-size sub-chunks to the device in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::config::PlaybackConfig;
use crate::error::PlaybackError;
use crate::jitter_buffer::JitterBuffer;
use crate::queue::BoundedQueue;
use crate::worker::SynthesizedChunk;

pub struct PlaybackStage {
    handle: Option<JoinHandle<()>>,
}

impl PlaybackStage {
    pub fn start(
        device_name: Option<String>,
        cfg: PlaybackConfig,
        input: Arc<BoundedQueue<SynthesizedChunk>>,
        jitter: Arc<JitterBuffer>,
        stop: Arc<AtomicBool>,
    ) -> Result<Self, PlaybackError> {
        let handle = std::thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                if let Err(err) = run(device_name, cfg, input, jitter, stop) {
                    tracing::error!(error = %err, "playback stage terminated");
                }
            })
            .map_err(|e| PlaybackError::DeviceWrite(e.into()))?;

        Ok(Self { handle: Some(handle) })
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn open_device(name: Option<&str>) -> anyhow::Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        if let Some(device) = host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
        {
            return Ok(device);
        }
    }
    host.default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device available"))
}

fn run(
    device_name: Option<String>,
    cfg: PlaybackConfig,
    input: Arc<BoundedQueue<SynthesizedChunk>>,
    jitter: Arc<JitterBuffer>,
    stop: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let device = open_device(device_name.as_deref()).map_err(PlaybackError::DeviceWrite)?;
    let supported = device.default_output_config()?;
    let device_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();

    // Device-feed ring: the cpal callback drains this; underruns write silence.
    let feed = HeapRb::<f32>::new(device_rate as usize / 2);
    let (mut feed_prod, mut feed_cons) = feed.split();

    let err_fn = |err| tracing::warn!(error = %err, "output stream error");
    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |out: &mut [f32], _| {
                for frame in out.chunks_mut(channels) {
                    let sample = feed_cons.pop().unwrap_or(0.0);
                    for s in frame.iter_mut() {
                        *s = sample;
                    }
                }
            },
            err_fn,
            None,
        ),
        other => anyhow::bail!("unsupported output sample format: {other:?}"),
    }?;
    stream.play()?;

    while !stop.load(Ordering::Relaxed) {
        match input.try_pop(Duration::from_millis(cfg.pop_timeout_ms)) {
            Ok(chunk) => {
                let resampled = if chunk.sample_rate == device_rate {
                    chunk.samples
                } else {
                    crate::audio::resample::sinc(&chunk.samples, chunk.sample_rate, device_rate)
                        .unwrap_or(chunk.samples)
                };
                // Drain each sub-chunk right after pushing it rather than queueing
                // the whole utterance first — the jitter buffer's capacity is far
                // shorter than a long synthesized utterance, so pushing the full
                // batch up front would drop everything but the tail.
                for sub in resampled.chunks(cfg.sub_chunk_samples) {
                    jitter.push(sub.to_vec());
                    while let Some(drained) = jitter.pop() {
                        write_blocking(&mut feed_prod, &drained, &stop);
                    }
                }
            }
            Err(crate::error::QueueError::Closed) => break,
            Err(_) => {}
        }
    }

    drop(stream);
    Ok(())
}

/// Push `data` into the device-feed ring, waiting for space rather than
/// dropping samples, honoring the "synchronous writer" device contract.
fn write_blocking(prod: &mut ringbuf::HeapProd<f32>, data: &[f32], stop: &AtomicBool) {
    let mut offset = 0;
    while offset < data.len() {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let pushed = prod.push_slice(&data[offset..]);
        offset += pushed;
        if offset < data.len() {
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}
