//! Worker Stage: one thread orchestrating ASR → translate → synthesize per
//! utterance, with long-audio chunking and peak-normalized synthesis
//! output, directly mirroring the reference pipeline's per-utterance loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::WorkerConfig;
use crate::engines::{AsrEngine, MtEngine, TtsEngine};
use crate::queue::BoundedQueue;
use crate::session::SessionId;
use crate::telemetry::{SessionRollup, StepEvent, TelemetryEvent, TelemetryHub, ThreadKind};

pub struct UtteranceRecord {
    pub wav_bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub sample_count: usize,
    pub duration_secs: f32,
    pub capture_start: DateTime<Utc>,
    pub session_id: SessionId,
}

pub struct SynthesizedChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub session_id: SessionId,
}

pub struct WorkerStage {
    cfg: WorkerConfig,
    asr: Arc<dyn AsrEngine>,
    mt: Arc<dyn MtEngine>,
    tts: Arc<dyn TtsEngine>,
    src_lang: String,
    dst_lang: String,
}

impl WorkerStage {
    pub fn new(
        cfg: WorkerConfig,
        asr: Arc<dyn AsrEngine>,
        mt: Arc<dyn MtEngine>,
        tts: Arc<dyn TtsEngine>,
        src_lang: String,
        dst_lang: String,
    ) -> Self {
        Self {
            cfg,
            asr,
            mt,
            tts,
            src_lang,
            dst_lang,
        }
    }

    /// Runs until `D1` closes. Blocking pops at 1s per the concurrency model.
    /// On stop, no further item is popped once the current one (if any) has
    /// been handled — the queue tail is discarded. Whether that current,
    /// already-popped item is allowed to finish or is abandoned mid-phase is
    /// governed by `cfg.drain_on_stop`.
    pub fn run(
        &self,
        input: &BoundedQueue<UtteranceRecord>,
        output: &BoundedQueue<SynthesizedChunk>,
        telemetry: &TelemetryHub,
        stop: &AtomicBool,
    ) {
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            match input.try_pop(Duration::from_secs(1)) {
                Ok(record) => self.process(record, output, telemetry, stop),
                Err(crate::error::QueueError::Closed) => break,
                Err(_) => continue,
            }
        }
    }

    /// Returns true if processing should stop immediately without finishing
    /// the remaining phases: only when `drain_on_stop` is disabled and a
    /// shutdown has been requested mid-utterance.
    fn should_abandon(&self, stop: &AtomicBool) -> bool {
        !self.cfg.drain_on_stop && stop.load(Ordering::Relaxed)
    }

    fn process(
        &self,
        record: UtteranceRecord,
        output: &BoundedQueue<SynthesizedChunk>,
        telemetry: &TelemetryHub,
        stop: &AtomicBool,
    ) {
        let session = record.session_id.clone();
        let e2e_start = Instant::now();
        let mut errors = Vec::new();

        let (text, detected_language, asr_latency_ms, asr_segments) = self.transcribe(&record, &mut errors);
        telemetry.counters.asr_latency_ms.store(asr_latency_ms as u64, Ordering::Relaxed);
        self.emit_step(telemetry, &session, "asr", asr_latency_ms, detected_language.clone(), &errors);

        if text.trim().is_empty() {
            telemetry.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
            self.emit_rollup(telemetry, &session, "", "", asr_segments, 0, e2e_start, &errors);
            return;
        }
        if self.should_abandon(stop) {
            self.emit_rollup(telemetry, &session, &text, "", asr_segments, 0, e2e_start, &errors);
            return;
        }

        let mt_start = Instant::now();
        let translated = if self.src_lang != self.dst_lang {
            match self.mt.translate(&text, &self.src_lang, &self.dst_lang) {
                Ok(t) if !t.trim().is_empty() => t,
                Ok(_) => {
                    telemetry.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
                    self.emit_rollup(telemetry, &session, &text, "", asr_segments, 0, e2e_start, &errors);
                    return;
                }
                Err(err) => {
                    errors.push(format!("translation failed, using source text: {err}"));
                    text.clone()
                }
            }
        } else {
            text.clone()
        };
        let mt_latency_ms = mt_start.elapsed().as_secs_f64() * 1000.0;
        telemetry.counters.mt_latency_ms.store(mt_latency_ms as u64, Ordering::Relaxed);
        self.emit_step(telemetry, &session, "translation", mt_latency_ms, None, &errors);

        if self.should_abandon(stop) {
            self.emit_rollup(telemetry, &session, &text, &translated, asr_segments, 0, e2e_start, &errors);
            return;
        }

        let tts_start = Instant::now();
        let synthesized = match self.tts.synthesize(&translated, &self.dst_lang) {
            Ok(audio) => audio,
            Err(err) => {
                errors.push(format!("synthesis failed: {err}"));
                telemetry.counters.processing_errors.fetch_add(1, Ordering::Relaxed);
                self.emit_step(telemetry, &session, "synthesis", 0.0, None, &errors);
                self.emit_rollup(telemetry, &session, &text, &translated, asr_segments, 0, e2e_start, &errors);
                return;
            }
        };
        let tts_latency_ms = tts_start.elapsed().as_secs_f64() * 1000.0;
        telemetry.counters.tts_latency_ms.store(tts_latency_ms as u64, Ordering::Relaxed);

        let mut samples = decode_and_resample(&synthesized.bytes, self.cfg.playback_sample_rate);
        peak_normalize(&mut samples);

        let e2e_ms = e2e_start.elapsed().as_secs_f64() * 1000.0;
        telemetry.counters.e2e_latency_ms.store(e2e_ms as u64, Ordering::Relaxed);
        self.emit_step(telemetry, &session, "synthesis", tts_latency_ms, None, &errors);
        self.emit_rollup(telemetry, &session, &text, &translated, asr_segments, 1, e2e_start, &errors);

        let chunk = SynthesizedChunk {
            samples,
            sample_rate: self.cfg.playback_sample_rate,
            session_id: session,
        };
        let _ = output.push_blocking(chunk);
    }

    /// ASR phase, including long-audio chunking with overlap and word-level
    /// de-duplication at chunk boundaries. Returns the asr segment count
    /// alongside the usual (text, detected_language, latency_ms).
    fn transcribe(&self, record: &UtteranceRecord, errors: &mut Vec<String>) -> (String, Option<String>, f64, u32) {
        let start = Instant::now();
        if record.duration_secs <= self.cfg.long_audio_threshold_secs {
            let result = self.asr.transcribe(&record.wav_bytes, Some(&self.src_lang));
            let elapsed = start.elapsed().as_secs_f64() * 1000.0;
            return match result {
                Ok(r) => (r.text, r.detected_language, elapsed, 1),
                Err(err) => {
                    errors.push(format!("ASR failed: {err}"));
                    (String::new(), None, elapsed, 0)
                }
            };
        }

        let chunks = split_with_overlap(&record.wav_bytes, record.sample_rate, self.cfg.chunk_secs, self.cfg.chunk_overlap_secs);
        let segments = chunks.len() as u32;
        let mut pieces: Vec<String> = Vec::new();
        let mut detected = None;
        for chunk in chunks {
            match self.asr.transcribe(&chunk, Some(&self.src_lang)) {
                Ok(r) => {
                    if detected.is_none() && r.detected_language.is_some() {
                        detected = r.detected_language;
                    }
                    if !r.text.trim().is_empty() {
                        pieces.push(r.text);
                    }
                }
                Err(err) => errors.push(format!("ASR chunk failed: {err}")),
            }
        }
        let text = clean_overlap_duplicates(&pieces);
        (text, detected, start.elapsed().as_secs_f64() * 1000.0, segments)
    }

    fn emit_step(
        &self,
        telemetry: &TelemetryHub,
        session: &SessionId,
        step_kind: &str,
        latency_ms: f64,
        language: Option<String>,
        errors: &[String],
    ) {
        telemetry.emit(TelemetryEvent::Step(StepEvent {
            session_id: session.clone(),
            thread: ThreadKind::Worker,
            timestamp: Utc::now(),
            step_kind: step_kind.to_string(),
            channel: Some(format!("{}->{}", self.src_lang, self.dst_lang)),
            message: None,
            latency_ms: Some(latency_ms),
            model_used: None,
            language,
            errors: errors.to_vec(),
            metadata: serde_json::Value::Null,
        }));
    }

    /// Emits the per-utterance summary row backing the rollup table. Called
    /// once at every exit point of `process`, successful or not.
    #[allow(clippy::too_many_arguments)]
    fn emit_rollup(
        &self,
        telemetry: &TelemetryHub,
        session: &SessionId,
        input_text: &str,
        translated_text: &str,
        asr_segments: u32,
        output_segments: u32,
        e2e_start: Instant,
        errors: &[String],
    ) {
        telemetry.emit(TelemetryEvent::Rollup(SessionRollup {
            session_id: session.clone(),
            timestamp: Utc::now(),
            input_language: self.src_lang.clone(),
            output_language: self.dst_lang.clone(),
            input_channel: None,
            output_channel: None,
            full_message_input: input_text.to_string(),
            full_message_translated: translated_text.to_string(),
            total_segments_audio: 1,
            total_segments_asr: asr_segments,
            total_segments_output: output_segments,
            model_used: None,
            total_latency_ms: e2e_start.elapsed().as_secs_f64() * 1000.0,
            errors: errors.to_vec(),
            metadata: serde_json::Value::Null,
        }));
    }
}

/// Splits raw WAV bytes into overlapping chunks, each re-encoded as WAV.
fn split_with_overlap(wav_bytes: &[u8], sample_rate: u32, chunk_secs: f32, overlap_secs: f32) -> Vec<Vec<u8>> {
    let Ok((samples, rate)) = crate::audio::wav::decode(wav_bytes) else {
        return vec![wav_bytes.to_vec()];
    };
    let chunk_len = (rate as f32 * chunk_secs) as usize;
    let overlap_len = (rate as f32 * overlap_secs) as usize;
    let step = chunk_len.saturating_sub(overlap_len).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + chunk_len).min(samples.len());
        if let Ok(bytes) = crate::audio::wav::encode(&samples[start..end], sample_rate) {
            chunks.push(bytes);
        }
        if end == samples.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Word-level duplicate cleanup at chunk boundaries: if a chunk's leading
/// words repeat the previous chunk's trailing words, drop the repeat once.
fn clean_overlap_duplicates(pieces: &[String]) -> String {
    let mut out: Vec<String> = Vec::new();
    for piece in pieces {
        let words: Vec<&str> = piece.split_whitespace().collect();
        if out.is_empty() {
            out.extend(words.iter().map(|w| w.to_string()));
            continue;
        }
        let max_overlap = words.len().min(out.len()).min(10);
        let mut overlap = 0;
        for n in (1..=max_overlap).rev() {
            if out[out.len() - n..] == words[..n] {
                overlap = n;
                break;
            }
        }
        out.extend(words[overlap..].iter().map(|w| w.to_string()));
    }
    out.join(" ")
}

fn decode_and_resample(bytes: &[u8], target_rate: u32) -> Vec<f32> {
    let Ok((samples, rate)) = crate::audio::wav::decode(bytes) else {
        return Vec::new();
    };
    let floats: Vec<f32> = samples.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
    if rate == target_rate {
        return floats;
    }
    crate::audio::resample::sinc(&floats, rate, target_rate).unwrap_or(floats)
}

/// Peak-normalize to [-1, 1]; silence-on-zero-max fallback per the
/// reference implementation's synthesis thread.
fn peak_normalize(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()));
    if peak == 0.0 {
        return;
    }
    for s in samples.iter_mut() {
        *s /= peak;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_drops_repeated_boundary_words() {
        let pieces = vec!["the quick brown fox".to_string(), "brown fox jumps over".to_string()];
        let merged = clean_overlap_duplicates(&pieces);
        assert_eq!(merged, "the quick brown fox jumps over");
    }

    #[test]
    fn dedup_handles_no_overlap() {
        let pieces = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(clean_overlap_duplicates(&pieces), "hello world");
    }

    #[test]
    fn peak_normalize_scales_to_unit_peak() {
        let mut samples = vec![0.5, -2.0, 1.0];
        peak_normalize(&mut samples);
        assert!((samples[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn peak_normalize_zero_max_is_silence() {
        let mut samples = vec![0.0, 0.0];
        peak_normalize(&mut samples);
        assert_eq!(samples, vec![0.0, 0.0]);
    }
}
