//! VAD Segmenter: frame-level voice decision plus start/stop hysteresis.
//!
//! The hysteresis state machine mirrors the reference implementation's
//! `VADProcessor` (consecutive voice/silence frame counters). Per-frame
//! voice/silence classification is delegated to a WebRTC-style fixed-point
//! detector; this module owns only the streak counters and transition
//! table, never the raw classification.

use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use crate::config::VadConfig;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Recording,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Decision {
    pub is_voice: bool,
    pub is_recording: bool,
    pub should_start: bool,
    pub should_stop: bool,
    /// Populated only when `should_stop` is set.
    pub recording_duration_ms: u32,
}

pub struct VadSegmenter {
    detector: VoiceActivityDetector,
    sample_rate: u32,
    frame_ms: u32,
    voice_threshold_frames: u32,
    silence_threshold_frames: u32,
    silence_thresh_dbfs: Option<f32>,

    state: State,
    voice_streak: u32,
    silence_streak: u32,
    recording_frames: u32,
}

fn profile_for(aggressiveness: u8) -> VoiceActivityProfile {
    match aggressiveness {
        0 => VoiceActivityProfile::QUALITY,
        1 => VoiceActivityProfile::LBR,
        2 => VoiceActivityProfile::AGGRESSIVE,
        _ => VoiceActivityProfile::VERY_AGGRESSIVE,
    }
}

impl VadSegmenter {
    pub fn new(cfg: &VadConfig, sample_rate: u32) -> Self {
        let voice_threshold_frames = (cfg.voice_threshold_ms / cfg.frame_ms).max(1);
        let silence_threshold_frames = (cfg.silence_threshold_ms / cfg.frame_ms).max(1);
        Self {
            detector: VoiceActivityDetector::new(profile_for(cfg.aggressiveness)),
            sample_rate,
            frame_ms: cfg.frame_ms,
            voice_threshold_frames,
            silence_threshold_frames,
            silence_thresh_dbfs: cfg.silence_thresh_dbfs,
            state: State::Idle,
            voice_streak: 0,
            silence_streak: 0,
            recording_frames: 0,
        }
    }

    fn expected_frame_len(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize) / 1000
    }

    fn below_amplitude_gate(&self, frame: &[i16]) -> bool {
        let Some(gate_dbfs) = self.silence_thresh_dbfs else {
            return false;
        };
        let peak = frame.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0) as f32;
        if peak == 0.0 {
            return true;
        }
        let dbfs = 20.0 * (peak / i16::MAX as f32).log10();
        dbfs < gate_dbfs
    }

    /// Classify one fixed-duration frame and advance the hysteresis state
    /// machine. A wrong-size frame is a non-fatal rejection: state is
    /// unchanged and an error is returned.
    pub fn process_frame(&mut self, frame: &[i16]) -> Result<Decision, CaptureError> {
        let expected = self.expected_frame_len();
        if frame.len() != expected {
            return Err(CaptureError::FrameSizeMismatch {
                expected,
                got: frame.len(),
            });
        }

        let is_voice = if self.below_amplitude_gate(frame) {
            false
        } else {
            self.detector
                .predict_16khz(frame)
                .unwrap_or(false)
        };

        let mut decision = Decision {
            is_voice,
            ..Default::default()
        };

        match self.state {
            State::Idle => {
                if is_voice {
                    self.voice_streak += 1;
                    self.silence_streak = 0;
                    if self.voice_streak >= self.voice_threshold_frames {
                        self.state = State::Recording;
                        self.recording_frames = self.voice_streak;
                        decision.should_start = true;
                    }
                } else {
                    self.silence_streak += 1;
                    self.voice_streak = 0;
                }
            }
            State::Recording => {
                self.recording_frames += 1;
                if is_voice {
                    self.voice_streak += 1;
                    self.silence_streak = 0;
                } else {
                    self.silence_streak += 1;
                    self.voice_streak = 0;
                    if self.silence_streak >= self.silence_threshold_frames {
                        self.state = State::Idle;
                        decision.should_stop = true;
                        decision.recording_duration_ms = self.recording_frames * self.frame_ms;
                        self.recording_frames = 0;
                        self.voice_streak = 0;
                        self.silence_streak = 0;
                    }
                }
            }
        }

        decision.is_recording = self.state == State::Recording;
        Ok(decision)
    }

    pub fn is_recording(&self) -> bool {
        self.state == State::Recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> VadConfig {
        VadConfig {
            frame_ms: 30,
            voice_threshold_ms: 90,
            silence_threshold_ms: 90,
            aggressiveness: 2,
            preset: crate::config::SilencePreset::Balanced,
            enabled: true,
            silence_thresh_dbfs: None,
        }
    }

    fn voice_frame(len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| ((i as f32 * 0.3).sin() * 20000.0) as i16)
            .collect()
    }

    fn silence_frame(len: usize) -> Vec<i16> {
        vec![0; len]
    }

    #[test]
    fn wrong_frame_size_is_rejected_without_state_change() {
        let mut vad = VadSegmenter::new(&cfg(), 16_000);
        let result = vad.process_frame(&[0i16; 10]);
        assert!(result.is_err());
        assert!(!vad.is_recording());
    }

    #[test]
    fn voice_streak_triggers_should_start() {
        let mut vad = VadSegmenter::new(&cfg(), 16_000);
        let frame_len = vad.expected_frame_len();
        let mut started = false;
        for _ in 0..5 {
            let d = vad.process_frame(&voice_frame(frame_len)).unwrap();
            if d.should_start {
                started = true;
                break;
            }
        }
        assert!(started);
        assert!(vad.is_recording());
    }

    #[test]
    fn silence_streak_after_recording_triggers_should_stop() {
        let mut vad = VadSegmenter::new(&cfg(), 16_000);
        let frame_len = vad.expected_frame_len();
        for _ in 0..5 {
            vad.process_frame(&voice_frame(frame_len)).unwrap();
        }
        assert!(vad.is_recording());
        let mut stopped = false;
        for _ in 0..5 {
            let d = vad.process_frame(&silence_frame(frame_len)).unwrap();
            if d.should_stop {
                stopped = true;
                assert!(d.recording_duration_ms > 0);
                break;
            }
        }
        assert!(stopped);
        assert!(!vad.is_recording());
    }
}
