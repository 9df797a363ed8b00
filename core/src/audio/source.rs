//! Sound resources and the decoders instantiated from them
//!
//! A [`SoundResource`] is the shareable, immutable description of a sound.
//! Each playing voice owns its own [`Decoder`], created on the audio thread
//! when the voice becomes active. Decoders expose optional capabilities
//! (restart, seeking, position, length); an unsupported capability is a
//! no-op for the mixer, never an error.

use std::fmt;
use std::sync::Arc;

/// Failure to construct a decoder for a requested sound
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("sound '{0}' has no sample data")]
    Empty(String),

    #[error("sound '{name}' is not playable: {reason}")]
    Unsupported { name: String, reason: String },

    #[error("sound '{name}' data is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
}

/// A playable sound that can mint independent decoders.
pub trait SoundResource: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Construct a fresh decoder positioned at the start.
    fn instantiate(&self) -> Result<Box<dyn Decoder>, DecodeError>;
}

/// Per-voice sample generator.
///
/// Release happens on drop.
pub trait Decoder: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Fill `out` with interleaved frames.
    ///
    /// Returns the number of whole frames written; 0 means end of stream.
    fn read(&mut self, out: &mut [f32]) -> usize;

    /// Rewind to the start. Returns false if unsupported.
    fn restart(&mut self) -> bool {
        false
    }

    /// Seek to `seconds`. Returns false if unsupported.
    fn set_position(&mut self, _seconds: f32) -> bool {
        false
    }

    fn position(&self) -> Option<f32> {
        None
    }

    fn length(&self) -> Option<f32> {
        None
    }
}

// ============================================================================
// SampleBuffer
// ============================================================================

/// Fully decoded PCM held in memory. Supports every decoder capability.
#[derive(Clone)]
pub struct SampleBuffer {
    name: String,
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
}

impl SampleBuffer {
    /// `samples` are interleaved f32 in -1.0..=1.0
    pub fn new(name: impl Into<String>, sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            channels,
            samples: samples.into(),
        }
    }

    pub fn mono(name: impl Into<String>, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(name, sample_rate, 1, samples)
    }

    /// Convert signed 16-bit PCM.
    pub fn from_i16(name: impl Into<String>, sample_rate: u32, channels: u16, pcm: &[i16]) -> Self {
        let samples = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        Self::new(name, sample_rate, channels, samples)
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("frames", &self.frames())
            .finish()
    }
}

impl SoundResource for SampleBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Result<Box<dyn Decoder>, DecodeError> {
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(DecodeError::Unsupported {
                name: self.name.clone(),
                reason: format!("{} Hz, {} channels", self.sample_rate, self.channels),
            });
        }
        if self.frames() == 0 {
            return Err(DecodeError::Empty(self.name.clone()));
        }
        Ok(Box::new(SampleDecoder {
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
            channels: self.channels,
            cursor: 0,
        }))
    }
}

struct SampleDecoder {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
    /// Next frame to read
    cursor: usize,
}

impl SampleDecoder {
    fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

impl Decoder for SampleDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let channels = self.channels as usize;
        let wanted = out.len() / channels;
        let count = wanted.min(self.frames() - self.cursor);
        let start = self.cursor * channels;
        let end = start + count * channels;
        out[..count * channels].copy_from_slice(&self.samples[start..end]);
        self.cursor += count;
        count
    }

    fn restart(&mut self) -> bool {
        self.cursor = 0;
        true
    }

    fn set_position(&mut self, seconds: f32) -> bool {
        let frame = (seconds.max(0.0) * self.sample_rate as f32) as usize;
        self.cursor = frame.min(self.frames());
        true
    }

    fn position(&self) -> Option<f32> {
        Some(self.cursor as f32 / self.sample_rate as f32)
    }

    fn length(&self) -> Option<f32> {
        Some(self.frames() as f32 / self.sample_rate as f32)
    }
}

// ============================================================================
// SquareWave
// ============================================================================

/// Procedural square-wave beeper. Supports restart but not seeking.
#[derive(Debug, Clone)]
pub struct SquareWave {
    name: String,
    pub frequency: f32,
    pub amplitude: f32,
    /// None plays forever
    pub duration: Option<f32>,
    pub sample_rate: u32,
}

impl SquareWave {
    pub fn new(name: impl Into<String>, frequency: f32, duration: Option<f32>) -> Self {
        Self {
            name: name.into(),
            frequency,
            amplitude: 0.25,
            duration,
            sample_rate: 22_050,
        }
    }
}

impl SoundResource for SquareWave {
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> Result<Box<dyn Decoder>, DecodeError> {
        if self.frequency.is_nan() || self.frequency <= 0.0 || self.sample_rate == 0 {
            return Err(DecodeError::Unsupported {
                name: self.name.clone(),
                reason: format!("frequency {} Hz", self.frequency),
            });
        }
        let total = self
            .duration
            .map(|secs| (secs.max(0.0) * self.sample_rate as f32) as u64);
        Ok(Box::new(SquareDecoder {
            half_period: self.sample_rate as f32 / (self.frequency * 2.0),
            amplitude: self.amplitude,
            sample_rate: self.sample_rate,
            total,
            emitted: 0,
        }))
    }
}

struct SquareDecoder {
    half_period: f32,
    amplitude: f32,
    sample_rate: u32,
    total: Option<u64>,
    emitted: u64,
}

impl Decoder for SquareDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        1
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let remaining = self
            .total
            .map_or(out.len(), |total| total.saturating_sub(self.emitted) as usize);
        let count = out.len().min(remaining);
        for sample in &mut out[..count] {
            let phase = (self.emitted as f32 / self.half_period) as u64;
            *sample = if phase % 2 == 0 {
                self.amplitude
            } else {
                -self.amplitude
            };
            self.emitted += 1;
        }
        count
    }

    fn restart(&mut self) -> bool {
        self.emitted = 0;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_reads_to_end() {
        let sound = SampleBuffer::new("s", 100, 2, (0..20).map(|i| i as f32).collect());
        let mut decoder = sound.instantiate().unwrap();
        let mut out = [0.0; 8];
        assert_eq!(decoder.read(&mut out), 4);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(decoder.read(&mut out), 4);
        assert_eq!(decoder.read(&mut out), 2);
        assert_eq!(decoder.read(&mut out), 0);
        assert_eq!(decoder.position(), Some(0.1));
    }

    #[test]
    fn test_sample_buffer_seek_and_restart() {
        let sound = SampleBuffer::mono("s", 10, (0..10).map(|i| i as f32).collect());
        let mut decoder = sound.instantiate().unwrap();
        assert!(decoder.set_position(0.5));
        let mut out = [0.0; 1];
        decoder.read(&mut out);
        assert_eq!(out[0], 5.0);
        assert!(decoder.restart());
        decoder.read(&mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(decoder.length(), Some(1.0));
    }

    #[test]
    fn test_empty_sample_buffer_fails_to_instantiate() {
        let sound = SampleBuffer::mono("silence", 44_100, Vec::new());
        assert_eq!(
            sound.instantiate().err(),
            Some(DecodeError::Empty("silence".into()))
        );
    }

    #[test]
    fn test_square_wave_has_no_seek() {
        let wave = SquareWave::new("beep", 441.0, Some(0.01));
        let mut decoder = wave.instantiate().unwrap();
        assert!(!decoder.set_position(0.0));
        assert_eq!(decoder.position(), None);

        let mut out = vec![0.0; 1024];
        assert_eq!(decoder.read(&mut out), 220);
        assert_eq!(out[0], 0.25);
        assert_eq!(out[25], -0.25);
        assert_eq!(decoder.read(&mut out), 0);
        assert!(decoder.restart());
        assert_eq!(decoder.read(&mut out), 220);
    }
}
