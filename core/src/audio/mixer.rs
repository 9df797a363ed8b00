//! Voice mixing: resampling, panning, fades, and soft clipping

use std::f32::consts::FRAC_PI_4;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::shared::Shared;

use super::buffer::{Finished, PositionReport};
use super::command::{AudioHandle, PlayParams};
use super::source::{Decoder, SoundResource};

/// Source frames pulled from a decoder per refill
const CHUNK_FRAMES: usize = 256;

/// Destination for mixed interleaved stereo blocks.
pub trait AudioSink {
    /// Output rate in Hz; the mixer resamples every voice to this.
    fn sample_rate(&self) -> u32;

    /// Block until the device can accept `frames` more stereo frames.
    ///
    /// Implementations should give up after a short timeout so the mixing
    /// loop keeps polling commands.
    fn wait_ready(&mut self, frames: usize);

    /// Queue interleaved stereo samples (left, right, left, right, ...)
    fn write(&mut self, samples: &[f32]);
}

/// Sink that discards samples, optionally paced to real time.
pub struct NullSink {
    sample_rate: u32,
    paced: bool,
    deadline: Option<Instant>,
    written: u64,
}

impl NullSink {
    /// Discard samples at the rate a real device would consume them.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            paced: true,
            deadline: None,
            written: 0,
        }
    }

    /// Discard samples as fast as they are mixed.
    pub fn unpaced(sample_rate: u32) -> Self {
        Self {
            paced: false,
            ..Self::new(sample_rate)
        }
    }

    /// Stereo frames written so far
    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl AudioSink for NullSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn wait_ready(&mut self, _frames: usize) {
        if !self.paced {
            return;
        }
        let now = Instant::now();
        match self.deadline {
            Some(deadline) if deadline > now => thread::sleep(deadline - now),
            // Fell too far behind: resync rather than burst
            Some(deadline) if now - deadline > Duration::from_millis(100) => {
                self.deadline = Some(now);
            }
            Some(_) => {}
            None => self.deadline = Some(now),
        }
    }

    fn write(&mut self, samples: &[f32]) {
        let frames = samples.len() as u64 / 2;
        self.written += frames;
        if self.paced {
            let block = Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64);
            let base = self.deadline.unwrap_or_else(Instant::now);
            self.deadline = Some(base + block);
        }
    }
}

// ============================================================================
// Gain helpers
// ============================================================================

/// Equal-power gains for `pan` in [-1, 1]: -1 is hard left, +1 hard right,
/// centre sits at -3 dB on both sides.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let angle = (pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
    (angle.cos().max(0.0), angle.sin().max(0.0))
}

/// Soft clipping of the mixed bus.
///
/// Values in [-1, 1] pass through unchanged; anything louder is bent along
/// `1 + tanh(|x| - 1)` so the bus never exceeds ±2.0.
pub fn soft_clip(x: f32) -> f32 {
    if x.abs() <= 1.0 {
        x
    } else {
        x.signum() * (1.0 + (x.abs() - 1.0).tanh())
    }
}

// ============================================================================
// Voices
// ============================================================================

/// Linear gain ramp.
#[derive(Debug, Clone, Copy)]
struct Fade {
    step: f32,
    target: f32,
    /// Voice ends when the ramp completes
    stop: bool,
}

struct Voice {
    handle: AudioHandle,
    resource: Shared<dyn SoundResource>,
    decoder: Box<dyn Decoder>,
    channels: usize,
    source_rate: u32,
    volume: f32,
    pan: f32,
    looping: bool,
    paused: bool,
    priority: i32,
    /// Start order, used to steal the oldest among equal priorities
    serial: u64,
    level: f32,
    fade: Option<Fade>,
    /// Interleaved source frames awaiting resampling
    chunk: Vec<f32>,
    chunk_frames: usize,
    chunk_pos: usize,
    current: (f32, f32),
    next: (f32, f32),
    frac: f32,
    /// Source frames consumed since the last seek
    played: u64,
    /// Decoder ran dry; `next` holds the final frame
    draining: bool,
    done: bool,
}

impl Voice {
    /// Next source frame as (left, right), restarting when looping.
    fn pull(&mut self) -> Option<(f32, f32)> {
        if self.chunk_pos >= self.chunk_frames && !self.refill() {
            return None;
        }
        let base = self.chunk_pos * self.channels;
        let left = self.chunk[base];
        let right = if self.channels > 1 {
            self.chunk[base + 1]
        } else {
            left
        };
        self.chunk_pos += 1;
        Some((left, right))
    }

    fn refill(&mut self) -> bool {
        self.chunk_frames = self.decoder.read(&mut self.chunk);
        self.chunk_pos = 0;
        if self.chunk_frames > 0 {
            return true;
        }
        if !self.looping {
            return false;
        }
        // Rewind through whichever capability the decoder offers
        if !(self.decoder.restart() || self.decoder.set_position(0.0)) {
            trace!("voice {}: decoder cannot rewind, ending loop", self.handle);
            return false;
        }
        self.played = 0;
        self.chunk_frames = self.decoder.read(&mut self.chunk);
        self.chunk_frames > 0
    }

    /// Re-prime the interpolator after construction or a seek.
    fn prime(&mut self) {
        self.chunk_frames = 0;
        self.chunk_pos = 0;
        self.frac = 0.0;
        self.draining = false;
        let Some(first) = self.pull() else {
            self.done = true;
            return;
        };
        self.current = first;
        match self.pull() {
            Some(second) => self.next = second,
            None => {
                self.next = first;
                self.draining = true;
            }
        }
    }

    fn advance(&mut self, step: f32) {
        self.frac += step;
        while self.frac >= 1.0 {
            self.frac -= 1.0;
            self.played += 1;
            if self.draining {
                self.done = true;
                return;
            }
            self.current = self.next;
            match self.pull() {
                Some(frame) => self.next = frame,
                None => self.draining = true,
            }
        }
    }

    fn start_fade(&mut self, target: f32, seconds: f32, output_rate: u32, stop: bool) {
        let frames = seconds.max(0.0) * output_rate as f32;
        if frames < 1.0 {
            self.level = target;
            self.fade = None;
            if stop {
                self.done = true;
            }
            return;
        }
        self.fade = Some(Fade {
            step: (target - self.level) / frames,
            target,
            stop,
        });
    }

    fn tick_fade(&mut self) {
        let Some(fade) = self.fade else {
            return;
        };
        self.level += fade.step;
        let reached = if fade.step >= 0.0 {
            self.level >= fade.target
        } else {
            self.level <= fade.target
        };
        if reached {
            self.level = fade.target;
            self.fade = None;
            if fade.stop {
                self.done = true;
            }
        }
    }

    fn position(&self) -> f32 {
        self.played as f32 / self.source_rate as f32
    }
}

// ============================================================================
// Mixer
// ============================================================================

/// Mixing backend owning every active voice.
pub struct Mixer {
    sample_rate: u32,
    max_voices: usize,
    master_volume: f32,
    voices: Vec<Voice>,
    finished: Vec<Finished>,
    serial: u64,
}

impl Mixer {
    pub fn new(sample_rate: u32, max_voices: usize) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            max_voices: max_voices.max(1),
            master_volume: 1.0,
            voices: Vec::new(),
            finished: Vec::new(),
            serial: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn contains(&self, handle: AudioHandle) -> bool {
        self.voices.iter().any(|v| v.handle == handle)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    /// Register a voice. When every voice is busy, the lowest-priority
    /// (oldest among equals) voice is stolen if its priority does not exceed
    /// the newcomer's; otherwise the newcomer is rejected. Either way the
    /// loser is reported finished.
    pub fn add(
        &mut self,
        handle: AudioHandle,
        resource: Shared<dyn SoundResource>,
        mut decoder: Box<dyn Decoder>,
        params: &PlayParams,
    ) {
        if self.voices.len() >= self.max_voices {
            let victim = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| (v.priority, v.serial))
                .map(|(i, v)| (i, v.priority));
            match victim {
                Some((index, priority)) if priority <= params.priority => {
                    let stolen = self.voices.swap_remove(index);
                    debug!("voice {} stolen by {}", stolen.handle, handle);
                    self.finished.push(Finished {
                        handle: stolen.handle,
                        instance: stolen.resource,
                    });
                }
                _ => {
                    debug!("voice {} rejected: all voices busy", handle);
                    self.finished.push(Finished {
                        handle,
                        instance: resource,
                    });
                    return;
                }
            }
        }

        let channels = decoder.channels().max(1) as usize;
        let source_rate = decoder.sample_rate().max(1);
        let mut played = 0;
        if params.start_at > 0.0 && decoder.set_position(params.start_at) {
            played = (params.start_at * source_rate as f32) as u64;
        }

        self.serial += 1;
        let mut voice = Voice {
            handle,
            resource,
            decoder,
            channels,
            source_rate,
            volume: params.volume.clamp(0.0, 1.0),
            pan: params.pan.clamp(-1.0, 1.0),
            looping: params.looping,
            paused: false,
            priority: params.priority,
            serial: self.serial,
            level: 1.0,
            fade: None,
            chunk: vec![0.0; CHUNK_FRAMES * channels],
            chunk_frames: 0,
            chunk_pos: 0,
            current: (0.0, 0.0),
            next: (0.0, 0.0),
            frac: 0.0,
            played,
            draining: false,
            done: false,
        };
        if params.fade_in > 0.0 {
            voice.level = 0.0;
            voice.start_fade(1.0, params.fade_in, self.sample_rate, false);
        }
        voice.prime();
        trace!(
            "voice {} active ({} Hz, {} ch)",
            handle, source_rate, channels
        );
        self.voices.push(voice);
    }

    fn voice_mut(&mut self, handle: AudioHandle) -> Option<&mut Voice> {
        self.voices.iter_mut().find(|v| v.handle == handle)
    }

    /// Stop a voice, immediately or after fading out.
    pub fn stop(&mut self, handle: AudioHandle, fade_out: f32) -> bool {
        let rate = self.sample_rate;
        match self.voice_mut(handle) {
            Some(voice) => {
                voice.start_fade(0.0, fade_out, rate, true);
                // Paused voices never tick their fade
                if voice.paused {
                    voice.done = true;
                }
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for voice in self.voices.drain(..) {
            self.finished.push(Finished {
                handle: voice.handle,
                instance: voice.resource,
            });
        }
    }

    pub fn pause(&mut self, handle: AudioHandle) -> bool {
        self.voice_mut(handle).map(|v| v.paused = true).is_some()
    }

    pub fn resume(&mut self, handle: AudioHandle) -> bool {
        self.voice_mut(handle).map(|v| v.paused = false).is_some()
    }

    pub fn set_volume(&mut self, handle: AudioHandle, volume: f32) -> bool {
        self.voice_mut(handle)
            .map(|v| v.volume = volume.clamp(0.0, 1.0))
            .is_some()
    }

    pub fn set_pan(&mut self, handle: AudioHandle, pan: f32) -> bool {
        self.voice_mut(handle)
            .map(|v| v.pan = pan.clamp(-1.0, 1.0))
            .is_some()
    }

    pub fn set_looping(&mut self, handle: AudioHandle, looping: bool) -> bool {
        self.voice_mut(handle).map(|v| v.looping = looping).is_some()
    }

    /// Seek a voice; a decoder without seeking keeps playing undisturbed.
    pub fn set_position(&mut self, handle: AudioHandle, seconds: f32) -> bool {
        let Some(voice) = self.voice_mut(handle) else {
            return false;
        };
        if voice.decoder.set_position(seconds) {
            voice.played = (seconds.max(0.0) * voice.source_rate as f32) as u64;
            voice.prime();
        } else {
            trace!("voice {}: seek unsupported", handle);
        }
        true
    }

    /// Append every voice's playback offset in seconds.
    pub fn positions(&self, out: &mut Vec<PositionReport>) {
        out.extend(self.voices.iter().map(|v| PositionReport {
            handle: v.handle,
            seconds: v.position(),
        }));
    }

    /// Move voices that ended (naturally, stopped, stolen) into `out`.
    pub fn drain_finished(&mut self, out: &mut Vec<Finished>) {
        out.append(&mut self.finished);
    }

    /// Mix into interleaved stereo `out`, overwriting its contents.
    pub fn mix(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let output_rate = self.sample_rate as f32;

        for voice in &mut self.voices {
            if voice.paused || voice.done {
                continue;
            }
            let step = voice.source_rate as f32 / output_rate;
            let (pan_left, pan_right) = pan_gains(voice.pan);
            for frame in out.chunks_exact_mut(2) {
                let (l0, r0) = voice.current;
                let (l1, r1) = voice.next;
                let left = l0 + (l1 - l0) * voice.frac;
                let right = r0 + (r1 - r0) * voice.frac;

                let gain = voice.volume * voice.level;
                frame[0] += left * gain * pan_left;
                frame[1] += right * gain * pan_right;

                voice.tick_fade();
                voice.advance(step);
                if voice.done {
                    break;
                }
            }
        }

        let master = self.master_volume;
        for sample in out.iter_mut() {
            *sample = soft_clip(*sample * master);
        }

        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].done {
                let voice = self.voices.swap_remove(i);
                trace!("voice {} finished", voice.handle);
                self.finished.push(Finished {
                    handle: voice.handle,
                    instance: voice.resource,
                });
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::SampleBuffer;

    fn sound(frames: usize, rate: u32) -> Shared<dyn SoundResource> {
        let buffer = SampleBuffer::mono("tone", rate, vec![0.5; frames]);
        Shared::new(buffer).upcast(|arc| arc as std::sync::Arc<dyn SoundResource>)
    }

    fn add(mixer: &mut Mixer, raw: u64, sound: &Shared<dyn SoundResource>, params: PlayParams) {
        let decoder = sound.instantiate().unwrap();
        mixer.add(AudioHandle::from_raw(raw), sound.clone(), decoder, &params);
    }

    fn finished(mixer: &mut Mixer) -> Vec<u64> {
        let mut out = Vec::new();
        mixer.drain_finished(&mut out);
        out.into_iter().map(|f| f.handle.raw()).collect()
    }

    #[test]
    fn test_pan_extremes() {
        let (l, r) = pan_gains(-1.0);
        assert!((l - 1.0).abs() < 1e-6 && r.abs() < 1e-6);
        let (l, r) = pan_gains(1.0);
        assert!(l.abs() < 1e-6 && (r - 1.0).abs() < 1e-6);
        let (l, r) = pan_gains(0.0);
        assert!((l - r).abs() < 1e-6);
        assert!((l - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_pan_keeps_power_constant() {
        for pan in [-0.75, -0.3, 0.1, 0.6, 2.0] {
            let (l, r) = pan_gains(pan);
            assert!((l * l + r * r - 1.0).abs() < 1e-5, "pan {pan}");
        }
    }

    #[test]
    fn test_soft_clip_passthrough_and_limit() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert_eq!(soft_clip(-1.0), -1.0);
        assert!(soft_clip(3.0) < 2.0);
        assert!(soft_clip(3.0) > 1.9);
        assert!(soft_clip(-100.0) >= -2.0);
    }

    #[test]
    fn test_voice_plays_every_frame_then_finishes() {
        let mut mixer = Mixer::new(100, 4);
        let s = sound(10, 100);
        add(&mut mixer, 1, &s, PlayParams::default());

        let mut out = vec![0.0; 2 * 9];
        mixer.mix(&mut out);
        assert!(finished(&mut mixer).is_empty());
        assert!(out.iter().all(|&x| x > 0.0));

        let mut out = vec![0.0; 2 * 4];
        mixer.mix(&mut out);
        assert!(out[0] > 0.0);
        assert_eq!(out[2], 0.0);
        assert_eq!(finished(&mut mixer), vec![1]);
        assert!(mixer.is_empty());
    }

    #[test]
    fn test_resampling_consumes_at_source_rate() {
        let mut mixer = Mixer::new(200, 4);
        let s = sound(100, 100);
        add(&mut mixer, 1, &s, PlayParams::default());
        let mut out = vec![0.0; 2 * 100];
        mixer.mix(&mut out);

        let mut positions = Vec::new();
        mixer.positions(&mut positions);
        assert_eq!(positions.len(), 1);
        assert!((positions[0].seconds - 0.5).abs() < 0.011);
    }

    #[test]
    fn test_looping_voice_never_finishes() {
        let mut mixer = Mixer::new(100, 4);
        let s = sound(10, 100);
        add(&mut mixer, 1, &s, PlayParams::looping());
        let mut out = vec![0.0; 2 * 95];
        mixer.mix(&mut out);
        assert!(finished(&mut mixer).is_empty());
        assert!(out.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn test_stop_without_fade_finishes_on_next_mix() {
        let mut mixer = Mixer::new(100, 4);
        let s = sound(1000, 100);
        add(&mut mixer, 7, &s, PlayParams::default());
        assert!(mixer.stop(AudioHandle::from_raw(7), 0.0));
        assert!(!mixer.stop(AudioHandle::from_raw(8), 0.0));
        mixer.mix(&mut [0.0; 8]);
        assert_eq!(finished(&mut mixer), vec![7]);
    }

    #[test]
    fn test_fade_out_ramps_to_silence() {
        let mut mixer = Mixer::new(100, 4);
        let s = sound(1000, 100);
        add(&mut mixer, 1, &s, PlayParams::default());
        mixer.stop(AudioHandle::from_raw(1), 0.1);

        let mut out = vec![0.0; 2 * 20];
        mixer.mix(&mut out);
        assert!(out[0] > out[10]);
        assert_eq!(out[2 * 15], 0.0);
        assert_eq!(finished(&mut mixer), vec![1]);
    }

    #[test]
    fn test_paused_voice_is_silent_and_holds_position() {
        let mut mixer = Mixer::new(100, 4);
        let s = sound(1000, 100);
        add(&mut mixer, 1, &s, PlayParams::default());
        mixer.pause(AudioHandle::from_raw(1));
        let mut out = vec![0.0; 2 * 10];
        mixer.mix(&mut out);
        assert!(out.iter().all(|&x| x == 0.0));

        let mut positions = Vec::new();
        mixer.positions(&mut positions);
        assert_eq!(positions[0].seconds, 0.0);
    }

    #[test]
    fn test_voice_stealing_prefers_lowest_priority() {
        let mut mixer = Mixer::new(100, 2);
        let s = sound(1000, 100);
        let low = PlayParams {
            priority: 0,
            ..PlayParams::default()
        };
        let high = PlayParams {
            priority: 5,
            ..PlayParams::default()
        };
        add(&mut mixer, 1, &s, high);
        add(&mut mixer, 2, &s, low);
        add(&mut mixer, 3, &s, low);
        assert_eq!(finished(&mut mixer), vec![2]);

        // Lower than everything playing: rejected
        let lowest = PlayParams {
            priority: -1,
            ..PlayParams::default()
        };
        add(&mut mixer, 4, &s, lowest);
        assert_eq!(finished(&mut mixer), vec![4]);
        assert!(mixer.contains(AudioHandle::from_raw(1)));
        assert!(mixer.contains(AudioHandle::from_raw(3)));
    }

    #[test]
    fn test_master_volume_scales_bus() {
        let mut mixer = Mixer::new(100, 4);
        let s = sound(1000, 100);
        add(&mut mixer, 1, &s, PlayParams::default());
        mixer.set_master_volume(0.0);
        let mut out = vec![1.0; 8];
        mixer.mix(&mut out);
        assert!(out.iter().all(|&x| x == 0.0));
    }
}
