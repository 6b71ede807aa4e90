//! One-pole peak-tracking automatic gain control.
//!
//! Runs ahead of both demodulators so their decision thresholds see a
//! predictable signal level regardless of microphone distance or volume.

use crate::config::AgcConfig;

const ENVELOPE_EPSILON: f32 = 1e-6;

/// Peak-tracking AGC with asymmetric attack/release.
#[derive(Debug, Clone)]
pub struct Agc {
    config: AgcConfig,
    attack_coef: f32,
    release_coef: f32,
    gain: f32,
    envelope: f32,
}

impl Agc {
    pub fn new(mut config: AgcConfig, sample_rate: usize) -> Self {
        config.target = config.target.clamp(1e-3, 1.0);
        Self {
            attack_coef: time_constant_coef(config.attack_ms, sample_rate),
            release_coef: time_constant_coef(config.release_ms, sample_rate),
            gain: 1.0f32.clamp(config.gain_min, config.gain_max),
            // starting the follower at the target keeps the first loud
            // samples from reading as "far below target"
            envelope: config.target,
            config,
        }
    }

    /// Process one sample and return the gain-corrected output.
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.gain * x;
        let level = y.abs();

        // below the silence floor nothing is tracked: zero input must leave
        // the gain where it is
        if level <= self.config.silence_floor {
            return y;
        }

        // Asymmetric one-pole envelope follower: fast when the signal is
        // above target, slow when it falls away.
        let coef = if level > self.config.target {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let error = self.config.target / (self.envelope + ENVELOPE_EPSILON);
        self.gain = (self.gain * error.powf(self.config.error_exponent))
            .clamp(self.config.gain_min, self.config.gain_max);

        y
    }

    /// Process a block in place.
    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    /// Restore initial state, optionally seeding the gain.
    pub fn reset(&mut self, initial_gain: Option<f32>) {
        self.gain = initial_gain
            .unwrap_or(1.0)
            .clamp(self.config.gain_min, self.config.gain_max);
        self.envelope = self.config.target;
    }
}

fn time_constant_coef(tau_ms: f32, sample_rate: usize) -> f32 {
    (-1.0 / (tau_ms * sample_rate as f32 / 1000.0)).exp()
}
