//! Channel modeling for tests and the loopback link.
//!
//! Simulates the lossy acoustic path between speaker and microphone with
//! AWGN and flat attenuation. Deterministic when seeded, which the
//! end-to-end tests rely on.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

/// Derive the AWGN standard deviation for a signal of `signal_power`
/// (normalized, 1.0 for a full-scale carrier) at the given SNR.
pub fn noise_std_for_snr_db(snr_db: f64, signal_power: f64) -> f64 {
    let snr_linear = 10f64.powf(snr_db / 10.0);
    (signal_power / snr_linear).sqrt()
}

/// Add white Gaussian noise to a sample block in place.
pub fn apply_awgn<R: Rng>(samples: &mut [f32], noise_std: f64, rng: &mut R) {
    if noise_std <= 0.0 {
        return;
    }
    for sample in samples.iter_mut() {
        let noise: f64 = rng.sample::<f64, _>(StandardNormal) * noise_std;
        *sample += noise as f32;
    }
}

/// Scale a sample block by a linear attenuation factor.
pub fn apply_attenuation(samples: &mut [f32], factor: f32) {
    for sample in samples.iter_mut() {
        *sample *= factor;
    }
}

/// Impairments applied to each block crossing the simulated link.
#[derive(Debug, Clone)]
pub struct ChannelSim {
    noise_std: f64,
    attenuation: f32,
    rng: ChaCha8Rng,
}

impl ChannelSim {
    /// A transparent channel: no noise, unity gain.
    pub fn clean() -> Self {
        Self {
            noise_std: 0.0,
            attenuation: 1.0,
            rng: ChaCha8Rng::seed_from_u64(0),
        }
    }

    pub fn with_snr_db(snr_db: f64, seed: u64) -> Self {
        Self {
            noise_std: noise_std_for_snr_db(snr_db, 1.0),
            attenuation: 1.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn attenuated(mut self, factor: f32) -> Self {
        self.attenuation = factor;
        self
    }

    pub fn process_block(&mut self, samples: &mut [f32]) {
        if self.attenuation != 1.0 {
            apply_attenuation(samples, self.attenuation);
        }
        apply_awgn(samples, self.noise_std, &mut self.rng);
    }
}
