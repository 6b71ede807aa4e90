use criterion::{black_box, criterion_group, criterion_main, Criterion};
use murmur_core::config::{DsssConfig, FskConfig};
use murmur_core::dsss::DsssModulator;
use murmur_core::fsk::{FskDemodulator, FskModulator};

fn benchmark_fsk_modulation(c: &mut Criterion) {
    let config = FskConfig::default();
    let message = [0xA5u8; 16];

    c.bench_function("fsk_modulate_16_bytes", |b| {
        let mut modulator = FskModulator::new(config.clone());
        b.iter(|| black_box(modulator.modulate(black_box(&message))))
    });
}

fn benchmark_fsk_demodulation(c: &mut Criterion) {
    let config = FskConfig::default();
    let mut modulator = FskModulator::new(config.clone());
    let audio = modulator.modulate(&[0xA5u8; 16]);

    c.bench_function("fsk_demodulate_16_bytes", |b| {
        b.iter(|| {
            let mut demodulator = FskDemodulator::new(config.clone());
            let mut out = Vec::new();
            demodulator.demod_block(black_box(&audio), &mut out);
            black_box(out)
        })
    });
}

fn benchmark_dsss_modulation(c: &mut Criterion) {
    let config = DsssConfig::default();
    let bits = [0u8, 1, 1, 0, 1, 0, 0, 1].repeat(8);

    c.bench_function("dsss_modulate_64_bits", |b| {
        let mut modulator = DsssModulator::new(config.clone()).unwrap();
        b.iter(|| black_box(modulator.modulate_bits(black_box(&bits))))
    });
}

criterion_group!(
    benches,
    benchmark_fsk_modulation,
    benchmark_fsk_demodulation,
    benchmark_dsss_modulation
);
criterion_main!(benches);
