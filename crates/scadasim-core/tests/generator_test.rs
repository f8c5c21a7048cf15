//! Statistical properties of the waveform generator

use scadasim_core::generator::{Bounds, WaveformGenerator, QUALITY_BAD, QUALITY_GOOD};

#[test]
fn test_samples_stay_within_bounds() {
    let bounds = Bounds::new(40.0, 95.0, 5.0);
    let mut generator = WaveformGenerator::seeded(bounds, 17);
    let mut states: Vec<_> = (0..8).map(|_| generator.initialize()).collect();

    for _ in 0..2_000 {
        for state in states.iter_mut() {
            let sample = generator.advance(state, 5);
            assert!(sample.value >= 40.0 && sample.value <= 95.0);
        }
    }
}

#[test]
fn test_quality_is_mostly_good() {
    let mut generator = WaveformGenerator::seeded(Bounds::default(), 1234);
    let mut state = generator.initialize();

    let mut good = 0;
    for _ in 0..10_000 {
        let sample = generator.advance(&mut state, 1);
        assert!(sample.quality == QUALITY_GOOD || sample.quality == QUALITY_BAD);
        if sample.is_good() {
            good += 1;
        }
    }

    // 90% expected; four standard deviations is about 1.2%
    assert!((8_800..=9_200).contains(&good), "good samples: {}", good);
}

#[test]
fn test_waveform_covers_its_range() {
    let bounds = Bounds::new(0.0, 100.0, 0.0);
    let mut generator = WaveformGenerator::seeded(bounds, 5);
    let mut state = generator.initialize();
    let period = state.period_minutes;

    let values: Vec<f64> = (0..period)
        .map(|_| generator.advance(&mut state, 1).value)
        .collect();
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    // at least a quarter of the range is swept over one period
    assert!(hi - lo >= 25.0 * 0.99, "swing {}", hi - lo);
}

#[test]
fn test_entropy_generators_differ() {
    let mut a = WaveformGenerator::new(Bounds::default());
    let mut b = WaveformGenerator::new(Bounds::default());

    let states_a: Vec<_> = (0..4).map(|_| a.initialize()).collect();
    let states_b: Vec<_> = (0..4).map(|_| b.initialize()).collect();
    assert_ne!(states_a, states_b);
}
