// Statistical behaviour of the sampler: weighted selection law, replacement
// policy, multiplicity and perturbation spread.

use approx::assert_relative_eq;
use kdsource::bandwidth::{Bandwidth, BandwidthMethod};
use kdsource::geometry::{Energy, GeometryModel, Position};
use kdsource::kde::{DensityModel, FitConfig};
use kdsource::particle::ParticleRecord;
use kdsource::particle_list::ParticleList;
use kdsource::sampler::{Sampler, SelectionPolicy};
use kdsource::source::KernelDensitySource;
use kdsource::stats::weighted_mean_var;
use kdsource::{draw, Error, RandomStream};
use std::sync::Arc;

const BASE_ENERGY: f64 = 1e6;

/// `weights.len()` records with energies 1 MeV + i eV
fn indexed_model(weights: &[f64], h: f64) -> DensityModel {
    let records = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            ParticleRecord::new([0.0; 3], [0.0, 0.0, 1.0], BASE_ENERGY + i as f64).with_weight(w)
        })
        .collect();
    let list = ParticleList::new(records).unwrap();
    let geometry = GeometryModel::new(vec![Box::new(Energy::new())]).unwrap();
    DensityModel::fit(
        &list,
        geometry,
        FitConfig::new(BandwidthMethod::Fixed(Bandwidth::Scalar(h))).with_scaling(vec![1.0]),
    )
    .unwrap()
}

fn index_of(p: &ParticleRecord) -> usize {
    (p.energy - BASE_ENERGY).round() as usize
}

fn selection_counts(sampler: Sampler<'_>, k: usize, count: isize, seed: u64) -> Vec<usize> {
    let mut counts = vec![0; k];
    let mut stream = RandomStream::new(seed);
    for p in sampler.draw(count, false, &mut stream).unwrap() {
        counts[index_of(&p.unwrap())] += 1;
    }
    counts
}

#[test]
fn test_equal_weights_converge_to_uniform() {
    let model = indexed_model(&[1.0; 10], 0.1);
    let m = 100_000;
    let counts = selection_counts(Sampler::new(&model), 10, m as isize, 1);
    for (i, &c) in counts.iter().enumerate() {
        let freq = c as f64 / m as f64;
        assert!((freq - 0.1).abs() < 0.005, "record {} frequency {}", i, freq);
    }
}

#[test]
fn test_unequal_weights_follow_weight_share() {
    let weights = [1.0, 2.0, 3.0, 4.0, 0.0];
    let model = indexed_model(&weights, 0.1);
    let m = 100_000;
    let counts = selection_counts(Sampler::new(&model), weights.len(), m as isize, 2);
    let total: f64 = weights.iter().sum();
    for (i, (&c, &w)) in counts.iter().zip(&weights).enumerate() {
        let freq = c as f64 / m as f64;
        assert!((freq - w / total).abs() < 0.006, "record {} frequency {}", i, freq);
    }
    assert_eq!(counts[4], 0, "zero-weight records are never emitted");
}

#[test]
fn test_seed_changes_order_not_long_run_multiset() {
    let model = indexed_model(&[1.0; 10], 0.1);
    let a = selection_counts(Sampler::new(&model), 10, 50_000, 10);
    let b = selection_counts(Sampler::new(&model), 10, 50_000, 11);
    assert_ne!(a, b);
    for (x, y) in a.iter().zip(&b) {
        assert!((*x as f64 - *y as f64).abs() < 500.0);
    }
}

#[test]
fn test_with_replacement_allows_duplicates_at_training_size() {
    let model = indexed_model(&[1.0; 10], 0.1);
    let sampler = Sampler::new(&model);
    let with_duplicates = (0..20)
        .filter(|&seed| selection_counts(sampler, 10, 10, seed).iter().any(|&c| c > 1))
        .count();
    // P(no duplicate in 10 draws from 10) = 10!/10^10
    assert!(with_duplicates >= 19, "only {} of 20 draws repeated a record", with_duplicates);

    let systematic = sampler.with_policy(SelectionPolicy::Systematic);
    for seed in 0..20 {
        assert_eq!(selection_counts(systematic, 10, 10, seed), vec![1; 10]);
    }
}

#[test]
fn test_multiplicity_conservation_across_batches() {
    let model = Arc::new(indexed_model(&[1.0; 10], 0.1));
    let (batches, count) = (3, 100);

    for policy in [SelectionPolicy::WithReplacement, SelectionPolicy::Systematic] {
        let source = KernelDensitySource::new(model.clone())
            .with_perturb(false)
            .with_policy(policy);
        let mut counts = vec![0usize; 10];
        for batch in 0..batches {
            for p in source.sample_batch(8, batch, count).unwrap() {
                counts[index_of(&p)] += 1;
            }
        }
        assert_eq!(counts.iter().sum::<usize>(), batches * count);
        if policy == SelectionPolicy::Systematic {
            assert_eq!(counts, vec![batches * count / 10; 10]);
        }
    }
}

#[test]
fn test_perturbation_spread_matches_bandwidth() {
    // Two training points far apart; draws around point 0 only
    let records = vec![
        ParticleRecord::new([0.0; 3], [0.0, 0.0, 1.0], 1e6),
        ParticleRecord::new([0.0; 3], [0.0, 0.0, 1.0], 5e6),
    ];
    let list = ParticleList::new(records).unwrap();
    let geometry = GeometryModel::new(vec![Box::new(Energy::new())]).unwrap();
    let h = 0.5;
    let model = DensityModel::fit(
        &list,
        geometry,
        FitConfig::new(BandwidthMethod::Fixed(Bandwidth::Scalar(h))).with_scaling(vec![1000.0]),
    )
    .unwrap();

    let sampler = Sampler::new(&model);
    let mut stream = RandomStream::new(31);
    let energies: Vec<f64> = (0..40_000)
        .map(|_| sampler.emit(0, true, &mut stream).unwrap().energy)
        .collect();
    let (mean, var) = weighted_mean_var(&energies, None).unwrap();
    assert_relative_eq!(mean, 1e6, epsilon = 10.0);
    assert_relative_eq!(var.sqrt(), h * 1000.0, max_relative = 0.03);
    assert_eq!(model.kernel_std(0), vec![500.0]);
}

#[test]
fn test_perturbed_position_spread_per_dimension() {
    let records = (0..2)
        .map(|i| ParticleRecord::new([10.0 * i as f64, 0.0, 0.0], [1.0, 0.0, 0.0], 1e6))
        .collect();
    let list = ParticleList::new(records).unwrap();
    let geometry = GeometryModel::new(vec![Box::new(Position::cartesian())]).unwrap();
    let model = DensityModel::fit(
        &list,
        geometry,
        FitConfig::new(BandwidthMethod::Fixed(Bandwidth::PerDimension(vec![0.1, 0.2, 0.4])))
            .with_scaling(vec![1.0, 1.0, 1.0]),
    )
    .unwrap();

    let sampler = Sampler::new(&model);
    let mut stream = RandomStream::new(4);
    let draws: Vec<ParticleRecord> = (0..20_000).map(|_| sampler.emit(1, true, &mut stream).unwrap()).collect();
    for (d, expected) in [0.1, 0.2, 0.4].iter().enumerate() {
        let column: Vec<f64> = draws.iter().map(|p| p.position[d]).collect();
        let (_, var) = weighted_mean_var(&column, None).unwrap();
        assert_relative_eq!(var.sqrt(), *expected, max_relative = 0.04);
    }
}

#[test]
fn test_constant_variable_never_gives_zero_bandwidth() {
    let model_err = DensityModel::fit(
        &ParticleList::new(vec![ParticleRecord::default(); 20]).unwrap(),
        GeometryModel::new(vec![Box::new(Energy::new())]).unwrap(),
        FitConfig::new(BandwidthMethod::Silverman),
    )
    .unwrap_err();
    assert!(matches!(model_err, Error::InvalidBandwidth(_)));

    let model = indexed_model(&[1.0; 4], 0.1);
    let mut stream = RandomStream::new(1);
    assert!(matches!(draw(&model, -5, true, &mut stream), Err(Error::Configuration(_))));
}

#[test]
fn test_near_constant_variable_rejected() {
    // Spread of a few neV on 1 MeV: positive but negligible
    let records = (0..20)
        .map(|i| ParticleRecord::new([0.0; 3], [0.0, 0.0, 1.0], BASE_ENERGY + i as f64 * 1e-9))
        .collect();
    let list = ParticleList::new(records).unwrap();
    let geometry = || GeometryModel::new(vec![Box::new(Energy::new())]).unwrap();
    let err = DensityModel::fit(&list, geometry(), FitConfig::new(BandwidthMethod::Silverman)).unwrap_err();
    assert!(matches!(err, Error::InvalidBandwidth(_)), "{}", err);

    // The same records fit once the scaling clears the threshold
    let model = DensityModel::fit(
        &list,
        geometry(),
        FitConfig::new(BandwidthMethod::Silverman).with_scaling(vec![1e-3]),
    )
    .unwrap();
    assert_eq!(model.scaling(), &[1e-3]);
}
