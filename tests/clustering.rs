//! Clustering engines on sampled Gaussian mixtures.

use hiclust::cluster::{score_partition, Clustering, Gmm, Kmeans};
use ndarray::Array2;
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

fn gaussian_blobs(
    centers: &[(f32, f32)],
    per_cluster: usize,
    sd: f32,
    seed: u64,
) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, sd).unwrap();
    let mut data = Array2::<f32>::zeros((centers.len() * per_cluster, 2));
    for (c, &(x, y)) in centers.iter().enumerate() {
        for i in 0..per_cluster {
            let row = c * per_cluster + i;
            data[[row, 0]] = x + noise.sample(&mut rng);
            data[[row, 1]] = y + noise.sample(&mut rng);
        }
    }
    data
}

fn misassignment_rate(labels: &[usize], per_cluster: usize) -> f64 {
    let missed: usize = labels
        .chunks(per_cluster)
        .map(|chunk| {
            let repr = chunk[0];
            chunk.iter().filter(|&&l| l != repr).count()
        })
        .sum();
    missed as f64 / labels.len() as f64
}

#[test]
fn kmeans_recovers_gaussian_mixture() {
    let centers = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
    let data = gaussian_blobs(&centers, 50, 0.8, 239);

    let partition = Kmeans::new(4).with_seed(7).fit(&data).unwrap();
    assert!(partition.is_exact(4));
    let error = misassignment_rate(&partition.labels, 50);
    assert!(error < 0.05, "misassignment rate {error}");
}

#[test]
fn gmm_refines_overlapping_mixture() {
    let centers = [(0.0, 0.0), (4.0, 4.0)];
    let data = gaussian_blobs(&centers, 60, 1.0, 11);

    let partition = Kmeans::new(2).with_seed(3).fit(&data).unwrap();
    assert!(partition.is_exact(2));
    let gmm = Gmm::new(2).fit_from_partition(&data, &partition.groups()).unwrap();
    let error = misassignment_rate(&gmm.labels, 60);
    assert!(error < 0.1, "misassignment rate {error}");

    // Points between the modes carry genuinely split responsibility.
    let max_resp: f64 = (0..data.nrows())
        .map(|i| {
            gmm.responsibilities
                .row(i)
                .iter()
                .cloned()
                .fold(f64::MIN, f64::max)
        })
        .fold(f64::MAX, f64::min);
    assert!(max_resp < 1.0);
}

#[test]
fn wcss_decreases_with_more_clusters_on_structured_data() {
    let centers = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)];
    let data = gaussian_blobs(&centers, 40, 0.5, 5);

    let mut last = f64::INFINITY;
    for k in [2usize, 3] {
        let mut best = f64::INFINITY;
        for seed in 0..5 {
            let partition = Kmeans::new(k).with_seed(seed).fit(&data).unwrap();
            if partition.is_exact(k) {
                best = best.min(score_partition(&partition, &data).wcss);
            }
        }
        assert!(best < last, "wcss did not improve at k={k}");
        last = best;
    }
}
