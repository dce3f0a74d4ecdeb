use markov_mixtures::{
    GaussianMixtureModel, MixtureFitOptions, ModelError, MultivariateNormal, NormalFitOptions,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Two well-separated elliptical blobs around (0, 0) and (6, 6).
fn two_blob_data(rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let near = MultivariateNormal::new(
        vec![0.0, 0.0],
        vec![vec![1.0, 0.2], vec![0.2, 0.5]],
    )
    .unwrap();
    let far = MultivariateNormal::new(
        vec![6.0, 6.0],
        vec![vec![0.5, -0.1], vec![-0.1, 1.0]],
    )
    .unwrap();

    let mut data = near.sample(rng, 120);
    data.extend(far.sample(rng, 180));
    data
}

#[test]
fn full_workflow_seeds_fits_and_classifies() {
    let mut rng = ChaCha8Rng::seed_from_u64(314);
    let data = two_blob_data(&mut rng);

    let mut model = GaussianMixtureModel::new(2).unwrap();
    let log_likelihood = model
        .compute(&data, &MixtureFitOptions::default(), &mut rng)
        .unwrap();
    assert!(log_likelihood.is_finite());

    let near_label = model.classify(&[0.0, 0.0]).unwrap();
    let far_label = model.classify(&[6.0, 6.0]).unwrap();
    assert_ne!(near_label, far_label);

    // Points well inside a blob classify with that blob's label.
    assert_eq!(model.classify(&[0.3, -0.2]).unwrap(), near_label);
    assert_eq!(model.classify(&[5.8, 6.3]).unwrap(), far_label);

    let (label, responses) = model.classify_with_responses(&[0.1, 0.1]).unwrap();
    assert_eq!(label, near_label);
    assert_eq!(responses.len(), 2);
    assert!(responses[near_label] > responses[far_label]);
}

#[test]
fn cluster_views_report_live_parameters() {
    let mut rng = ChaCha8Rng::seed_from_u64(27);
    let data = two_blob_data(&mut rng);

    let mut model = GaussianMixtureModel::new(2).unwrap();
    model
        .compute(&data, &MixtureFitOptions::default(), &mut rng)
        .unwrap();

    let clusters = model.clusters().unwrap();
    assert_eq!(clusters.len(), 2);

    let total: f64 = clusters.iter().map(|c| c.proportion()).sum();
    assert!((total - 1.0).abs() < 1e-9);
    // Cluster masses reflect the 120/180 split.
    for cluster in &clusters {
        assert!(cluster.proportion() > 0.3 && cluster.proportion() < 0.7);
    }

    let mut means: Vec<Vec<f64>> = clusters.iter().map(|c| c.mean().to_vec()).collect();
    means.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());
    assert!(means[0][0].abs() < 0.5);
    assert!((means[1][0] - 6.0).abs() < 0.5);

    // Views read through to the mixture; the view and the mixture agree.
    let view = model.cluster(0).unwrap();
    let mixture = model.mixture().unwrap();
    assert_eq!(view.mean(), mixture.component(0).mean());
    assert_eq!(view.covariance(), mixture.component(0).covariance());
    assert!(view.density(view.mean()).unwrap() > 0.0);

    assert!(model.cluster(2).is_err());
}

#[test]
fn initialization_alone_supports_classification() {
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let data = two_blob_data(&mut rng);

    let mut model = GaussianMixtureModel::new(2).unwrap();
    model.initialize(&data, &mut rng).unwrap();

    let near = model.classify(&[0.0, 0.0]).unwrap();
    let far = model.classify(&[6.0, 6.0]).unwrap();
    assert_ne!(near, far);
}

#[test]
fn rank_deficient_covariance_is_rejected() {
    // Perfectly collinear columns give a rank-one covariance.
    let cov = vec![vec![1.0, 1.0], vec![1.0, 1.0]];
    assert!(matches!(
        MultivariateNormal::new(vec![0.0, 0.0], cov),
        Err(ModelError::NonPositiveDefiniteMatrix { .. })
    ));

    // The same degeneracy arising from data is reported by the fit when no
    // regularization is configured.
    let collinear: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
    assert!(matches!(
        MultivariateNormal::estimate(&collinear, &NormalFitOptions::default()),
        Err(ModelError::NonPositiveDefiniteMatrix { .. })
    ));

    // Regularization recovers it.
    let recovered = MultivariateNormal::estimate(
        &collinear,
        &NormalFitOptions {
            regularization: 1e-3,
            diagonal: false,
        },
    );
    assert!(recovered.is_ok());
}

#[test]
fn round_trip_accessors_return_construction_values() {
    let mean = vec![1.5, -2.5];
    let cov = vec![vec![2.0, 0.3], vec![0.3, 1.0]];
    let mvn = MultivariateNormal::new(mean.clone(), cov.clone()).unwrap();
    assert_eq!(mvn.mean(), mean.as_slice());
    assert_eq!(mvn.covariance(), cov.as_slice());
    assert_eq!(mvn.dimension(), 2);
}

#[test]
fn unfitted_model_queries_fail_cleanly() {
    let model = GaussianMixtureModel::new(3).unwrap();
    assert!(model.classify(&[0.0]).is_err());
    assert!(model.clusters().is_err());
    assert!(model.cluster(0).is_err());
    assert!(GaussianMixtureModel::new(0).is_err());
}
