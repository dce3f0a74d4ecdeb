use markov_mixtures::{matrix, CholeskyDecomposition, ModelError};
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Builds a random symmetric positive definite matrix as `M·Mᵀ + n·I`.
fn random_spd(n: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let m: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    let mt = matrix::transpose(&m).unwrap();
    let mut a = matrix::multiply(&m, &mt).unwrap();
    for (i, row) in a.iter_mut().enumerate() {
        row[i] += n as f64;
    }
    a
}

#[test]
fn reconstruction_holds_for_random_spd_matrices() {
    let mut rng = ChaCha8Rng::seed_from_u64(100);
    for n in [1, 2, 3, 5, 8] {
        let a = random_spd(n, &mut rng);

        let standard = CholeskyDecomposition::new(&a).unwrap();
        assert!(standard.is_symmetric());
        assert!(standard.is_positive_definite());
        let r = standard.reconstruct();
        for i in 0..n {
            for j in 0..n {
                assert!((r[i][j] - a[i][j]).abs() < 1e-9);
            }
        }

        let robust = CholeskyDecomposition::new_robust(&a).unwrap();
        let r = robust.reconstruct();
        for i in 0..n {
            for j in 0..n {
                assert!((r[i][j] - a[i][j]).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn solve_round_trips_through_the_original_matrix() {
    let mut rng = ChaCha8Rng::seed_from_u64(200);
    for n in [2, 4, 6] {
        let a = random_spd(n, &mut rng);
        let b: Vec<f64> = (0..n).map(|_| rng.gen_range(-5.0..5.0)).collect();

        for chol in [
            CholeskyDecomposition::new(&a).unwrap(),
            CholeskyDecomposition::new_robust(&a).unwrap(),
        ] {
            let x = chol.solve_vector(&b).unwrap();
            let back = matrix::multiply_vector(&a, &x).unwrap();
            for (got, want) in back.iter().zip(&b) {
                assert!((got - want).abs() < 1e-8);
            }
        }
    }
}

#[test]
fn inverse_multiplies_to_identity() {
    let mut rng = ChaCha8Rng::seed_from_u64(300);
    let a = random_spd(4, &mut rng);
    let inv = CholeskyDecomposition::new(&a).unwrap().inverse().unwrap();
    let prod = matrix::multiply(&a, &inv).unwrap();
    for i in 0..4 {
        for j in 0..4 {
            let want = if i == j { 1.0 } else { 0.0 };
            assert!((prod[i][j] - want).abs() < 1e-8);
        }
    }
}

#[test]
fn determinants_agree_with_nalgebra() {
    let mut rng = ChaCha8Rng::seed_from_u64(400);
    for n in [2, 3, 5] {
        let a = random_spd(n, &mut rng);
        let chol = CholeskyDecomposition::new(&a).unwrap();

        let flat: Vec<f64> = a.iter().flatten().cloned().collect();
        let na = DMatrix::from_row_slice(n, n, &flat);
        let na_chol = nalgebra::Cholesky::new(na.clone()).expect("matrix is SPD");
        let na_det: f64 = na_chol.determinant();

        let det = chol.determinant().unwrap();
        assert!((det - na_det).abs() < 1e-9 * na_det.abs().max(1.0));
        assert!((chol.log_determinant().unwrap() - det.ln()).abs() < 1e-9);
        assert!(chol.is_nonsingular().unwrap());

        // Factors agree up to tolerance as well.
        let na_l = na_chol.l();
        let l = chol.left_triangular();
        for i in 0..n {
            for j in 0..=i {
                assert!((l[i][j] - na_l[(i, j)]).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn robust_path_factors_indefinite_matrices() {
    // Indefinite but nonsingular: eigenvalues of opposite sign.
    let a = vec![vec![2.0, 3.0], vec![3.0, 1.0]];
    assert!(!CholeskyDecomposition::new(&a).unwrap().is_positive_definite());

    let robust = CholeskyDecomposition::new_robust(&a).unwrap();
    assert!(!robust.is_positive_definite());
    assert!((robust.determinant().unwrap() - (2.0 - 9.0)).abs() < 1e-9);
    assert!(robust.is_nonsingular().unwrap());

    let x = robust.solve_vector(&[1.0, 1.0]).unwrap();
    let back = matrix::multiply_vector(&a, &x).unwrap();
    assert!((back[0] - 1.0).abs() < 1e-9);
    assert!((back[1] - 1.0).abs() < 1e-9);
}

#[test]
fn error_paths_are_reported_not_poisoned() {
    // Asymmetric input: recorded during the pass, raised on use.
    let asym = vec![vec![1.0, 2.0], vec![0.5, 1.0]];
    let chol = CholeskyDecomposition::new(&asym).unwrap();
    assert!(!chol.is_symmetric());
    assert!(matches!(
        chol.solve_vector(&[1.0, 1.0]),
        Err(ModelError::NonSymmetricMatrix { .. })
    ));
    assert!(matches!(
        chol.log_determinant(),
        Err(ModelError::NonSymmetricMatrix { .. })
    ));

    // Indefinite input on the standard path blocks solves only.
    let indef = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
    let chol = CholeskyDecomposition::new(&indef).unwrap();
    assert!(matches!(
        chol.solve_vector(&[1.0, 1.0]),
        Err(ModelError::NonPositiveDefiniteMatrix { .. })
    ));

    // Singular input on the robust path fails at the offending pivot.
    let singular = vec![
        vec![1.0, 2.0, 3.0],
        vec![2.0, 4.0, 6.0],
        vec![3.0, 6.0, 9.0],
    ];
    match CholeskyDecomposition::new_robust(&singular) {
        Err(ModelError::SingularMatrix { pivot }) => assert_eq!(pivot, 1),
        other => panic!("expected SingularMatrix, got {:?}", other),
    }

    // Non-square input never reaches the factorization.
    assert!(matches!(
        CholeskyDecomposition::new(&[vec![1.0, 2.0]]),
        Err(ModelError::DimensionMismatch { .. })
    ));
}
