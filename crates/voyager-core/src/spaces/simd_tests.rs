//! Tests for the `f32` SIMD kernels.
//!
//! Every selected variant must agree with the scalar reference within IEEE
//! rounding slack, across dimensionalities that exercise each tier and tail.

use super::simd::{
    euclidean_scalar, inner_product_scalar, select_euclidean, select_inner_product,
};

fn test_vectors(dims: usize) -> (Vec<f32>, Vec<f32>) {
    // Deterministic, sign-alternating values with varied magnitudes.
    let a: Vec<f32> = (0..dims)
        .map(|i| {
            let x = i as f32;
            (x * 0.37).sin() + x * 0.001
        })
        .collect();
    let b: Vec<f32> = (0..dims)
        .map(|i| {
            let x = i as f32;
            (x * 0.11).cos() - x * 0.002
        })
        .collect();
    (a, b)
}

#[test]
fn test_euclidean_matches_scalar_across_dims() {
    for dims in [1, 2, 3, 4, 5, 7, 8, 12, 16, 19, 32, 33, 64, 100, 128, 769] {
        let (a, b) = test_vectors(dims);
        let reference = euclidean_scalar(&a, &b);
        let fast = select_euclidean(dims)(&a, &b);
        // FMA and lane-reordered accumulation shift the result within IEEE
        // rounding of the term count.
        assert!(
            (fast - reference).abs() <= reference.abs() * 1e-4 + 1e-4,
            "dims={dims}: {fast} vs {reference}"
        );
    }
}

#[test]
fn test_inner_product_matches_scalar_across_dims() {
    for dims in [1, 2, 3, 4, 5, 7, 8, 12, 16, 19, 32, 33, 64, 100, 128, 769] {
        let (a, b) = test_vectors(dims);
        let reference = inner_product_scalar(&a, &b);
        let fast = select_inner_product(dims)(&a, &b);
        assert!(
            (fast - reference).abs() <= reference.abs() * 1e-4 + 1e-3,
            "dims={dims}: {fast} vs {reference}"
        );
    }
}

#[test]
fn test_euclidean_identity_is_zero() {
    for dims in [3, 8, 17, 64] {
        let (a, _) = test_vectors(dims);
        assert_eq!(select_euclidean(dims)(&a, &a), 0.0);
    }
}

#[test]
fn test_euclidean_known_value() {
    // |(1,2) - (2,3)|² = 2
    let d = select_euclidean(2)(&[1.0, 2.0], &[2.0, 3.0]);
    assert!((d - 2.0).abs() < 1e-6);
}

#[test]
fn test_inner_product_known_value() {
    // 1 - (1*4 + 2*5 + 3*6) = 1 - 32 = -31
    let d = select_inner_product(3)(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
    assert!((d - (-31.0)).abs() < 1e-5);
}

#[test]
fn test_inner_product_of_orthogonal_unit_vectors() {
    let d = select_inner_product(3)(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
    assert!((d - 1.0).abs() < 1e-6);
}
