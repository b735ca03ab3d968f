use crate::config::{Number, EPSILON};
use wide::f32x8;

/// Compute cosine similarity between two vectors of equal length using SIMD
/// operations, returning the score as an `f64` in `[-1, 1]`.
///
/// When either vector has (near-)zero magnitude the similarity is defined as
/// `0.0` instead of dividing by zero. Callers are responsible for checking
/// lengths up front; mismatched slices are a logic error.
pub fn cosine_similarity(a: &[Number], b: &[Number]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "cosine_similarity length mismatch");

    let mut dot_product = f32x8::splat(0.0);
    let mut mag_a = f32x8::splat(0.0);
    let mut mag_b = f32x8::splat(0.0);

    let len = a.len();
    let simd_len = len - (len % 8);

    // SIMD loop
    for i in (0..simd_len).step_by(8) {
        let va = f32x8::new([
            a[i],
            a[i + 1],
            a[i + 2],
            a[i + 3],
            a[i + 4],
            a[i + 5],
            a[i + 6],
            a[i + 7],
        ]);
        let vb = f32x8::new([
            b[i],
            b[i + 1],
            b[i + 2],
            b[i + 3],
            b[i + 4],
            b[i + 5],
            b[i + 6],
            b[i + 7],
        ]);
        dot_product += va * vb;
        mag_a += va * va;
        mag_b += vb * vb;
    }

    let mut scalar_dot_product = dot_product.reduce_add();
    let mut scalar_mag_a = mag_a.reduce_add();
    let mut scalar_mag_b = mag_b.reduce_add();

    // Handle remaining elements
    for i in simd_len..len {
        scalar_dot_product += a[i] * b[i];
        scalar_mag_a += a[i] * a[i];
        scalar_mag_b += b[i] * b[i];
    }

    let denominator = (f64::from(scalar_mag_a) * f64::from(scalar_mag_b)).sqrt();
    if denominator < f64::from(EPSILON) {
        0.0
    } else {
        (f64::from(scalar_dot_product) / denominator).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-6;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.3_f32; 16];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < TOLERANCE);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let a = [2.0, 1.0, 0.5];
        let b = [-2.0, -1.0, -0.5];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn zero_magnitude_vector_scores_zero() {
        let a = [0.0; 8];
        let b = [1.0; 8];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&b, &a), 0.0);
    }

    #[test]
    fn magnitude_does_not_affect_score() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let b: Vec<f32> = a.iter().map(|x| x * 100.0).collect();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn handles_lengths_not_divisible_by_eight() {
        // 11 elements exercises both the SIMD loop and the scalar tail.
        let a = [0.5_f32; 11];
        let b = [0.25_f32; 11];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn known_value() {
        // cos(45 degrees) between [1,0] and [1,1].
        let a = [1.0, 0.0];
        let b = [1.0, 1.0];
        let expected = 1.0 / 2.0_f64.sqrt();
        assert!((cosine_similarity(&a, &b) - expected).abs() < 1e-6);
    }
}
