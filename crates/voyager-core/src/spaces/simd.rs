//! SIMD kernels for `f32` vectors.
//!
//! Three tiers, selected once per space at construction:
//!
//! | Tier | Width | Requirement |
//! |------|-------|-------------|
//! | AVX-512 | 16 floats/iteration | `x86_64` with `avx512f` at runtime |
//! | `wide::f32x8` | 8 floats/iteration | any platform (`wide` lowers to AVX2/NEON/SSE) |
//! | `wide::f32x4` | 4 floats/iteration | any platform |
//! | scalar | 1 | — |
//!
//! Each width has an exact variant (dimensionality divisible by the width)
//! and a tail-handling variant that finishes the residual lanes in scalar
//! code. All variants are numerically equivalent within IEEE rounding; the
//! selection is a performance concern only.

// AVX-512 intrinsics post-date the declared MSRV; runtime feature detection
// keeps the call sites sound on older toolchains' targets.
#![allow(clippy::incompatible_msrv)]

use super::DistanceFn;
use wide::{f32x4, f32x8};

// ============================================================================
// Selection tables
// ============================================================================

/// Picks the squared-L2 kernel for `dims`.
pub(crate) fn select_euclidean(dims: usize) -> DistanceFn<f32> {
    #[cfg(target_arch = "x86_64")]
    {
        if dims >= 16 && is_x86_feature_detected!("avx512f") {
            return euclidean_avx512;
        }
    }
    if dims >= 8 {
        if dims % 8 == 0 {
            euclidean_x8
        } else {
            euclidean_x8_tail
        }
    } else if dims >= 4 {
        if dims % 4 == 0 {
            euclidean_x4
        } else {
            euclidean_x4_tail
        }
    } else {
        euclidean_scalar
    }
}

/// Picks the inner-product-distance kernel for `dims`.
pub(crate) fn select_inner_product(dims: usize) -> DistanceFn<f32> {
    #[cfg(target_arch = "x86_64")]
    {
        if dims >= 16 && is_x86_feature_detected!("avx512f") {
            return inner_product_avx512;
        }
    }
    if dims >= 8 {
        if dims % 8 == 0 {
            inner_product_x8
        } else {
            inner_product_x8_tail
        }
    } else if dims >= 4 {
        if dims % 4 == 0 {
            inner_product_x4
        } else {
            inner_product_x4_tail
        }
    } else {
        inner_product_scalar
    }
}

// ============================================================================
// Scalar kernels
// ============================================================================

pub(crate) fn euclidean_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = x - y;
        sum += d * d;
    }
    sum
}

pub(crate) fn inner_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
    }
    1.0 - dot
}

// ============================================================================
// 8-wide kernels (wide::f32x8)
// ============================================================================

#[inline]
fn squared_l2_x8_chunks(a: &[f32], b: &[f32], chunks: usize) -> f32 {
    let mut sum = f32x8::ZERO;
    for i in 0..chunks {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        let d = va - vb;
        sum = d.mul_add(d, sum);
    }
    sum.reduce_add()
}

#[inline]
fn dot_x8_chunks(a: &[f32], b: &[f32], chunks: usize) -> f32 {
    let mut sum = f32x8::ZERO;
    for i in 0..chunks {
        let offset = i * 8;
        let va = f32x8::from(&a[offset..offset + 8]);
        let vb = f32x8::from(&b[offset..offset + 8]);
        sum = va.mul_add(vb, sum);
    }
    sum.reduce_add()
}

fn euclidean_x8(a: &[f32], b: &[f32]) -> f32 {
    squared_l2_x8_chunks(a, b, a.len() / 8)
}

fn euclidean_x8_tail(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 8;
    let mut sum = squared_l2_x8_chunks(a, b, chunks);
    for i in chunks * 8..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

fn inner_product_x8(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot_x8_chunks(a, b, a.len() / 8)
}

fn inner_product_x8_tail(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 8;
    let mut dot = dot_x8_chunks(a, b, chunks);
    for i in chunks * 8..a.len() {
        dot += a[i] * b[i];
    }
    1.0 - dot
}

// ============================================================================
// 4-wide kernels (wide::f32x4)
// ============================================================================

#[inline]
fn squared_l2_x4_chunks(a: &[f32], b: &[f32], chunks: usize) -> f32 {
    let mut sum = f32x4::ZERO;
    for i in 0..chunks {
        let o = i * 4;
        let va = f32x4::from([a[o], a[o + 1], a[o + 2], a[o + 3]]);
        let vb = f32x4::from([b[o], b[o + 1], b[o + 2], b[o + 3]]);
        let d = va - vb;
        sum = d.mul_add(d, sum);
    }
    sum.reduce_add()
}

#[inline]
fn dot_x4_chunks(a: &[f32], b: &[f32], chunks: usize) -> f32 {
    let mut sum = f32x4::ZERO;
    for i in 0..chunks {
        let o = i * 4;
        let va = f32x4::from([a[o], a[o + 1], a[o + 2], a[o + 3]]);
        let vb = f32x4::from([b[o], b[o + 1], b[o + 2], b[o + 3]]);
        sum = va.mul_add(vb, sum);
    }
    sum.reduce_add()
}

fn euclidean_x4(a: &[f32], b: &[f32]) -> f32 {
    squared_l2_x4_chunks(a, b, a.len() / 4)
}

fn euclidean_x4_tail(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 4;
    let mut sum = squared_l2_x4_chunks(a, b, chunks);
    for i in chunks * 4..a.len() {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

fn inner_product_x4(a: &[f32], b: &[f32]) -> f32 {
    1.0 - dot_x4_chunks(a, b, a.len() / 4)
}

fn inner_product_x4_tail(a: &[f32], b: &[f32]) -> f32 {
    let chunks = a.len() / 4;
    let mut dot = dot_x4_chunks(a, b, chunks);
    for i in chunks * 4..a.len() {
        dot += a[i] * b[i];
    }
    1.0 - dot
}

// ============================================================================
// AVX-512 kernels (x86_64, runtime-detected)
// ============================================================================

/// 16-wide squared L2 using `_mm512_fmadd_ps`, scalar residual tail.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx512f")]
unsafe fn squared_l2_avx512_body(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::{
        _mm512_fmadd_ps, _mm512_loadu_ps, _mm512_reduce_add_ps, _mm512_setzero_ps, _mm512_sub_ps,
    };

    let len = a.len();
    let simd_len = len / 16;
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut sum = _mm512_setzero_ps();
    for i in 0..simd_len {
        let offset = i * 16;
        let va = _mm512_loadu_ps(a_ptr.add(offset));
        let vb = _mm512_loadu_ps(b_ptr.add(offset));
        let d = _mm512_sub_ps(va, vb);
        sum = _mm512_fmadd_ps(d, d, sum);
    }

    let mut result = _mm512_reduce_add_ps(sum);
    for i in simd_len * 16..len {
        let d = a[i] - b[i];
        result += d * d;
    }
    result
}

/// 16-wide dot product using `_mm512_fmadd_ps`, scalar residual tail.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx512f")]
unsafe fn dot_avx512_body(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::{
        _mm512_fmadd_ps, _mm512_loadu_ps, _mm512_reduce_add_ps, _mm512_setzero_ps,
    };

    let len = a.len();
    let simd_len = len / 16;
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    let mut sum = _mm512_setzero_ps();
    for i in 0..simd_len {
        let offset = i * 16;
        let va = _mm512_loadu_ps(a_ptr.add(offset));
        let vb = _mm512_loadu_ps(b_ptr.add(offset));
        sum = _mm512_fmadd_ps(va, vb, sum);
    }

    let mut result = _mm512_reduce_add_ps(sum);
    for i in simd_len * 16..len {
        result += a[i] * b[i];
    }
    result
}

#[cfg(target_arch = "x86_64")]
fn euclidean_avx512(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: only selected after is_x86_feature_detected!("avx512f").
    unsafe { squared_l2_avx512_body(a, b) }
}

#[cfg(target_arch = "x86_64")]
fn inner_product_avx512(a: &[f32], b: &[f32]) -> f32 {
    // SAFETY: only selected after is_x86_feature_detected!("avx512f").
    1.0 - unsafe { dot_avx512_body(a, b) }
}
