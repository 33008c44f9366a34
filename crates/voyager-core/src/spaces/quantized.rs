//! Distance kernels for the 8-bit storage types.
//!
//! `Float8` kernels accumulate in integers (the stored bytes are already
//! scaled by 127) and apply the scale² adjustment once at the end. `E4M3`
//! kernels decode each lane through the lookup table and accumulate in
//! `f32`. Both unroll four accumulators for instruction-level parallelism;
//! the byte-wide lanes leave plenty of room for the auto-vectorizer on top.

use crate::storage::{Float8, StorageScalar, E4M3};

/// `(1/127)²`, the scale-squared adjustment for `Float8` sums.
const FLOAT8_SCALE_SQ: f32 = 1.0 / (127.0 * 127.0);

#[allow(clippy::cast_precision_loss)]
pub(super) fn euclidean_float8(a: &[Float8], b: &[Float8]) -> f32 {
    let chunks = a.len() / 4;

    let mut sum0: i64 = 0;
    let mut sum1: i64 = 0;
    let mut sum2: i64 = 0;
    let mut sum3: i64 = 0;

    for i in 0..chunks {
        let base = i * 4;
        let d0 = i32::from(a[base].raw()) - i32::from(b[base].raw());
        let d1 = i32::from(a[base + 1].raw()) - i32::from(b[base + 1].raw());
        let d2 = i32::from(a[base + 2].raw()) - i32::from(b[base + 2].raw());
        let d3 = i32::from(a[base + 3].raw()) - i32::from(b[base + 3].raw());
        sum0 += i64::from(d0 * d0);
        sum1 += i64::from(d1 * d1);
        sum2 += i64::from(d2 * d2);
        sum3 += i64::from(d3 * d3);
    }

    for i in chunks * 4..a.len() {
        let d = i32::from(a[i].raw()) - i32::from(b[i].raw());
        sum0 += i64::from(d * d);
    }

    ((sum0 + sum1 + sum2 + sum3) as f32) * FLOAT8_SCALE_SQ
}

#[allow(clippy::cast_precision_loss)]
pub(super) fn inner_product_float8(a: &[Float8], b: &[Float8]) -> f32 {
    let chunks = a.len() / 4;

    let mut sum0: i64 = 0;
    let mut sum1: i64 = 0;
    let mut sum2: i64 = 0;
    let mut sum3: i64 = 0;

    for i in 0..chunks {
        let base = i * 4;
        sum0 += i64::from(i32::from(a[base].raw()) * i32::from(b[base].raw()));
        sum1 += i64::from(i32::from(a[base + 1].raw()) * i32::from(b[base + 1].raw()));
        sum2 += i64::from(i32::from(a[base + 2].raw()) * i32::from(b[base + 2].raw()));
        sum3 += i64::from(i32::from(a[base + 3].raw()) * i32::from(b[base + 3].raw()));
    }

    for i in chunks * 4..a.len() {
        sum0 += i64::from(i32::from(a[i].raw()) * i32::from(b[i].raw()));
    }

    1.0 - ((sum0 + sum1 + sum2 + sum3) as f32) * FLOAT8_SCALE_SQ
}

pub(super) fn euclidean_e4m3(a: &[E4M3], b: &[E4M3]) -> f32 {
    let chunks = a.len() / 4;

    let mut sum0 = 0.0f32;
    let mut sum1 = 0.0f32;
    let mut sum2 = 0.0f32;
    let mut sum3 = 0.0f32;

    for i in 0..chunks {
        let base = i * 4;
        let d0 = a[base].to_f32() - b[base].to_f32();
        let d1 = a[base + 1].to_f32() - b[base + 1].to_f32();
        let d2 = a[base + 2].to_f32() - b[base + 2].to_f32();
        let d3 = a[base + 3].to_f32() - b[base + 3].to_f32();
        sum0 += d0 * d0;
        sum1 += d1 * d1;
        sum2 += d2 * d2;
        sum3 += d3 * d3;
    }

    for i in chunks * 4..a.len() {
        let d = a[i].to_f32() - b[i].to_f32();
        sum0 += d * d;
    }

    sum0 + sum1 + sum2 + sum3
}

pub(super) fn inner_product_e4m3(a: &[E4M3], b: &[E4M3]) -> f32 {
    let chunks = a.len() / 4;

    let mut sum0 = 0.0f32;
    let mut sum1 = 0.0f32;
    let mut sum2 = 0.0f32;
    let mut sum3 = 0.0f32;

    for i in 0..chunks {
        let base = i * 4;
        sum0 += a[base].to_f32() * b[base].to_f32();
        sum1 += a[base + 1].to_f32() * b[base + 1].to_f32();
        sum2 += a[base + 2].to_f32() * b[base + 2].to_f32();
        sum3 += a[base + 3].to_f32() * b[base + 3].to_f32();
    }

    for i in chunks * 4..a.len() {
        sum0 += a[i].to_f32() * b[i].to_f32();
    }

    1.0 - (sum0 + sum1 + sum2 + sum3)
}
