//! Fuzz target for kernel dispatch and batch evaluation.
//!
//! Arbitrary bytes are reinterpreted as every dtype and fed through the
//! engine. Any input may be rejected with an error, but none may panic, and
//! binary kernels must agree exactly between the best tier and the baseline.

#![no_main]

use std::sync::{Arc, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use simkern_core::{
    bf16, f16, CapabilityRegistry, CapabilitySet, Dtype, Engine, MatrixRef, Metric, OutputDtype,
    VectorRef,
};

/// Keeps single inputs small enough for libFuzzer's default timeout.
const MAX_BYTES: usize = 64 * 1024;

#[derive(Debug, Arbitrary)]
struct Input {
    metric: u8,
    dtype: u8,
    output: u8,
    rows: u8,
    a: Vec<u8>,
    b: Vec<u8>,
}

fn engines() -> &'static (Engine, Engine) {
    static ENGINES: OnceLock<(Engine, Engine)> = OnceLock::new();
    ENGINES.get_or_init(|| {
        (
            Engine::new(Arc::new(CapabilityRegistry::detect())),
            Engine::new(Arc::new(CapabilityRegistry::with_supported(
                CapabilitySet::baseline(),
            ))),
        )
    })
}

enum Owned {
    F64(Vec<f64>),
    F32(Vec<f32>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    I8(Vec<i8>),
    Bits(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

fn decode(bytes: &[u8], dtype: Dtype) -> Owned {
    match dtype {
        Dtype::F64 | Dtype::Complex128 => Owned::F64(
            bytes
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        Dtype::F32 | Dtype::Complex64 => Owned::F32(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        ),
        Dtype::F16 => Owned::F16(
            bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        Dtype::BF16 => Owned::BF16(
            bytes
                .chunks_exact(2)
                .map(|c| bf16::from_le_bytes([c[0], c[1]]))
                .collect(),
        ),
        Dtype::I8 => Owned::I8(bytes.iter().map(|&x| x as i8).collect()),
        Dtype::B8 => Owned::Bits(bytes.to_vec()),
        Dtype::U16 => {
            let mut v: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            v.sort_unstable();
            v.dedup();
            Owned::U16(v)
        }
        Dtype::U32 => {
            let mut v: Vec<u32> = bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                .collect();
            v.sort_unstable();
            v.dedup();
            Owned::U32(v)
        }
    }
}

fn view(owned: &Owned, dtype: Dtype) -> Option<VectorRef<'_>> {
    match owned {
        Owned::F64(v) if dtype == Dtype::Complex128 => VectorRef::complex128(v).ok(),
        Owned::F32(v) if dtype == Dtype::Complex64 => VectorRef::complex64(v).ok(),
        Owned::F64(v) => Some(v.into()),
        Owned::F32(v) => Some(v.into()),
        Owned::F16(v) => Some(v.into()),
        Owned::BF16(v) => Some(v.into()),
        Owned::I8(v) => Some(v.into()),
        Owned::Bits(v) => Some(VectorRef::bits(v)),
        Owned::U16(v) => Some(v.into()),
        Owned::U32(v) => Some(v.into()),
    }
}

fuzz_target!(|input: Input| {
    if input.a.len() > MAX_BYTES || input.b.len() > MAX_BYTES {
        return;
    }
    let metric = Metric::ALL[usize::from(input.metric) % Metric::ALL.len()];
    let dtype = Dtype::ALL[usize::from(input.dtype) % Dtype::ALL.len()];
    let outputs = [
        None,
        Some(OutputDtype::F32),
        Some(OutputDtype::I32),
        Some(OutputDtype::U8),
        Some(OutputDtype::Complex128),
    ];
    let output = outputs[usize::from(input.output) % outputs.len()];

    let (a, b) = (decode(&input.a, dtype), decode(&input.b, dtype));
    let (Some(va), Some(vb)) = (view(&a, dtype), view(&b, dtype)) else {
        return;
    };
    let (best, baseline) = engines();

    // Single calls: errors are fine, panics are not.
    let single = best.compute(metric, va, vb);
    let reference = baseline.compute(metric, va, vb);
    if dtype == Dtype::B8 {
        if let (Ok(x), Ok(y)) = (&single, &reference) {
            assert_eq!(x, y, "{metric} b8 differs between tiers");
        }
    }
    match (metric, &single) {
        (Metric::Cosine, Ok(d)) => assert!((0.0..=2.0).contains(&d.re()), "cosine {d}"),
        (Metric::JensenShannon, Ok(d)) => {
            assert!(d.re().is_finite() && d.re() >= 0.0, "jensenshannon {d}");
        }
        _ => {}
    }
    let _ = best.compute_curved(metric, va, vb, vb);

    // Batch path with the right operand split into rows.
    let rows = usize::from(input.rows % 8) + 1;
    if va.len() % rows == 0 {
        if let Ok(ma) = MatrixRef::new(va, rows, va.len() / rows) {
            let mb = MatrixRef::from_vector(vb);
            let _ = best.evaluate(metric, &ma, &mb, output);
            let _ = best.cdist(metric, &ma, &ma, output);
        }
    }
});
