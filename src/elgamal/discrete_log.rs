//! Bounded discrete log recovery for exponential Elgamal.
//!
//! Decryption yields `v · Base`; a `DiscreteLogSolver` maps that point back to
//! `v`. The built-in solver is baby-step giant-step with `2^ceil(bits/2)` baby
//! steps kept in a hash table keyed by the first 8 bytes of the packed point.

use crate::{
    curve::{CurveEngine, ExtendedPoint, Point, Scalar},
    errors::{Error, Result},
    Balance, BALANCE_RANGE,
};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Largest supported search range, in bits.
pub const MAX_RANGE_BITS: u32 = 48;

/// Baby steps computed per batch normalization.
const TABLE_CHUNK: u64 = 4096;
/// Giant steps computed per batch normalization.
const GIANT_STEP_BATCH: usize = 256;

/// Recovers `v` from `v · Base` for `v` in a bounded range.
pub trait DiscreteLogSolver {
    /// Exclusive upper bound of the recoverable values.
    fn range(&self) -> u64;

    /// Finds `v < self.range()` with `v · Base == target`, or fails with
    /// `DecryptionRangeExceeded`.
    fn solve(&self, curve: &CurveEngine, target: &Point) -> Result<Balance>;
}

fn table_key(p: &Point) -> u64 {
    LittleEndian::read_u64(&p.pack().0[..8])
}

fn steps_for(range_bits: u32) -> u64 {
    1u64 << ((range_bits + 1) / 2)
}

/// Baby steps `j · Base` for `j` in `[start, end)`, keyed.
fn baby_steps(curve: &CurveEngine, start: u64, end: u64) -> Vec<(u64, u32)> {
    let base = ExtendedPoint::from(curve.base());
    let mut acc = curve.mul_base_extended(&Scalar::from(start));
    let mut points = Vec::with_capacity((end - start) as usize);
    for _ in start..end {
        points.push(acc);
        acc = acc.add(&base);
    }
    ExtendedPoint::batch_normalize(&points)
        .iter()
        .zip(start..end)
        .map(|(p, j)| (table_key(p), j as u32))
        .collect()
}

#[derive(Serialize, Deserialize)]
struct StoredTable {
    range_bits: u32,
    entries: Vec<(u64, u32)>,
}

/// Baby-step giant-step solver over `[0, 2^range_bits)`.
#[derive(Clone, Debug)]
pub struct BabyStepGiantStep {
    range_bits: u32,
    steps: u64,
    table: HashMap<u64, u32>,
    /// `-steps · Base`
    giant_step: ExtendedPoint,
}

impl BabyStepGiantStep {
    /// Solver covering the full balance range `[0, 2^40)`.
    pub fn new(curve: &CurveEngine) -> Self {
        Self::with_range_bits(curve, BALANCE_RANGE)
    }

    /// Solver covering `[0, 2^range_bits)`; `range_bits` is clamped to `[1, MAX_RANGE_BITS]`.
    pub fn with_range_bits(curve: &CurveEngine, range_bits: u32) -> Self {
        let range_bits = range_bits.clamp(1, MAX_RANGE_BITS);
        let steps = steps_for(range_bits);

        let chunks: Vec<(u64, u64)> = (0..steps)
            .step_by(TABLE_CHUNK as usize)
            .map(|start| (start, (start + TABLE_CHUNK).min(steps)))
            .collect();

        #[cfg(feature = "rayon")]
        let parts: Vec<Vec<(u64, u32)>> = chunks
            .par_iter()
            .map(|&(start, end)| baby_steps(curve, start, end))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let parts: Vec<Vec<(u64, u32)>> = chunks
            .iter()
            .map(|&(start, end)| baby_steps(curve, start, end))
            .collect();

        let mut table = HashMap::with_capacity(steps as usize);
        for (key, j) in parts.into_iter().flatten() {
            table.entry(key).or_insert(j);
        }
        log::debug!("built baby-step table: {} bits, {} entries", range_bits, table.len());

        Self::from_table(curve, range_bits, table)
    }

    fn from_table(curve: &CurveEngine, range_bits: u32, table: HashMap<u64, u32>) -> Self {
        let steps = steps_for(range_bits);
        let giant_step = ExtendedPoint::from(&-curve.mul_base(&Scalar::from(steps)));
        Self {
            range_bits,
            steps,
            table,
            giant_step,
        }
    }

    pub fn range_bits(&self) -> u32 {
        self.range_bits
    }

    /// Serializes the baby-step table so another process can skip building it.
    pub fn write_table<W: Write>(&self, writer: W) -> Result<()> {
        let mut entries: Vec<(u64, u32)> = self.table.iter().map(|(k, j)| (*k, *j)).collect();
        entries.sort_unstable_by_key(|(_, j)| *j);
        bincode::serialize_into(
            writer,
            &StoredTable {
                range_bits: self.range_bits,
                entries,
            },
        )
        .map_err(|e| Error::ConfigError(format!("cannot write baby-step table: {e}")))
    }

    /// Loads a table written by `write_table`.
    ///
    /// A tampered table can only cause misses: every hit is checked against
    /// the target before it is returned.
    pub fn read_table<R: Read>(curve: &CurveEngine, reader: R) -> Result<Self> {
        let stored: StoredTable = bincode::deserialize_from(reader)
            .map_err(|e| Error::ConfigError(format!("cannot read baby-step table: {e}")))?;
        ensure!(
            (1..=MAX_RANGE_BITS).contains(&stored.range_bits),
            Error::ConfigError(format!("unsupported table range of {} bits", stored.range_bits))
        );
        let steps = steps_for(stored.range_bits);
        ensure!(
            !stored.entries.is_empty() && stored.entries.len() as u64 <= steps,
            Error::ConfigError(format!(
                "table holds {} entries, expected at most {steps}",
                stored.entries.len()
            ))
        );

        let mut table = HashMap::with_capacity(stored.entries.len());
        for (key, j) in stored.entries {
            table.entry(key).or_insert(j);
        }
        Ok(Self::from_table(curve, stored.range_bits, table))
    }
}

impl DiscreteLogSolver for BabyStepGiantStep {
    fn range(&self) -> u64 {
        1u64 << self.range_bits
    }

    fn solve(&self, curve: &CurveEngine, target: &Point) -> Result<Balance> {
        let range = self.range();
        let giant_steps = range.div_ceil(self.steps);

        let mut acc = ExtendedPoint::from(target);
        let mut batch = Vec::with_capacity(GIANT_STEP_BATCH);
        let mut i = 0u64;
        while i < giant_steps {
            let n = GIANT_STEP_BATCH.min((giant_steps - i) as usize);
            batch.clear();
            for _ in 0..n {
                batch.push(acc);
                acc = acc.add(&self.giant_step);
            }

            for (k, p) in ExtendedPoint::batch_normalize(&batch).iter().enumerate() {
                let Some(j) = self.table.get(&table_key(p)) else {
                    continue;
                };
                let candidate = (i + k as u64) * self.steps + u64::from(*j);
                if candidate < range && curve.mul_base(&Scalar::from(candidate)) == *target {
                    return Ok(candidate);
                }
            }
            i += n as u64;
        }
        Err(Error::DecryptionRangeExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const SEED_1: [u8; 32] = [42u8; 32];

    #[test]
    fn solves_boundaries() {
        let curve = CurveEngine::new();
        let solver = BabyStepGiantStep::with_range_bits(&curve, 16);
        assert_eq!(solver.range(), 1 << 16);

        for v in [0u64, 1, 2, 255, 256, 257, (1 << 16) - 1] {
            let target = curve.mul_base(&Scalar::from(v));
            assert_eq!(solver.solve(&curve, &target), Ok(v));
        }
    }

    #[test]
    fn odd_bit_ranges() {
        let curve = CurveEngine::new();
        let solver = BabyStepGiantStep::with_range_bits(&curve, 13);
        let mut rng = StdRng::from_seed(SEED_1);
        for _ in 0..16 {
            let v = rng.gen_range(0..(1u64 << 13));
            assert_eq!(solver.solve(&curve, &curve.mul_base(&Scalar::from(v))), Ok(v));
        }
    }

    #[test]
    fn out_of_range_fails() {
        let curve = CurveEngine::new();
        let solver = BabyStepGiantStep::with_range_bits(&curve, 12);
        let target = curve.mul_base(&Scalar::from(1u64 << 12));
        assert_eq!(
            solver.solve(&curve, &target),
            Err(Error::DecryptionRangeExceeded)
        );
        let target = -curve.mul_base(&Scalar::from(1u64));
        assert_eq!(
            solver.solve(&curve, &target),
            Err(Error::DecryptionRangeExceeded)
        );
    }

    #[test]
    fn table_roundtrip() {
        let curve = CurveEngine::new();
        let solver = BabyStepGiantStep::with_range_bits(&curve, 14);
        let mut bytes = Vec::new();
        solver.write_table(&mut bytes).unwrap();

        let loaded = BabyStepGiantStep::read_table(&curve, bytes.as_slice()).unwrap();
        assert_eq!(loaded.range_bits(), 14);
        let target = curve.mul_base(&Scalar::from(12_345u64));
        assert_eq!(loaded.solve(&curve, &target), Ok(12_345));
    }

    #[test]
    fn corrupt_table_is_rejected() {
        let curve = CurveEngine::new();
        assert!(matches!(
            BabyStepGiantStep::read_table(&curve, &[1u8, 2, 3][..]),
            Err(Error::ConfigError(_))
        ));

        let mut bytes = Vec::new();
        bincode::serialize_into(
            &mut bytes,
            &StoredTable {
                range_bits: 64,
                entries: vec![(0, 0)],
            },
        )
        .unwrap();
        assert!(BabyStepGiantStep::read_table(&curve, bytes.as_slice()).is_err());
    }
}
