//! BabyJubJub point arithmetic and the 32-byte compressed encoding.
//!
//! The curve is used in its circomlib twisted-Edwards form
//! `a·x² + y² = 1 + d·x²·y²` with `a = 168700` and `d = 168696` over the
//! BN254 scalar field, so that packed points and coordinates match what the
//! Noir circuits and the on-chain verifier expect. Field arithmetic comes from
//! `ark-ff`; the group law runs on extended coordinates, whose addition
//! formula is complete for this curve.

use crate::errors::{Error, Result};

use ark_ff::{batch_inversion, BigInt, BigInteger, BitIteratorBE, Field, MontFp, One, PrimeField, Zero};
use byteorder::{ByteOrder, LittleEndian};
use codec::{Decode, Encode, MaxEncodedLen};
use core::ops::{Add, AddAssign, Neg, Sub};
use rand_core::{CryptoRng, RngCore};
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};

/// Coordinates live in the BN254 scalar field.
pub use ark_ed_on_bn254::Fq as FieldElement;
/// Scalars live in the prime subgroup order `L`.
pub use ark_ed_on_bn254::Fr as Scalar;

/// Size of a packed point.
pub const PACKED_POINT_SIZE: usize = 32;

/// Bits needed to represent any scalar below `L`.
pub const SCALAR_BITS: usize = 251;

pub const COEFF_A: FieldElement = MontFp!("168700");
pub const COEFF_D: FieldElement = MontFp!("168696");

/// circomlib `Base8`, the generator of the prime order subgroup.
const BASE8_X: FieldElement =
    MontFp!("5299619240641551281634865583518297030282874472190772894086521144482721001553");
const BASE8_Y: FieldElement =
    MontFp!("16950150798460657717958625567821834550301663161624707787222815936182638968203");

// ------------------------------------------------------------------------
// Affine points.
// ------------------------------------------------------------------------

/// A point known to satisfy the curve equation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    x: FieldElement,
    y: FieldElement,
}

impl Point {
    pub const IDENTITY: Point = Point {
        x: MontFp!("0"),
        y: MontFp!("1"),
    };

    /// Builds a point from affine coordinates, rejecting anything off the curve.
    pub fn new(x: FieldElement, y: FieldElement) -> Result<Self> {
        let x2 = x.square();
        let y2 = y.square();
        ensure!(
            COEFF_A * x2 + y2 == FieldElement::one() + COEFF_D * x2 * y2,
            Error::CurveEncodingError
        );
        Ok(Self { x, y })
    }

    pub fn x(&self) -> FieldElement {
        self.x
    }

    pub fn y(&self) -> FieldElement {
        self.y
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Compresses the point: little-endian `y` with the sign of `x` in the top bit.
    pub fn pack(&self) -> PackedPoint {
        let mut bytes = [0u8; PACKED_POINT_SIZE];
        bytes.copy_from_slice(&self.y.into_bigint().to_bytes_le());
        if is_negative(&self.x) {
            bytes[31] |= 0x80;
        }
        PackedPoint(bytes)
    }

    fn to_extended(self) -> ExtendedPoint {
        ExtendedPoint {
            x: self.x,
            y: self.y,
            t: self.x * self.y,
            z: FieldElement::one(),
        }
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A coordinate is "negative" when it lies in the upper half of the field.
fn is_negative(v: &FieldElement) -> bool {
    v.into_bigint() > FieldElement::MODULUS_MINUS_ONE_DIV_TWO
}

impl<'a, 'b> Add<&'b Point> for &'a Point {
    type Output = Point;

    fn add(self, other: &'b Point) -> Point {
        self.to_extended().add(&other.to_extended()).normalize()
    }
}

impl Add<Point> for Point {
    type Output = Point;

    fn add(self, other: Point) -> Point {
        &self + &other
    }
}

impl AddAssign<&Point> for Point {
    fn add_assign(&mut self, other: &Point) {
        *self = &*self + other;
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point {
            x: -self.x,
            y: self.y,
        }
    }
}

impl<'a, 'b> Sub<&'b Point> for &'a Point {
    type Output = Point;

    fn sub(self, other: &'b Point) -> Point {
        self + &(-*other)
    }
}

impl Sub<Point> for Point {
    type Output = Point;

    fn sub(self, other: Point) -> Point {
        &self - &other
    }
}

// ------------------------------------------------------------------------
// Packed points.
// ------------------------------------------------------------------------

/// The 32-byte compressed encoding of a curve point.
#[derive(
    Copy,
    Clone,
    Default,
    Encode,
    Decode,
    MaxEncodedLen,
    TypeInfo,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Serialize,
    Deserialize,
)]
pub struct PackedPoint(pub [u8; PACKED_POINT_SIZE]);

impl PackedPoint {
    pub fn as_bytes(&self) -> &[u8; PACKED_POINT_SIZE] {
        &self.0
    }

    /// Decodes the point, failing when the bytes do not describe a curve point.
    pub fn unpack(&self) -> Result<Point> {
        let mut bytes = self.0;
        let sign = bytes[31] & 0x80 != 0;
        bytes[31] &= 0x7f;

        let y = FieldElement::from_bigint(bigint_from_le(&bytes)).ok_or(Error::CurveEncodingError)?;

        // x² = (1 - y²) / (a - d·y²)
        let y2 = y.square();
        let den = (COEFF_A - COEFF_D * y2)
            .inverse()
            .ok_or(Error::CurveEncodingError)?;
        let x2 = (FieldElement::one() - y2) * den;
        let mut x = x2.sqrt().ok_or(Error::CurveEncodingError)?;
        if is_negative(&x) {
            x = -x;
        }
        if sign {
            // x = 0 has no negative form.
            ensure!(!x.is_zero(), Error::CurveEncodingError);
            x = -x;
        }

        Point::new(x, y)
    }
}

impl From<&Point> for PackedPoint {
    fn from(p: &Point) -> Self {
        p.pack()
    }
}

impl core::fmt::Display for PackedPoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Reads 32 little-endian bytes into four 64-bit limbs.
pub(crate) fn bigint_from_le(bytes: &[u8; 32]) -> BigInt<4> {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        *limb = LittleEndian::read_u64(&bytes[i * 8..(i + 1) * 8]);
    }
    BigInt::new(limbs)
}

// ------------------------------------------------------------------------
// Extended coordinates.
// ------------------------------------------------------------------------

/// `(X:Y:T:Z)` with `x = X/Z`, `y = Y/Z`, `x·y = T/Z`.
#[derive(Copy, Clone, Debug)]
pub(crate) struct ExtendedPoint {
    x: FieldElement,
    y: FieldElement,
    t: FieldElement,
    z: FieldElement,
}

impl ExtendedPoint {
    pub(crate) fn identity() -> Self {
        Point::IDENTITY.to_extended()
    }

    /// add-2008-hwcd, valid for doubling as well.
    pub(crate) fn add(&self, other: &Self) -> Self {
        let a = self.x * other.x;
        let b = self.y * other.y;
        let c = COEFF_D * self.t * other.t;
        let d = self.z * other.z;
        let e = (self.x + self.y) * (other.x + other.y) - a - b;
        let f = d - c;
        let g = d + c;
        let h = b - COEFF_A * a;
        Self {
            x: e * f,
            y: g * h,
            t: e * h,
            z: f * g,
        }
    }

    pub(crate) fn double(&self) -> Self {
        self.add(self)
    }

    pub(crate) fn normalize(&self) -> Point {
        // Z never vanishes under the complete addition law.
        let z_inv = self
            .z
            .inverse()
            .expect("extended point with Z = 0");
        Point {
            x: self.x * z_inv,
            y: self.y * z_inv,
        }
    }

    /// Normalizes many points with a single field inversion.
    pub(crate) fn batch_normalize(points: &[Self]) -> Vec<Point> {
        let mut zs: Vec<FieldElement> = points.iter().map(|p| p.z).collect();
        batch_inversion(&mut zs);
        points
            .iter()
            .zip(zs)
            .map(|(p, z_inv)| Point {
                x: p.x * z_inv,
                y: p.y * z_inv,
            })
            .collect()
    }
}

impl From<&Point> for ExtendedPoint {
    fn from(p: &Point) -> Self {
        p.to_extended()
    }
}

// ------------------------------------------------------------------------
// Curve engine.
// ------------------------------------------------------------------------

/// Immutable curve context: the base point and its doubling ladder.
///
/// Build it once and share it by reference; nothing in it changes after
/// construction.
#[derive(Clone, Debug)]
pub struct CurveEngine {
    base: Point,
    /// `2^i · Base` for every scalar bit.
    base_ladder: Vec<ExtendedPoint>,
}

impl CurveEngine {
    pub fn new() -> Self {
        let base = Point {
            x: BASE8_X,
            y: BASE8_Y,
        };
        let mut base_ladder = Vec::with_capacity(SCALAR_BITS + 1);
        let mut acc = base.to_extended();
        for _ in 0..=SCALAR_BITS {
            base_ladder.push(acc);
            acc = acc.double();
        }
        Self { base, base_ladder }
    }

    pub fn base(&self) -> &Point {
        &self.base
    }

    /// `s · Base` using the precomputed ladder.
    pub fn mul_base(&self, s: &Scalar) -> Point {
        self.mul_base_extended(s).normalize()
    }

    pub(crate) fn mul_base_extended(&self, s: &Scalar) -> ExtendedPoint {
        let bits = s.into_bigint();
        self.base_ladder
            .iter()
            .enumerate()
            .filter(|(i, _)| bits.get_bit(*i))
            .fold(ExtendedPoint::identity(), |acc, (_, p)| acc.add(p))
    }

    /// `s · P` by double-and-add.
    pub fn scalar_multiply(&self, p: &Point, s: &Scalar) -> Point {
        if *p == self.base {
            return self.mul_base(s);
        }
        let p = p.to_extended();
        BitIteratorBE::without_leading_zeros(s.into_bigint())
            .fold(ExtendedPoint::identity(), |acc, bit| {
                let acc = acc.double();
                if bit {
                    acc.add(&p)
                } else {
                    acc
                }
            })
            .normalize()
    }

    pub fn add_points(&self, a: &Point, b: &Point) -> Point {
        a + b
    }

    /// Uniform scalar in `[0, bound]` by rejection sampling.
    pub fn random_scalar<R: RngCore + CryptoRng>(&self, bound: &Scalar, rng: &mut R) -> Scalar {
        let bound = bound.into_bigint();
        let bits = bound.num_bits() as usize;
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let mut candidate = bigint_from_le(&bytes);
            for (i, limb) in candidate.0.iter_mut().enumerate() {
                let low = i * 64;
                if low >= bits {
                    *limb = 0;
                } else if bits - low < 64 {
                    *limb &= (1u64 << (bits - low)) - 1;
                }
            }
            if candidate <= bound {
                if let Some(s) = Scalar::from_bigint(candidate) {
                    return s;
                }
            }
        }
    }

    /// Uniform scalar in `[1, L-1]`.
    pub fn random_nonzero_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Scalar {
        let max = -Scalar::one();
        loop {
            let s = self.random_scalar(&max, rng);
            if !s.is_zero() {
                return s;
            }
        }
    }
}

impl Default for CurveEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Where coordinator randomness comes from.
///
/// `FixedForTesting` makes ciphertexts reproducible and must only ever be used
/// by tests; there is deliberately no `Default`.
#[derive(Copy, Clone, Debug)]
pub enum ScalarSource {
    Secure,
    FixedForTesting(Scalar),
}

impl ScalarSource {
    pub fn draw(&self, curve: &CurveEngine) -> Scalar {
        match self {
            Self::Secure => curve.random_nonzero_scalar(&mut rand::rngs::OsRng),
            Self::FixedForTesting(s) => *s,
        }
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------
