//! Exponential Elgamal encryption over BabyJubJub.
//! Since Elgamal is a homomorphic encryption it also provides
//! addition and subtraction API over the cipher texts.

use crate::{
    codec_wrapper::{WrappedPoint, WrappedScalar},
    curve::{CurveEngine, PackedPoint, Point, Scalar},
    errors::{Error, Result},
    Balance, BALANCE_RANGE,
};

use core::ops::{Add, AddAssign, Deref, Sub};
use rand_core::{CryptoRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use codec::{Decode, Encode, MaxEncodedLen};
use scale_info::TypeInfo;

pub mod discrete_log;

pub use discrete_log::{BabyStepGiantStep, DiscreteLogSolver};

/// Largest value (exclusive) that can be encrypted and still decrypted.
pub const PLAINTEXT_BOUND: u128 = 1 << BALANCE_RANGE;

/// Fails with `PlainTextRangeError` unless `0 <= value < 2^40`.
pub fn ensure_plaintext_range(value: u128) -> Result<Balance> {
    ensure!(value < PLAINTEXT_BOUND, Error::PlainTextRangeError { value });
    Ok(value as Balance)
}

/// Encryption of `plaintext · Base` under a public key.
///
/// `c1 := r · Base`, `c2 := plaintext · Base + r · public_key`.
#[derive(Copy, Clone, Encode, Decode, MaxEncodedLen, TypeInfo, Default, Debug, PartialEq, Eq)]
pub struct CipherText {
    pub c1: WrappedPoint,
    pub c2: WrappedPoint,
}

impl CipherText {
    pub fn new(c1: Point, c2: Point) -> Self {
        Self {
            c1: c1.into(),
            c2: c2.into(),
        }
    }

    /// A ciphertext of zero made with zero randomness: both points are the identity.
    ///
    /// Useful as the neutral element when folding sums, never as a ledger value.
    pub fn identity() -> Self {
        Default::default()
    }

    /// `Encrypt(public_key, 0)` with the given randomness.
    pub fn zero_encryption(
        curve: &CurveEngine,
        public_key: &ElgamalPublicKey,
        randomness: &Scalar,
    ) -> Self {
        public_key.encrypt_unchecked(curve, 0, randomness)
    }

    /// Point-wise addition; decrypts to the sum of both plaintexts.
    ///
    /// The caller keeps the sum below `2^40`; no overflow check happens here.
    pub fn homomorphic_add(&self, other: &CipherText) -> CipherText {
        self + other
    }
}

// ------------------------------------------------------------------------
// Arithmetic operations on the ciphertext.
// ------------------------------------------------------------------------

impl<'a, 'b> Add<&'b CipherText> for &'a CipherText {
    type Output = CipherText;

    fn add(self, other: &'b CipherText) -> CipherText {
        CipherText::new(*self.c1 + *other.c1, *self.c2 + *other.c2)
    }
}

impl Add<CipherText> for CipherText {
    type Output = CipherText;

    fn add(self, other: CipherText) -> CipherText {
        &self + &other
    }
}

impl<'b> AddAssign<&'b CipherText> for CipherText {
    fn add_assign(&mut self, rhs: &CipherText) {
        *self = (self as &CipherText) + rhs;
    }
}

impl<'a, 'b> Sub<&'b CipherText> for &'a CipherText {
    type Output = CipherText;

    fn sub(self, other: &'b CipherText) -> CipherText {
        CipherText::new(*self.c1 - *other.c1, *self.c2 - *other.c2)
    }
}

impl Sub<CipherText> for CipherText {
    type Output = CipherText;

    fn sub(self, other: CipherText) -> CipherText {
        &self - &other
    }
}

// ------------------------------------------------------------------------
// Elgamal Encryption.
// ------------------------------------------------------------------------

/// An Elgamal Secret Key is a random scalar in `[1, L-1]`.
#[derive(Clone, Encode, Decode, Zeroize, ZeroizeOnDrop, Debug)]
pub struct ElgamalSecretKey {
    pub secret: WrappedScalar,
}

impl Deref for ElgamalSecretKey {
    type Target = Scalar;
    fn deref(&self) -> &Self::Target {
        &self.secret
    }
}

/// The Elgamal Public Key is the secret key multiplied by the base point.
#[derive(Copy, Clone, Encode, Decode, MaxEncodedLen, TypeInfo, Default, PartialEq, Eq, Debug)]
pub struct ElgamalPublicKey {
    pub pub_key: WrappedPoint,
}

impl ElgamalPublicKey {
    pub fn from_packed(packed: &PackedPoint) -> Result<Self> {
        Ok(Self {
            pub_key: packed.unpack()?.into(),
        })
    }

    pub fn pack(&self) -> PackedPoint {
        self.pub_key.pack()
    }

    fn encrypt_unchecked(&self, curve: &CurveEngine, value: Balance, randomness: &Scalar) -> CipherText {
        let c1 = curve.mul_base(randomness);
        let c2 = curve.mul_base(&Scalar::from(value))
            + curve.scalar_multiply(&self.pub_key, randomness);
        CipherText::new(c1, c2)
    }

    /// Encrypts `value` with caller-chosen randomness. Deterministic.
    pub fn encrypt(
        &self,
        curve: &CurveEngine,
        value: Balance,
        randomness: &Scalar,
    ) -> Result<CipherText> {
        ensure_plaintext_range(value as u128)?;
        Ok(self.encrypt_unchecked(curve, value, randomness))
    }

    /// Generates the randomness, and encrypts the value.
    pub fn encrypt_value<R: RngCore + CryptoRng>(
        &self,
        curve: &CurveEngine,
        value: Balance,
        rng: &mut R,
    ) -> Result<(Scalar, CipherText)> {
        let randomness = curve.random_nonzero_scalar(rng);
        Ok((randomness, self.encrypt(curve, value, &randomness)?))
    }
}

impl ElgamalSecretKey {
    pub fn new(secret: Scalar) -> Self {
        ElgamalSecretKey {
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> Scalar {
        *self.secret
    }

    pub fn get_public_key(&self, curve: &CurveEngine) -> ElgamalPublicKey {
        ElgamalPublicKey {
            pub_key: curve.mul_base(&self.secret()).into(),
        }
    }

    /// `plaintext · Base = c2 - secret · c1`
    fn message_point(&self, curve: &CurveEngine, cipher_text: &CipherText) -> Point {
        *cipher_text.c2 - curve.scalar_multiply(&cipher_text.c1, &self.secret())
    }

    /// Decrypt a cipher text that is known to encrypt a Balance.
    pub fn decrypt<S: DiscreteLogSolver + ?Sized>(
        &self,
        curve: &CurveEngine,
        solver: &S,
        cipher_text: &CipherText,
    ) -> Result<Balance> {
        solver.solve(curve, &self.message_point(curve, cipher_text))
    }

    /// Verifies that a cipher text encrypts the given `value`.
    /// This follows the same logic as decrypt(), except that the `value`
    /// is provided and we don't need to search for it.
    pub fn verify(&self, curve: &CurveEngine, cipher_text: &CipherText, value: Balance) -> Result<()> {
        ensure!(
            curve.mul_base(&Scalar::from(value)) == self.message_point(curve, cipher_text),
            Error::DecryptionRangeExceeded
        );
        Ok(())
    }
}

/// Holds Elgamal encryption keys.
#[derive(Clone, Encode, Decode, Debug)]
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ElgamalKeys {
    #[zeroize(skip)]
    pub public: ElgamalPublicKey,
    pub secret: ElgamalSecretKey,
}

impl ElgamalKeys {
    /// Samples a fresh key pair.
    pub fn generate<R: RngCore + CryptoRng>(curve: &CurveEngine, rng: &mut R) -> Self {
        let secret = ElgamalSecretKey::new(curve.random_nonzero_scalar(rng));
        Self::from_secret(curve, secret)
    }

    pub fn from_secret(curve: &CurveEngine, secret: ElgamalSecretKey) -> Self {
        Self {
            public: secret.get_public_key(curve),
            secret,
        }
    }
}

// ------------------------------------------------------------------------
// Tests
// ------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Balance;
    use rand::{rngs::StdRng, SeedableRng};

    const SEED_1: [u8; 32] = [42u8; 32];
    const SEED_2: [u8; 32] = [56u8; 32];

    fn small_solver(curve: &CurveEngine) -> BabyStepGiantStep {
        BabyStepGiantStep::with_range_bits(curve, 20)
    }

    #[test]
    fn basic_enc_dec() {
        let curve = CurveEngine::new();
        let solver = small_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let keys = ElgamalKeys::generate(&curve, &mut rng);

        // Test encrypting balance.
        let balance: Balance = 256;
        let randomness = curve.random_nonzero_scalar(&mut rng);
        // Test encrypt().
        let cipher = keys.public.encrypt(&curve, balance, &randomness).unwrap();
        assert_eq!(keys.secret.decrypt(&curve, &solver, &cipher), Ok(balance));

        // Test encrypt_value().
        let (_, cipher) = keys.public.encrypt_value(&curve, balance, &mut rng).unwrap();
        assert_eq!(keys.secret.decrypt(&curve, &solver, &cipher), Ok(balance));
        assert_eq!(keys.secret.verify(&curve, &cipher, balance), Ok(()));
        assert!(keys.secret.verify(&curve, &cipher, balance + 1).is_err());
    }

    #[test]
    fn encryption_is_deterministic_given_randomness() {
        let curve = CurveEngine::new();
        let mut rng = StdRng::from_seed(SEED_1);
        let keys = ElgamalKeys::generate(&curve, &mut rng);
        let r = Scalar::from(1234u64);
        assert_eq!(
            keys.public.encrypt(&curve, 77, &r),
            keys.public.encrypt(&curve, 77, &r)
        );
        assert_ne!(
            keys.public.encrypt(&curve, 77, &r),
            keys.public.encrypt(&curve, 77, &Scalar::from(1235u64))
        );
    }

    #[test]
    fn plaintext_range_is_enforced() {
        let curve = CurveEngine::new();
        let mut rng = StdRng::from_seed(SEED_1);
        let keys = ElgamalKeys::generate(&curve, &mut rng);
        let r = Scalar::from(9u64);

        assert!(keys.public.encrypt(&curve, (1 << 40) - 1, &r).is_ok());
        assert_eq!(
            keys.public.encrypt(&curve, 1 << 40, &r),
            Err(Error::PlainTextRangeError { value: 1 << 40 })
        );
        assert!(keys.public.encrypt(&curve, u64::MAX, &r).is_err());
    }

    #[test]
    fn decrypt_zero_encryption() {
        let curve = CurveEngine::new();
        let solver = small_solver(&curve);
        let mut rng = StdRng::from_seed(SEED_1);
        let keys = ElgamalKeys::generate(&curve, &mut rng);

        let zero = CipherText::zero_encryption(&curve, &keys.public, &Scalar::from(5u64));
        assert_eq!(keys.secret.decrypt(&curve, &solver, &zero), Ok(0));
        assert_eq!(keys.secret.decrypt(&curve, &solver, &CipherText::identity()), Ok(0));
    }

    #[test]
    fn homomorphic_encryption() {
        let curve = CurveEngine::new();
        let solver = small_solver(&curve);
        let v1: Balance = 623;
        let v2: Balance = 456;
        let mut rng = StdRng::from_seed(SEED_2);
        let r1 = curve.random_nonzero_scalar(&mut rng);
        let r2 = curve.random_nonzero_scalar(&mut rng);

        let keys = ElgamalKeys::generate(&curve, &mut rng);
        let elg_pub = keys.public;

        let cipher1 = elg_pub.encrypt(&curve, v1, &r1).unwrap();
        let cipher2 = elg_pub.encrypt(&curve, v2, &r2).unwrap();
        let cipher12 = elg_pub.encrypt(&curve, v1 + v2, &(r1 + r2)).unwrap();
        assert_eq!(cipher1.homomorphic_add(&cipher2), cipher12);
        assert_eq!(cipher12 - cipher2, cipher1);
        assert_eq!(
            keys.secret.decrypt(&curve, &solver, &(cipher1 + cipher2)),
            Ok(v1 + v2)
        );
    }

    #[test]
    fn wrong_key_does_not_decrypt() {
        let curve = CurveEngine::new();
        let solver = BabyStepGiantStep::with_range_bits(&curve, 12);
        let mut rng = StdRng::from_seed(SEED_2);
        let alice = ElgamalKeys::generate(&curve, &mut rng);
        let bob = ElgamalKeys::generate(&curve, &mut rng);

        let (_, cipher) = alice.public.encrypt_value(&curve, 10, &mut rng).unwrap();
        assert_eq!(
            bob.secret.decrypt(&curve, &solver, &cipher),
            Err(Error::DecryptionRangeExceeded)
        );
    }

    #[test]
    fn keys_codec_roundtrip() {
        let curve = CurveEngine::new();
        let mut rng = StdRng::from_seed(SEED_1);
        let keys = ElgamalKeys::generate(&curve, &mut rng);
        let encoded = keys.encode();
        assert_eq!(encoded.len(), 64);
        let decoded = ElgamalKeys::decode(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded.public, keys.public);
        assert_eq!(decoded.secret.secret(), keys.secret.secret());

        let (_, cipher) = keys.public.encrypt_value(&curve, 3, &mut rng).unwrap();
        let bytes = cipher.encode();
        assert_eq!(CipherText::decode(&mut bytes.as_slice()).unwrap(), cipher);
    }
}
