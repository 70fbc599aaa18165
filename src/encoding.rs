//! Conversions between the crate's types and the forms the ledger and the
//! circuits exchange.

use crate::{
    codec_wrapper::WrappedField,
    curve::{FieldElement, PackedPoint, Point, Scalar},
    elgamal::CipherText,
    errors::{Error, Result},
};

use ark_ff::{BigInteger, PrimeField, Zero};
use codec::{Decode, Encode, MaxEncodedLen};
use num_bigint::BigUint;
use scale_info::TypeInfo;
use sha3::{Digest, Keccak256};

/// The ledger's stored form of a balance ciphertext: `(C1x, C1y, C2x, C2y)`.
///
/// An account that was never funded holds the all-zero quadruple, which is
/// not a ciphertext at all (`(0, 0)` is not a curve point).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Encode, Decode, MaxEncodedLen, TypeInfo)]
pub struct EncryptedBalance {
    pub c1x: WrappedField,
    pub c1y: WrappedField,
    pub c2x: WrappedField,
    pub c2y: WrappedField,
}

impl EncryptedBalance {
    pub fn new(c1x: FieldElement, c1y: FieldElement, c2x: FieldElement, c2y: FieldElement) -> Self {
        Self {
            c1x: c1x.into(),
            c1y: c1y.into(),
            c2x: c2x.into(),
            c2y: c2y.into(),
        }
    }

    /// The quadruple the ledger reports for an unfunded account.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.coordinates().iter().all(|c| c.is_zero())
    }

    pub fn coordinates(&self) -> [FieldElement; 4] {
        [*self.c1x, *self.c1y, *self.c2x, *self.c2y]
    }

    /// Reads the four coordinates as 32-byte big-endian `uint256` words.
    pub fn from_be_words(words: &[[u8; 32]; 4]) -> Result<Self> {
        let field = |w: &[u8; 32]| -> Result<FieldElement> {
            let value = BigUint::from_bytes_be(w);
            ensure!(
                value < BigUint::from(FieldElement::MODULUS),
                Error::ChainCallError(format!("coordinate 0x{} exceeds the field", hex::encode(w)))
            );
            Ok(FieldElement::from_be_bytes_mod_order(w))
        };
        Ok(Self::new(
            field(&words[0])?,
            field(&words[1])?,
            field(&words[2])?,
            field(&words[3])?,
        ))
    }

    /// The coordinates as 32-byte big-endian `uint256` words.
    pub fn to_be_words(&self) -> [[u8; 32]; 4] {
        self.coordinates().map(|c| be_word(&c))
    }
}

impl From<&CipherText> for EncryptedBalance {
    fn from(ct: &CipherText) -> Self {
        Self::new(ct.c1.x(), ct.c1.y(), ct.c2.x(), ct.c2.y())
    }
}

impl From<CipherText> for EncryptedBalance {
    fn from(ct: CipherText) -> Self {
        Self::from(&ct)
    }
}

impl TryFrom<&EncryptedBalance> for CipherText {
    type Error = Error;

    /// Fails with `CurveEncodingError` for coordinates off the curve, including
    /// the all-zero quadruple.
    fn try_from(balance: &EncryptedBalance) -> Result<Self> {
        let c1 = Point::new(*balance.c1x, *balance.c1y)?;
        let c2 = Point::new(*balance.c2x, *balance.c2y)?;
        Ok(CipherText::new(c1, c2))
    }
}

impl TryFrom<EncryptedBalance> for CipherText {
    type Error = Error;

    fn try_from(balance: EncryptedBalance) -> Result<Self> {
        CipherText::try_from(&balance)
    }
}

fn be_word<F: PrimeField>(value: &F) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&value.into_bigint().to_bytes_be());
    out
}

/// `keccak256(C1x ‖ C1y ‖ C2x ‖ C2y) mod L`, each coordinate a big-endian word.
///
/// A pure function of the stored balance, bound into spending proofs so a
/// proof only applies to the balance it was built against.
pub fn nonce(balance: &EncryptedBalance) -> Scalar {
    let mut hasher = Keccak256::new();
    for word in balance.to_be_words() {
        hasher.update(word);
    }
    Scalar::from_be_bytes_mod_order(&hasher.finalize())
}

/// The raw packed bytes read as a little-endian integer reduced mod `L`.
///
/// No curve decoding happens here.
pub fn scalar_from_packed_le(packed: &PackedPoint) -> Scalar {
    Scalar::from_le_bytes_mod_order(packed.as_bytes())
}

/// Decimal rendering used in prover input documents.
pub fn to_decimal<F: PrimeField>(value: &F) -> String {
    let n: BigUint = value.into_bigint().into();
    n.to_str_radix(10)
}

/// Parses a decimal string into a canonical field element.
pub fn from_decimal<F: PrimeField>(value: &str) -> Result<F> {
    let n = BigUint::parse_bytes(value.as_bytes(), 10)
        .ok_or_else(|| Error::ChainCallError(format!("`{value}` is not a decimal integer")))?;
    let modulus: BigUint = F::MODULUS.into();
    ensure!(
        n < modulus,
        Error::ChainCallError(format!("`{value}` exceeds the field modulus"))
    );
    Ok(F::from_be_bytes_mod_order(&n.to_bytes_be()))
}
