use codec::{Decode, Encode, Error as CodecError, Input, MaxEncodedLen, Output};
use ark_ff::{BigInteger, PrimeField};
use scale_info::{build::Fields, Path, Type, TypeInfo};
use zeroize::Zeroize;

use core::ops::{Deref, DerefMut};

use crate::curve::{bigint_from_le, FieldElement, PackedPoint, Point, Scalar, PACKED_POINT_SIZE};

/// Constants:
/// A serialized Scalar size.
pub const SCALAR_SIZE: usize = 32;

/// A serialized field element size.
pub const FIELD_ELEMENT_SIZE: usize = 32;

fn to_le_array<F: PrimeField>(value: &F) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&value.into_bigint().to_bytes_le());
    out
}

/// Wrapper for `Point` to implement SCALE encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WrappedPoint(Point);

impl Encode for WrappedPoint {
    #[inline]
    fn size_hint(&self) -> usize {
        PACKED_POINT_SIZE
    }

    /// Encodes itself as the packed point.
    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        self.0.pack().0.encode_to(dest);
    }
}

impl Decode for WrappedPoint {
    /// Decodes a `Point` from its packed form.
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let packed = PackedPoint::decode(input)?;
        let inner = packed
            .unpack()
            .map_err(|_| CodecError::from("Invalid packed `Point`."))?;

        Ok(Self(inner))
    }
}

impl MaxEncodedLen for WrappedPoint {
    fn max_encoded_len() -> usize {
        PACKED_POINT_SIZE
    }
}

impl TypeInfo for WrappedPoint {
    type Identity = Self;
    fn type_info() -> Type {
        Type::builder()
            .path(Path::new("WrappedPoint", module_path!()))
            .composite(
                Fields::unnamed()
                    .field(|f| f.ty::<[u8; PACKED_POINT_SIZE]>().type_name("PackedPoint")),
            )
    }
}

impl From<WrappedPoint> for Point {
    fn from(data: WrappedPoint) -> Self {
        data.0
    }
}

impl Deref for WrappedPoint {
    type Target = Point;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Point> for WrappedPoint {
    fn from(data: Point) -> Self {
        Self(data)
    }
}

/// Wrapper for `Scalar` to implement SCALE encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroize)]
pub struct WrappedScalar(pub Scalar);

impl Encode for WrappedScalar {
    #[inline]
    fn size_hint(&self) -> usize {
        SCALAR_SIZE
    }

    /// Encodes itself as 32 little-endian bytes.
    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        to_le_array(&self.0).encode_to(dest);
    }
}

impl Decode for WrappedScalar {
    /// Decodes a `Scalar` from an array of bytes.
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let s = <[u8; SCALAR_SIZE]>::decode(input)?;

        let inner = Scalar::from_bigint(bigint_from_le(&s))
            .ok_or_else(|| CodecError::from("Non-canonical `Scalar`."))?;
        Ok(Self(inner))
    }
}

impl From<WrappedScalar> for Scalar {
    fn from(data: WrappedScalar) -> Self {
        data.0
    }
}

impl Deref for WrappedScalar {
    type Target = Scalar;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for WrappedScalar {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Scalar> for WrappedScalar {
    fn from(data: Scalar) -> Self {
        Self(data)
    }
}

/// Wrapper for a base field element (a ledger `uint256` coordinate).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WrappedField(pub FieldElement);

impl Encode for WrappedField {
    #[inline]
    fn size_hint(&self) -> usize {
        FIELD_ELEMENT_SIZE
    }

    fn encode_to<W: Output + ?Sized>(&self, dest: &mut W) {
        to_le_array(&self.0).encode_to(dest);
    }
}

impl Decode for WrappedField {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let s = <[u8; FIELD_ELEMENT_SIZE]>::decode(input)?;

        let inner = FieldElement::from_bigint(bigint_from_le(&s))
            .ok_or_else(|| CodecError::from("Non-canonical field element."))?;
        Ok(Self(inner))
    }
}

impl MaxEncodedLen for WrappedField {
    fn max_encoded_len() -> usize {
        FIELD_ELEMENT_SIZE
    }
}

impl TypeInfo for WrappedField {
    type Identity = Self;
    fn type_info() -> Type {
        Type::builder()
            .path(Path::new("WrappedField", module_path!()))
            .composite(
                Fields::unnamed().field(|f| f.ty::<[u8; FIELD_ELEMENT_SIZE]>().type_name("U256Le")),
            )
    }
}

impl Deref for WrappedField {
    type Target = FieldElement;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<FieldElement> for WrappedField {
    fn from(data: FieldElement) -> Self {
        Self(data)
    }
}
