// ── SSH host-key codec ──
//
// Decodes the RFC 4253 §6.6 public-key blob (4-byte length-prefixed
// fields) into a comparable, hashable HostIdentity, and encodes it back
// deterministically. The identity is the de-duplication and lookup key for
// every call-home connection, so equality must be over canonical key
// material: mpint values are stripped of redundant leading zero bytes on
// decode and re-prefixed on encode when the high bit is set.
//
// All offset arithmetic is fallible. The blob is attacker-controlled.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DecodeError;

const TAG_RSA: &str = "ssh-rsa";
const TAG_DSA: &str = "ssh-dss";
const TAG_ECDSA_P256: &str = "ecdsa-sha2-nistp256";
const CURVE_P256: &str = "nistp256";

/// Uncompressed SEC1 point on P-256: 0x04 || X (32 bytes) || Y (32 bytes).
const P256_POINT_LEN: usize = 65;

/// A device's host public key, decoded into comparable form.
///
/// Two identities are equal iff algorithm and canonical key material match.
/// Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostIdentity {
    Rsa { exponent: Bytes, modulus: Bytes },
    Dsa { p: Bytes, q: Bytes, g: Bytes, y: Bytes },
    EcdsaP256 { point: Bytes },
}

impl HostIdentity {
    /// Parse a wire-format public-key blob.
    pub fn decode(wire: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = wire;
        let tag = read_field(&mut buf)?;
        let tag = std::str::from_utf8(tag.as_ref())
            .map_err(|_| DecodeError::Malformed("type tag is not UTF-8"))?;

        let identity = match tag {
            TAG_RSA => Self::Rsa {
                exponent: read_mpint(&mut buf)?,
                modulus: read_mpint(&mut buf)?,
            },
            TAG_DSA => Self::Dsa {
                p: read_mpint(&mut buf)?,
                q: read_mpint(&mut buf)?,
                g: read_mpint(&mut buf)?,
                y: read_mpint(&mut buf)?,
            },
            TAG_ECDSA_P256 => {
                let curve = read_field(&mut buf)?;
                if curve.as_ref() != CURVE_P256.as_bytes() {
                    return Err(DecodeError::Malformed("unexpected curve name"));
                }
                let point = read_field(&mut buf)?;
                if point.len() != P256_POINT_LEN || point[0] != 0x04 {
                    return Err(DecodeError::Malformed("expected 65-byte uncompressed point"));
                }
                Self::EcdsaP256 { point }
            }
            other => return Err(DecodeError::UnknownType(other.to_owned())),
        };

        if buf.has_remaining() {
            return Err(DecodeError::Malformed("trailing bytes after key material"));
        }
        Ok(identity)
    }

    /// Encode back to the wire blob. Deterministic: the same identity
    /// always produces the same bytes, so the encoding doubles as a stable
    /// secondary map key.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        match self {
            Self::Rsa { exponent, modulus } => {
                put_field(&mut buf, TAG_RSA.as_bytes());
                put_mpint(&mut buf, exponent);
                put_mpint(&mut buf, modulus);
            }
            Self::Dsa { p, q, g, y } => {
                put_field(&mut buf, TAG_DSA.as_bytes());
                put_mpint(&mut buf, p);
                put_mpint(&mut buf, q);
                put_mpint(&mut buf, g);
                put_mpint(&mut buf, y);
            }
            Self::EcdsaP256 { point } => {
                put_field(&mut buf, TAG_ECDSA_P256.as_bytes());
                put_field(&mut buf, CURVE_P256.as_bytes());
                put_field(&mut buf, point);
            }
        }
        buf.to_vec()
    }

    /// Parse the authorized-keys string form: either the bare base64 blob
    /// or a full `<tag> <base64> [comment]` line.
    pub fn from_openssh(s: &str) -> Result<Self, DecodeError> {
        let mut tokens = s.split_whitespace();
        let first = tokens.next().ok_or(DecodeError::Malformed("empty key string"))?;
        let blob = if first.starts_with("ssh-") || first.starts_with("ecdsa-") {
            tokens.next().ok_or(DecodeError::Malformed("missing base64 after type tag"))?
        } else {
            first
        };
        Self::decode(&BASE64_STANDARD.decode(blob)?)
    }

    /// The authorized-keys string form of the encoded blob.
    pub fn to_openssh(&self) -> String {
        format!("{} {}", self.algorithm(), BASE64_STANDARD.encode(self.encode()))
    }

    /// The SSH algorithm name this key is tagged with.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Rsa { .. } => TAG_RSA,
            Self::Dsa { .. } => TAG_DSA,
            Self::EcdsaP256 { .. } => TAG_ECDSA_P256,
        }
    }
}

impl std::fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { modulus, .. } => write!(f, "{} ({} bit)", TAG_RSA, modulus.len() * 8),
            Self::Dsa { p, .. } => write!(f, "{} ({} bit)", TAG_DSA, p.len() * 8),
            Self::EcdsaP256 { .. } => f.write_str(TAG_ECDSA_P256),
        }
    }
}

// ── Field helpers ───────────────────────────────────────────────────

/// Read one 4-byte length-prefixed field.
fn read_field(buf: &mut &[u8]) -> Result<Bytes, DecodeError> {
    if buf.remaining() < 4 {
        return Err(DecodeError::Malformed("truncated length field"));
    }
    let len = usize::try_from(buf.get_u32()).map_err(|_| DecodeError::Malformed("length overflow"))?;
    if buf.remaining() < len {
        return Err(DecodeError::Malformed("length exceeds remaining bytes"));
    }
    Ok(buf.copy_to_bytes(len))
}

/// Read an mpint field and strip redundant leading zero bytes so that the
/// stored magnitude is canonical.
fn read_mpint(buf: &mut &[u8]) -> Result<Bytes, DecodeError> {
    let raw = read_field(buf)?;
    let start = raw.iter().position(|&b| b != 0).unwrap_or(raw.len());
    Ok(raw.slice(start..))
}

fn put_field(buf: &mut BytesMut, field: &[u8]) {
    buf.put_u32(u32::try_from(field.len()).unwrap_or(u32::MAX));
    buf.put_slice(field);
}

/// Write a canonical magnitude as an mpint, prefixing a zero byte when the
/// high bit is set (RFC 4251 §5).
fn put_mpint(buf: &mut BytesMut, magnitude: &[u8]) {
    let sign = magnitude.first().is_some_and(|&b| b & 0x80 != 0);
    let len = magnitude.len() + usize::from(sign);
    buf.put_u32(u32::try_from(len).unwrap_or(u32::MAX));
    if sign {
        buf.put_u8(0);
    }
    buf.put_slice(magnitude);
}
