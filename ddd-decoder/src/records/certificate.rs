//! Certificate structure
//!
//! Gen1 certificates are 194-byte RSA certificates of which only the
//! non-recoverable part (modulus tail, exponent and the authority reference)
//! is readable without signature recovery. Gen2 certificates are BER-TLV
//! encoded ECC certificates. Signatures are never checked.

use super::{Decoded, FieldReader, RecordKind};
use crate::tables::Nation;
use crate::tlv::{self, Tlv};
use crate::types::{time_real, DecoderError, Generation, Result, Timestamp};
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

/// Length of a Gen1 certificate
pub const GEN1_CERTIFICATE_LEN: usize = 194;

const GEN1_SIGNATURE_LEN: usize = 128;
const GEN1_MODULUS_TAIL_LEN: usize = 50;
const GEN1_EXPONENT_LEN: usize = 8;

const TAG_CERTIFICATE: u32 = 0x7F21;
const TAG_BODY: u32 = 0x7F4E;
const TAG_PROFILE: u32 = 0x5F29;
const TAG_AUTHORITY_REFERENCE: u32 = 0x42;
const TAG_HOLDER_AUTHORISATION: u32 = 0x5F4C;
const TAG_PUBLIC_KEY: u32 = 0x7F49;
const TAG_DOMAIN_PARAMETERS: u32 = 0x06;
const TAG_PUBLIC_POINT: u32 = 0x86;
const TAG_HOLDER_REFERENCE: u32 = 0x5F20;
const TAG_EFFECTIVE_DATE: u32 = 0x5F25;
const TAG_EXPIRATION_DATE: u32 = 0x5F24;
const TAG_SIGNATURE: u32 = 0x5F37;

/// Standardised domain parameters for Gen2 keys
const CURVES: &[(&str, &str)] = &[
    ("1.3.36.3.3.2.8.1.1.7", "brainpoolP256r1"),
    ("1.3.36.3.3.2.8.1.1.11", "brainpoolP384r1"),
    ("1.3.36.3.3.2.8.1.1.13", "brainpoolP512r1"),
    ("1.2.840.10045.3.1.7", "NIST P-256"),
    ("1.3.132.0.34", "NIST P-384"),
    ("1.3.132.0.35", "NIST P-521"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CertificateRole {
    MemberState,
    VehicleUnit,
    Card,
    CertificationAuthority,
}

/// Key identifier of the certification authority (`CertificationAuthorityKID`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorityReference {
    pub nation: Nation,
    pub nation_alpha: String,
    pub key_serial: u8,
    /// Additional coding, hex
    pub additional_info: String,
    pub ca_identifier: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "algorithm")]
pub enum PublicKey {
    /// Readable part of a Gen1 RSA key, hex
    Rsa { modulus_tail: String, exponent: String },
    /// Gen2 elliptic curve key
    Ecc {
        domain_oid: String,
        curve: Option<&'static str>,
        point_len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateRecord {
    pub role: CertificateRole,
    pub profile: Option<u8>,
    pub authority_reference: Option<AuthorityReference>,
    /// Holder authorisation, hex (Gen2)
    pub holder_authorisation: Option<String>,
    /// Holder reference, hex (Gen2)
    pub holder_reference: Option<String>,
    pub effective: Option<Timestamp>,
    pub expiry: Option<Timestamp>,
    pub public_key: PublicKey,
    pub signature_len: usize,
}

/// Decode a card certificate EF
fn decode_certificate(
    payload: &[u8],
    base: usize,
    generation: Generation,
    role: CertificateRole,
) -> Result<Decoded> {
    let certificate = read_certificate(payload, base, generation, role)?;
    let mut out = Decoded::default();
    out.push(generation, RecordKind::Certificate(certificate));
    Ok(out)
}

/// EF `C100` (Gen1) / `C101` (Gen2)
pub(crate) fn decode_card_certificate(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    decode_certificate(payload, base, generation, CertificateRole::Card)
}

/// EF `C108` (Gen1) / `C109` (Gen2)
pub(crate) fn decode_ca_certificate(payload: &[u8], base: usize, generation: Generation) -> Result<Decoded> {
    decode_certificate(payload, base, generation, CertificateRole::CertificationAuthority)
}

pub(crate) fn read_certificate(
    data: &[u8],
    base: usize,
    generation: Generation,
    role: CertificateRole,
) -> Result<CertificateRecord> {
    match generation {
        Generation::Gen1 => read_gen1(data, base, role),
        Generation::Gen2 => read_gen2(data, base, role),
    }
}

fn read_gen1(data: &[u8], base: usize, role: CertificateRole) -> Result<CertificateRecord> {
    let mut r = FieldReader::new(data, base);
    r.skip(GEN1_SIGNATURE_LEN)?;
    let modulus_tail = hex(r.read_bytes(GEN1_MODULUS_TAIL_LEN)?);
    let exponent = hex(r.read_bytes(GEN1_EXPONENT_LEN)?);
    let authority_reference = parse_authority_reference(r.read_bytes(8)?);

    Ok(CertificateRecord {
        role,
        profile: None,
        authority_reference: Some(authority_reference),
        holder_authorisation: None,
        holder_reference: None,
        effective: None,
        expiry: None,
        public_key: PublicKey::Rsa { modulus_tail, exponent },
        signature_len: GEN1_SIGNATURE_LEN,
    })
}

fn read_gen2(data: &[u8], base: usize, role: CertificateRole) -> Result<CertificateRecord> {
    let top = tlv::parse_tlv(data, base)?;
    let certificate = require(&top, TAG_CERTIFICATE, base)?;
    let parts = certificate.children()?;
    let body = require(&parts, TAG_BODY, certificate.offset)?;
    let fields = body.children()?;

    let profile = tlv::find(&fields, TAG_PROFILE).and_then(|t| t.value.first().copied());
    let authority_reference = tlv::find(&fields, TAG_AUTHORITY_REFERENCE)
        .filter(|t| t.value.len() == 8)
        .map(|t| parse_authority_reference(t.value));
    let holder_authorisation = tlv::find(&fields, TAG_HOLDER_AUTHORISATION).map(|t| hex(t.value));
    let holder_reference = tlv::find(&fields, TAG_HOLDER_REFERENCE).map(|t| hex(t.value));
    let effective = tlv::find(&fields, TAG_EFFECTIVE_DATE).and_then(|t| time_value(t.value));
    let expiry = tlv::find(&fields, TAG_EXPIRATION_DATE).and_then(|t| time_value(t.value));

    let key = require(&fields, TAG_PUBLIC_KEY, body.offset)?;
    let key_fields = key.children()?;
    let domain_oid = tlv::find(&key_fields, TAG_DOMAIN_PARAMETERS)
        .map(|t| decode_oid(t.value))
        .unwrap_or_default();
    let curve = CURVES
        .iter()
        .find(|(oid, _)| *oid == domain_oid)
        .map(|(_, name)| *name);
    let point_len = tlv::find(&key_fields, TAG_PUBLIC_POINT).map_or(0, |t| t.value.len());

    let signature_len = tlv::find(&parts, TAG_SIGNATURE).map_or(0, |t| t.value.len());

    // Tags we do not interpret are simply not looked up
    log::trace!(
        "Gen2 certificate: {} body field(s), curve {:?}",
        fields.len(),
        curve
    );

    Ok(CertificateRecord {
        role,
        profile,
        authority_reference,
        holder_authorisation,
        holder_reference,
        effective,
        expiry,
        public_key: PublicKey::Ecc {
            domain_oid,
            curve,
            point_len,
        },
        signature_len,
    })
}

fn require<'a, 'b>(objects: &'b [Tlv<'a>], tag: u32, offset: usize) -> Result<&'b Tlv<'a>> {
    tlv::find(objects, tag).ok_or_else(|| DecoderError::InvalidEncoding {
        offset,
        detail: format!("certificate has no 0x{:X} element", tag),
        partial: None,
    })
}

fn time_value(value: &[u8]) -> Option<Timestamp> {
    if value.len() != 4 {
        return None;
    }
    time_real(BigEndian::read_u32(value))
}

fn parse_authority_reference(raw: &[u8]) -> AuthorityReference {
    AuthorityReference {
        nation: Nation::from_code(raw[0]),
        nation_alpha: String::from_utf8_lossy(&raw[1..4]).trim().to_string(),
        key_serial: raw[4],
        additional_info: hex(&raw[5..7]),
        ca_identifier: raw[7],
    }
}

/// Render a BER-encoded object identifier in dotted form
fn decode_oid(value: &[u8]) -> String {
    let Some((&first, rest)) = value.split_first() else {
        return String::new();
    };

    let mut arcs = vec![(first / 40) as u64, (first % 40) as u64];
    let mut current: u64 = 0;
    for &byte in rest {
        current = (current << 7) | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            arcs.push(current);
            current = 0;
        }
    }

    arcs.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(".")
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
