//! Infrastructure implementation of the `CredentialGenerator` port.
//!
//! Randomness comes from the OS RNG. SSH keys are 2048-bit RSA (PKCS#1 PEM
//! private key, OpenSSH `ssh-rsa` public key). Director TLS material is a
//! self-signed CA plus a leaf issued for the director's external address.

use std::net::IpAddr;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose, date_time_ymd,
};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

use crate::application::ports::{CertificateBundle, CredentialGenerator, SshKeyPair};

const RSA_BITS: usize = 2048;
const CERTIFICATE_VALIDITY_DAYS: i64 = 2 * 365;

#[derive(Debug, Clone, Copy, Default)]
pub struct OsCredentialGenerator;

impl CredentialGenerator for OsCredentialGenerator {
    fn random_string(&self, prefix: &str, length: usize) -> String {
        let suffix: String = OsRng
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect();
        format!("{prefix}{suffix}")
    }

    fn ssh_key_pair(&self) -> Result<SshKeyPair> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS).context("generating RSA key")?;
        let public = RsaPublicKey::from(&private);
        let pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .context("encoding RSA private key")?;
        Ok(SshKeyPair {
            private_key: pem.to_string(),
            public_key: format!("ssh-rsa {}", STANDARD.encode(ssh_rsa_wire(&public))),
        })
    }

    fn x509_key_pair(&self, ca_common_name: &str, common_name: &str) -> Result<CertificateBundle> {
        let ca_key = KeyPair::generate().context("generating CA key")?;
        let mut ca_params = CertificateParams::new(Vec::<String>::new())?;
        ca_params.distinguished_name = distinguished_name(ca_common_name);
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        set_validity(&mut ca_params);
        let ca = ca_params.self_signed(&ca_key).context("signing CA")?;

        // IP addresses become IP SANs, anything else a DNS SAN.
        let mut params = CertificateParams::new(vec![common_name.to_string()])
            .with_context(|| format!("invalid certificate name {common_name:?}"))?;
        params.distinguished_name = distinguished_name(common_name);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        set_validity(&mut params);
        let key = KeyPair::generate().context("generating certificate key")?;
        let certificate = params
            .signed_by(&key, &ca, &ca_key)
            .context("signing certificate")?;

        Ok(CertificateBundle {
            ca: ca.pem(),
            certificate: certificate.pem(),
            private_key: key.serialize_pem(),
        })
    }

    fn certificate_valid_for(&self, ca: &str, certificate: &str, common_name: &str) -> bool {
        match validate(ca, certificate, common_name) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::debug!(error = %e, "director certificate did not parse");
                false
            }
        }
    }
}

fn validate(ca: &str, certificate: &str, common_name: &str) -> Result<bool> {
    let (_, ca_pem) = parse_x509_pem(ca.as_bytes()).context("parsing CA PEM")?;
    let ca = ca_pem.parse_x509().context("parsing CA")?;
    let (_, cert_pem) = parse_x509_pem(certificate.as_bytes()).context("parsing certificate PEM")?;
    let cert = cert_pem.parse_x509().context("parsing certificate")?;

    if cert.issuer() != ca.subject() || !cert.validity().is_valid() {
        return Ok(false);
    }

    let wanted_ip: Option<IpAddr> = common_name.parse().ok();
    let Some(san) = cert.subject_alternative_name().context("reading SAN")? else {
        return Ok(false);
    };
    Ok(san.value.general_names.iter().any(|name| match (name, wanted_ip) {
        (GeneralName::IPAddress(bytes), Some(ip)) => ip_from_bytes(bytes) == Some(ip),
        (GeneralName::DNSName(dns), None) => dns.eq_ignore_ascii_case(common_name),
        _ => false,
    }))
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    dn.push(DnType::OrganizationName, "Cloud Foundry");
    dn
}

fn set_validity(params: &mut CertificateParams) {
    let start = Utc::now() - Duration::days(1);
    let end = start + Duration::days(CERTIFICATE_VALIDITY_DAYS);
    params.not_before = date_time_ymd(start.year(), day_parts(start).0, day_parts(start).1);
    params.not_after = date_time_ymd(end.year(), day_parts(end).0, day_parts(end).1);
}

/// Month and day as rcgen expects them; both always fit in a byte.
fn day_parts(date: chrono::DateTime<Utc>) -> (u8, u8) {
    (
        u8::try_from(date.month()).unwrap_or(1),
        u8::try_from(date.day()).unwrap_or(1),
    )
}

/// SSH wire encoding of an RSA public key: string "ssh-rsa", mpint e, mpint n.
fn ssh_rsa_wire(key: &RsaPublicKey) -> Vec<u8> {
    let mut out = Vec::new();
    write_string(&mut out, b"ssh-rsa");
    write_mpint(&mut out, &key.e().to_bytes_be());
    write_mpint(&mut out, &key.n().to_bytes_be());
    out
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(bytes);
}

fn write_mpint(out: &mut Vec<u8>, magnitude: &[u8]) {
    let trimmed: &[u8] = match magnitude.iter().position(|b| *b != 0) {
        Some(first) => &magnitude[first..],
        None => &[],
    };
    if trimmed.first().is_some_and(|b| b & 0x80 != 0) {
        let mut padded = Vec::with_capacity(trimmed.len() + 1);
        padded.push(0);
        padded.extend_from_slice(trimmed);
        write_string(out, &padded);
    } else {
        write_string(out, trimmed);
    }
}
