use std::time::{SystemTime, UNIX_EPOCH};

use pkcs8::DecodePrivateKey as _;
use rsa::pkcs1::{DecodeRsaPrivateKey as _, EncodeRsaPrivateKey as _};
use serde::Serialize;

use crate::errors::Error;

#[derive(Debug, Serialize)]
pub(crate) struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: u64,
}

/// Accepts PKCS#8 (plain or encrypted) and PKCS#1 PEM.
fn load_private_key(pem_str: &str, passphrase: Option<&str>) -> Result<rsa::RsaPrivateKey, Error> {
    let blocks = pem::parse_many(pem_str.as_bytes())
        .map_err(|e| Error::Key(format!("PEM parse failed: {e}")))?;
    for block in &blocks {
        match block.tag() {
            "ENCRYPTED PRIVATE KEY" => {
                let pass = passphrase.ok_or_else(|| {
                    Error::Key("Encrypted private key provided but no passphrase set".into())
                })?;
                return rsa::RsaPrivateKey::from_pkcs8_encrypted_der(block.contents(), pass)
                    .map_err(|e| Error::Key(format!("PKCS#8 decryption failed: {e}")));
            }
            "PRIVATE KEY" => {
                return rsa::RsaPrivateKey::from_pkcs8_der(block.contents())
                    .map_err(|e| Error::Key(format!("PKCS#8 parse failed: {e}")));
            }
            "RSA PRIVATE KEY" => {
                return rsa::RsaPrivateKey::from_pkcs1_der(block.contents())
                    .map_err(|e| Error::Key(format!("PKCS#1 parse failed: {e}")));
            }
            _ => continue,
        }
    }
    Err(Error::Key("No RSA private key block found in PEM".into()))
}

pub(crate) fn claims(client_id: &str, username: &str, audience: &str, exp_secs: u64) -> Result<Claims, Error> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::Config(format!("Time error: {e}")))?
        .as_secs();
    Ok(Claims {
        iss: client_id.to_string(),
        sub: username.to_string(),
        aud: audience.trim_end_matches('/').to_string(),
        exp: now + exp_secs,
    })
}

/// Signs an RS256 assertion for the OAuth JWT bearer grant.
pub(crate) fn sign_assertion(
    claims: &Claims,
    private_key_pem: &str,
    passphrase: Option<&str>,
) -> Result<String, Error> {
    let rsa_key = load_private_key(private_key_pem, passphrase)?;
    let pkcs1 = rsa_key
        .to_pkcs1_der()
        .map_err(|e| Error::Key(format!("PKCS#1 DER encode failed: {e}")))?;
    let enc_key = jsonwebtoken::EncodingKey::from_rsa_der(pkcs1.as_bytes());
    let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
    jsonwebtoken::encode(&header, claims, &enc_key)
        .map_err(|e| Error::JwtSign(format!("JWT signing failed: {e}")))
}
