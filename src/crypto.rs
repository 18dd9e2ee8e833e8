use std::borrow::Cow;

use russh::Preferred;
use russh::keys::{Algorithm, HashAlg};

/// Algorithm preferences for a connection: russh defaults, or a legacy-first suite for old
/// servers when `insecure` is set.
pub fn preferred(insecure: bool, prefer_compression: bool) -> Preferred {
    let mut preferred = if insecure { legacy_preferred() } else { Preferred::default() };
    preferred.compression = compression_order(prefer_compression);
    preferred
}

fn legacy_preferred() -> Preferred {
    Preferred {
        kex: Cow::Owned(vec![
            russh::kex::DH_G14_SHA1,
            russh::kex::DH_G1_SHA1,
            russh::kex::CURVE25519,
        ]),
        key: Cow::Owned(vec![
            Algorithm::Rsa { hash: None },
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha256),
            },
            Algorithm::Dsa,
            Algorithm::Ed25519,
        ]),
        cipher: Cow::Owned(vec![
            russh::cipher::AES_128_CTR,
            russh::cipher::AES_128_CBC,
            russh::cipher::CHACHA20_POLY1305,
        ]),
        mac: Cow::Owned(vec![russh::mac::HMAC_SHA1, russh::mac::HMAC_SHA256]),
        ..Preferred::DEFAULT
    }
}

fn compression_order(prefer_compression: bool) -> Cow<'static, [russh::compression::Name]> {
    if prefer_compression {
        Cow::Owned(vec![
            russh::compression::ZLIB,
            russh::compression::ZLIB_LEGACY,
            russh::compression::NONE,
        ])
    } else {
        Cow::Owned(vec![
            russh::compression::NONE,
            russh::compression::ZLIB,
            russh::compression::ZLIB_LEGACY,
        ])
    }
}
