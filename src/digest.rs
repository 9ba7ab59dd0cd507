//! `Want-Digest` negotiation.
//!
//! Clients list the digests they accept as `algorithm[;q=weight]`
//! entries. Entries are ranked by weight (highest first, ties keep their
//! order) and the first algorithm we support is used to hash the whole
//! file. The result goes in a `Digest: <algorithm>=<hex>` header.

use std::fs::File;
use std::io;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

/// Hash algorithms we can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Resolve a `Want-Digest` token, case-insensitively. `sha` is an alias
    /// for `sha-1`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(Algorithm::Md5),
            "sha" | "sha-1" => Some(Algorithm::Sha1),
            "sha-256" => Some(Algorithm::Sha256),
            "sha-512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    /// Hex digest of the full contents of `path`.
    pub fn hash_file(self, path: &Path) -> io::Result<String> {
        match self {
            Algorithm::Md5 => hash_with::<Md5>(path),
            Algorithm::Sha1 => hash_with::<Sha1>(path),
            Algorithm::Sha256 => hash_with::<Sha256>(path),
            Algorithm::Sha512 => hash_with::<Sha512>(path),
        }
    }
}

/// One `Want-Digest` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct WantedDigest {
    pub name: String,
    pub weight: f64,
}

/// Parse a `Want-Digest` header into entries sorted by descending weight.
///
/// A missing, unparsable or non-finite `q` counts as `1.0`. Empty entries
/// are skipped.
pub fn parse_want_digest(header: &str) -> Vec<WantedDigest> {
    let mut wanted: Vec<WantedDigest> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let weight = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .next()
                .and_then(|q| q.trim().parse::<f64>().ok())
                .filter(|q| q.is_finite())
                .unwrap_or(1.0);
            Some(WantedDigest {
                name: name.to_string(),
                weight,
            })
        })
        .collect();

    // sort_by is stable, so equal weights keep header order.
    wanted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    wanted
}

/// Pick the highest-ranked supported algorithm from a `Want-Digest` header.
///
/// Returns the token as the client wrote it along with the algorithm.
pub fn select(header: &str) -> Option<(String, Algorithm)> {
    parse_want_digest(header)
        .into_iter()
        .find_map(|wanted| Algorithm::from_name(&wanted.name).map(|alg| (wanted.name, alg)))
}

/// Compute the `Digest` header value for `path` according to `want_digest`.
///
/// `Ok(None)` means none of the requested algorithms is supported; that is
/// not an error and no header should be sent.
pub fn negotiate(want_digest: &str, path: &Path) -> io::Result<Option<String>> {
    match select(want_digest) {
        Some((name, algorithm)) => {
            let hex = algorithm.hash_file(path)?;
            Ok(Some(format!("{name}={hex}")))
        }
        None => Ok(None),
    }
}

/// Like [`negotiate`], but falls back to `MD5` when the client asked for
/// nothing we support (or asked for nothing at all).
pub fn negotiate_or_fallback(want_digest: Option<&str>, path: &Path) -> io::Result<String> {
    if let Some(value) = want_digest.map(|h| negotiate(h, path)).transpose()?.flatten() {
        return Ok(value);
    }
    let hex = Algorithm::Md5.hash_file(path)?;
    Ok(format!("MD5={hex}"))
}

fn hash_with<D: Digest + io::Write>(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
