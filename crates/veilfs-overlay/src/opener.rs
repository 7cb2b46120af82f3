//! `enc://` connection strings.
//!
//! `enc://<root>?key=<key>[&chunk_size=N][&create=false]` opens an overlay
//! over the host directory `<root>`.

use secrecy::SecretString;
use veilfs_core::{VeilError, VeilResult};
use veilfs_crypto::OverlayKey;
use veilfs_storage::LocalBackend;

use crate::options::OverlayOptions;
use crate::overlay::EncryptingOverlay;

pub const SCHEME: &str = "enc";

/// Parsed form of an `enc://` URL.
#[derive(Debug)]
struct EncUrl {
    root: String,
    key: Option<SecretString>,
    chunk_size: Option<usize>,
    create: bool,
}

/// Percent-decode one URL component. Every `%` must introduce exactly
/// two hex digits; `urlencoding` passes malformed escapes through verbatim,
/// so they are rejected here first.
fn percent_decode(input: &str) -> VeilResult<String> {
    let bytes = input.as_bytes();
    for (i, _) in bytes.iter().enumerate().filter(|(_, &b)| b == b'%') {
        let well_formed = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !well_formed {
            return Err(VeilError::Config(format!("bad percent escape in '{input}'")));
        }
    }
    urlencoding::decode(input)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| VeilError::Config(format!("'{input}' is not utf-8")))
}

fn parse_bool(name: &str, value: &str) -> VeilResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(VeilError::Config(format!("{name}: expected a boolean, got '{value}'"))),
    }
}

fn parse(url: &str) -> VeilResult<EncUrl> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| VeilError::Config(format!("'{url}' is not a URL")))?;
    if scheme != SCHEME {
        return Err(VeilError::Config(format!(
            "unsupported scheme '{scheme}', expected '{SCHEME}'"
        )));
    }

    let (root, query) = rest.split_once('?').unwrap_or((rest, ""));
    let root = percent_decode(root)?;
    if root.is_empty() {
        return Err(VeilError::Config(format!("'{url}' has no root path")));
    }

    let mut parsed = EncUrl {
        root,
        key: None,
        chunk_size: None,
        create: true,
    };
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        match name {
            "key" => parsed.key = Some(SecretString::from(percent_decode(value)?)),
            "chunk_size" => {
                let size = value.parse::<usize>().map_err(|e| {
                    VeilError::Config(format!("chunk_size: {e}"))
                })?;
                parsed.chunk_size = Some(size);
            }
            "create" => parsed.create = parse_bool(name, value)?,
            other => tracing::warn!(param = other, "ignoring unknown enc:// parameter"),
        }
    }
    Ok(parsed)
}

/// Open an overlay from an `enc://` URL. The key is checked before the
/// root directory is touched.
pub fn open_url(url: &str) -> VeilResult<EncryptingOverlay<LocalBackend>> {
    let parsed = parse(url)?;
    let secret = parsed
        .key
        .as_ref()
        .ok_or_else(|| VeilError::InvalidKey("enc:// URL has no key parameter".into()))?;

    let mut options = OverlayOptions::new(OverlayKey::from_secret(secret)?);
    if let Some(size) = parsed.chunk_size {
        options = options.with_chunk_size(size);
    }
    options.validate()?;

    let backend = LocalBackend::new(&parsed.root, parsed.create)?;
    tracing::info!(root = %parsed.root, "opened enc:// overlay");
    EncryptingOverlay::with_options(backend, options)
}
