//! Decode configuration.
//!
//! All behavior toggles are carried in an immutable [`DecodeConfig`] snapshot
//! that the caller threads explicitly into every entry point; the decoder
//! never reads ambient process-wide state. The only global is the counter
//! behind the optional binary-dump side channel, which must stay monotonic
//! across concurrent decodes.

use std::sync::atomic::{AtomicU32, Ordering};

/// Immutable decode-time configuration snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeConfig {
    /// Accept any container regardless of its IntelGT compatibility notes.
    pub force_device_compatibility: bool,
    /// Consult the static product-config compatibility map when the exact
    /// product config does not match.
    pub product_config_compat_mode: bool,
    /// Downgrade unknown zeInfo attributes from errors to warnings.
    pub allow_unknown_zeinfo_attributes: bool,
    /// Write every decoded container to disk under an incrementing filename.
    pub dump_decoded_binaries: bool,
}

static DUMP_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Dump side channel: writes `bytes` to `zebin_dumped_<n>.bin` in the current
/// directory when enabled. Failures are logged and otherwise ignored, a dump
/// must never affect the decode outcome.
pub fn dump_binary(config: &DecodeConfig, bytes: &[u8]) {
    if !config.dump_decoded_binaries {
        return;
    }
    let n = DUMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = format!("zebin_dumped_{n:04}.bin");
    match std::fs::write(&path, bytes) {
        Ok(()) => tracing::debug!(target: "zebin", "dumped {} bytes to {path}", bytes.len()),
        Err(err) => tracing::warn!(target: "zebin", "failed to dump binary to {path}: {err}"),
    }
}
