//! Decode error taxonomy and the error/warning accumulation channel.
//!
//! Decoding never panics on malformed input and never aborts on a warning:
//! entry points return `Result<T, DecodeError>` and push human-readable,
//! component-prefixed messages into a [`DecodeLog`] that the caller surfaces
//! into its build log.

use thiserror::Error;

/// Message prefix for container-level diagnostics.
pub const PREFIX: &str = "DeviceBinaryFormat::zebin : ";

/// Message prefix for diagnostics raised while decoding the `.ze_info` metadata.
pub const ZE_INFO_PREFIX: &str = "DeviceBinaryFormat::zebin::.ze_info : ";

/// Terminal decode outcomes. `Ok(_)` maps to code 0; each variant carries a
/// stable numeric code surfaced by the validation CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(i32)]
pub enum DecodeError {
    /// Internal failure with no more specific classification.
    #[error("undefined decode error")]
    Undefined = 1,
    /// Malformed structure, bounds violation or required-field mismatch.
    #[error("malformed device binary")]
    InvalidBinary = 2,
    /// Well-formed but unsupported, e.g. wrong zeInfo major version.
    #[error("unhandled device binary")]
    UnhandledBinary = 3,
    /// Forward-compatibility signal: an attribute this decoder does not know.
    #[error("unknown zeInfo attribute")]
    UnknownZeinfoAttribute = 4,
}

impl DecodeError {
    /// Stable numeric code used as the validation CLI exit code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Failures while propagating call-graph attributes onto kernels and
/// external functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExternalFunctionResolveError {
    /// A dependency names a callee with no `ExternalFunctionInfo`.
    #[error("external function info missing")]
    ExternalFunctionInfoMissing,
    /// A kernel dependency names a kernel with no descriptor.
    #[error("kernel descriptor missing")]
    KernelDescriptorMissing,
}

/// Accumulated decode diagnostics.
///
/// Warnings never abort decoding; errors always do. Both channels collect
/// newline-separated messages so the caller can surface them verbatim.
#[derive(Debug, Default, Clone)]
pub struct DecodeLog {
    pub errors: String,
    pub warnings: String,
}

impl DecodeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error message. The caller is still responsible for
    /// returning the matching [`DecodeError`].
    pub fn error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(target: "zebin", "decode error: {message}");
        self.errors.push_str(message);
        self.errors.push('\n');
    }

    /// Append a warning message and keep decoding.
    pub fn warn(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(target: "zebin", "decode warning: {message}");
        self.warnings.push_str(message);
        self.warnings.push('\n');
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
