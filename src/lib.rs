//! Zebin container library.
//!
//! This library decodes, validates, links and re-emits "zebin", the
//! ELF-based container format carrying compiled GPU kernel binaries and
//! their metadata. It is organized into several modules:
//! - `config`: immutable decode configuration snapshot.
//! - `error`: decode error taxonomy and the error/warning channel.
//! - `elf`: generic 32/64-bit ELF codec plus the zebin constants.
//! - `sections`: zebin section classification and cardinality rules.
//! - `device`: IntelGT compatibility notes and target-device validation.
//! - `yaml`: restricted YAML reader for the `.ze_info` grammar.
//! - `zeinfo`: the kernel/function metadata decoder.
//! - `program`: decoded program and kernel descriptors.
//! - `linker_input` / `linker`: cross-segment symbol and relocation
//!   resolution with segment patching.
//! - `deps`: call-graph attribute propagation.
//! - `debug_zebin`: loadable debug-ELF re-emission.
//! - `decoder`: the top-level decode pipeline.

pub mod config;
pub mod debug_zebin;
pub mod decoder;
pub mod deps;
pub mod device;
pub mod elf;
pub mod error;
pub mod linker;
pub mod linker_input;
pub mod program;
pub mod sections;
pub mod utils;
pub mod yaml;
pub mod zeinfo;

pub use config::DecodeConfig;
pub use decoder::{decode_program, is_zebin, DecodeOutput};
pub use device::{GfxCoreFamily, ProductConfig, ProductFamily, TargetDevice, TargetMetadata};
pub use error::{DecodeError, DecodeLog, ExternalFunctionResolveError};
pub use linker::{
    construct_linker_error_message, construct_relocations_debug_message, IsaSegment,
    LinkResult, Linker, LinkerDeviceInfo, LinkingStatus, LinkSegments, SegmentInfo,
};
pub use program::{ExternalFunctionInfo, KernelDescriptor, KernelInfo, ProgramInfo};
pub use zeinfo::{decode_kernel_misc_info, ZeInfoVersion, ZE_INFO_DECODER_VERSION};
