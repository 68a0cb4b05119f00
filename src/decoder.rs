//! Top-level zebin decode pipeline.
//!
//! Ties the stages together: format sniffing, class dispatch, ELF decode,
//! section classification, target-device validation, zeInfo decoding, ISA
//! attachment and linker-input assembly. All diagnostics funnel into one
//! [`DecodeLog`] returned alongside the result.

use object::elf as raw;

/// `e_ident` index of the ELF class byte (not exposed by `object::elf`).
const EI_CLASS: usize = 4;
/// `e_ident` index of the data-encoding byte (not exposed by `object::elf`).
const EI_DATA: usize = 5;

use crate::config::{self, DecodeConfig};
use crate::device::{self, TargetDevice};
use crate::elf::decoder::{Elf, ElfSection};
use crate::elf::{
    section_names, ElfClass, Elf32, Elf64, EM_INTELGT, ET_ZEBIN_DYN, ET_ZEBIN_EXE, ET_ZEBIN_REL,
};
use crate::error::{DecodeError, DecodeLog, PREFIX};
use crate::linker_input::decode_linker_input;
use crate::program::{GlobalSurfaceInfo, ProgramInfo};
use crate::sections::ZebinSections;
use crate::zeinfo;

/// Cheap format sniff: an ELF whose machine is IntelGT or whose file type is
/// one of the zebin-specific types.
pub fn is_zebin(data: &[u8]) -> bool {
    if data.len() < 20 || data[..4] != raw::ELFMAG {
        return false;
    }
    let read_u16 = |offset: usize| {
        let bytes = [data[offset], data[offset + 1]];
        match data[EI_DATA] {
            raw::ELFDATA2MSB => u16::from_be_bytes(bytes),
            _ => u16::from_le_bytes(bytes),
        }
    };
    let e_type = read_u16(16);
    let machine = read_u16(18);
    machine == EM_INTELGT || matches!(e_type, ET_ZEBIN_REL | ET_ZEBIN_EXE | ET_ZEBIN_DYN)
}

/// Decode result plus the accumulated diagnostics, for build-log surfacing.
#[derive(Debug)]
pub struct DecodeOutput<'d> {
    pub program: Result<ProgramInfo<'d>, DecodeError>,
    pub errors: String,
    pub warnings: String,
}

/// Decodes a zebin container into a [`ProgramInfo`] for `target`.
pub fn decode_program<'d>(
    data: &'d [u8],
    target: &TargetDevice,
    config: &DecodeConfig,
) -> DecodeOutput<'d> {
    let mut log = DecodeLog::new();
    config::dump_binary(config, data);
    let program = decode_program_inner(data, target, config, &mut log);
    DecodeOutput {
        program,
        errors: log.errors,
        warnings: log.warnings,
    }
}

fn decode_program_inner<'d>(
    data: &'d [u8],
    target: &TargetDevice,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<ProgramInfo<'d>, DecodeError> {
    if !is_zebin(data) {
        log.error(format!("{PREFIX}Not a zebin device binary."));
        return Err(DecodeError::InvalidBinary);
    }
    match data.get(EI_CLASS) {
        Some(&raw::ELFCLASS32) => decode_zebin::<Elf32>(data, target, config, log),
        Some(&raw::ELFCLASS64) => decode_zebin::<Elf64>(data, target, config, log),
        other => {
            log.error(format!(
                "{PREFIX}Unsupported ELF class : {}.",
                other.copied().unwrap_or(0)
            ));
            Err(DecodeError::InvalidBinary)
        }
    }
}

fn global_surface<'d>(
    init: Option<&ElfSection<'d>>,
    zero_init: Option<&ElfSection<'d>>,
) -> GlobalSurfaceInfo<'d> {
    let init_data = init.map(|s| s.data).unwrap_or(&[]);
    let zero_init_size = zero_init.map(|s| s.size).unwrap_or(0);
    GlobalSurfaceInfo {
        init_data,
        size: init_data.len() as u64 + zero_init_size,
        zero_init_size,
    }
}

fn decode_zebin<'d, F: ElfClass>(
    data: &'d [u8],
    target: &TargetDevice,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<ProgramInfo<'d>, DecodeError> {
    let elf = Elf::decode::<F>(data, log)?;
    let sections = ZebinSections::extract(&elf, log)?;
    sections.validate_counts(log)?;

    let bundle = device::validate_target_device(
        &elf,
        sections.note_intelgt.first(),
        target,
        config,
        log,
    )?;

    let mut program = ProgramInfo::default();
    program.indirect_detection_version = bundle.indirect_detection_version.unwrap_or(0);
    program.indirect_access_buffer_major_version =
        bundle.indirect_access_buffer_major_version.unwrap_or(0);
    program.global_constants = global_surface(
        sections.const_data.first(),
        sections.const_zero_init.first(),
    );
    program.global_variables = global_surface(
        sections.global_data.first(),
        sections.global_zero_init.first(),
    );
    program.global_strings = global_surface(sections.const_string_data.first(), None);
    program.spirv = sections.spirv.first().map(|s| s.data);
    program.build_options = sections.build_options.first().and_then(|s| {
        let text = std::str::from_utf8(s.data).ok();
        if text.is_none() {
            log.warn(format!(
                "{PREFIX}Ignoring non-textual {} section.",
                section_names::BUILD_OPTIONS
            ));
        }
        text
    });

    match sections.ze_info.first() {
        None => log.warn(format!(
            "{PREFIX}Expected at least one .ze_info section, got 0"
        )),
        Some(section) => {
            let text = std::str::from_utf8(section.data).map_err(|_| {
                log.error(format!(
                    "{PREFIX}Invalid UTF-8 in {} section.",
                    section_names::ZE_INFO
                ));
                DecodeError::InvalidBinary
            })?;
            zeinfo::decode_ze_info(&mut program, text, config, log)?;
        }
    }

    // Every kernel named by the metadata must come with its ISA.
    for kernel in &mut program.kernel_infos {
        let name = kernel.descriptor.metadata.kernel_name.as_str();
        match sections
            .kernel_text
            .iter()
            .find(|kt| kt.kernel_name == name)
        {
            Some(kernel_text) => kernel.heap.kernel_isa = kernel_text.section.data,
            None => {
                log.error(format!(
                    "{PREFIX}Could not find text section for kernel : {name}."
                ));
                return Err(DecodeError::InvalidBinary);
            }
        }
        kernel.gtpin_info = sections.gtpin_for(name).map(|s| s.data);
    }

    program.linker_input = decode_linker_input(&elf, &sections, log)?;
    Ok(program)
}
