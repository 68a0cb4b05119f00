//! Debug container re-emission.
//!
//! Re-encodes a relocatable zebin as a loadable ELF for external debuggers:
//! the file type is forced to `ET_EXEC`, every section backed by a GPU
//! segment gains a `PT_LOAD` program header and its final virtual address,
//! and the debug-info relocations are applied against the patched symbol
//! values. The CPU-only string section receives an address but no load
//! segment.

use std::collections::BTreeMap;

use object::elf as raw;

/// `e_ident` index of the ELF class byte (not exposed by `object::elf`).
const EI_CLASS: usize = 4;

use crate::elf::decoder::Elf;
use crate::elf::encoder::{ElfEncoder, SectionValues};
use crate::elf::{
    section_names, Elf64, ProgramHeaderValues, R_ZE_SYM_ADDR, R_ZE_SYM_ADDR_32,
    R_ZE_SYM_ADDR_32_HI,
};
use crate::error::{DecodeError, DecodeLog, PREFIX};
use crate::linker::SegmentInfo;

/// Final GPU placement of the segments referenced by the debug image.
#[derive(Debug, Clone, Default)]
pub struct DebugSegments {
    pub var_data: SegmentInfo,
    pub const_data: SegmentInfo,
    pub string_data: SegmentInfo,
    /// Kernel name → ISA segment placement.
    pub kernels: BTreeMap<String, SegmentInfo>,
}

impl DebugSegments {
    /// GPU segment backing a section name, plus whether it is GPU-loadable
    /// (the string surface lives on the CPU side only).
    fn for_section(&self, name: &str) -> Option<(SegmentInfo, bool)> {
        match name {
            section_names::DATA_CONST | section_names::BSS_CONST => Some((self.const_data, true)),
            section_names::DATA_GLOBAL | section_names::BSS_GLOBAL => {
                Some((self.var_data, true))
            }
            section_names::DATA_CONST_STRING => Some((self.string_data, false)),
            _ => name
                .strip_prefix(section_names::TEXT_PREFIX)
                .and_then(|kernel| self.kernels.get(kernel))
                .map(|segment| (*segment, true)),
        }
    }
}

/// Re-emits `bytes` as a loadable, address-patched debug ELF.
pub fn create_debug_zebin(
    bytes: &[u8],
    segments: &DebugSegments,
    log: &mut DecodeLog,
) -> Result<Vec<u8>, DecodeError> {
    if bytes.get(EI_CLASS) != Some(&raw::ELFCLASS64) {
        log.error(format!(
            "{PREFIX}Debug zebin requires a 64-bit container."
        ));
        return Err(DecodeError::UnhandledBinary);
    }
    let elf = Elf::decode::<Elf64>(bytes, log)?;

    let mut encoder = ElfEncoder::<Elf64>::new(raw::ET_EXEC, elf.machine);
    encoder.set_flags(elf.flags);
    encoder.set_entry(elf.entry);

    for section in elf.sections.iter().skip(1) {
        let placement = segments.for_section(section.name);
        let addr = placement.map(|(s, _)| s.gpu_address).unwrap_or(section.addr);
        let index = encoder.append_section_with(
            section.name,
            SectionValues {
                sh_type: section.sh_type,
                flags: section.flags,
                addr,
                link: section.link,
                info: section.info,
                addralign: section.addralign,
                entsize: section.entsize,
                data: section.data.to_vec(),
                nobits_size: if section.sh_type == raw::SHT_NOBITS {
                    section.size
                } else {
                    0
                },
            },
        );
        if let Some((segment, loadable)) = placement {
            if loadable {
                let executable = section.name.starts_with(section_names::TEXT_PREFIX);
                encoder.append_program_header(
                    ProgramHeaderValues {
                        p_type: raw::PT_LOAD,
                        flags: raw::PF_R | if executable { raw::PF_X } else { raw::PF_W },
                        vaddr: segment.gpu_address,
                        paddr: segment.gpu_address,
                        memsz: segment.segment_size.max(section.size),
                        align: section.addralign.max(1),
                        ..Default::default()
                    },
                    Some(index),
                );
            }
        }
    }

    let mut out = encoder.encode();
    apply_relocations(&mut out, segments, log)?;
    Ok(out)
}

const SYM64_SIZE: usize = 24;
const SYM64_VALUE_OFFSET: usize = 8;

/// Rewrites symbol values by their owning segment's final address, then
/// patches the debug-info relocation targets with `value + addend`.
/// A container without a symbol table is left untouched.
fn apply_relocations(
    image: &mut Vec<u8>,
    segments: &DebugSegments,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let mut patches: Vec<(usize, Vec<u8>)> = Vec::new();
    {
        let elf = Elf::decode::<Elf64>(image, log)?;
        let Some(symtab_index) = elf.symtab_index else {
            return Ok(());
        };
        let symtab_offset = elf.sections[symtab_index].offset as usize;

        let mut patched_values: Vec<u64> = elf.symbols.iter().map(|s| s.value).collect();
        for (index, symbol) in elf.symbols.iter().enumerate().skip(1) {
            let section_name = match elf.sections.get(symbol.section_index) {
                Some(section) => section.name,
                None => continue,
            };
            let base = if let Some((segment, _)) = segments.for_section(section_name) {
                Some(segment.gpu_address)
            } else if section_name.starts_with(section_names::DEBUG_PREFIX)
                && symbol.name.starts_with(section_names::TEXT)
            {
                // Debug references into kernel code are named after the
                // kernel's text section.
                symbol
                    .name
                    .strip_prefix(section_names::TEXT_PREFIX)
                    .and_then(|kernel| segments.kernels.get(kernel))
                    .map(|segment| segment.gpu_address)
            } else {
                None
            };
            let Some(base) = base else { continue };
            let value = symbol.value.wrapping_add(base);
            patched_values[index] = value;
            patches.push((
                symtab_offset + index * SYM64_SIZE + SYM64_VALUE_OFFSET,
                value.to_le_bytes().to_vec(),
            ));
        }

        for block in &elf.relocations {
            let Some(target) = elf.sections.get(block.target_section) else {
                continue;
            };
            if !target.name.starts_with(section_names::DEBUG_PREFIX) {
                continue;
            }
            for entry in &block.entries {
                let value = patched_values
                    .get(entry.symbol_index)
                    .copied()
                    .unwrap_or(0)
                    .wrapping_add_signed(entry.addend);
                let bytes: Vec<u8> = match entry.r_type {
                    R_ZE_SYM_ADDR => value.to_le_bytes().to_vec(),
                    R_ZE_SYM_ADDR_32 => (value as u32).to_le_bytes().to_vec(),
                    R_ZE_SYM_ADDR_32_HI => ((value >> 32) as u32).to_le_bytes().to_vec(),
                    // Anything else is left untouched.
                    _ => continue,
                };
                patches.push((target.offset as usize + entry.offset as usize, bytes));
            }
        }
    }

    for (offset, bytes) in patches {
        let end = offset + bytes.len();
        if end > image.len() {
            log.error(format!(
                "{PREFIX}Debug relocation out of bounds at offset : {offset}."
            ));
            return Err(DecodeError::InvalidBinary);
        }
        image[offset..end].copy_from_slice(&bytes);
    }
    Ok(())
}
