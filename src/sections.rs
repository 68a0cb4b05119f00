//! Zebin section classification.
//!
//! Buckets the decoded ELF sections by name and type, and enforces the
//! per-bucket cardinality rules before any byte of metadata is interpreted.
//! `SHT_PROGBITS` sections are assumed load-bearing, so an unrecognized name
//! there is a hard error; side-channel sections (misc, notes, zero-init) are
//! only warned about.

use object::elf;

use crate::elf::decoder::{Elf, ElfSection};
use crate::elf::{section_names as names, SHT_ZEBIN_GTPIN_INFO, SHT_ZEBIN_MISC, SHT_ZEBIN_SPIRV, SHT_ZEBIN_VISA_ASM, SHT_ZEBIN_ZEINFO};
use crate::error::{DecodeError, DecodeLog, PREFIX};

/// A per-kernel instruction section (`.text.<kernel>`).
#[derive(Debug, Clone, Copy)]
pub struct KernelTextSection<'d> {
    pub kernel_name: &'d str,
    pub section: ElfSection<'d>,
}

/// Classified references into a decoded [`Elf`]. Never owns bytes.
#[derive(Debug, Default)]
pub struct ZebinSections<'d> {
    pub kernel_text: Vec<KernelTextSection<'d>>,
    pub external_functions_text: Vec<ElfSection<'d>>,
    pub const_data: Vec<ElfSection<'d>>,
    pub global_data: Vec<ElfSection<'d>>,
    pub const_string_data: Vec<ElfSection<'d>>,
    pub const_zero_init: Vec<ElfSection<'d>>,
    pub global_zero_init: Vec<ElfSection<'d>>,
    pub ze_info: Vec<ElfSection<'d>>,
    pub gtpin_info: Vec<ElfSection<'d>>,
    pub spirv: Vec<ElfSection<'d>>,
    pub note_intelgt: Vec<ElfSection<'d>>,
    pub build_options: Vec<ElfSection<'d>>,
    pub symtab: Vec<ElfSection<'d>>,
}

impl<'d> ZebinSections<'d> {
    /// Classifies every section of `elf` into its bucket.
    pub fn extract(elf: &Elf<'d>, log: &mut DecodeLog) -> Result<Self, DecodeError> {
        let mut out = ZebinSections::default();
        for section in &elf.sections {
            match section.sh_type {
                elf::SHT_NULL | elf::SHT_STRTAB | elf::SHT_REL | elf::SHT_RELA => {}
                elf::SHT_SYMTAB => out.symtab.push(*section),
                elf::SHT_PROGBITS => out.classify_progbits(section, log)?,
                elf::SHT_NOBITS => match section.name {
                    names::BSS_CONST => out.const_zero_init.push(*section),
                    names::BSS_GLOBAL => out.global_zero_init.push(*section),
                    other => log.warn(format!(
                        "{PREFIX}Unhandled SHT_NOBITS section : {other}, currently supports only : .bss.const and .bss.global."
                    )),
                },
                SHT_ZEBIN_ZEINFO => out.ze_info.push(*section),
                SHT_ZEBIN_SPIRV => out.spirv.push(*section),
                SHT_ZEBIN_GTPIN_INFO => out.gtpin_info.push(*section),
                SHT_ZEBIN_VISA_ASM => {
                    tracing::trace!(target: "zebin", "skipping vISA asm section {}", section.name);
                }
                SHT_ZEBIN_MISC => match section.name {
                    names::BUILD_OPTIONS => out.build_options.push(*section),
                    other => log.warn(format!(
                        "{PREFIX}Unhandled SHT_ZEBIN_MISC section : {other}, currently supports only : .misc.buildOptions."
                    )),
                },
                elf::SHT_NOTE => {
                    if section.name == names::NOTE_INTELGT_COMPAT {
                        out.note_intelgt.push(*section);
                    } else {
                        log.warn(format!(
                            "{PREFIX}Unhandled SHT_NOTE section : {}, currently supports only : .note.intelgt.compat.",
                            section.name
                        ));
                    }
                }
                other => log.warn(format!(
                    "{PREFIX}Unhandled ELF section header type : {other} in section {}.",
                    section.name
                )),
            }
        }
        Ok(out)
    }

    fn classify_progbits(
        &mut self,
        section: &ElfSection<'d>,
        log: &mut DecodeLog,
    ) -> Result<(), DecodeError> {
        match section.name {
            names::TEXT | names::EXTERNAL_FUNCTIONS => {
                self.external_functions_text.push(*section);
                return Ok(());
            }
            names::DATA_CONST => {
                self.const_data.push(*section);
                return Ok(());
            }
            names::DATA_GLOBAL_CONST => {
                log.warn(format!(
                    "{PREFIX}Misspelled section name : {}, should be : {}.",
                    names::DATA_GLOBAL_CONST,
                    names::DATA_CONST
                ));
                self.const_data.push(*section);
                return Ok(());
            }
            names::DATA_GLOBAL => {
                self.global_data.push(*section);
                return Ok(());
            }
            names::DATA_CONST_STRING => {
                self.const_string_data.push(*section);
                return Ok(());
            }
            _ => {}
        }
        if let Some(kernel_name) = section.name.strip_prefix(names::TEXT_PREFIX) {
            self.kernel_text.push(KernelTextSection {
                kernel_name,
                section: *section,
            });
            return Ok(());
        }
        if section.name.starts_with(names::DEBUG_PREFIX) {
            return Ok(());
        }
        log.error(format!(
            "{PREFIX}Unhandled SHT_PROGBITS section : {} currently supports only : {}.KERNEL_NAME, {}, {}, {}, {} and {}*.",
            section.name,
            names::TEXT,
            names::DATA_CONST,
            names::DATA_GLOBAL,
            names::DATA_CONST_STRING,
            names::SYMTAB,
            names::DEBUG_PREFIX
        ));
        Err(DecodeError::InvalidBinary)
    }

    /// Enforces the "at most one" buckets; the message carries the canonical
    /// section name and the actual count.
    pub fn validate_counts(&self, log: &mut DecodeLog) -> Result<(), DecodeError> {
        let buckets: [(usize, &str); 10] = [
            (self.ze_info.len(), names::ZE_INFO),
            (self.const_data.len(), names::DATA_CONST),
            (self.global_data.len(), names::DATA_GLOBAL),
            (self.const_string_data.len(), names::DATA_CONST_STRING),
            (self.const_zero_init.len(), names::BSS_CONST),
            (self.global_zero_init.len(), names::BSS_GLOBAL),
            (self.symtab.len(), names::SYMTAB),
            (self.spirv.len(), names::SPV),
            (self.note_intelgt.len(), names::NOTE_INTELGT_COMPAT),
            (self.external_functions_text.len(), names::TEXT),
        ];
        let mut failed = false;
        for (count, name) in buckets {
            if count > 1 {
                failed = true;
                log.error(format!(
                    "{PREFIX}Expected at most 1 of {name} section, got : {count}"
                ));
            }
        }
        if failed {
            return Err(DecodeError::InvalidBinary);
        }
        Ok(())
    }

    /// Kernel-name keyed lookup of GT-Pin sections (`.gtpin_info.<kernel>`).
    pub fn gtpin_for(&self, kernel_name: &str) -> Option<&ElfSection<'d>> {
        self.gtpin_info.iter().find(|s| {
            s.name
                .strip_prefix(names::GTPIN_INFO_PREFIX)
                .is_some_and(|suffix| suffix == kernel_name)
        })
    }
}
