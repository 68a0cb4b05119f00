//! Generic ELF container reader.
//!
//! Decodes a 32- or 64-bit ELF image into a width-agnostic, zero-copy view:
//! header fields, named sections with borrowed byte spans, program headers,
//! the symbol table and all relocation blocks. Every offset is checked
//! against the input buffer before it is dereferenced; a malformed container
//! yields [`DecodeError::InvalidBinary`], never an out-of-bounds read.

use object::elf;
use object::pod;
use object::read::elf::{ProgramHeader as _, Rel as _, Rela as _, SectionHeader as _, Sym as _};
use object::Endianness;

use crate::elf::ElfClass;
use crate::error::{DecodeError, DecodeLog, PREFIX};
use crate::utils::read_cstr;

/// One decoded section header with its resolved name and byte span.
///
/// `data` is empty for `SHT_NOBITS` and `SHT_NULL`; `size` always reflects
/// the declared `sh_size`.
#[derive(Debug, Clone, Copy)]
pub struct ElfSection<'d> {
    pub index: usize,
    pub name: &'d str,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
    pub data: &'d [u8],
}

/// One decoded program header.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfProgramHeader {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

/// One decoded symbol-table entry.
#[derive(Debug, Clone, Copy)]
pub struct ElfSymbol<'d> {
    pub name: &'d str,
    pub value: u64,
    pub size: u64,
    pub section_index: usize,
    pub binding: u8,
    pub sym_type: u8,
    pub other: u8,
}

/// One relocation record with its symbol reference resolved to a name.
#[derive(Debug, Clone, Copy)]
pub struct RawRelocation<'d> {
    pub offset: u64,
    pub r_type: u32,
    pub symbol_index: usize,
    pub symbol_name: &'d str,
    pub addend: i64,
}

/// All relocations of one `SHT_REL`/`SHT_RELA` section, keyed by the section
/// they apply to.
#[derive(Debug, Clone)]
pub struct ElfRelocationBlock<'d> {
    /// Index of the relocation section itself.
    pub section_index: usize,
    /// Index of the section the entries patch (`sh_info`).
    pub target_section: usize,
    pub entries: Vec<RawRelocation<'d>>,
}

/// Width-agnostic decoded view of an ELF container. Borrows the input buffer
/// for the lifetime of the view; owns only the index structures.
#[derive(Debug)]
pub struct Elf<'d> {
    pub data: &'d [u8],
    /// `ELFCLASS32` or `ELFCLASS64`.
    pub class: u8,
    pub endian: Endianness,
    pub e_type: u16,
    pub machine: u16,
    pub flags: u32,
    pub entry: u64,
    pub sections: Vec<ElfSection<'d>>,
    pub program_headers: Vec<ElfProgramHeader>,
    pub symbols: Vec<ElfSymbol<'d>>,
    /// Index of the symbol-table section, if any.
    pub symtab_index: Option<usize>,
    pub relocations: Vec<ElfRelocationBlock<'d>>,
}

fn invalid(log: &mut DecodeLog, what: &str) -> DecodeError {
    log.error(format!("{PREFIX}Invalid ELF binary : {what}"));
    DecodeError::InvalidBinary
}

fn checked_span<'d>(
    data: &'d [u8],
    offset: u64,
    size: u64,
    what: &str,
    log: &mut DecodeLog,
) -> Result<&'d [u8], DecodeError> {
    let start = usize::try_from(offset).map_err(|_| invalid(log, what))?;
    let len = usize::try_from(size).map_err(|_| invalid(log, what))?;
    let end = start.checked_add(len).ok_or_else(|| invalid(log, what))?;
    data.get(start..end).ok_or_else(|| invalid(log, what))
}

impl<'d> Elf<'d> {
    /// Decodes a container of the class given by `F`. A class mismatch or any
    /// structural inconsistency is an `InvalidBinary` error.
    pub fn decode<F: ElfClass>(data: &'d [u8], log: &mut DecodeLog) -> Result<Self, DecodeError> {
        let header = F::parse(data).map_err(|err| {
            log.error(format!("{PREFIX}Invalid or unsupported ELF header : {err}"));
            DecodeError::InvalidBinary
        })?;
        let endian = header.endian().map_err(|err| {
            log.error(format!("{PREFIX}Invalid ELF endianness : {err}"));
            DecodeError::InvalidBinary
        })?;

        let section_headers = Self::section_header_table::<F>(header, endian, data, log)?;
        let shstrndx = Self::resolve_shstrndx::<F>(header, endian, section_headers, log)?;

        let strtab = match section_headers.get(shstrndx) {
            Some(sh) if shstrndx != elf::SHN_UNDEF as usize => checked_span(
                data,
                sh.sh_offset(endian).into(),
                sh.sh_size(endian).into(),
                "section name table out of bounds",
                log,
            )?,
            _ => &[],
        };

        let mut sections = Vec::with_capacity(section_headers.len());
        for (index, sh) in section_headers.iter().enumerate() {
            let sh_type = sh.sh_type(endian);
            let offset: u64 = sh.sh_offset(endian).into();
            let size: u64 = sh.sh_size(endian).into();
            let name_offset = sh.sh_name(endian) as usize;
            let name = if strtab.is_empty() && name_offset == 0 {
                ""
            } else {
                read_cstr(strtab, name_offset)
                    .ok_or_else(|| invalid(log, "section name offset out of bounds"))?
            };
            let section_data = if sh_type == elf::SHT_NOBITS || sh_type == elf::SHT_NULL {
                &[]
            } else {
                checked_span(data, offset, size, "section data out of bounds", log)?
            };
            sections.push(ElfSection {
                index,
                name,
                sh_type,
                flags: sh.sh_flags(endian).into(),
                addr: sh.sh_addr(endian).into(),
                offset,
                size,
                link: sh.sh_link(endian),
                info: sh.sh_info(endian),
                addralign: sh.sh_addralign(endian).into(),
                entsize: sh.sh_entsize(endian).into(),
                data: section_data,
            });
        }

        let program_headers = Self::program_header_table::<F>(header, endian, data, log)?;

        let mut decoded = Elf {
            data,
            class: F::CLASS,
            endian,
            e_type: header.e_type(endian),
            machine: header.e_machine(endian),
            flags: header.e_flags(endian),
            entry: header.e_entry(endian).into(),
            sections,
            program_headers,
            symbols: Vec::new(),
            symtab_index: None,
            relocations: Vec::new(),
        };
        decoded.decode_symbol_table::<F>(endian, log)?;
        decoded.decode_relocations::<F>(endian, log)?;
        Ok(decoded)
    }

    fn section_header_table<F: ElfClass>(
        header: &'d F,
        endian: Endianness,
        data: &'d [u8],
        log: &mut DecodeLog,
    ) -> Result<&'d [F::SectionHeader], DecodeError> {
        let shoff: u64 = header.e_shoff(endian).into();
        if shoff == 0 {
            return Ok(&[]);
        }
        let entsize = header.e_shentsize(endian) as usize;
        if entsize != core::mem::size_of::<F::SectionHeader>() {
            return Err(invalid(log, "unexpected section header entry size"));
        }
        let start = usize::try_from(shoff)
            .ok()
            .filter(|&s| s <= data.len())
            .ok_or_else(|| invalid(log, "section header table out of bounds"))?;
        let mut count = header.e_shnum(endian) as usize;
        if count == 0 {
            // Extended numbering: the real count lives in section 0.
            let (first, _) = pod::from_bytes::<F::SectionHeader>(&data[start..])
                .map_err(|()| invalid(log, "section header table out of bounds"))?;
            let extended: u64 = first.sh_size(endian).into();
            count = usize::try_from(extended)
                .map_err(|_| invalid(log, "invalid extended section count"))?;
        }
        let (table, _) = pod::slice_from_bytes::<F::SectionHeader>(&data[start..], count)
            .map_err(|()| invalid(log, "section header table out of bounds"))?;
        Ok(table)
    }

    fn resolve_shstrndx<F: ElfClass>(
        header: &'d F,
        endian: Endianness,
        section_headers: &'d [F::SectionHeader],
        log: &mut DecodeLog,
    ) -> Result<usize, DecodeError> {
        let raw = header.e_shstrndx(endian);
        let index = if raw == elf::SHN_XINDEX {
            match section_headers.first() {
                Some(first) => first.sh_link(endian) as usize,
                None => 0,
            }
        } else {
            raw as usize
        };
        if index != elf::SHN_UNDEF as usize && index >= section_headers.len() {
            return Err(invalid(log, "section name table index out of bounds"));
        }
        Ok(index)
    }

    fn program_header_table<F: ElfClass>(
        header: &'d F,
        endian: Endianness,
        data: &'d [u8],
        log: &mut DecodeLog,
    ) -> Result<Vec<ElfProgramHeader>, DecodeError> {
        let phoff: u64 = header.e_phoff(endian).into();
        let count = header.e_phnum(endian) as usize;
        if phoff == 0 || count == 0 {
            return Ok(Vec::new());
        }
        if header.e_phentsize(endian) as usize != core::mem::size_of::<F::ProgramHeader>() {
            return Err(invalid(log, "unexpected program header entry size"));
        }
        let start = usize::try_from(phoff)
            .ok()
            .filter(|&s| s <= data.len())
            .ok_or_else(|| invalid(log, "program header table out of bounds"))?;
        let (table, _) = pod::slice_from_bytes::<F::ProgramHeader>(&data[start..], count)
            .map_err(|()| invalid(log, "program header table out of bounds"))?;
        Ok(table
            .iter()
            .map(|ph| ElfProgramHeader {
                p_type: ph.p_type(endian),
                flags: ph.p_flags(endian),
                offset: ph.p_offset(endian).into(),
                vaddr: ph.p_vaddr(endian).into(),
                paddr: ph.p_paddr(endian).into(),
                filesz: ph.p_filesz(endian).into(),
                memsz: ph.p_memsz(endian).into(),
                align: ph.p_align(endian).into(),
            })
            .collect())
    }

    fn decode_symbol_table<F: ElfClass>(
        &mut self,
        endian: Endianness,
        log: &mut DecodeLog,
    ) -> Result<(), DecodeError> {
        let Some(symtab) = self.sections.iter().find(|s| s.sh_type == elf::SHT_SYMTAB) else {
            return Ok(());
        };
        let entry_size = core::mem::size_of::<F::Sym>();
        if symtab.data.len() % entry_size != 0 {
            return Err(invalid(log, "invalid symbol table size"));
        }
        let count = symtab.data.len() / entry_size;
        let (entries, _) = pod::slice_from_bytes::<F::Sym>(symtab.data, count)
            .map_err(|()| invalid(log, "symbol table out of bounds"))?;
        let strtab = self
            .sections
            .get(symtab.link as usize)
            .map(|s| s.data)
            .unwrap_or(&[]);

        let symtab_index = symtab.index;
        let mut symbols = Vec::with_capacity(count);
        for sym in entries {
            let name_offset = sym.st_name(endian) as usize;
            let name = if name_offset == 0 {
                ""
            } else {
                read_cstr(strtab, name_offset)
                    .ok_or_else(|| invalid(log, "symbol name offset out of bounds"))?
            };
            symbols.push(ElfSymbol {
                name,
                value: sym.st_value(endian).into(),
                size: sym.st_size(endian).into(),
                section_index: sym.st_shndx(endian) as usize,
                binding: sym.st_bind(),
                sym_type: sym.st_type(),
                other: sym.st_other(),
            });
        }
        self.symbols = symbols;
        self.symtab_index = Some(symtab_index);
        Ok(())
    }

    fn decode_relocations<F: ElfClass>(
        &mut self,
        endian: Endianness,
        log: &mut DecodeLog,
    ) -> Result<(), DecodeError> {
        let mut blocks = Vec::new();
        for section in &self.sections {
            let with_addend = match section.sh_type {
                elf::SHT_RELA => true,
                elf::SHT_REL => false,
                _ => continue,
            };
            if self.symtab_index.is_none() {
                log.warn(format!(
                    "{PREFIX}Ignoring relocation section {} : no symbol table present",
                    section.name
                ));
                continue;
            }
            let mut entries = Vec::new();
            if with_addend {
                let entry_size = core::mem::size_of::<F::Rela>();
                if section.data.len() % entry_size != 0 {
                    return Err(invalid(log, "invalid relocation section size"));
                }
                let count = section.data.len() / entry_size;
                let (relas, _) = pod::slice_from_bytes::<F::Rela>(section.data, count)
                    .map_err(|()| invalid(log, "relocation section out of bounds"))?;
                for rela in relas {
                    entries.push(self.make_relocation(
                        rela.r_offset(endian).into(),
                        rela.r_type(endian, false),
                        rela.r_sym(endian, false) as usize,
                        rela.r_addend(endian).into(),
                        log,
                    )?);
                }
            } else {
                let entry_size = core::mem::size_of::<F::Rel>();
                if section.data.len() % entry_size != 0 {
                    return Err(invalid(log, "invalid relocation section size"));
                }
                let count = section.data.len() / entry_size;
                let (rels, _) = pod::slice_from_bytes::<F::Rel>(section.data, count)
                    .map_err(|()| invalid(log, "relocation section out of bounds"))?;
                for rel in rels {
                    entries.push(self.make_relocation(
                        rel.r_offset(endian).into(),
                        rel.r_type(endian),
                        rel.r_sym(endian) as usize,
                        0,
                        log,
                    )?);
                }
            }
            blocks.push(ElfRelocationBlock {
                section_index: section.index,
                target_section: section.info as usize,
                entries,
            });
        }
        self.relocations = blocks;
        Ok(())
    }

    fn make_relocation(
        &self,
        offset: u64,
        r_type: u32,
        symbol_index: usize,
        addend: i64,
        log: &mut DecodeLog,
    ) -> Result<RawRelocation<'d>, DecodeError> {
        let symbol = self
            .symbols
            .get(symbol_index)
            .ok_or_else(|| invalid(log, "relocation symbol index out of bounds"))?;
        Ok(RawRelocation {
            offset,
            r_type,
            symbol_index,
            symbol_name: symbol.name,
            addend,
        })
    }

    pub fn is_64(&self) -> bool {
        self.class == elf::ELFCLASS64
    }

    pub fn section_by_name(&self, name: &str) -> Option<&ElfSection<'d>> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Relocation blocks whose target is the given section.
    pub fn relocations_for(&self, section_index: usize) -> impl Iterator<Item = &ElfRelocationBlock<'d>> {
        self.relocations
            .iter()
            .filter(move |b| b.target_section == section_index)
    }
}
