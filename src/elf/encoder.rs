//! ELF container writer.
//!
//! Assembles a fresh ELF image from section and program-header records:
//! a NULL section is always emitted at index 0 and a `.shstrtab` holding the
//! section names is appended (or regenerated in place when the caller copies
//! one through). Serialization goes through the raw `object::elf` header
//! structs, one `bytes_of` at a time, so the same code path covers both
//! container classes.

use object::pod::bytes_of;

use crate::elf::{
    ElfClass, FileHeaderValues, ProgramHeaderValues, SectionHeaderValues, SymbolValues,
};
use crate::utils::align_up;

/// Section payload and header fields supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct SectionValues {
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
    pub data: Vec<u8>,
    /// Declared size for `SHT_NOBITS` sections (which carry no bytes).
    pub nobits_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Data,
    /// Content replaced with the generated section-name table.
    SectionNames,
    /// Content filled from the symbol builder at encode time.
    Symtab,
    /// Content filled with the symbol name table at encode time.
    SymtabNames,
    /// Content filled from a relocation builder at encode time.
    Rela,
}

#[derive(Debug, Clone)]
struct SectionRecord {
    name: String,
    kind: RecordKind,
    values: SectionValues,
}

#[derive(Debug, Clone)]
struct RelaBuilder {
    record: usize,
    entries: Vec<(u64, u32, u32, i64)>,
}

/// Builder for a new ELF image of class `F`.
pub struct ElfEncoder<F: ElfClass> {
    e_type: u16,
    machine: u16,
    flags: u32,
    entry: u64,
    records: Vec<SectionRecord>,
    phdrs: Vec<(ProgramHeaderValues, Option<usize>)>,
    symbols: Vec<(String, SymbolValues)>,
    symtab_record: Option<usize>,
    strtab_record: Option<usize>,
    relas: Vec<RelaBuilder>,
    shstrtab_record: Option<usize>,
    _class: core::marker::PhantomData<F>,
}

impl<F: ElfClass> ElfEncoder<F> {
    pub fn new(e_type: u16, machine: u16) -> Self {
        Self {
            e_type,
            machine,
            flags: 0,
            entry: 0,
            records: Vec::new(),
            phdrs: Vec::new(),
            symbols: Vec::new(),
            symtab_record: None,
            strtab_record: None,
            relas: Vec::new(),
            shstrtab_record: None,
            _class: core::marker::PhantomData,
        }
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    pub fn set_entry(&mut self, entry: u64) {
        self.entry = entry;
    }

    fn push(&mut self, name: &str, kind: RecordKind, values: SectionValues) -> usize {
        self.records.push(SectionRecord {
            name: name.to_string(),
            kind,
            values,
        });
        // Index in the final image: the NULL section occupies slot 0.
        self.records.len()
    }

    /// Appends a section with explicit header fields. Returns its final index.
    pub fn append_section_with(&mut self, name: &str, values: SectionValues) -> usize {
        if name == ".shstrtab" && values.sh_type == object::elf::SHT_STRTAB {
            let index = self.push(name, RecordKind::SectionNames, values);
            self.shstrtab_record = Some(index - 1);
            return index;
        }
        self.push(name, RecordKind::Data, values)
    }

    /// Appends a plain data section of the given type.
    pub fn append_section(&mut self, name: &str, sh_type: u32, data: &[u8]) -> usize {
        self.append_section_with(
            name,
            SectionValues {
                sh_type,
                addralign: 1,
                data: data.to_vec(),
                ..Default::default()
            },
        )
    }

    /// Appends an allocatable `SHT_PROGBITS` section.
    pub fn append_progbits(&mut self, name: &str, data: &[u8], align: u64) -> usize {
        self.append_section_with(
            name,
            SectionValues {
                sh_type: object::elf::SHT_PROGBITS,
                flags: object::elf::SHF_ALLOC as u64,
                addralign: align,
                data: data.to_vec(),
                ..Default::default()
            },
        )
    }

    /// Appends a zero-initialized (`SHT_NOBITS`) section of the given size.
    pub fn append_nobits(&mut self, name: &str, size: u64) -> usize {
        self.append_section_with(
            name,
            SectionValues {
                sh_type: object::elf::SHT_NOBITS,
                flags: (object::elf::SHF_ALLOC | object::elf::SHF_WRITE) as u64,
                addralign: 1,
                nobits_size: size,
                ..Default::default()
            },
        )
    }

    /// Starts the symbol table (`.symtab` + `.strtab`). Symbol index 0 is the
    /// reserved null entry.
    pub fn begin_symtab(&mut self) {
        if self.symtab_record.is_some() {
            return;
        }
        let symtab = self.push(".symtab", RecordKind::Symtab, SectionValues::default());
        let strtab = self.push(".strtab", RecordKind::SymtabNames, SectionValues::default());
        self.symtab_record = Some(symtab - 1);
        self.strtab_record = Some(strtab - 1);
    }

    /// Appends a symbol; `begin_symtab` must have been called. Returns the
    /// symbol index.
    pub fn append_symbol(&mut self, name: &str, values: SymbolValues) -> usize {
        assert!(self.symtab_record.is_some(), "symbol table not started");
        self.symbols.push((name.to_string(), values));
        self.symbols.len()
    }

    /// Appends one relocation-with-addend record to the named relocation
    /// section, creating that section on first use.
    pub fn append_rela(
        &mut self,
        rela_section: &str,
        target_section: usize,
        offset: u64,
        symbol: u32,
        r_type: u32,
        addend: i64,
    ) {
        let record = match self
            .records
            .iter()
            .position(|r| r.kind == RecordKind::Rela && r.name == rela_section)
        {
            Some(pos) => pos,
            None => {
                let index = self.push(
                    rela_section,
                    RecordKind::Rela,
                    SectionValues {
                        sh_type: object::elf::SHT_RELA,
                        info: target_section as u32,
                        addralign: 8,
                        ..Default::default()
                    },
                );
                index - 1
            }
        };
        match self.relas.iter_mut().find(|r| r.record == record) {
            Some(builder) => builder.entries.push((offset, r_type, symbol, addend)),
            None => self.relas.push(RelaBuilder {
                record,
                entries: vec![(offset, r_type, symbol, addend)],
            }),
        }
    }

    /// Appends a program header; when `section` is given, its file offset and
    /// size are resolved from that section at layout time.
    pub fn append_program_header(&mut self, values: ProgramHeaderValues, section: Option<usize>) {
        self.phdrs.push((values, section));
    }

    /// Serializes the image.
    pub fn encode(mut self) -> Vec<u8> {
        self.materialize_symtab();
        self.materialize_relas();

        // Section name table; regenerated even when a record was copied in.
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::with_capacity(self.records.len());
        for record in &self.records {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(record.name.as_bytes());
            shstrtab.push(0);
        }
        let auto_shstrtab = self.shstrtab_record.is_none();
        let shstrtab_name_offset = shstrtab.len() as u32;
        if auto_shstrtab {
            shstrtab.extend_from_slice(b".shstrtab\0");
        }
        if let Some(pos) = self.shstrtab_record {
            self.records[pos].values.data = shstrtab.clone();
        }

        let shnum = self.records.len() as u16 + 1 + u16::from(auto_shstrtab);
        let shstrndx = match self.shstrtab_record {
            Some(pos) => pos as u16 + 1,
            None => shnum - 1,
        };

        let ehsize = core::mem::size_of::<F>() as u64;
        let phentsize = core::mem::size_of::<F::ProgramHeader>() as u64;
        let shentsize = core::mem::size_of::<F::SectionHeader>() as u64;
        let phnum = self.phdrs.len() as u16;
        let phoff = if phnum > 0 { ehsize } else { 0 };

        // Lay out section data.
        let mut pos = ehsize + phentsize * u64::from(phnum);
        let mut offsets = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let align = record.values.addralign.max(1);
            if align.is_power_of_two() {
                pos = align_up(pos, align);
            }
            offsets.push(pos);
            if record.values.sh_type != object::elf::SHT_NOBITS {
                pos += record.values.data.len() as u64;
            }
        }
        let auto_shstrtab_offset = pos;
        if auto_shstrtab {
            pos += shstrtab.len() as u64;
        }
        let shoff = align_up(pos, 8);

        let header = F::file_header(&FileHeaderValues {
            e_type: self.e_type,
            machine: self.machine,
            flags: self.flags,
            entry: self.entry,
            phoff,
            shoff,
            phnum,
            shnum,
            shstrndx,
        });

        let mut out = Vec::with_capacity(shoff as usize + shentsize as usize * shnum as usize);
        out.extend_from_slice(bytes_of(&header));

        for (values, section) in &self.phdrs {
            let mut ph = *values;
            if let Some(index) = section {
                if let Some(record) = index.checked_sub(1).and_then(|i| self.records.get(i)) {
                    ph.offset = offsets[index - 1];
                    ph.filesz = if record.values.sh_type == object::elf::SHT_NOBITS {
                        0
                    } else {
                        record.values.data.len() as u64
                    };
                    if ph.memsz == 0 {
                        ph.memsz = record.section_size();
                    }
                }
            }
            out.extend_from_slice(bytes_of(&F::program_header(&ph)));
        }

        for (record, &offset) in self.records.iter().zip(&offsets) {
            if record.values.sh_type == object::elf::SHT_NOBITS {
                continue;
            }
            if out.len() < offset as usize {
                out.resize(offset as usize, 0);
            }
            out.extend_from_slice(&record.values.data);
        }
        if auto_shstrtab {
            if out.len() < auto_shstrtab_offset as usize {
                out.resize(auto_shstrtab_offset as usize, 0);
            }
            out.extend_from_slice(&shstrtab);
        }
        if out.len() < shoff as usize {
            out.resize(shoff as usize, 0);
        }

        // Section headers: NULL, then the records, then the generated name
        // table when none was copied through.
        out.extend_from_slice(bytes_of(&F::section_header(&SectionHeaderValues::default())));
        for ((record, &offset), &name) in self.records.iter().zip(&offsets).zip(&name_offsets) {
            out.extend_from_slice(bytes_of(&F::section_header(&SectionHeaderValues {
                name,
                sh_type: record.values.sh_type,
                flags: record.values.flags,
                addr: record.values.addr,
                offset,
                size: record.section_size(),
                link: record.values.link,
                info: record.values.info,
                addralign: record.values.addralign,
                entsize: record.values.entsize,
            })));
        }
        if auto_shstrtab {
            out.extend_from_slice(bytes_of(&F::section_header(&SectionHeaderValues {
                name: shstrtab_name_offset,
                sh_type: object::elf::SHT_STRTAB,
                offset: auto_shstrtab_offset,
                size: shstrtab.len() as u64,
                addralign: 1,
                ..Default::default()
            })));
        }
        out
    }

    fn materialize_symtab(&mut self) {
        let (Some(symtab), Some(strtab)) = (self.symtab_record, self.strtab_record) else {
            return;
        };
        let mut names = vec![0u8];
        let mut data = Vec::new();
        data.extend_from_slice(bytes_of(&F::symbol(&SymbolValues::default())));
        let mut first_global = self.symbols.len() as u32 + 1;
        for (i, (name, values)) in self.symbols.iter().enumerate() {
            let mut values = *values;
            if !name.is_empty() {
                values.name = names.len() as u32;
                names.extend_from_slice(name.as_bytes());
                names.push(0);
            }
            if (values.info >> 4) != object::elf::STB_LOCAL && first_global > i as u32 + 1 {
                first_global = i as u32 + 1;
            }
            data.extend_from_slice(bytes_of(&F::symbol(&values)));
        }
        let strtab_index = strtab as u32 + 1;
        let record = &mut self.records[symtab];
        record.values.sh_type = object::elf::SHT_SYMTAB;
        record.values.data = data;
        record.values.entsize = core::mem::size_of::<F::Sym>() as u64;
        record.values.link = strtab_index;
        record.values.info = first_global;
        record.values.addralign = 8;
        let strtab_record = &mut self.records[strtab];
        strtab_record.values.sh_type = object::elf::SHT_STRTAB;
        strtab_record.values.data = names;
        strtab_record.values.addralign = 1;
    }

    fn materialize_relas(&mut self) {
        let symtab_index = self.symtab_record.map(|i| i as u32 + 1).unwrap_or(0);
        for builder in &self.relas {
            let mut data = Vec::new();
            for &(offset, r_type, symbol, addend) in &builder.entries {
                data.extend_from_slice(bytes_of(&F::rela(offset, symbol, r_type, addend)));
            }
            let record = &mut self.records[builder.record];
            record.values.data = data;
            record.values.entsize = core::mem::size_of::<F::Rela>() as u64;
            record.values.link = symtab_index;
        }
    }
}

impl SectionRecord {
    fn section_size(&self) -> u64 {
        if self.values.sh_type == object::elf::SHT_NOBITS {
            self.values.nobits_size
        } else {
            self.values.data.len() as u64
        }
    }
}
