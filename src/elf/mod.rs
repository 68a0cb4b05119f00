//! Generic ELF container codec plus the zebin-specific constants layered on
//! top of the standard ELF vocabulary.
//!
//! The codec is split into:
//! - `decoder`: a zero-copy, bounds-checked reader generic over the 32/64-bit
//!   address width (`Elf32`/`Elf64`).
//! - `encoder`: a writer assembling a fresh ELF image from section and
//!   program-header records, used by the debug re-emitter and by tests to
//!   fabricate containers.

use object::elf;
use object::endian::{U16, U32, U64, I32, I64};
use object::read::elf::FileHeader;
use object::Endianness;

pub mod decoder;
pub mod encoder;

pub use decoder::{Elf, ElfRelocationBlock, ElfSection, ElfSymbol, RawRelocation};
pub use encoder::ElfEncoder;

/// 32-bit container class.
pub type Elf32 = elf::FileHeader32<Endianness>;
/// 64-bit container class.
pub type Elf64 = elf::FileHeader64<Endianness>;

/// Machine id used by GPU device binaries.
pub const EM_INTELGT: u16 = 205;

/// Relocatable zebin container.
pub const ET_ZEBIN_REL: u16 = 0xff11;
/// Executable (pre-linked) zebin container.
pub const ET_ZEBIN_EXE: u16 = 0xff12;
/// Dynamically linkable zebin container.
pub const ET_ZEBIN_DYN: u16 = 0xff13;

/// SPIR-V payload section.
pub const SHT_ZEBIN_SPIRV: u32 = 0xff00_0009;
/// Textual kernel metadata section.
pub const SHT_ZEBIN_ZEINFO: u32 = 0xff00_0011;
/// GT-Pin instrumentation info section.
pub const SHT_ZEBIN_GTPIN_INFO: u32 = 0xff00_0012;
/// vISA assembly side channel.
pub const SHT_ZEBIN_VISA_ASM: u32 = 0xff00_0013;
/// Miscellaneous payload (build options).
pub const SHT_ZEBIN_MISC: u32 = 0xff00_0014;

/// Full pointer-width symbol address.
pub const R_ZE_SYM_ADDR: u32 = 1;
/// Low 32 bits of a symbol address.
pub const R_ZE_SYM_ADDR_32: u32 = 2;
/// High 32 bits of a symbol address.
pub const R_ZE_SYM_ADDR_32_HI: u32 = 3;
/// Patched with the offset where per-thread payload begins.
pub const R_PER_THREAD_PAYLOAD_OFFSET: u32 = 4;

/// Reserved zebin section names.
pub mod section_names {
    /// Shared external-functions instruction segment.
    pub const TEXT: &str = ".text";
    /// Historical alias of the external-functions segment.
    pub const EXTERNAL_FUNCTIONS: &str = ".text.Intel_Symbol_Table_Void_Program";
    /// Per-kernel instruction segments: `.text.<kernel>`.
    pub const TEXT_PREFIX: &str = ".text.";
    pub const DATA_CONST: &str = ".data.const";
    /// Misspelled legacy emission of `.data.const`, tolerated with a warning.
    pub const DATA_GLOBAL_CONST: &str = ".data.global_const";
    pub const DATA_GLOBAL: &str = ".data.global";
    pub const DATA_CONST_STRING: &str = ".data.const.string";
    pub const BSS_CONST: &str = ".bss.const";
    pub const BSS_GLOBAL: &str = ".bss.global";
    pub const SYMTAB: &str = ".symtab";
    pub const SPV: &str = ".spv";
    pub const ZE_INFO: &str = ".ze_info";
    /// Per-kernel GT-Pin sections: `.gtpin_info.<kernel>`.
    pub const GTPIN_INFO_PREFIX: &str = ".gtpin_info.";
    pub const NOTE_INTELGT_COMPAT: &str = ".note.intelgt.compat";
    pub const BUILD_OPTIONS: &str = ".misc.buildOptions";
    pub const DEBUG_PREFIX: &str = ".debug_";
    pub const REL_PREFIX: &str = ".rel.";
    pub const RELA_PREFIX: &str = ".rela.";
}

/// IntelGT note record types (`.note.intelgt.compat`).
pub mod intelgt_note {
    /// Note owner string.
    pub const OWNER: &str = "IntelGT";
    pub const PRODUCT_FAMILY: u32 = 1;
    pub const GFX_CORE_FAMILY: u32 = 2;
    pub const TARGET_METADATA: u32 = 3;
    pub const ZE_INFO_VERSION: u32 = 4;
    pub const VISA_ABI_VERSION: u32 = 5;
    pub const PRODUCT_CONFIG: u32 = 6;
    pub const INDIRECT_ACCESS_DETECTION_VERSION: u32 = 7;
    pub const INDIRECT_ACCESS_BUFFER_MAJOR_VERSION: u32 = 8;
}

/// Plain-integer views of the header records, width-agnostic. The
/// [`ElfClass`] impls truncate to the class's field widths on encode.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHeaderValues {
    pub e_type: u16,
    pub machine: u16,
    pub flags: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub phnum: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SectionHeaderValues {
    pub name: u32,
    pub sh_type: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramHeaderValues {
    pub p_type: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolValues {
    pub name: u32,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

/// Address-width parameter of the codec.
///
/// Extends the read-side `FileHeader` trait with constructors for the raw
/// header records, so the encoder can serialize either class through one code
/// path. Zebin containers are little-endian.
pub trait ElfClass: FileHeader<Endian = Endianness> {
    const CLASS: u8;

    fn file_header(v: &FileHeaderValues) -> Self;
    fn section_header(v: &SectionHeaderValues) -> Self::SectionHeader;
    fn program_header(v: &ProgramHeaderValues) -> Self::ProgramHeader;
    fn symbol(v: &SymbolValues) -> Self::Sym;
    fn rela(offset: u64, symbol: u32, r_type: u32, addend: i64) -> Self::Rela;
}

const LE: Endianness = Endianness::Little;

fn ident(class: u8) -> elf::Ident {
    elf::Ident {
        magic: elf::ELFMAG,
        class,
        data: elf::ELFDATA2LSB,
        version: elf::EV_CURRENT,
        os_abi: elf::ELFOSABI_NONE,
        abi_version: 0,
        padding: [0; 7],
    }
}

impl ElfClass for Elf64 {
    const CLASS: u8 = elf::ELFCLASS64;

    fn file_header(v: &FileHeaderValues) -> Self {
        elf::FileHeader64 {
            e_ident: ident(Self::CLASS),
            e_type: U16::new(LE, v.e_type),
            e_machine: U16::new(LE, v.machine),
            e_version: U32::new(LE, elf::EV_CURRENT as u32),
            e_entry: U64::new(LE, v.entry),
            e_phoff: U64::new(LE, v.phoff),
            e_shoff: U64::new(LE, v.shoff),
            e_flags: U32::new(LE, v.flags),
            e_ehsize: U16::new(LE, core::mem::size_of::<Self>() as u16),
            e_phentsize: U16::new(LE, core::mem::size_of::<elf::ProgramHeader64<Endianness>>() as u16),
            e_phnum: U16::new(LE, v.phnum),
            e_shentsize: U16::new(LE, core::mem::size_of::<elf::SectionHeader64<Endianness>>() as u16),
            e_shnum: U16::new(LE, v.shnum),
            e_shstrndx: U16::new(LE, v.shstrndx),
        }
    }

    fn section_header(v: &SectionHeaderValues) -> Self::SectionHeader {
        elf::SectionHeader64 {
            sh_name: U32::new(LE, v.name),
            sh_type: U32::new(LE, v.sh_type),
            sh_flags: U64::new(LE, v.flags),
            sh_addr: U64::new(LE, v.addr),
            sh_offset: U64::new(LE, v.offset),
            sh_size: U64::new(LE, v.size),
            sh_link: U32::new(LE, v.link),
            sh_info: U32::new(LE, v.info),
            sh_addralign: U64::new(LE, v.addralign),
            sh_entsize: U64::new(LE, v.entsize),
        }
    }

    fn program_header(v: &ProgramHeaderValues) -> Self::ProgramHeader {
        elf::ProgramHeader64 {
            p_type: U32::new(LE, v.p_type),
            p_flags: U32::new(LE, v.flags),
            p_offset: U64::new(LE, v.offset),
            p_vaddr: U64::new(LE, v.vaddr),
            p_paddr: U64::new(LE, v.paddr),
            p_filesz: U64::new(LE, v.filesz),
            p_memsz: U64::new(LE, v.memsz),
            p_align: U64::new(LE, v.align),
        }
    }

    fn symbol(v: &SymbolValues) -> Self::Sym {
        elf::Sym64 {
            st_name: U32::new(LE, v.name),
            st_info: v.info,
            st_other: v.other,
            st_shndx: U16::new(LE, v.shndx),
            st_value: U64::new(LE, v.value),
            st_size: U64::new(LE, v.size),
        }
    }

    fn rela(offset: u64, symbol: u32, r_type: u32, addend: i64) -> Self::Rela {
        elf::Rela64 {
            r_offset: U64::new(LE, offset),
            r_info: U64::new(LE, (u64::from(symbol) << 32) | u64::from(r_type)),
            r_addend: I64::new(LE, addend),
        }
    }
}

impl ElfClass for Elf32 {
    const CLASS: u8 = elf::ELFCLASS32;

    fn file_header(v: &FileHeaderValues) -> Self {
        elf::FileHeader32 {
            e_ident: ident(Self::CLASS),
            e_type: U16::new(LE, v.e_type),
            e_machine: U16::new(LE, v.machine),
            e_version: U32::new(LE, elf::EV_CURRENT as u32),
            e_entry: U32::new(LE, v.entry as u32),
            e_phoff: U32::new(LE, v.phoff as u32),
            e_shoff: U32::new(LE, v.shoff as u32),
            e_flags: U32::new(LE, v.flags),
            e_ehsize: U16::new(LE, core::mem::size_of::<Self>() as u16),
            e_phentsize: U16::new(LE, core::mem::size_of::<elf::ProgramHeader32<Endianness>>() as u16),
            e_phnum: U16::new(LE, v.phnum),
            e_shentsize: U16::new(LE, core::mem::size_of::<elf::SectionHeader32<Endianness>>() as u16),
            e_shnum: U16::new(LE, v.shnum),
            e_shstrndx: U16::new(LE, v.shstrndx),
        }
    }

    fn section_header(v: &SectionHeaderValues) -> Self::SectionHeader {
        elf::SectionHeader32 {
            sh_name: U32::new(LE, v.name),
            sh_type: U32::new(LE, v.sh_type),
            sh_flags: U32::new(LE, v.flags as u32),
            sh_addr: U32::new(LE, v.addr as u32),
            sh_offset: U32::new(LE, v.offset as u32),
            sh_size: U32::new(LE, v.size as u32),
            sh_link: U32::new(LE, v.link),
            sh_info: U32::new(LE, v.info),
            sh_addralign: U32::new(LE, v.addralign as u32),
            sh_entsize: U32::new(LE, v.entsize as u32),
        }
    }

    fn program_header(v: &ProgramHeaderValues) -> Self::ProgramHeader {
        elf::ProgramHeader32 {
            p_type: U32::new(LE, v.p_type),
            p_offset: U32::new(LE, v.offset as u32),
            p_vaddr: U32::new(LE, v.vaddr as u32),
            p_paddr: U32::new(LE, v.paddr as u32),
            p_filesz: U32::new(LE, v.filesz as u32),
            p_memsz: U32::new(LE, v.memsz as u32),
            p_flags: U32::new(LE, v.flags),
            p_align: U32::new(LE, v.align as u32),
        }
    }

    fn symbol(v: &SymbolValues) -> Self::Sym {
        elf::Sym32 {
            st_name: U32::new(LE, v.name),
            st_value: U32::new(LE, v.value as u32),
            st_size: U32::new(LE, v.size as u32),
            st_info: v.info,
            st_other: v.other,
            st_shndx: U16::new(LE, v.shndx),
        }
    }

    fn rela(offset: u64, symbol: u32, r_type: u32, addend: i64) -> Self::Rela {
        elf::Rela32 {
            r_offset: U32::new(LE, offset as u32),
            r_info: U32::new(LE, (symbol << 8) | (r_type & 0xff)),
            r_addend: I32::new(LE, addend as i32),
        }
    }
}
