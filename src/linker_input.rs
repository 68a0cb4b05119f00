//! Cross-segment link intent decoded from the container's symbol table and
//! relocation sections.
//!
//! Symbols are classified by their owning section into segment kinds, and
//! relocations are bucketed per instruction segment or into the data
//! relocation list. Call-graph usage edges (kernel→callee, caller→callee)
//! are recovered here from relocations into the exported-functions segment,
//! so the linker can later propagate call-graph attributes.

use std::collections::HashMap;

use object::elf;

use crate::elf::decoder::Elf;
use crate::elf::{
    section_names, R_PER_THREAD_PAYLOAD_OFFSET, R_ZE_SYM_ADDR, R_ZE_SYM_ADDR_32,
    R_ZE_SYM_ADDR_32_HI,
};
use crate::error::{DecodeError, DecodeLog, PREFIX};
use crate::sections::ZebinSections;

/// Segment a symbol or relocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    GlobalConstants,
    GlobalConstantsZeroInit,
    GlobalStrings,
    GlobalVariables,
    GlobalVariablesZeroInit,
    Instructions,
}

/// Patch width/semantics of a relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationKind {
    /// Full pointer-width address.
    Address,
    /// Low 32 bits of the address.
    AddressLow,
    /// High 32 bits of the address.
    AddressHigh,
    /// Low 16 bits of the address.
    Address16,
    /// Offset at which per-thread payload starts; resolved from the kernel
    /// descriptor, not from the symbol table.
    PerThreadPayloadOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSize {
    Ptr32bit,
    Ptr64bit,
}

impl PointerSize {
    pub fn in_bytes(self) -> usize {
        match self {
            PointerSize::Ptr32bit => 4,
            PointerSize::Ptr64bit => 8,
        }
    }
}

/// One resolvable symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolInfo {
    pub offset: u64,
    pub size: u64,
    pub segment: SegmentType,
    /// Meaningful only when `segment` is `Instructions`.
    pub instruction_segment_id: usize,
    pub global: bool,
}

/// One patch site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationInfo {
    pub symbol_name: String,
    pub offset: u64,
    pub kind: RelocationKind,
    pub relocation_segment: SegmentType,
    pub addend: i64,
}

/// A kernel calling an external function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDependency {
    pub callee: String,
    pub kernel_name: String,
    pub optional: bool,
}

/// An external function calling another external function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDependency {
    pub callee: String,
    pub caller: String,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkerTraits {
    pub requires_patching_of_instruction_segments: bool,
    pub exports_functions: bool,
    pub exports_global_variables: bool,
    pub exports_global_constants: bool,
    pub pointer_size: PointerSize,
}

/// Symbol/relocation intent consumed by the linker.
#[derive(Debug)]
pub struct LinkerInput {
    pub traits: LinkerTraits,
    pub symbols: HashMap<String, SymbolInfo>,
    /// Relocation lists indexed by instruction segment id.
    pub text_relocations: Vec<Vec<RelocationInfo>>,
    pub data_relocations: Vec<RelocationInfo>,
    pub exported_functions_segment_id: Option<usize>,
    pub kernel_dependencies: Vec<KernelDependency>,
    pub function_dependencies: Vec<FunctionDependency>,
    /// Kernel (or alias) name per instruction segment, for diagnostics.
    pub instruction_segment_names: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum SectionClass {
    Data(SegmentType),
    Instructions(usize),
}

fn map_relocation_kind(r_type: u32) -> Option<RelocationKind> {
    match r_type {
        R_ZE_SYM_ADDR => Some(RelocationKind::Address),
        R_ZE_SYM_ADDR_32 => Some(RelocationKind::AddressLow),
        R_ZE_SYM_ADDR_32_HI => Some(RelocationKind::AddressHigh),
        R_PER_THREAD_PAYLOAD_OFFSET => Some(RelocationKind::PerThreadPayloadOffset),
        _ => None,
    }
}

/// A function span inside the exported-functions segment, used to attribute
/// a relocation site to its containing (caller) function.
#[derive(Debug, Clone)]
struct FunctionSpan {
    name: String,
    start: u64,
    size: u64,
}

/// Decodes the linker input. Returns `None` when the container carries no
/// symbol table, i.e. there is nothing to link.
pub fn decode_linker_input(
    elf: &Elf<'_>,
    sections: &ZebinSections<'_>,
    log: &mut DecodeLog,
) -> Result<Option<LinkerInput>, DecodeError> {
    if elf.symtab_index.is_none() {
        return Ok(None);
    }

    // Instruction segments: one per kernel text section, in ELF order, then
    // the shared external-functions segment when present.
    let mut section_map = HashMap::new();
    let mut segment_names = Vec::new();
    for (id, kernel_text) in sections.kernel_text.iter().enumerate() {
        section_map.insert(kernel_text.section.index, SectionClass::Instructions(id));
        segment_names.push(kernel_text.kernel_name.to_string());
    }
    let exported_functions_segment_id = sections.external_functions_text.first().map(|s| {
        let id = segment_names.len();
        section_map.insert(s.index, SectionClass::Instructions(id));
        segment_names.push(
            s.name
                .strip_prefix(section_names::TEXT_PREFIX)
                .unwrap_or("external functions")
                .to_string(),
        );
        id
    });
    for (bucket, segment) in [
        (&sections.const_data, SegmentType::GlobalConstants),
        (&sections.const_zero_init, SegmentType::GlobalConstantsZeroInit),
        (&sections.global_data, SegmentType::GlobalVariables),
        (&sections.global_zero_init, SegmentType::GlobalVariablesZeroInit),
        (&sections.const_string_data, SegmentType::GlobalStrings),
    ] {
        for section in bucket.iter() {
            section_map.insert(section.index, SectionClass::Data(segment));
        }
    }

    let mut input = LinkerInput {
        traits: LinkerTraits {
            requires_patching_of_instruction_segments: false,
            exports_functions: false,
            exports_global_variables: false,
            exports_global_constants: false,
            pointer_size: if elf.is_64() {
                PointerSize::Ptr64bit
            } else {
                PointerSize::Ptr32bit
            },
        },
        symbols: HashMap::new(),
        text_relocations: vec![Vec::new(); segment_names.len()],
        data_relocations: Vec::new(),
        exported_functions_segment_id,
        kernel_dependencies: Vec::new(),
        function_dependencies: Vec::new(),
        instruction_segment_names: segment_names,
    };

    let mut function_spans: Vec<FunctionSpan> = Vec::new();
    let mut weak_functions: Vec<String> = Vec::new();
    for symbol in elf.symbols.iter().skip(1) {
        let Some(class) = section_map.get(&symbol.section_index) else {
            continue;
        };
        let global = symbol.binding == elf::STB_GLOBAL || symbol.binding == elf::STB_WEAK;
        match class {
            SectionClass::Instructions(id) => {
                if symbol.sym_type == elf::STT_FUNC
                    && Some(*id) == exported_functions_segment_id
                {
                    function_spans.push(FunctionSpan {
                        name: symbol.name.to_string(),
                        start: symbol.value,
                        size: symbol.size,
                    });
                    if symbol.binding == elf::STB_WEAK {
                        weak_functions.push(symbol.name.to_string());
                    }
                    if global {
                        input.traits.exports_functions = true;
                    }
                }
                if global && !symbol.name.is_empty() {
                    input.symbols.insert(
                        symbol.name.to_string(),
                        SymbolInfo {
                            offset: symbol.value,
                            size: symbol.size,
                            segment: SegmentType::Instructions,
                            instruction_segment_id: *id,
                            global: symbol.binding == elf::STB_GLOBAL,
                        },
                    );
                }
            }
            SectionClass::Data(segment) => {
                if !global || symbol.name.is_empty() {
                    continue;
                }
                match segment {
                    SegmentType::GlobalVariables | SegmentType::GlobalVariablesZeroInit => {
                        input.traits.exports_global_variables = true
                    }
                    SegmentType::GlobalConstants | SegmentType::GlobalConstantsZeroInit => {
                        input.traits.exports_global_constants = true
                    }
                    _ => {}
                }
                input.symbols.insert(
                    symbol.name.to_string(),
                    SymbolInfo {
                        offset: symbol.value,
                        size: symbol.size,
                        segment: *segment,
                        instruction_segment_id: 0,
                        global: symbol.binding == elf::STB_GLOBAL,
                    },
                );
            }
        }
    }

    for block in &elf.relocations {
        let Some(class) = section_map.get(&block.target_section) else {
            // Debug-info and other side-channel relocations are applied by
            // the debug re-emitter, not the linker.
            continue;
        };
        let target_size = elf
            .sections
            .get(block.target_section)
            .map(|s| s.size)
            .unwrap_or(0);
        for entry in &block.entries {
            let Some(kind) = map_relocation_kind(entry.r_type) else {
                log.warn(format!(
                    "{PREFIX}Unhandled relocation type : {} at offset {} targeting symbol {}.",
                    entry.r_type, entry.offset, entry.symbol_name
                ));
                continue;
            };
            if entry.offset >= target_size {
                log.error(format!(
                    "{PREFIX}Invalid relocation offset : {} out of bounds of section of size : {}.",
                    entry.offset, target_size
                ));
                return Err(DecodeError::InvalidBinary);
            }
            match class {
                SectionClass::Instructions(id) => {
                    input.text_relocations[*id].push(RelocationInfo {
                        symbol_name: entry.symbol_name.to_string(),
                        offset: entry.offset,
                        kind,
                        relocation_segment: SegmentType::Instructions,
                        addend: entry.addend,
                    });
                }
                SectionClass::Data(segment) => match segment {
                    SegmentType::GlobalConstants | SegmentType::GlobalVariables => {
                        input.data_relocations.push(RelocationInfo {
                            symbol_name: entry.symbol_name.to_string(),
                            offset: entry.offset,
                            kind,
                            relocation_segment: *segment,
                            addend: entry.addend,
                        });
                    }
                    other => {
                        log.warn(format!(
                            "{PREFIX}Ignoring relocation into unsupported data segment {other:?}."
                        ));
                    }
                },
            }
        }
    }
    input.traits.requires_patching_of_instruction_segments =
        input.text_relocations.iter().any(|r| !r.is_empty());

    recover_dependencies(&mut input, &function_spans, &weak_functions);
    Ok(Some(input))
}

/// Derives the call-graph usage edges from relocations referencing external
/// function symbols.
fn recover_dependencies(
    input: &mut LinkerInput,
    function_spans: &[FunctionSpan],
    weak_functions: &[String],
) {
    let is_function = |name: &str| function_spans.iter().any(|s| s.name == name);
    let is_optional = |name: &str| weak_functions.iter().any(|w| w == name);

    for (id, relocations) in input.text_relocations.iter().enumerate() {
        let exported = Some(id) == input.exported_functions_segment_id;
        for relocation in relocations {
            if !is_function(&relocation.symbol_name) {
                continue;
            }
            if exported {
                // Caller is whichever function span contains the patch site.
                let caller = function_spans.iter().find(|s| {
                    relocation.offset >= s.start && relocation.offset < s.start + s.size.max(1)
                });
                if let Some(caller) = caller {
                    if caller.name != relocation.symbol_name {
                        input.function_dependencies.push(FunctionDependency {
                            callee: relocation.symbol_name.clone(),
                            caller: caller.name.clone(),
                            optional: is_optional(&relocation.symbol_name),
                        });
                    }
                }
            } else {
                input.kernel_dependencies.push(KernelDependency {
                    callee: relocation.symbol_name.clone(),
                    kernel_name: input.instruction_segment_names[id].clone(),
                    optional: is_optional(&relocation.symbol_name),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::encoder::ElfEncoder;
    use crate::elf::{self, Elf64, SymbolValues};
    use object::elf as raw;

    fn func_info(binding: u8) -> u8 {
        (binding << 4) | raw::STT_FUNC
    }

    fn obj_info(binding: u8) -> u8 {
        (binding << 4) | raw::STT_OBJECT
    }

    fn build() -> Vec<u8> {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        let text_k = enc.append_progbits(".text.kernel_a", &[0; 64], 16);
        let text_ext = enc.append_progbits(".text.Intel_Symbol_Table_Void_Program", &[0; 96], 16);
        let data_const = enc.append_progbits(".data.const", &[0; 32], 8);
        enc.begin_symtab();
        let fn_a = enc.append_symbol(
            "fn_a",
            SymbolValues {
                info: func_info(raw::STB_GLOBAL),
                shndx: text_ext as u16,
                value: 0,
                size: 48,
                ..Default::default()
            },
        ) as u32;
        let fn_b = enc.append_symbol(
            "fn_b",
            SymbolValues {
                info: func_info(raw::STB_GLOBAL),
                shndx: text_ext as u16,
                value: 48,
                size: 48,
                ..Default::default()
            },
        ) as u32;
        let const_var = enc.append_symbol(
            "const_var",
            SymbolValues {
                info: obj_info(raw::STB_GLOBAL),
                shndx: data_const as u16,
                value: 8,
                size: 8,
                ..Default::default()
            },
        ) as u32;
        // kernel_a calls fn_a; fn_a calls fn_b; const data refers to fn_a.
        enc.append_rela(".rela.text.kernel_a", text_k, 16, fn_a, elf::R_ZE_SYM_ADDR, 0);
        enc.append_rela(
            ".rela.text.Intel_Symbol_Table_Void_Program",
            text_ext,
            8,
            fn_b,
            elf::R_ZE_SYM_ADDR_32,
            0,
        );
        enc.append_rela(".rela.data.const", data_const, 0, fn_a, elf::R_ZE_SYM_ADDR, 4);
        let _ = const_var;
        enc.encode()
    }

    fn decode_all(bytes: &[u8]) -> (LinkerInput, DecodeLog) {
        let mut log = DecodeLog::new();
        let elf = Elf::decode::<Elf64>(bytes, &mut log).unwrap();
        let sections = ZebinSections::extract(&elf, &mut log).unwrap();
        let input = decode_linker_input(&elf, &sections, &mut log)
            .unwrap()
            .unwrap();
        (input, log)
    }

    #[test]
    fn classifies_symbols_and_relocations() {
        let (input, log) = decode_all(&build());
        assert!(!log.has_errors());

        assert_eq!(input.instruction_segment_names[0], "kernel_a");
        assert_eq!(input.exported_functions_segment_id, Some(1));
        assert_eq!(input.traits.pointer_size, PointerSize::Ptr64bit);
        assert!(input.traits.requires_patching_of_instruction_segments);
        assert!(input.traits.exports_functions);
        assert!(input.traits.exports_global_constants);
        assert!(!input.traits.exports_global_variables);

        let fn_a = input.symbols.get("fn_a").unwrap();
        assert_eq!(fn_a.segment, SegmentType::Instructions);
        assert_eq!(fn_a.instruction_segment_id, 1);
        let const_var = input.symbols.get("const_var").unwrap();
        assert_eq!(const_var.segment, SegmentType::GlobalConstants);
        assert_eq!(const_var.offset, 8);

        assert_eq!(input.text_relocations[0].len(), 1);
        assert_eq!(input.text_relocations[0][0].kind, RelocationKind::Address);
        assert_eq!(input.text_relocations[1].len(), 1);
        assert_eq!(input.text_relocations[1][0].kind, RelocationKind::AddressLow);
        assert_eq!(input.data_relocations.len(), 1);
        assert_eq!(input.data_relocations[0].relocation_segment, SegmentType::GlobalConstants);
        assert_eq!(input.data_relocations[0].addend, 4);
    }

    #[test]
    fn recovers_kernel_and_function_dependencies() {
        let (input, _) = decode_all(&build());
        assert_eq!(input.kernel_dependencies.len(), 1);
        let kdep = &input.kernel_dependencies[0];
        assert_eq!(kdep.callee, "fn_a");
        assert_eq!(kdep.kernel_name, "kernel_a");
        assert!(!kdep.optional);

        assert_eq!(input.function_dependencies.len(), 1);
        let fdep = &input.function_dependencies[0];
        assert_eq!(fdep.callee, "fn_b");
        assert_eq!(fdep.caller, "fn_a");
    }

    #[test]
    fn no_symtab_means_nothing_to_link() {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        enc.append_progbits(".text.k", &[0; 16], 16);
        let bytes = enc.encode();
        let mut log = DecodeLog::new();
        let decoded = Elf::decode::<Elf64>(&bytes, &mut log).unwrap();
        let sections = ZebinSections::extract(&decoded, &mut log).unwrap();
        assert!(decode_linker_input(&decoded, &sections, &mut log)
            .unwrap()
            .is_none());
    }

    #[test]
    fn relocation_offset_must_lie_within_the_segment() {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        let text = enc.append_progbits(".text.k", &[0; 16], 16);
        enc.begin_symtab();
        let sym = enc.append_symbol(
            "x",
            SymbolValues {
                info: func_info(raw::STB_GLOBAL),
                shndx: text as u16,
                ..Default::default()
            },
        ) as u32;
        enc.append_rela(".rela.text.k", text, 64, sym, elf::R_ZE_SYM_ADDR, 0);
        let bytes = enc.encode();
        let mut log = DecodeLog::new();
        let decoded = Elf::decode::<Elf64>(&bytes, &mut log).unwrap();
        let sections = ZebinSections::extract(&decoded, &mut log).unwrap();
        let err = decode_linker_input(&decoded, &sections, &mut log).unwrap_err();
        assert_eq!(err, DecodeError::InvalidBinary);
        assert!(log.errors.contains("Invalid relocation offset"));
    }

    #[test]
    fn unknown_relocation_type_warns_and_skips() {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        let text = enc.append_progbits(".text.k", &[0; 16], 16);
        enc.begin_symtab();
        let sym = enc.append_symbol(
            "x",
            SymbolValues {
                info: func_info(raw::STB_GLOBAL),
                shndx: text as u16,
                ..Default::default()
            },
        ) as u32;
        enc.append_rela(".rela.text.k", text, 0, sym, 0x77, 0);
        let bytes = enc.encode();
        let mut log = DecodeLog::new();
        let decoded = Elf::decode::<Elf64>(&bytes, &mut log).unwrap();
        let sections = ZebinSections::extract(&decoded, &mut log).unwrap();
        let input = decode_linker_input(&decoded, &sections, &mut log)
            .unwrap()
            .unwrap();
        assert!(input.text_relocations[0].is_empty());
        assert!(!input.traits.requires_patching_of_instruction_segments);
        assert!(log.warnings.contains("Unhandled relocation type : 119"));
    }

    #[test]
    fn weak_callee_marks_dependency_optional() {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        let text_k = enc.append_progbits(".text.k", &[0; 32], 16);
        let text_ext = enc.append_progbits(".text", &[0; 32], 16);
        enc.begin_symtab();
        let weak_fn = enc.append_symbol(
            "maybe_fn",
            SymbolValues {
                info: func_info(raw::STB_WEAK),
                shndx: text_ext as u16,
                value: 0,
                size: 32,
                ..Default::default()
            },
        ) as u32;
        enc.append_rela(".rela.text.k", text_k, 0, weak_fn, elf::R_ZE_SYM_ADDR, 0);
        let bytes = enc.encode();
        let (input, _) = decode_all(&bytes);
        assert_eq!(input.kernel_dependencies.len(), 1);
        assert!(input.kernel_dependencies[0].optional);
    }

    #[test]
    fn thirty_two_bit_container_has_32bit_pointer_trait() {
        use crate::elf::Elf32;
        let mut enc = ElfEncoder::<Elf32>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        enc.append_progbits(".text.k", &[0; 16], 16);
        enc.begin_symtab();
        let bytes = enc.encode();
        let mut log = DecodeLog::new();
        let decoded = Elf::decode::<Elf32>(&bytes, &mut log).unwrap();
        let sections = ZebinSections::extract(&decoded, &mut log).unwrap();
        let input = decode_linker_input(&decoded, &sections, &mut log)
            .unwrap()
            .unwrap();
        assert_eq!(input.traits.pointer_size, PointerSize::Ptr32bit);
    }
}
