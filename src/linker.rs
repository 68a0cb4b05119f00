//! Core Linker logic.
//!
//! Orchestrates the cross-segment link:
//! 1. Symbol Resolution: relocate every declared symbol to its final GPU
//!    address and add the synthetic data-segment base symbols.
//! 2. Data Patching: apply data-segment relocations in place on the staged
//!    constant/variable buffers.
//! 3. Instruction Patching: apply text relocations on private copies of the
//!    kernel ISA (patch-then-upload; the decoded container is never
//!    mutated), resolving built-in symbols from device constants.
//! 4. Dependency Resolution: propagate call-graph attributes onto external
//!    functions and kernel descriptors.
//! 5. Status: `Error` when a required relocation stays unresolved,
//!    `LinkedPartially` when only externally-satisfiable ones remain.

use std::collections::HashMap;

use crate::deps;
use crate::error::{DecodeLog, PREFIX};
use crate::linker_input::{
    LinkerInput, PointerSize, RelocationInfo, RelocationKind, SegmentType, SymbolInfo,
};
use crate::program::{ExternalFunctionInfo, KernelInfo};

/// Resolved against the device's sub-device index, not the symbol table.
pub const SUB_DEVICE_ID_SYMBOL: &str = "__SubDeviceID";
/// Resolved against the owning kernel's cross-thread data size.
pub const PER_THREAD_OFF_SYMBOL: &str = "__INTEL_PER_THREAD_OFF";
/// Patch sites recorded for implicit-args finalization, not patched here.
pub const IMPLICIT_ARGS_OFFSET_SYMBOL: &str = "__INTEL_PATCH_CROSS_THREAD_OFFSET_OFF_R0";

/// Terminal link outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkingStatus {
    Error,
    LinkedFully,
    LinkedPartially,
}

/// GPU placement of one segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentInfo {
    pub gpu_address: u64,
    pub segment_size: u64,
}

/// Final GPU placement of every data segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkSegments {
    pub global_variables: SegmentInfo,
    pub global_variables_zero_init: SegmentInfo,
    pub global_constants: SegmentInfo,
    pub global_constants_zero_init: SegmentInfo,
    pub strings: SegmentInfo,
    pub exported_functions: SegmentInfo,
}

/// One instruction segment: original ISA bytes and their GPU address.
#[derive(Debug, Clone, Copy)]
pub struct IsaSegment<'a> {
    pub gpu_address: u64,
    pub data: &'a [u8],
}

/// Device constants built-in symbols resolve against.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkerDeviceInfo {
    pub sub_device_id: u32,
}

/// A symbol with its final GPU address.
#[derive(Debug, Clone, Copy)]
pub struct RelocatedSymbol {
    pub symbol: SymbolInfo,
    pub gpu_address: u64,
}

pub type RelocatedSymbolsMap = HashMap<String, RelocatedSymbol>;

/// An instruction-segment relocation whose symbol could not be resolved.
#[derive(Debug, Clone)]
pub struct UnresolvedExternal {
    pub relocation: RelocationInfo,
    pub instruction_segment_id: Option<usize>,
    /// Set when the failure is structural (bad segment id, out-of-bounds
    /// patch) rather than a missing external symbol.
    pub internal_error: bool,
}

impl UnresolvedExternal {
    /// Required relocations force the terminal `Error` status; unresolved
    /// instruction-segment externals may be satisfied by a later module
    /// link and only downgrade to `LinkedPartially`.
    pub fn is_required(&self) -> bool {
        self.internal_error || self.relocation.relocation_segment != SegmentType::Instructions
    }
}

/// Everything `link` produces.
#[derive(Debug)]
pub struct LinkResult {
    pub status: LinkingStatus,
    pub relocated_symbols: RelocatedSymbolsMap,
    pub unresolved_externals: Vec<UnresolvedExternal>,
    /// Patched private copies, `None` for segments with no relocations
    /// (upload the original bytes).
    pub patched_isa: Vec<Option<Vec<u8>>>,
    /// Per instruction segment: `(patch offset, relocation kind)` sites
    /// recorded for implicit-args finalization.
    pub implicit_args_relocations: Vec<Vec<(u64, RelocationKind)>>,
}

/// Patches `value` into `buffer` at `offset` honoring the relocation width.
/// Fails (without touching the buffer) when the patch would run out of
/// bounds.
pub fn patch_address(
    buffer: &mut [u8],
    offset: u64,
    value: u64,
    kind: RelocationKind,
    pointer_size: PointerSize,
) -> Result<(), ()> {
    let width = match kind {
        RelocationKind::Address => pointer_size.in_bytes(),
        RelocationKind::AddressLow
        | RelocationKind::AddressHigh
        | RelocationKind::PerThreadPayloadOffset => 4,
        RelocationKind::Address16 => 2,
    };
    let patch_value = match kind {
        RelocationKind::Address => value,
        RelocationKind::AddressLow | RelocationKind::PerThreadPayloadOffset => {
            value & 0xffff_ffff
        }
        RelocationKind::AddressHigh => (value >> 32) & 0xffff_ffff,
        RelocationKind::Address16 => value & 0xffff,
    };
    let offset = usize::try_from(offset).map_err(|_| ())?;
    let end = offset.checked_add(width).ok_or(())?;
    if end > buffer.len() {
        return Err(());
    }
    buffer[offset..end].copy_from_slice(&patch_value.to_le_bytes()[..width]);
    Ok(())
}

/// Reads a previously patched value back at the relocation's width.
pub fn read_patched_value(
    buffer: &[u8],
    offset: usize,
    kind: RelocationKind,
    pointer_size: PointerSize,
) -> u64 {
    let width = match kind {
        RelocationKind::Address => pointer_size.in_bytes(),
        RelocationKind::AddressLow
        | RelocationKind::AddressHigh
        | RelocationKind::PerThreadPayloadOffset => 4,
        RelocationKind::Address16 => 2,
    };
    let mut raw = [0u8; 8];
    raw[..width].copy_from_slice(&buffer[offset..offset + width]);
    u64::from_le_bytes(raw)
}

pub struct Linker {
    input: LinkerInput,
}

impl Linker {
    pub fn new(input: LinkerInput) -> Self {
        Self { input }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn link(
        self,
        segments: &LinkSegments,
        const_data: &mut [u8],
        var_data: &mut [u8],
        isa_segments: &[IsaSegment<'_>],
        kernels: &mut [KernelInfo<'_>],
        external_functions: &mut [ExternalFunctionInfo],
        device: &LinkerDeviceInfo,
        log: &mut DecodeLog,
    ) -> LinkResult {
        let input = &self.input;
        let mut result = LinkResult {
            status: LinkingStatus::LinkedFully,
            relocated_symbols: HashMap::new(),
            unresolved_externals: Vec::new(),
            patched_isa: vec![None; isa_segments.len()],
            implicit_args_relocations: vec![Vec::new(); isa_segments.len()],
        };
        let mut internal_error = false;

        // 1. Symbol resolution.
        for (name, symbol) in &input.symbols {
            let (base, limit) = match symbol.segment {
                SegmentType::GlobalConstants => (
                    segments.global_constants.gpu_address,
                    segments.global_constants.segment_size,
                ),
                SegmentType::GlobalConstantsZeroInit => (
                    segments.global_constants_zero_init.gpu_address,
                    segments.global_constants_zero_init.segment_size,
                ),
                SegmentType::GlobalStrings => {
                    (segments.strings.gpu_address, segments.strings.segment_size)
                }
                SegmentType::GlobalVariables => (
                    segments.global_variables.gpu_address,
                    segments.global_variables.segment_size,
                ),
                SegmentType::GlobalVariablesZeroInit => (
                    segments.global_variables_zero_init.gpu_address,
                    segments.global_variables_zero_init.segment_size,
                ),
                SegmentType::Instructions => {
                    match isa_segments.get(symbol.instruction_segment_id) {
                        Some(segment) => (segment.gpu_address, segment.data.len() as u64),
                        None => {
                            log.error(format!(
                                "{PREFIX}Invalid instruction segment id : {} for symbol : {name}.",
                                symbol.instruction_segment_id
                            ));
                            internal_error = true;
                            continue;
                        }
                    }
                }
            };
            if symbol
                .offset
                .checked_add(symbol.size)
                .is_none_or(|end| end > limit)
            {
                log.error(format!(
                    "{PREFIX}Symbol : {name} out of bounds of its segment (offset {} size {} segment size {limit}).",
                    symbol.offset, symbol.size
                ));
                internal_error = true;
                continue;
            }
            result.relocated_symbols.insert(
                name.clone(),
                RelocatedSymbol {
                    symbol: *symbol,
                    gpu_address: base + symbol.offset,
                },
            );
        }

        // Synthetic whole-segment base symbols.
        for (name, segment, info) in [
            (
                "globalConstants",
                SegmentType::GlobalConstants,
                segments.global_constants,
            ),
            (
                "globalVariables",
                SegmentType::GlobalVariables,
                segments.global_variables,
            ),
        ] {
            result
                .relocated_symbols
                .entry(name.to_string())
                .or_insert(RelocatedSymbol {
                    symbol: SymbolInfo {
                        offset: 0,
                        size: info.segment_size,
                        segment,
                        instruction_segment_id: 0,
                        global: false,
                    },
                    gpu_address: info.gpu_address,
                });
        }

        // 2. Data-segment relocations.
        for relocation in &input.data_relocations {
            let buffer: &mut [u8] = match relocation.relocation_segment {
                SegmentType::GlobalConstants => &mut *const_data,
                SegmentType::GlobalVariables => &mut *var_data,
                other => {
                    log.error(format!(
                        "{PREFIX}Unsupported relocation segment : {other:?}."
                    ));
                    internal_error = true;
                    continue;
                }
            };
            let Some(symbol) = result.relocated_symbols.get(&relocation.symbol_name) else {
                result.unresolved_externals.push(UnresolvedExternal {
                    relocation: relocation.clone(),
                    instruction_segment_id: None,
                    internal_error: false,
                });
                continue;
            };
            let value = symbol.gpu_address.wrapping_add_signed(relocation.addend);
            if patch_address(
                buffer,
                relocation.offset,
                value,
                relocation.kind,
                input.traits.pointer_size,
            )
            .is_err()
            {
                log.error(format!(
                    "{PREFIX}Data relocation out of bounds at offset : {}.",
                    relocation.offset
                ));
                internal_error = true;
            }
        }

        // 3. Instruction-segment relocations, applied on private copies.
        if input.traits.requires_patching_of_instruction_segments {
            for (id, relocations) in input.text_relocations.iter().enumerate() {
                if relocations.is_empty() {
                    continue;
                }
                let Some(isa) = isa_segments.get(id) else {
                    log.error(format!("{PREFIX}Missing instruction segment : {id}."));
                    internal_error = true;
                    continue;
                };
                let mut patched = isa.data.to_vec();
                let segment_kernel_ctd = input
                    .instruction_segment_names
                    .get(id)
                    .and_then(|name| {
                        kernels
                            .iter()
                            .find(|k| &k.descriptor.metadata.kernel_name == name)
                    })
                    .map(|k| u64::from(k.descriptor.attributes.cross_thread_data_size))
                    .unwrap_or(0);
                for relocation in relocations {
                    if relocation.symbol_name == IMPLICIT_ARGS_OFFSET_SYMBOL {
                        result.implicit_args_relocations[id]
                            .push((relocation.offset, relocation.kind));
                        continue;
                    }
                    let value = if relocation.kind == RelocationKind::PerThreadPayloadOffset
                        || relocation.symbol_name == PER_THREAD_OFF_SYMBOL
                    {
                        segment_kernel_ctd
                    } else if relocation.symbol_name == SUB_DEVICE_ID_SYMBOL {
                        u64::from(device.sub_device_id)
                    } else {
                        match result.relocated_symbols.get(&relocation.symbol_name) {
                            Some(symbol) => {
                                symbol.gpu_address.wrapping_add_signed(relocation.addend)
                            }
                            None => {
                                result.unresolved_externals.push(UnresolvedExternal {
                                    relocation: relocation.clone(),
                                    instruction_segment_id: Some(id),
                                    internal_error: false,
                                });
                                continue;
                            }
                        }
                    };
                    if patch_address(
                        &mut patched,
                        relocation.offset,
                        value,
                        relocation.kind,
                        input.traits.pointer_size,
                    )
                    .is_err()
                    {
                        log.error(format!(
                            "{PREFIX}Instruction relocation out of bounds at offset : {} in segment : {id}.",
                            relocation.offset
                        ));
                        internal_error = true;
                    }
                }
                result.patched_isa[id] = Some(patched);
            }
        }

        // 4. Call-graph attribute propagation.
        if let Err(err) = deps::resolve_external_dependencies(
            external_functions,
            &input.kernel_dependencies,
            &input.function_dependencies,
            kernels,
        ) {
            log.error(format!(
                "{PREFIX}Failed to resolve external function dependencies : {err}."
            ));
            internal_error = true;
        }

        // 5. Terminal status.
        let any_required = internal_error
            || result
                .unresolved_externals
                .iter()
                .any(UnresolvedExternal::is_required);
        result.status = if any_required {
            LinkingStatus::Error
        } else if !result.unresolved_externals.is_empty() {
            LinkingStatus::LinkedPartially
        } else {
            LinkingStatus::LinkedFully
        };
        tracing::debug!(
            target: "zebin",
            "link finished: {:?}, {} unresolved externals",
            result.status,
            result.unresolved_externals.len()
        );
        result
    }
}

/// Renders unresolved relocations for build-log surfacing.
pub fn construct_linker_error_message(
    unresolved_externals: &[UnresolvedExternal],
    instruction_segment_names: &[String],
) -> String {
    if unresolved_externals.is_empty() {
        return "Internal linker error".to_string();
    }
    let mut message = String::new();
    for unresolved in unresolved_externals {
        let location = match unresolved.instruction_segment_id {
            Some(id) => {
                let name = instruction_segment_names
                    .get(id)
                    .map(String::as_str)
                    .unwrap_or("<unknown>");
                format!("instructions segment #{id} ({name})")
            }
            None => format!("{:?} data segment", unresolved.relocation.relocation_segment),
        };
        message.push_str(&format!(
            "error : unresolved external symbol \"{}\" at offset {} in {}\n",
            unresolved.relocation.symbol_name, unresolved.relocation.offset, location
        ));
    }
    message
}

/// Renders the relocated-symbols map for debug logging.
pub fn construct_relocations_debug_message(relocated_symbols: &RelocatedSymbolsMap) -> String {
    let mut lines: Vec<String> = relocated_symbols
        .iter()
        .map(|(name, symbol)| {
            format!("symbol : {name} gpu address : 0x{:x}\n", symbol.gpu_address)
        })
        .collect();
    lines.sort();
    let mut message = String::from("Relocations debug information :\n");
    for line in lines {
        message.push_str(&line);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker_input::{FunctionDependency, KernelDependency, LinkerTraits};
    use std::collections::HashMap;

    fn reloc(symbol: &str, offset: u64, kind: RelocationKind) -> RelocationInfo {
        RelocationInfo {
            symbol_name: symbol.to_string(),
            offset,
            kind,
            relocation_segment: SegmentType::Instructions,
            addend: 0,
        }
    }

    fn data_reloc(
        symbol: &str,
        offset: u64,
        kind: RelocationKind,
        segment: SegmentType,
        addend: i64,
    ) -> RelocationInfo {
        RelocationInfo {
            symbol_name: symbol.to_string(),
            offset,
            kind,
            relocation_segment: segment,
            addend,
        }
    }

    fn input_with(
        symbols: &[(&str, SymbolInfo)],
        text_relocations: Vec<Vec<RelocationInfo>>,
        data_relocations: Vec<RelocationInfo>,
        segment_names: &[&str],
    ) -> LinkerInput {
        LinkerInput {
            traits: LinkerTraits {
                requires_patching_of_instruction_segments: text_relocations
                    .iter()
                    .any(|r| !r.is_empty()),
                exports_functions: false,
                exports_global_variables: false,
                exports_global_constants: false,
                pointer_size: PointerSize::Ptr64bit,
            },
            symbols: symbols
                .iter()
                .map(|(n, s)| (n.to_string(), *s))
                .collect::<HashMap<_, _>>(),
            text_relocations,
            data_relocations,
            exported_functions_segment_id: None,
            kernel_dependencies: Vec::new(),
            function_dependencies: Vec::new(),
            instruction_segment_names: segment_names.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn data_symbol(segment: SegmentType, offset: u64, size: u64) -> SymbolInfo {
        SymbolInfo {
            offset,
            size,
            segment,
            instruction_segment_id: 0,
            global: true,
        }
    }

    fn kernel(name: &str, ctd: u32) -> KernelInfo<'static> {
        let mut k = KernelInfo::default();
        k.descriptor.metadata.kernel_name = name.to_string();
        k.descriptor.attributes.cross_thread_data_size = ctd;
        k
    }

    #[test]
    fn patch_round_trips_for_every_relocation_width() {
        let value = 0x1122_3344_5566_7788u64;
        for kind in [
            RelocationKind::Address,
            RelocationKind::AddressLow,
            RelocationKind::AddressHigh,
            RelocationKind::Address16,
            RelocationKind::PerThreadPayloadOffset,
        ] {
            let mut buffer = vec![0u8; 16];
            patch_address(&mut buffer, 4, value, kind, PointerSize::Ptr64bit).unwrap();
            let read = read_patched_value(&buffer, 4, kind, PointerSize::Ptr64bit);
            let expected = match kind {
                RelocationKind::Address => value,
                RelocationKind::AddressLow | RelocationKind::PerThreadPayloadOffset => {
                    value & 0xffff_ffff
                }
                RelocationKind::AddressHigh => value >> 32,
                RelocationKind::Address16 => value & 0xffff,
            };
            assert_eq!(read, expected, "{kind:?}");
        }

        // 32-bit pointers truncate full-width patches.
        let mut buffer = vec![0u8; 8];
        patch_address(&mut buffer, 0, value, RelocationKind::Address, PointerSize::Ptr32bit)
            .unwrap();
        assert_eq!(
            read_patched_value(&buffer, 0, RelocationKind::Address, PointerSize::Ptr32bit),
            value & 0xffff_ffff
        );
    }

    #[test]
    fn out_of_bounds_patch_is_rejected_and_buffer_untouched() {
        let mut buffer = vec![0u8; 8];
        assert!(patch_address(&mut buffer, 6, 1, RelocationKind::AddressLow, PointerSize::Ptr64bit).is_err());
        assert_eq!(buffer, vec![0u8; 8]);
    }

    #[test]
    fn data_relocations_patch_staged_buffers() {
        let input = input_with(
            &[("var_x", data_symbol(SegmentType::GlobalVariables, 16, 8))],
            vec![],
            vec![
                data_reloc("var_x", 0, RelocationKind::Address, SegmentType::GlobalConstants, 8),
                data_reloc("var_x", 8, RelocationKind::AddressLow, SegmentType::GlobalConstants, 0),
                data_reloc("var_x", 12, RelocationKind::AddressHigh, SegmentType::GlobalConstants, 0),
            ],
            &[],
        );
        let segments = LinkSegments {
            global_variables: SegmentInfo {
                gpu_address: 0x1_0000_0000,
                segment_size: 64,
            },
            global_constants: SegmentInfo {
                gpu_address: 0x2000,
                segment_size: 64,
            },
            ..Default::default()
        };
        let mut const_data = vec![0u8; 32];
        let mut var_data = vec![0u8; 0];
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &segments,
            &mut const_data,
            &mut var_data,
            &[],
            &mut [],
            &mut [],
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::LinkedFully);

        let expected = 0x1_0000_0000u64 + 16;
        assert_eq!(
            u64::from_le_bytes(const_data[0..8].try_into().unwrap()),
            expected + 8
        );
        assert_eq!(
            u32::from_le_bytes(const_data[8..12].try_into().unwrap()),
            (expected & 0xffff_ffff) as u32
        );
        assert_eq!(
            u32::from_le_bytes(const_data[12..16].try_into().unwrap()),
            (expected >> 32) as u32
        );

        let relocated = result.relocated_symbols.get("var_x").unwrap();
        assert_eq!(relocated.gpu_address, expected);
        // Synthetic base symbols always exist.
        assert_eq!(
            result.relocated_symbols.get("globalConstants").unwrap().gpu_address,
            0x2000
        );
        assert_eq!(
            result.relocated_symbols.get("globalVariables").unwrap().gpu_address,
            0x1_0000_0000
        );
    }

    #[test]
    fn instruction_patching_uses_private_copies() {
        let original = vec![0xCCu8; 32];
        let input = input_with(
            &[(
                "fn_target",
                SymbolInfo {
                    offset: 8,
                    size: 8,
                    segment: SegmentType::Instructions,
                    instruction_segment_id: 1,
                    global: true,
                },
            )],
            vec![
                vec![reloc("fn_target", 0, RelocationKind::Address)],
                vec![],
            ],
            vec![],
            &["kernel_a", "helpers"],
        );
        let isa = [
            IsaSegment {
                gpu_address: 0x10_0000,
                data: &original,
            },
            IsaSegment {
                gpu_address: 0x20_0000,
                data: &[0u8; 64],
            },
        ];
        let mut kernels = [kernel("kernel_a", 96)];
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &LinkSegments::default(),
            &mut [],
            &mut [],
            &isa,
            &mut kernels,
            &mut [],
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::LinkedFully);
        // The source buffer is never mutated.
        assert!(original.iter().all(|&b| b == 0xCC));
        let patched = result.patched_isa[0].as_ref().unwrap();
        assert_eq!(
            u64::from_le_bytes(patched[0..8].try_into().unwrap()),
            0x20_0000 + 8
        );
        assert!(result.patched_isa[1].is_none());
    }

    #[test]
    fn builtin_symbols_resolve_from_device_constants() {
        let input = input_with(
            &[],
            vec![vec![
                reloc(SUB_DEVICE_ID_SYMBOL, 0, RelocationKind::AddressLow),
                reloc(PER_THREAD_OFF_SYMBOL, 4, RelocationKind::AddressLow),
                reloc("ignored", 8, RelocationKind::PerThreadPayloadOffset),
                reloc(IMPLICIT_ARGS_OFFSET_SYMBOL, 12, RelocationKind::AddressLow),
            ]],
            vec![],
            &["kernel_a"],
        );
        let isa = [IsaSegment {
            gpu_address: 0,
            data: &[0u8; 16],
        }];
        let mut kernels = [kernel("kernel_a", 160)];
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &LinkSegments::default(),
            &mut [],
            &mut [],
            &isa,
            &mut kernels,
            &mut [],
            &LinkerDeviceInfo { sub_device_id: 3 },
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::LinkedFully);
        let patched = result.patched_isa[0].as_ref().unwrap();
        assert_eq!(u32::from_le_bytes(patched[0..4].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(patched[4..8].try_into().unwrap()), 160);
        assert_eq!(u32::from_le_bytes(patched[8..12].try_into().unwrap()), 160);
        // Implicit-args sites are recorded, not patched.
        assert_eq!(u32::from_le_bytes(patched[12..16].try_into().unwrap()), 0);
        assert_eq!(result.implicit_args_relocations[0], vec![(12, RelocationKind::AddressLow)]);
    }

    #[test]
    fn unresolved_text_symbol_links_partially() {
        let input = input_with(
            &[],
            vec![vec![reloc("from_other_module", 0, RelocationKind::Address)]],
            vec![],
            &["kernel_a"],
        );
        let isa = [IsaSegment {
            gpu_address: 0,
            data: &[0u8; 16],
        }];
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &LinkSegments::default(),
            &mut [],
            &mut [],
            &isa,
            &mut [],
            &mut [],
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::LinkedPartially);
        assert_eq!(result.unresolved_externals.len(), 1);
        assert!(!result.unresolved_externals[0].is_required());

        let message = construct_linker_error_message(
            &result.unresolved_externals,
            &["kernel_a".to_string()],
        );
        assert!(message.contains("unresolved external symbol \"from_other_module\""));
        assert!(message.contains("instructions segment #0 (kernel_a)"));
    }

    #[test]
    fn unresolved_data_symbol_is_a_link_error() {
        let input = input_with(
            &[],
            vec![],
            vec![data_reloc(
                "ghost",
                0,
                RelocationKind::Address,
                SegmentType::GlobalConstants,
                0,
            )],
            &[],
        );
        let mut const_data = vec![0u8; 16];
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &LinkSegments::default(),
            &mut const_data,
            &mut [],
            &[],
            &mut [],
            &mut [],
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::Error);
        assert!(result.unresolved_externals[0].is_required());
    }

    #[test]
    fn symbol_out_of_segment_bounds_is_a_link_error() {
        let input = input_with(
            &[("big", data_symbol(SegmentType::GlobalConstants, 60, 16))],
            vec![],
            vec![],
            &[],
        );
        let segments = LinkSegments {
            global_constants: SegmentInfo {
                gpu_address: 0x1000,
                segment_size: 64,
            },
            ..Default::default()
        };
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &segments,
            &mut [],
            &mut [],
            &[],
            &mut [],
            &mut [],
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::Error);
        assert!(log.errors.contains("out of bounds of its segment"));
    }

    #[test]
    fn dependency_propagation_runs_during_link() {
        let mut input = input_with(&[], vec![vec![]], vec![], &["kernel_a"]);
        input.kernel_dependencies.push(KernelDependency {
            callee: "helper".to_string(),
            kernel_name: "kernel_a".to_string(),
            optional: false,
        });
        input.function_dependencies.push(FunctionDependency {
            callee: "leaf".to_string(),
            caller: "helper".to_string(),
            optional: false,
        });
        let mut functions = vec![
            ExternalFunctionInfo {
                function_name: "helper".to_string(),
                ..Default::default()
            },
            ExternalFunctionInfo {
                function_name: "leaf".to_string(),
                barrier_count: 2,
                uses_printf: true,
                ..Default::default()
            },
        ];
        let isa = [IsaSegment {
            gpu_address: 0,
            data: &[0u8; 4],
        }];
        let mut kernels = [kernel("kernel_a", 0)];
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &LinkSegments::default(),
            &mut [],
            &mut [],
            &isa,
            &mut kernels,
            &mut functions,
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::LinkedFully);
        assert_eq!(functions[0].barrier_count, 2);
        assert!(functions[0].uses_printf);
        assert_eq!(kernels[0].descriptor.attributes.barrier_count, 2);
        assert!(kernels[0].descriptor.attributes.flags.uses_printf);
    }

    #[test]
    fn missing_dependency_target_fails_the_link() {
        let mut input = input_with(&[], vec![], vec![], &[]);
        input.kernel_dependencies.push(KernelDependency {
            callee: "ghost".to_string(),
            kernel_name: "kernel_a".to_string(),
            optional: false,
        });
        let mut log = DecodeLog::new();
        let result = Linker::new(input).link(
            &LinkSegments::default(),
            &mut [],
            &mut [],
            &[],
            &mut [],
            &mut [],
            &LinkerDeviceInfo::default(),
            &mut log,
        );
        assert_eq!(result.status, LinkingStatus::Error);
        assert!(log.errors.contains("external function dependencies"));
    }

    #[test]
    fn debug_message_lists_relocated_symbols() {
        let mut map = RelocatedSymbolsMap::new();
        map.insert(
            "alpha".to_string(),
            RelocatedSymbol {
                symbol: data_symbol(SegmentType::GlobalConstants, 0, 4),
                gpu_address: 0xdead,
            },
        );
        let message = construct_relocations_debug_message(&map);
        assert!(message.starts_with("Relocations debug information :"));
        assert!(message.contains("symbol : alpha gpu address : 0xdead"));
    }
}
