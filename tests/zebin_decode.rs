//! End-to-end container scenarios: fabricate real zebin images with the
//! encoder and drive them through the full decode → link pipeline.

use object::elf as raw;

use zebin::elf::encoder::ElfEncoder;
use zebin::elf::{self, Elf64, SymbolValues};
use zebin::linker::{IsaSegment, LinkSegments, Linker, LinkerDeviceInfo, LinkingStatus, SegmentInfo};
use zebin::{decode_program, DecodeConfig, DecodeError, TargetDevice};

fn forced() -> DecodeConfig {
    DecodeConfig {
        force_device_compatibility: true,
        ..Default::default()
    }
}

fn intelgt_note(note_type: u32, desc: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
    out.extend_from_slice(&note_type.to_le_bytes());
    out.extend_from_slice(b"IntelGT\0");
    out.extend_from_slice(desc);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

#[test]
fn zebin_without_ze_info_decodes_with_a_warning() {
    let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
    enc.append_progbits(".text.lonely", &[0; 16], 16);
    let bytes = enc.encode();

    let out = decode_program(&bytes, &TargetDevice::default(), &forced());
    let program = out.program.expect("decode must succeed");
    assert!(program.kernel_infos.is_empty());
    assert!(out
        .warnings
        .contains("Expected at least one .ze_info section, got 0"));
    assert!(out.errors.is_empty());
}

#[test]
fn duplicate_kernels_blocks_are_invalid_with_exact_count() {
    let ze_info = "\
version: '1.39'
kernels:
  - name: a
    execution_env:
      simd_size: 8
kernels:
  - name: a
    execution_env:
      simd_size: 8
";
    let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
    enc.append_progbits(".text.a", &[0; 16], 16);
    enc.append_section(".ze_info", elf::SHT_ZEBIN_ZEINFO, ze_info.as_bytes());
    let bytes = enc.encode();

    let out = decode_program(&bytes, &TargetDevice::default(), &forced());
    assert_eq!(out.program.unwrap_err(), DecodeError::InvalidBinary);
    assert!(out.errors.contains("Expected at most 1 of kernels, got : 2"));
}

#[test]
fn four_cycle_dependency_graph_resolves_in_discovery_order() {
    let adjacency = vec![vec![1], vec![2], vec![3], vec![0]];
    assert_eq!(zebin::deps::resolve(&adjacency), vec![3, 2, 1, 0]);
}

#[test]
fn mixed_addressing_modes_fail_through_the_full_pipeline() {
    let ze_info = "\
version: '1.39'
kernels:
  - name: mixer
    execution_env:
      simd_size: 16
    payload_arguments:
      - arg_type: arg_bypointer
        offset: 0
        size: 8
        arg_index: 0
        addrmode: bindless
        addrspace: global
        access_type: readwrite
      - arg_type: arg_bypointer
        offset: 8
        size: 8
        arg_index: 1
        addrmode: stateful
        addrspace: global
        access_type: readonly
";
    let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
    enc.append_progbits(".text.mixer", &[0; 32], 16);
    enc.append_section(".ze_info", elf::SHT_ZEBIN_ZEINFO, ze_info.as_bytes());
    let bytes = enc.encode();

    let out = decode_program(&bytes, &TargetDevice::default(), &forced());
    assert_eq!(out.program.unwrap_err(), DecodeError::InvalidBinary);
    assert!(out
        .errors
        .contains("bindless and bindful addressing modes must not be mixed."));
}

/// Builds a two-kernel container with an external function, global constant
/// data, IntelGT notes and relocations tying everything together.
fn build_linked_container() -> Vec<u8> {
    let ze_info = "\
version: '1.39'
kernels:
  - name: scale
    execution_env:
      simd_size: 16
      grf_count: 128
    payload_arguments:
      - arg_type: arg_bypointer
        offset: 0
        size: 8
        arg_index: 0
        addrmode: stateless
        addrspace: global
        access_type: readwrite
  - name: offset
    execution_env:
      simd_size: 32
functions:
  - name: fn_helper
    execution_env:
      grf_count: 128
      simd_size: 16
      barrier_count: 2
      has_printf_calls: true
global_host_access_table:
  - device_name: dev_counter
    host_name: counter
";
    let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
    let text_scale = enc.append_progbits(".text.scale", &[0x22; 64], 16);
    let _text_offset = enc.append_progbits(".text.offset", &[0x33; 32], 16);
    let text_ext = enc.append_progbits(".text.Intel_Symbol_Table_Void_Program", &[0x44; 48], 16);
    let data_const = enc.append_progbits(".data.const", &[0u8; 32], 8);
    enc.append_section(".ze_info", elf::SHT_ZEBIN_ZEINFO, ze_info.as_bytes());

    let mut notes = Vec::new();
    notes.extend_from_slice(&intelgt_note(1, &42u32.to_le_bytes()));
    notes.extend_from_slice(&intelgt_note(4, b"1.39\0"));
    enc.append_section(".note.intelgt.compat", raw::SHT_NOTE, &notes);

    enc.begin_symtab();
    let fn_helper = enc.append_symbol(
        "fn_helper",
        SymbolValues {
            info: (raw::STB_GLOBAL << 4) | raw::STT_FUNC,
            shndx: text_ext as u16,
            value: 0,
            size: 48,
            ..Default::default()
        },
    ) as u32;
    let const_sym = enc.append_symbol(
        "lookup_table",
        SymbolValues {
            info: (raw::STB_GLOBAL << 4) | raw::STT_OBJECT,
            shndx: data_const as u16,
            value: 8,
            size: 16,
            ..Default::default()
        },
    ) as u32;
    // scale calls fn_helper and loads from the constant surface.
    enc.append_rela(".rela.text.scale", text_scale, 8, fn_helper, elf::R_ZE_SYM_ADDR, 0);
    enc.append_rela(".rela.text.scale", text_scale, 16, const_sym, elf::R_ZE_SYM_ADDR_32, 4);
    // The constant surface holds a pointer to fn_helper.
    enc.append_rela(".rela.data.const", data_const, 0, fn_helper, elf::R_ZE_SYM_ADDR, 0);
    enc.encode()
}

#[test]
fn full_pipeline_decodes_links_and_propagates_attributes() {
    let bytes = build_linked_container();
    let target = TargetDevice {
        product_family: zebin::ProductFamily(42),
        ..Default::default()
    };
    let out = decode_program(&bytes, &target, &DecodeConfig::default());
    assert!(out.errors.is_empty(), "unexpected errors: {}", out.errors);
    let mut program = out.program.unwrap();

    assert_eq!(program.kernel_infos.len(), 2);
    assert_eq!(program.external_functions.len(), 1);
    assert_eq!(
        program.globals_device_to_host_name_map.get("dev_counter"),
        Some(&"counter".to_string())
    );
    assert_eq!(program.global_constants.size, 32);

    let input = program.linker_input.take().expect("linker input");
    assert_eq!(input.instruction_segment_names, vec!["scale", "offset", "Intel_Symbol_Table_Void_Program"]);
    assert_eq!(input.exported_functions_segment_id, Some(2));
    assert_eq!(input.kernel_dependencies.len(), 1);
    assert_eq!(input.kernel_dependencies[0].callee, "fn_helper");

    let isa_scale = program.kernel_infos[0].heap.kernel_isa;
    let isa_offset = program.kernel_infos[1].heap.kernel_isa;
    let ext_fns = [0x44u8; 48];
    let isa = [
        IsaSegment { gpu_address: 0x10_0000, data: isa_scale },
        IsaSegment { gpu_address: 0x11_0000, data: isa_offset },
        IsaSegment { gpu_address: 0x12_0000, data: &ext_fns },
    ];
    let segments = LinkSegments {
        global_constants: SegmentInfo {
            gpu_address: 0x2000_0000,
            segment_size: 32,
        },
        exported_functions: SegmentInfo {
            gpu_address: 0x12_0000,
            segment_size: 48,
        },
        ..Default::default()
    };
    let mut const_data = program.global_constants.init_data.to_vec();
    let mut var_data = Vec::new();
    let mut log = zebin::DecodeLog::new();
    let (mut kernels, mut functions) = (
        std::mem::take(&mut program.kernel_infos),
        std::mem::take(&mut program.external_functions),
    );
    let result = Linker::new(input).link(
        &segments,
        &mut const_data,
        &mut var_data,
        &isa,
        &mut kernels,
        &mut functions,
        &LinkerDeviceInfo::default(),
        &mut log,
    );
    assert_eq!(result.status, LinkingStatus::LinkedFully);
    assert!(result.unresolved_externals.is_empty());

    // fn_helper resolves into the external-functions segment.
    let patched = result.patched_isa[0].as_ref().unwrap();
    assert_eq!(
        u64::from_le_bytes(patched[8..16].try_into().unwrap()),
        0x12_0000
    );
    // lookup_table's low 32 bits with addend 4.
    assert_eq!(
        u32::from_le_bytes(patched[16..20].try_into().unwrap()),
        0x2000_0000u32 + 8 + 4
    );
    // The source container was never touched; the data surface was.
    assert_eq!(isa_scale[8..16], [0x22; 8]);
    assert_eq!(
        u64::from_le_bytes(const_data[0..8].try_into().unwrap()),
        0x12_0000
    );
    // The second kernel had no relocations: original bytes get uploaded.
    assert!(result.patched_isa[1].is_none());

    // Call-graph attributes flowed from fn_helper into the kernel.
    assert_eq!(kernels[0].descriptor.attributes.barrier_count, 2);
    assert!(kernels[0].descriptor.attributes.flags.uses_printf);
    assert_eq!(kernels[1].descriptor.attributes.barrier_count, 0);
}

#[test]
fn wrong_device_is_unhandled_without_force() {
    let bytes = build_linked_container();
    let target = TargetDevice {
        product_family: zebin::ProductFamily(7),
        ..Default::default()
    };
    let out = decode_program(&bytes, &target, &DecodeConfig::default());
    assert_eq!(out.program.unwrap_err(), DecodeError::UnhandledBinary);
    assert!(out.errors.contains("Unhandled target device"));
}

#[test]
fn thirty_two_bit_container_round_trips() {
    use zebin::elf::Elf32;
    let ze_info = "\
version: '1.39'
kernels:
  - name: tiny
    execution_env:
      simd_size: 8
";
    let mut enc = ElfEncoder::<Elf32>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
    enc.append_progbits(".text.tiny", &[9; 16], 16);
    enc.append_section(".ze_info", elf::SHT_ZEBIN_ZEINFO, ze_info.as_bytes());
    let bytes = enc.encode();

    let out = decode_program(&bytes, &TargetDevice::default(), &forced());
    let program = out.program.unwrap();
    assert_eq!(program.kernel_infos.len(), 1);
    assert_eq!(program.kernel_infos[0].heap.kernel_isa, &[9; 16]);

    // A 32-bit-pointer device cannot consume a 64-bit container.
    let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
    enc.append_progbits(".text.tiny", &[9; 16], 16);
    enc.append_section(".ze_info", elf::SHT_ZEBIN_ZEINFO, ze_info.as_bytes());
    enc.append_section(
        ".note.intelgt.compat",
        raw::SHT_NOTE,
        &intelgt_note(1, &42u32.to_le_bytes()),
    );
    let bytes64 = enc.encode();
    let narrow_device = TargetDevice {
        product_family: zebin::ProductFamily(42),
        max_pointer_size_in_bytes: 4,
        ..Default::default()
    };
    let out = decode_program(&bytes64, &narrow_device, &DecodeConfig::default());
    assert_eq!(out.program.unwrap_err(), DecodeError::UnhandledBinary);
}
