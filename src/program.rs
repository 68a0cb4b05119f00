//! Decoded program and kernel descriptors.
//!
//! [`ProgramInfo`] is the whole-program decode result: global data surfaces,
//! one [`KernelInfo`] per kernel named by the metadata, external-function
//! records and the optional [`LinkerInput`](crate::linker_input::LinkerInput).
//! It borrows the container for ISA and data spans and owns everything it
//! generated itself (descriptors, surface/dynamic state heap images).

use std::collections::BTreeMap;

use crate::linker_input::LinkerInput;

/// Size of one surface-state entry in a generated surface state heap.
pub const SURFACE_STATE_SIZE: u32 = 64;
/// Size of one binding-table entry (a dword offset into the heap).
pub const BINDING_TABLE_ENTRY_SIZE: u32 = 4;
/// Size of one sampler-state entry in a generated dynamic state heap.
pub const SAMPLER_STATE_SIZE: u32 = 16;
/// Size (and alignment) of the border-color state preceding sampler states.
pub const SAMPLER_BORDER_COLOR_SIZE: u32 = 64;

/// Offset into the cross-thread data payload.
pub type CrossThreadDataOffset = Option<u16>;
/// Offset into a generated surface-state heap.
pub type SurfaceStateOffset = Option<u32>;

/// One global data surface (constants, variables or strings).
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalSurfaceInfo<'d> {
    /// Initialized bytes from the container; empty for zero-init only surfaces.
    pub init_data: &'d [u8],
    /// Total surface size: initialized bytes plus zero-init tail.
    pub size: u64,
    pub zero_init_size: u64,
}

/// Address-space qualifier of an explicit argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressSpace {
    #[default]
    Unknown,
    Global,
    Constant,
    Local,
    Image,
    Sampler,
}

/// Access qualifier of an explicit argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessQualifier {
    #[default]
    Unknown,
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Pointer argument payload bindings. Exactly one addressing mode is
/// populated per argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgDescPointer {
    pub stateless: CrossThreadDataOffset,
    pub bindful: SurfaceStateOffset,
    pub bindless: CrossThreadDataOffset,
    pub buffer_offset: CrossThreadDataOffset,
    pub pointer_size: u8,
    pub slm_offset: CrossThreadDataOffset,
    pub required_slm_alignment: u32,
    pub accessed_using_statelessly: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArgDescImage {
    pub bindful: SurfaceStateOffset,
    pub bindless: CrossThreadDataOffset,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArgDescSampler {
    /// Offset into the generated dynamic state heap.
    pub bindful: Option<u32>,
    pub bindless: CrossThreadDataOffset,
    pub sampler_index: Option<u32>,
}

/// One flat element of a by-value argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArgValueElement {
    pub offset: u16,
    pub size: u16,
    pub source_offset: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ArgDescValue {
    pub elements: Vec<ArgValueElement>,
}

/// Kind-specific part of an explicit argument.
#[derive(Debug, Clone, Default)]
pub enum ArgDescriptor {
    #[default]
    Unknown,
    Pointer(ArgDescPointer),
    Image(ArgDescImage),
    Sampler(ArgDescSampler),
    Value(ArgDescValue),
}

impl ArgDescriptor {
    pub fn as_pointer_mut(&mut self) -> Option<&mut ArgDescPointer> {
        match self {
            ArgDescriptor::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_pointer_or_image(&self) -> bool {
        matches!(self, ArgDescriptor::Pointer(_) | ArgDescriptor::Image(_))
    }
}

/// One explicit kernel argument with its qualifiers.
#[derive(Debug, Clone, Default)]
pub struct ExplicitArg {
    pub descriptor: ArgDescriptor,
    pub address_space: AddressSpace,
    pub access: AccessQualifier,
}

/// Introspection metadata for one argument, from `kernels_misc_info`.
#[derive(Debug, Clone, Default)]
pub struct ArgTypeMetadataExtended {
    pub arg_name: String,
    pub address_qualifier: String,
    pub access_qualifier: String,
    pub type_name: String,
    pub type_qualifiers: String,
}

/// Work-dispatch payload offsets, one slot per dimension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchTraits {
    pub global_work_offset: [CrossThreadDataOffset; 3],
    pub local_work_size: [CrossThreadDataOffset; 3],
    pub enqueued_local_work_size: [CrossThreadDataOffset; 3],
    pub global_work_size: [CrossThreadDataOffset; 3],
    pub num_work_groups: [CrossThreadDataOffset; 3],
    pub work_dim: CrossThreadDataOffset,
}

/// Implicit (non-user-visible) payload arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitArgs {
    pub printf_surface: ArgDescPointer,
    pub private_memory: ArgDescPointer,
    pub global_constants_surface: ArgDescPointer,
    pub global_variables_surface: ArgDescPointer,
    pub implicit_args_buffer: CrossThreadDataOffset,
    /// Bindful surface-state offset of the system-thread (SIP) surface.
    pub system_thread_surface: SurfaceStateOffset,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BindingTable {
    pub table_offset: u32,
    pub num_entries: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerTable {
    pub table_offset: u32,
    pub num_samplers: u32,
    pub border_color_offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PayloadMappings {
    pub dispatch: DispatchTraits,
    pub implicit: ImplicitArgs,
    pub explicit_args: Vec<ExplicitArg>,
    pub explicit_args_extended_metadata: Vec<ArgTypeMetadataExtended>,
    pub binding_table: BindingTable,
    pub sampler_table: SamplerTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadSchedulingMode {
    #[default]
    Default,
    AgeBased,
    RoundRobin,
    RoundRobinStall,
}

/// Boolean kernel traits, mostly call-graph derived.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelAttributeFlags {
    pub uses_printf: bool,
    pub has_rt_calls: bool,
    pub has_indirect_calls: bool,
    pub has_indirect_stateless_access: bool,
    pub uses_stack_calls: bool,
    pub uses_systolic_pipeline: bool,
    pub uses_4gb_buffers: bool,
    pub has_stateless_writes: bool,
    pub requires_disabled_mid_thread_preemption: bool,
    pub requires_subgroup_independent_forward_progress: bool,
    pub requires_implicit_args_buffer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct KernelAttributes {
    pub simd_size: u32,
    pub num_grf_required: u32,
    pub barrier_count: u32,
    pub required_work_group_size: [u32; 3],
    pub work_group_walk_order: [u32; 3],
    pub slm_inline_size: u32,
    pub inline_data_payload_size: u32,
    pub cross_thread_data_size: u32,
    pub per_thread_data_size: u32,
    pub num_local_id_channels: u32,
    pub eu_thread_count: u32,
    /// Per-thread scratch, one value per scratch slot.
    pub per_thread_scratch_size: [u32; 2],
    pub per_hw_thread_private_memory_size: u32,
    pub indirect_stateless_count: u32,
    pub thread_scheduling_mode: ThreadSchedulingMode,
    pub flags: KernelAttributeFlags,
}

/// Kernel source-level metadata.
#[derive(Debug, Clone, Default)]
pub struct KernelMetadata {
    pub kernel_name: String,
    /// Source attributes rendered as one language-attribute string.
    pub language_attributes: String,
    pub required_sub_group_size: u32,
    pub work_group_size_hint: [u32; 3],
    /// Marked unrunnable by the compiler (decode still succeeds).
    pub is_invalid: bool,
}

/// Instruction-pointer offsets into the kernel ISA.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelEntryPoints {
    pub skip_per_thread_data_load: u32,
    pub skip_set_ffid_gp: u32,
}

/// Full ABI description of one kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelDescriptor {
    pub metadata: KernelMetadata,
    pub attributes: KernelAttributes,
    pub payload: PayloadMappings,
    pub entry_points: KernelEntryPoints,
}

/// ISA bytes plus the heaps generated while decoding the kernel's metadata.
#[derive(Debug, Clone, Default)]
pub struct KernelHeapInfo<'d> {
    pub kernel_isa: &'d [u8],
    pub surface_state_heap: Vec<u8>,
    pub dynamic_state_heap: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct KernelInfo<'d> {
    pub descriptor: KernelDescriptor,
    pub heap: KernelHeapInfo<'d>,
    pub gtpin_info: Option<&'d [u8]>,
}

/// A callable non-kernel function, populated from the `functions:` metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalFunctionInfo {
    pub function_name: String,
    pub num_grf_required: u32,
    pub simd_size: u32,
    pub barrier_count: u32,
    pub has_rt_calls: bool,
    pub uses_printf: bool,
    pub has_indirect_calls: bool,
}

/// Whole-program decode result; exclusively owned by the caller.
#[derive(Debug, Default)]
pub struct ProgramInfo<'d> {
    pub global_constants: GlobalSurfaceInfo<'d>,
    pub global_variables: GlobalSurfaceInfo<'d>,
    pub global_strings: GlobalSurfaceInfo<'d>,
    pub kernel_infos: Vec<KernelInfo<'d>>,
    pub external_functions: Vec<ExternalFunctionInfo>,
    pub linker_input: Option<LinkerInput>,
    /// Device-mangled to host-visible global variable names.
    pub globals_device_to_host_name_map: BTreeMap<String, String>,
    pub build_options: Option<&'d str>,
    pub spirv: Option<&'d [u8]>,
    /// The raw metadata text, kept for lazy misc-info decoding.
    pub ze_info: Option<&'d str>,
    kernel_misc_info_position: Option<usize>,
    pub indirect_detection_version: u32,
    pub indirect_access_buffer_major_version: u32,
}

impl<'d> ProgramInfo<'d> {
    /// Records where `kernels_misc_info` starts inside the metadata blob, for
    /// the lazy introspection decode.
    pub fn set_kernel_misc_info_position(&mut self, offset: usize) {
        self.kernel_misc_info_position = Some(offset);
    }

    pub fn kernel_misc_info_position(&self) -> Option<usize> {
        self.kernel_misc_info_position
    }

    pub fn kernel_info_mut(&mut self, name: &str) -> Option<&mut KernelInfo<'d>> {
        self.kernel_infos
            .iter_mut()
            .find(|k| k.descriptor.metadata.kernel_name == name)
    }
}
