//! zeInfo metadata schema: tag vocabulary, version handling and the raw
//! entry records the decoder reads before populating kernel descriptors.

use std::fmt;

use crate::error::{DecodeError, DecodeLog, ZE_INFO_PREFIX};

pub mod decoder;

pub use decoder::{decode_kernel_misc_info, decode_ze_info};

/// Metadata version this decoder implements.
pub const ZE_INFO_DECODER_VERSION: ZeInfoVersion = ZeInfoVersion { major: 1, minor: 39 };

/// `MAJOR.MINOR` version of the metadata schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeInfoVersion {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for ZeInfoVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl ZeInfoVersion {
    /// Parses a `MAJOR.MINOR` string. The error is a ready-to-log message.
    pub fn parse(text: &str) -> Result<Self, String> {
        let parse = || {
            let (major, minor) = text.split_once('.')?;
            Some(ZeInfoVersion {
                major: major.parse().ok()?,
                minor: minor.parse().ok()?,
            })
        };
        parse().ok_or_else(|| {
            format!("{ZE_INFO_PREFIX}Invalid version format : {text}, expected 'MAJOR.MINOR' string.")
        })
    }

    /// Applies the compatibility rules against the decoder's own version:
    /// the major version must match exactly, a newer minor version only
    /// warns, an older minor version is silently fine.
    pub fn validate(self, log: &mut DecodeLog) -> Result<(), DecodeError> {
        let decoder = ZE_INFO_DECODER_VERSION;
        if self.major != decoder.major {
            log.error(format!(
                "{ZE_INFO_PREFIX}Unhandled major version : {}, decoder is at : {}",
                self.major, decoder.major
            ));
            return Err(DecodeError::UnhandledBinary);
        }
        if self.minor > decoder.minor {
            log.warn(format!(
                "{ZE_INFO_PREFIX}Minor version : {} is newer than decoder's : {}, some features may be skipped",
                self.minor, decoder.minor
            ));
        }
        Ok(())
    }
}

/// Key strings of the metadata grammar.
pub mod tags {
    pub const VERSION: &str = "version";
    pub const KERNELS: &str = "kernels";
    pub const FUNCTIONS: &str = "functions";
    pub const KERNELS_MISC_INFO: &str = "kernels_misc_info";
    pub const GLOBAL_HOST_ACCESS_TABLE: &str = "global_host_access_table";

    pub const NAME: &str = "name";
    pub const USER_ATTRIBUTES: &str = "user_attributes";
    pub const EXECUTION_ENV: &str = "execution_env";
    pub const DEBUG_ENV: &str = "debug_env";
    pub const PAYLOAD_ARGUMENTS: &str = "payload_arguments";
    pub const PER_THREAD_PAYLOAD_ARGUMENTS: &str = "per_thread_payload_arguments";
    pub const BINDING_TABLE_INDICES: &str = "binding_table_indices";
    pub const PER_THREAD_MEMORY_BUFFERS: &str = "per_thread_memory_buffers";

    // execution_env
    pub const BARRIER_COUNT: &str = "barrier_count";
    pub const DISABLE_MID_THREAD_PREEMPTION: &str = "disable_mid_thread_preemption";
    pub const GRF_COUNT: &str = "grf_count";
    pub const HAS_4GB_BUFFERS: &str = "has_4gb_buffers";
    pub const HAS_DPAS: &str = "has_dpas";
    pub const HAS_STACK_CALLS: &str = "has_stack_calls";
    pub const HAS_RTCALLS: &str = "has_rtcalls";
    pub const HAS_PRINTF_CALLS: &str = "has_printf_calls";
    pub const HAS_INDIRECT_CALLS: &str = "has_indirect_calls";
    pub const HAS_INDIRECT_STATELESS_ACCESS: &str = "has_indirect_stateless_access";
    pub const HAS_NO_STATELESS_WRITE: &str = "has_no_stateless_write";
    pub const INLINE_DATA_PAYLOAD_SIZE: &str = "inline_data_payload_size";
    pub const OFFSET_TO_SKIP_PER_THREAD_DATA_LOAD: &str = "offset_to_skip_per_thread_data_load";
    pub const OFFSET_TO_SKIP_SET_FFID_GP: &str = "offset_to_skip_set_ffid_gp";
    pub const REQUIRED_SUB_GROUP_SIZE: &str = "required_sub_group_size";
    pub const REQUIRED_WORK_GROUP_SIZE: &str = "required_work_group_size";
    pub const SIMD_SIZE: &str = "simd_size";
    pub const SLM_SIZE: &str = "slm_size";
    pub const SUBGROUP_INDEPENDENT_FORWARD_PROGRESS: &str = "subgroup_independent_forward_progress";
    pub const THREAD_SCHEDULING_MODE: &str = "thread_scheduling_mode";
    pub const WORK_GROUP_WALK_ORDER_DIMENSIONS: &str = "work_group_walk_order_dimensions";
    pub const INDIRECT_STATELESS_COUNT: &str = "indirect_stateless_count";
    pub const EU_THREAD_COUNT: &str = "eu_thread_count";

    // debug_env
    pub const SIP_SURFACE_BTI: &str = "sip_surface_bti";

    // payload arguments
    pub const ARG_TYPE: &str = "arg_type";
    pub const ARG_INDEX: &str = "arg_index";
    pub const OFFSET: &str = "offset";
    pub const SIZE: &str = "size";
    pub const ADDRMODE: &str = "addrmode";
    pub const ADDRSPACE: &str = "addrspace";
    pub const ACCESS_TYPE: &str = "access_type";
    pub const SAMPLER_INDEX: &str = "sampler_index";
    pub const SOURCE_OFFSET: &str = "source_offset";
    pub const SLM_ARGUMENT_ALIGNMENT: &str = "slm_argument_alignment";

    // binding_table_indices
    pub const BTI_VALUE: &str = "bti_value";

    // per_thread_memory_buffers
    pub const ALLOCATION_TYPE: &str = "type";
    pub const MEMORY_USAGE: &str = "usage";
    pub const SLOT: &str = "slot";
    pub const IS_SIMT_THREAD: &str = "is_simt_thread";

    // kernels_misc_info
    pub const ARGS_INFO: &str = "args_info";
    pub const INDEX: &str = "index";
    pub const ADDRESS_QUALIFIER: &str = "address_qualifier";
    pub const ACCESS_QUALIFIER: &str = "access_qualifier";
    pub const TYPE_NAME: &str = "type_name";
    pub const TYPE_QUALIFIERS: &str = "type_qualifiers";

    // global_host_access_table
    pub const DEVICE_NAME: &str = "device_name";
    pub const HOST_NAME: &str = "host_name";
}

/// Raw `execution_env` record with producer defaults.
#[derive(Debug, Clone)]
pub struct ZeInfoExecutionEnv {
    pub barrier_count: u32,
    pub disable_mid_thread_preemption: bool,
    pub grf_count: u32,
    pub has_4gb_buffers: bool,
    pub has_dpas: bool,
    pub has_stack_calls: bool,
    pub has_rtcalls: bool,
    pub has_printf_calls: bool,
    pub has_indirect_calls: bool,
    pub has_indirect_stateless_access: bool,
    pub has_no_stateless_write: bool,
    pub inline_data_payload_size: u32,
    pub offset_to_skip_per_thread_data_load: u32,
    pub offset_to_skip_set_ffid_gp: u32,
    pub required_sub_group_size: u32,
    pub required_work_group_size: [u32; 3],
    pub simd_size: u32,
    pub slm_size: u32,
    pub subgroup_independent_forward_progress: bool,
    pub thread_scheduling_mode: Option<String>,
    pub work_group_walk_order_dimensions: [u32; 3],
    pub indirect_stateless_count: u32,
    pub eu_thread_count: u32,
}

impl Default for ZeInfoExecutionEnv {
    fn default() -> Self {
        Self {
            barrier_count: 0,
            disable_mid_thread_preemption: false,
            grf_count: 128,
            has_4gb_buffers: false,
            has_dpas: false,
            has_stack_calls: false,
            has_rtcalls: false,
            has_printf_calls: false,
            has_indirect_calls: false,
            has_indirect_stateless_access: false,
            has_no_stateless_write: false,
            inline_data_payload_size: 0,
            offset_to_skip_per_thread_data_load: 0,
            offset_to_skip_set_ffid_gp: 0,
            required_sub_group_size: 0,
            required_work_group_size: [0; 3],
            simd_size: 8,
            slm_size: 0,
            subgroup_independent_forward_progress: false,
            thread_scheduling_mode: None,
            work_group_walk_order_dimensions: [0, 1, 2],
            indirect_stateless_count: 0,
            eu_thread_count: 0,
        }
    }
}

/// Raw payload-argument record.
#[derive(Debug, Clone)]
pub struct ZeInfoPayloadArgument {
    pub arg_type: String,
    pub offset: u32,
    pub size: u32,
    pub arg_index: i32,
    pub addrmode: Option<String>,
    pub addrspace: Option<String>,
    pub access_type: Option<String>,
    pub sampler_index: i32,
    pub source_offset: i32,
    pub slm_argument_alignment: u32,
    pub line: usize,
}

impl Default for ZeInfoPayloadArgument {
    fn default() -> Self {
        Self {
            arg_type: String::new(),
            offset: 0,
            size: 0,
            arg_index: -1,
            addrmode: None,
            addrspace: None,
            access_type: None,
            sampler_index: -1,
            source_offset: -1,
            slm_argument_alignment: 16,
            line: 0,
        }
    }
}

/// Raw per-thread payload argument record.
#[derive(Debug, Clone, Default)]
pub struct ZeInfoPerThreadPayloadArgument {
    pub arg_type: String,
    pub offset: u32,
    pub size: u32,
}

/// Raw binding-table entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeInfoBindingTableIndex {
    pub bti_value: u32,
    pub arg_index: u32,
}

/// Raw per-thread memory buffer record.
#[derive(Debug, Clone, Default)]
pub struct ZeInfoPerThreadMemoryBuffer {
    pub allocation_type: String,
    pub memory_usage: String,
    pub size: u32,
    pub slot: u32,
    pub is_simt_thread: bool,
}

/// Raw `args_info` entry of `kernels_misc_info`.
#[derive(Debug, Clone, Default)]
pub struct ZeInfoArgInfo {
    pub index: i32,
    pub name: String,
    pub address_qualifier: String,
    pub access_qualifier: String,
    pub type_name: String,
    pub type_qualifiers: String,
}
