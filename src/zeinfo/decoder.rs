//! zeInfo metadata decoder.
//!
//! Walks the parsed metadata tree and populates [`ProgramInfo`]: one
//! [`KernelInfo`] per `kernels:` entry, external functions from
//! `functions:`, the device→host global name table, and the lazily decoded
//! `kernels_misc_info` introspection block.

use crate::config::DecodeConfig;
use crate::error::{DecodeError, DecodeLog, ZE_INFO_PREFIX};
use crate::program::{
    AccessQualifier, AddressSpace, ArgDescImage, ArgDescPointer, ArgDescSampler, ArgDescValue,
    ArgDescriptor, ArgTypeMetadataExtended, ArgValueElement, ExplicitArg, ExternalFunctionInfo,
    KernelDescriptor, KernelInfo, ProgramInfo, ThreadSchedulingMode, BINDING_TABLE_ENTRY_SIZE,
    SAMPLER_BORDER_COLOR_SIZE, SAMPLER_STATE_SIZE, SURFACE_STATE_SIZE,
};
use crate::utils::align_up;
use crate::yaml::{self, Value};
use crate::zeinfo::{
    tags, ZeInfoArgInfo, ZeInfoBindingTableIndex, ZeInfoExecutionEnv, ZeInfoPayloadArgument,
    ZeInfoPerThreadMemoryBuffer, ZeInfoPerThreadPayloadArgument, ZeInfoVersion,
    ZE_INFO_DECODER_VERSION,
};

const CROSS_THREAD_DATA_ALIGNMENT: u32 = 32;

/// Decodes the `.ze_info` text into `program`. `text` must outlive the
/// program info; it is retained for the lazy misc-info decode.
pub fn decode_ze_info<'d>(
    program: &mut ProgramInfo<'d>,
    text: &'d str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    program.ze_info = Some(text);
    let root = parse_document(text, log)?;
    let Some(entries) = root.as_mapping() else {
        log.error(format!(
            "{ZE_INFO_PREFIX}Expected a mapping at the global scope of .ze_info"
        ));
        return Err(DecodeError::InvalidBinary);
    };
    if entries.is_empty() {
        log.error(format!("{ZE_INFO_PREFIX}Empty kernels metadata section (.ze_info)"));
        return Err(DecodeError::InvalidBinary);
    }

    let mut version_node: Option<&Value> = None;
    let mut kernels_node: Option<&Value> = None;
    let mut functions_node: Option<&Value> = None;
    let mut host_access_node: Option<&Value> = None;
    let mut counts = [0usize; 5];
    for entry in entries {
        match entry.key {
            tags::VERSION => {
                counts[0] += 1;
                version_node = Some(&entry.value);
            }
            tags::KERNELS => {
                counts[1] += 1;
                kernels_node = Some(&entry.value);
            }
            tags::FUNCTIONS => {
                counts[2] += 1;
                functions_node = Some(&entry.value);
            }
            tags::KERNELS_MISC_INFO => {
                counts[3] += 1;
            }
            tags::GLOBAL_HOST_ACCESS_TABLE => {
                counts[4] += 1;
                host_access_node = Some(&entry.value);
            }
            unknown => unknown_attribute(unknown, "global scope", config, log)?,
        }
    }
    let keys = [
        tags::VERSION,
        tags::KERNELS,
        tags::FUNCTIONS,
        tags::KERNELS_MISC_INFO,
        tags::GLOBAL_HOST_ACCESS_TABLE,
    ];
    let mut over_limit = false;
    for (count, key) in counts.iter().zip(keys) {
        if *count > 1 {
            over_limit = true;
            log.error(format!("{ZE_INFO_PREFIX}Expected at most 1 of {key}, got : {count}"));
        }
    }
    if over_limit {
        return Err(DecodeError::InvalidBinary);
    }

    match version_node {
        Some(node) => {
            let scalar = node.as_scalar().ok_or_else(|| {
                read_error(tags::VERSION, "<non-scalar>", "global scope", log)
            })?;
            let version = ZeInfoVersion::parse(scalar.value()).map_err(|message| {
                log.error(message);
                DecodeError::InvalidBinary
            })?;
            version.validate(log)?;
        }
        None => log.warn(format!(
            "{ZE_INFO_PREFIX}No version info provided (i.e. no version entry in global scope of ze_info), will use decoder's default : '{ZE_INFO_DECODER_VERSION}'"
        )),
    }

    let Some(kernels) = kernels_node else {
        log.error(format!("{ZE_INFO_PREFIX}Expected exactly 1 of kernels, got : 0"));
        return Err(DecodeError::InvalidBinary);
    };
    let Some(kernel_items) = kernels.as_sequence() else {
        return Err(read_error(tags::KERNELS, "<non-sequence>", "global scope", log));
    };
    for item in kernel_items {
        let kernel = decode_kernel(item, config, log)?;
        program.kernel_infos.push(kernel);
    }

    if let Some(functions) = functions_node {
        let Some(items) = functions.as_sequence() else {
            return Err(read_error(tags::FUNCTIONS, "<non-sequence>", "global scope", log));
        };
        for item in items {
            let function = decode_function(item, config, log)?;
            program.external_functions.push(function);
        }
    }

    if counts[3] > 0 {
        if let Some(offset) = yaml::top_level_key_offset(text, tags::KERNELS_MISC_INFO) {
            program.set_kernel_misc_info_position(offset);
        }
    }

    if let Some(table) = host_access_node {
        decode_global_host_access_table(program, table, config, log)?;
    }
    Ok(())
}

/// Lazily decodes `kernels_misc_info` (argument names and qualifiers) from
/// the position recorded during the main decode. Kept separate so exotic
/// introspection content never aborts kernel decoding.
pub fn decode_kernel_misc_info(
    program: &mut ProgramInfo<'_>,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let Some(position) = program.kernel_misc_info_position() else {
        return Ok(());
    };
    let Some(text) = program.ze_info else {
        return Ok(());
    };
    let tail = text.get(position..).ok_or_else(|| {
        log.error(format!("{ZE_INFO_PREFIX}Invalid kernels_misc_info offset : {position}"));
        DecodeError::InvalidBinary
    })?;
    let root = parse_document(tail, log)?;
    let entries = root.as_mapping().unwrap_or(&[]);
    let Some(misc) = entries.iter().find(|e| e.key == tags::KERNELS_MISC_INFO) else {
        return Ok(());
    };
    let Some(items) = misc.value.as_sequence() else {
        return Err(read_error(tags::KERNELS_MISC_INFO, "<non-sequence>", "global scope", log));
    };
    for item in items {
        let Some(kernel_entries) = item.as_mapping() else {
            return Err(read_error(tags::KERNELS_MISC_INFO, "<non-mapping>", "kernels_misc_info", log));
        };
        let mut name = String::new();
        let mut args = Vec::new();
        for entry in kernel_entries {
            match entry.key {
                tags::NAME => name = read_string(&entry.value, tags::NAME, "kernels_misc_info", log)?,
                tags::ARGS_INFO => {
                    let Some(infos) = entry.value.as_sequence() else {
                        return Err(read_error(tags::ARGS_INFO, "<non-sequence>", "kernels_misc_info", log));
                    };
                    for info in infos {
                        args.push(decode_arg_info(info, log)?);
                    }
                }
                unknown => log.warn(format!(
                    "{ZE_INFO_PREFIX}Unknown attribute : {unknown} in context of : kernels_misc_info"
                )),
            }
        }
        let Some(kernel) = program.kernel_info_mut(&name) else {
            log.error(format!(
                "{ZE_INFO_PREFIX}Could not find kernel {name} while decoding kernels_misc_info"
            ));
            return Err(DecodeError::InvalidBinary);
        };
        let metadata = &mut kernel.descriptor.payload.explicit_args_extended_metadata;
        for info in args {
            let index = usize::try_from(info.index).map_err(|_| {
                read_error(tags::INDEX, &info.index.to_string(), "args_info", log)
            })?;
            if metadata.len() <= index {
                metadata.resize_with(index + 1, Default::default);
            }
            metadata[index] = ArgTypeMetadataExtended {
                arg_name: info.name,
                address_qualifier: info.address_qualifier,
                access_qualifier: info.access_qualifier,
                type_name: info.type_name,
                type_qualifiers: info.type_qualifiers,
            };
        }
    }
    Ok(())
}

fn decode_arg_info(item: &Value, log: &mut DecodeLog) -> Result<ZeInfoArgInfo, DecodeError> {
    let Some(entries) = item.as_mapping() else {
        return Err(read_error(tags::ARGS_INFO, "<non-mapping>", "args_info", log));
    };
    let mut info = ZeInfoArgInfo::default();
    for entry in entries {
        match entry.key {
            tags::INDEX => info.index = read_i32(&entry.value, tags::INDEX, "args_info", log)?,
            tags::NAME => info.name = read_string(&entry.value, tags::NAME, "args_info", log)?,
            tags::ADDRESS_QUALIFIER => {
                info.address_qualifier =
                    read_string(&entry.value, tags::ADDRESS_QUALIFIER, "args_info", log)?
            }
            tags::ACCESS_QUALIFIER => {
                info.access_qualifier =
                    read_string(&entry.value, tags::ACCESS_QUALIFIER, "args_info", log)?
            }
            tags::TYPE_NAME => {
                info.type_name = read_string(&entry.value, tags::TYPE_NAME, "args_info", log)?
            }
            tags::TYPE_QUALIFIERS => {
                info.type_qualifiers =
                    read_string(&entry.value, tags::TYPE_QUALIFIERS, "args_info", log)?
            }
            unknown => log.warn(format!(
                "{ZE_INFO_PREFIX}Unknown attribute : {unknown} in context of : args_info"
            )),
        }
    }
    Ok(info)
}

fn decode_global_host_access_table(
    program: &mut ProgramInfo<'_>,
    table: &Value,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let Some(items) = table.as_sequence() else {
        return Err(read_error(tags::GLOBAL_HOST_ACCESS_TABLE, "<non-sequence>", "global scope", log));
    };
    for item in items {
        let Some(entries) = item.as_mapping() else {
            return Err(read_error(
                tags::GLOBAL_HOST_ACCESS_TABLE,
                "<non-mapping>",
                tags::GLOBAL_HOST_ACCESS_TABLE,
                log,
            ));
        };
        let mut device_name = String::new();
        let mut host_name = String::new();
        for entry in entries {
            match entry.key {
                tags::DEVICE_NAME => {
                    device_name =
                        read_string(&entry.value, tags::DEVICE_NAME, tags::GLOBAL_HOST_ACCESS_TABLE, log)?
                }
                tags::HOST_NAME => {
                    host_name =
                        read_string(&entry.value, tags::HOST_NAME, tags::GLOBAL_HOST_ACCESS_TABLE, log)?
                }
                unknown => {
                    unknown_attribute(unknown, tags::GLOBAL_HOST_ACCESS_TABLE, config, log)?
                }
            }
        }
        program
            .globals_device_to_host_name_map
            .insert(device_name, host_name);
    }
    Ok(())
}

fn decode_kernel<'d>(
    item: &Value,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<KernelInfo<'d>, DecodeError> {
    let Some(entries) = item.as_mapping() else {
        return Err(read_error(tags::KERNELS, "<non-mapping>", "kernels", log));
    };

    let mut name_node = None;
    let mut env_node = None;
    let mut attrs_node = None;
    let mut debug_env_node = None;
    let mut payload_node = None;
    let mut per_thread_node = None;
    let mut bti_node = None;
    let mut buffers_node = None;
    let mut counts = std::collections::BTreeMap::<&str, usize>::new();
    for entry in entries {
        *counts.entry(entry.key).or_default() += 1;
        match entry.key {
            tags::NAME => name_node = Some(&entry.value),
            tags::EXECUTION_ENV => env_node = Some(&entry.value),
            tags::USER_ATTRIBUTES => attrs_node = Some(&entry.value),
            tags::DEBUG_ENV => debug_env_node = Some(&entry.value),
            tags::PAYLOAD_ARGUMENTS => payload_node = Some(&entry.value),
            tags::PER_THREAD_PAYLOAD_ARGUMENTS => per_thread_node = Some(&entry.value),
            tags::BINDING_TABLE_INDICES => bti_node = Some(&entry.value),
            tags::PER_THREAD_MEMORY_BUFFERS => buffers_node = Some(&entry.value),
            unknown => unknown_attribute(unknown, "kernels", config, log)?,
        }
    }

    // name and execution_env are required exactly once; the remaining
    // sections are optional but may not repeat.
    let mut bad_counts = false;
    for key in [tags::NAME, tags::EXECUTION_ENV] {
        let count = counts.get(key).copied().unwrap_or(0);
        if count != 1 {
            bad_counts = true;
            log.error(format!(
                "{ZE_INFO_PREFIX}Expected exactly 1 of {key} in context of : kernels, got : {count}"
            ));
        }
    }
    for key in [
        tags::USER_ATTRIBUTES,
        tags::DEBUG_ENV,
        tags::PAYLOAD_ARGUMENTS,
        tags::PER_THREAD_PAYLOAD_ARGUMENTS,
        tags::BINDING_TABLE_INDICES,
        tags::PER_THREAD_MEMORY_BUFFERS,
    ] {
        let count = counts.get(key).copied().unwrap_or(0);
        if count > 1 {
            bad_counts = true;
            log.error(format!(
                "{ZE_INFO_PREFIX}Expected at most 1 of {key} in context of : kernels, got : {count}"
            ));
        }
    }
    if bad_counts {
        return Err(DecodeError::InvalidBinary);
    }

    let mut kernel = KernelInfo::default();
    let kd = &mut kernel.descriptor;
    kd.metadata.kernel_name = read_string(name_node.unwrap(), tags::NAME, "kernels", log)?;
    let kernel_name = kd.metadata.kernel_name.clone();

    if let Some(attrs) = attrs_node {
        decode_user_attributes(kd, attrs, log)?;
    }

    let env = decode_execution_env(env_node.unwrap(), &kernel_name, config, log)?;
    apply_execution_env(kd, &env, &kernel_name, log)?;

    if let Some(debug_env) = debug_env_node {
        decode_debug_env(kd, debug_env, &kernel_name, config, log)?;
    }

    if let Some(per_thread) = per_thread_node {
        let args = decode_per_thread_payload_arguments(per_thread, &kernel_name, config, log)?;
        apply_per_thread_payload_arguments(kd, &args, &kernel_name, log)?;
    }

    let mut sampler_count = 0u32;
    if let Some(payload) = payload_node {
        let args = decode_payload_arguments(payload, &kernel_name, config, log)?;
        sampler_count = apply_payload_arguments(kd, &args, &kernel_name, log)?;
    }

    if let Some(bti) = bti_node {
        let entries = decode_binding_table_indices(bti, &kernel_name, config, log)?;
        apply_binding_table(&mut kernel, &entries, &kernel_name, log)?;
    }

    apply_sampler_table(&mut kernel, sampler_count);

    if let Some(buffers) = buffers_node {
        let buffers = decode_per_thread_memory_buffers(buffers, &kernel_name, config, log)?;
        apply_per_thread_memory_buffers(&mut kernel.descriptor, &buffers, &kernel_name, log)?;
    }

    Ok(kernel)
}

fn decode_function(
    item: &Value,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<ExternalFunctionInfo, DecodeError> {
    let Some(entries) = item.as_mapping() else {
        return Err(read_error(tags::FUNCTIONS, "<non-mapping>", "functions", log));
    };
    let mut name = None;
    let mut env_node = None;
    for entry in entries {
        match entry.key {
            tags::NAME => name = Some(read_string(&entry.value, tags::NAME, "functions", log)?),
            tags::EXECUTION_ENV => env_node = Some(&entry.value),
            unknown => unknown_attribute(unknown, "functions", config, log)?,
        }
    }
    let (Some(name), Some(env_node)) = (name, env_node) else {
        log.error(format!(
            "{ZE_INFO_PREFIX}Expected exactly 1 of name and execution_env in context of : functions"
        ));
        return Err(DecodeError::InvalidBinary);
    };
    let env = decode_execution_env(env_node, &name, config, log)?;
    validate_simd_size(env.simd_size, &name, log)?;
    Ok(ExternalFunctionInfo {
        function_name: name,
        num_grf_required: env.grf_count,
        simd_size: env.simd_size,
        barrier_count: env.barrier_count,
        has_rt_calls: env.has_rtcalls,
        uses_printf: env.has_printf_calls,
        has_indirect_calls: env.has_indirect_calls,
    })
}

fn decode_user_attributes(
    kd: &mut KernelDescriptor,
    attrs: &Value,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let Some(entries) = attrs.as_mapping() else {
        return Err(read_error(tags::USER_ATTRIBUTES, "<non-mapping>", "kernels", log));
    };
    let mut rendered = Vec::new();
    for entry in entries {
        match entry.key {
            "intel_reqd_sub_group_size" => {
                kd.metadata.required_sub_group_size =
                    read_u32(&entry.value, entry.key, tags::USER_ATTRIBUTES, log)?;
                rendered.push(format!(
                    "intel_reqd_sub_group_size({})",
                    kd.metadata.required_sub_group_size
                ));
            }
            "work_group_size_hint" => {
                kd.metadata.work_group_size_hint =
                    read_u32_triple(&entry.value, entry.key, tags::USER_ATTRIBUTES, log)?;
                let [x, y, z] = kd.metadata.work_group_size_hint;
                rendered.push(format!("work_group_size_hint({x},{y},{z})"));
            }
            "invalid_kernel" => {
                kd.metadata.is_invalid = true;
                match entry.value.as_scalar() {
                    Some(reason) => rendered.push(format!("invalid_kernel(\"{}\")", reason.value())),
                    None => rendered.push("invalid_kernel".to_string()),
                }
            }
            other => match &entry.value {
                Value::Scalar(s) => rendered.push(format!("{other}({})", s.value())),
                Value::Sequence(items) => {
                    let parts: Vec<_> = items
                        .iter()
                        .filter_map(|v| v.as_scalar().map(|s| s.value()))
                        .collect();
                    rendered.push(format!("{other}({})", parts.join(",")));
                }
                Value::Mapping(_) => rendered.push(other.to_string()),
            },
        }
    }
    kd.metadata.language_attributes = rendered.join(" ");
    Ok(())
}

fn decode_execution_env(
    node: &Value,
    context: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<ZeInfoExecutionEnv, DecodeError> {
    let Some(entries) = node.as_mapping() else {
        return Err(read_error(tags::EXECUTION_ENV, "<non-mapping>", context, log));
    };
    let mut env = ZeInfoExecutionEnv::default();
    for entry in entries {
        let key = entry.key;
        let value = &entry.value;
        match key {
            tags::BARRIER_COUNT => env.barrier_count = read_u32(value, key, context, log)?,
            tags::DISABLE_MID_THREAD_PREEMPTION => {
                env.disable_mid_thread_preemption = read_bool(value, key, context, log)?
            }
            tags::GRF_COUNT => env.grf_count = read_u32(value, key, context, log)?,
            tags::HAS_4GB_BUFFERS => env.has_4gb_buffers = read_bool(value, key, context, log)?,
            tags::HAS_DPAS => env.has_dpas = read_bool(value, key, context, log)?,
            tags::HAS_STACK_CALLS => env.has_stack_calls = read_bool(value, key, context, log)?,
            tags::HAS_RTCALLS => env.has_rtcalls = read_bool(value, key, context, log)?,
            tags::HAS_PRINTF_CALLS => env.has_printf_calls = read_bool(value, key, context, log)?,
            tags::HAS_INDIRECT_CALLS => {
                env.has_indirect_calls = read_bool(value, key, context, log)?
            }
            tags::HAS_INDIRECT_STATELESS_ACCESS => {
                env.has_indirect_stateless_access = read_bool(value, key, context, log)?
            }
            tags::HAS_NO_STATELESS_WRITE => {
                env.has_no_stateless_write = read_bool(value, key, context, log)?
            }
            tags::INLINE_DATA_PAYLOAD_SIZE => {
                env.inline_data_payload_size = read_u32(value, key, context, log)?
            }
            tags::OFFSET_TO_SKIP_PER_THREAD_DATA_LOAD => {
                env.offset_to_skip_per_thread_data_load = read_u32(value, key, context, log)?
            }
            tags::OFFSET_TO_SKIP_SET_FFID_GP => {
                env.offset_to_skip_set_ffid_gp = read_u32(value, key, context, log)?
            }
            tags::REQUIRED_SUB_GROUP_SIZE => {
                env.required_sub_group_size = read_u32(value, key, context, log)?
            }
            tags::REQUIRED_WORK_GROUP_SIZE => {
                env.required_work_group_size = read_u32_triple(value, key, context, log)?
            }
            tags::SIMD_SIZE => env.simd_size = read_u32(value, key, context, log)?,
            tags::SLM_SIZE => env.slm_size = read_u32(value, key, context, log)?,
            tags::SUBGROUP_INDEPENDENT_FORWARD_PROGRESS => {
                env.subgroup_independent_forward_progress = read_bool(value, key, context, log)?
            }
            tags::THREAD_SCHEDULING_MODE => {
                env.thread_scheduling_mode = Some(read_string(value, key, context, log)?)
            }
            tags::WORK_GROUP_WALK_ORDER_DIMENSIONS => {
                env.work_group_walk_order_dimensions = read_u32_triple(value, key, context, log)?
            }
            tags::INDIRECT_STATELESS_COUNT => {
                env.indirect_stateless_count = read_u32(value, key, context, log)?
            }
            tags::EU_THREAD_COUNT => env.eu_thread_count = read_u32(value, key, context, log)?,
            unknown => unknown_attribute(unknown, tags::EXECUTION_ENV, config, log)?,
        }
    }
    Ok(env)
}

fn validate_simd_size(simd: u32, context: &str, log: &mut DecodeLog) -> Result<(), DecodeError> {
    if matches!(simd, 1 | 8 | 16 | 32) {
        return Ok(());
    }
    log.error(format!(
        "{ZE_INFO_PREFIX}Invalid simd size : {simd} in context of : {context}. Expected 1, 8, 16 or 32"
    ));
    Err(DecodeError::InvalidBinary)
}

fn apply_execution_env(
    kd: &mut KernelDescriptor,
    env: &ZeInfoExecutionEnv,
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    validate_simd_size(env.simd_size, kernel_name, log)?;
    let attrs = &mut kd.attributes;
    attrs.simd_size = env.simd_size;
    attrs.num_grf_required = env.grf_count;
    attrs.barrier_count = env.barrier_count;
    attrs.required_work_group_size = env.required_work_group_size;
    attrs.work_group_walk_order = env.work_group_walk_order_dimensions;
    attrs.slm_inline_size = env.slm_size;
    attrs.inline_data_payload_size = env.inline_data_payload_size;
    attrs.indirect_stateless_count = env.indirect_stateless_count;
    attrs.eu_thread_count = env.eu_thread_count;
    kd.entry_points.skip_per_thread_data_load = env.offset_to_skip_per_thread_data_load;
    kd.entry_points.skip_set_ffid_gp = env.offset_to_skip_set_ffid_gp;
    if kd.metadata.required_sub_group_size == 0 {
        kd.metadata.required_sub_group_size = env.required_sub_group_size;
    }

    let flags = &mut attrs.flags;
    flags.uses_stack_calls = env.has_stack_calls;
    flags.has_rt_calls = env.has_rtcalls;
    flags.uses_printf |= env.has_printf_calls;
    flags.has_indirect_calls = env.has_indirect_calls;
    flags.has_indirect_stateless_access = env.has_indirect_stateless_access;
    flags.uses_systolic_pipeline = env.has_dpas;
    flags.uses_4gb_buffers = env.has_4gb_buffers;
    flags.has_stateless_writes = !env.has_no_stateless_write;
    flags.requires_disabled_mid_thread_preemption = env.disable_mid_thread_preemption;
    flags.requires_subgroup_independent_forward_progress = env.subgroup_independent_forward_progress;

    attrs.thread_scheduling_mode = match env.thread_scheduling_mode.as_deref() {
        None => ThreadSchedulingMode::Default,
        Some("age_based") => ThreadSchedulingMode::AgeBased,
        Some("round_robin") => ThreadSchedulingMode::RoundRobin,
        Some("round_robin_stall") => ThreadSchedulingMode::RoundRobinStall,
        Some(other) => {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid thread scheduling mode : {other} in context of : {kernel_name}."
            ));
            return Err(DecodeError::InvalidBinary);
        }
    };
    Ok(())
}

fn decode_debug_env(
    kd: &mut KernelDescriptor,
    node: &Value,
    kernel_name: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let Some(entries) = node.as_mapping() else {
        return Err(read_error(tags::DEBUG_ENV, "<non-mapping>", kernel_name, log));
    };
    for entry in entries {
        match entry.key {
            tags::SIP_SURFACE_BTI => {
                let bti = read_i32(&entry.value, entry.key, kernel_name, log)?;
                if bti >= 0 {
                    kd.payload.implicit.system_thread_surface =
                        Some(bti as u32 * SURFACE_STATE_SIZE);
                }
            }
            unknown => unknown_attribute(unknown, tags::DEBUG_ENV, config, log)?,
        }
    }
    Ok(())
}

fn decode_per_thread_payload_arguments(
    node: &Value,
    context: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<Vec<ZeInfoPerThreadPayloadArgument>, DecodeError> {
    let Some(items) = node.as_sequence() else {
        return Err(read_error(tags::PER_THREAD_PAYLOAD_ARGUMENTS, "<non-sequence>", context, log));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(entries) = item.as_mapping() else {
            return Err(read_error(tags::PER_THREAD_PAYLOAD_ARGUMENTS, "<non-mapping>", context, log));
        };
        let mut arg = ZeInfoPerThreadPayloadArgument::default();
        for entry in entries {
            match entry.key {
                tags::ARG_TYPE => arg.arg_type = read_string(&entry.value, entry.key, context, log)?,
                tags::OFFSET => arg.offset = read_u32(&entry.value, entry.key, context, log)?,
                tags::SIZE => arg.size = read_u32(&entry.value, entry.key, context, log)?,
                unknown => {
                    unknown_attribute(unknown, tags::PER_THREAD_PAYLOAD_ARGUMENTS, config, log)?
                }
            }
        }
        out.push(arg);
    }
    Ok(out)
}

fn apply_per_thread_payload_arguments(
    kd: &mut KernelDescriptor,
    args: &[ZeInfoPerThreadPayloadArgument],
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let simd = kd.attributes.simd_size;
    for arg in args {
        // Each local-id channel occupies a full GRF per 16 lanes.
        let per_channel = match arg.arg_type.as_str() {
            "local_id" => simd.max(16) * 2,
            "packed_local_ids" => simd * 2,
            other => {
                log.error(format!(
                    "{ZE_INFO_PREFIX}Unhandled per-thread payload argument type : {other} in context of : {kernel_name}."
                ));
                return Err(DecodeError::InvalidBinary);
            }
        };
        if arg.offset != 0 {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid offset for argument of type {} : {} in context of : {kernel_name}. Expected 0.",
                arg.arg_type, arg.offset
            ));
            return Err(DecodeError::InvalidBinary);
        }
        let channels = arg.size / per_channel;
        if channels == 0 || channels > 3 || channels * per_channel != arg.size {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid size for argument of type {} : {} in context of : {kernel_name}.",
                arg.arg_type, arg.size
            ));
            return Err(DecodeError::InvalidBinary);
        }
        kd.attributes.num_local_id_channels = channels;
        kd.attributes.per_thread_data_size = arg.size;
    }
    Ok(())
}

fn decode_payload_arguments(
    node: &Value,
    context: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<Vec<ZeInfoPayloadArgument>, DecodeError> {
    let Some(items) = node.as_sequence() else {
        return Err(read_error(tags::PAYLOAD_ARGUMENTS, "<non-sequence>", context, log));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(entries) = item.as_mapping() else {
            return Err(read_error(tags::PAYLOAD_ARGUMENTS, "<non-mapping>", context, log));
        };
        let mut arg = ZeInfoPayloadArgument {
            line: item.line(),
            ..Default::default()
        };
        for entry in entries {
            match entry.key {
                tags::ARG_TYPE => arg.arg_type = read_string(&entry.value, entry.key, context, log)?,
                tags::OFFSET => arg.offset = read_u32(&entry.value, entry.key, context, log)?,
                tags::SIZE => arg.size = read_u32(&entry.value, entry.key, context, log)?,
                tags::ARG_INDEX => arg.arg_index = read_i32(&entry.value, entry.key, context, log)?,
                tags::ADDRMODE => {
                    arg.addrmode = Some(read_string(&entry.value, entry.key, context, log)?)
                }
                tags::ADDRSPACE => {
                    arg.addrspace = Some(read_string(&entry.value, entry.key, context, log)?)
                }
                tags::ACCESS_TYPE => {
                    arg.access_type = Some(read_string(&entry.value, entry.key, context, log)?)
                }
                tags::SAMPLER_INDEX => {
                    arg.sampler_index = read_i32(&entry.value, entry.key, context, log)?
                }
                tags::SOURCE_OFFSET => {
                    arg.source_offset = read_i32(&entry.value, entry.key, context, log)?
                }
                tags::SLM_ARGUMENT_ALIGNMENT => {
                    arg.slm_argument_alignment = read_u32(&entry.value, entry.key, context, log)?
                }
                unknown => unknown_attribute(unknown, tags::PAYLOAD_ARGUMENTS, config, log)?,
            }
        }
        out.push(arg);
    }
    Ok(out)
}

fn explicit_arg_mut<'a>(args: &'a mut Vec<ExplicitArg>, index: usize) -> &'a mut ExplicitArg {
    if args.len() <= index {
        args.resize_with(index + 1, Default::default);
    }
    &mut args[index]
}

fn require_arg_index(
    arg: &ZeInfoPayloadArgument,
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<usize, DecodeError> {
    usize::try_from(arg.arg_index).map_err(|_| {
        log.error(format!(
            "{ZE_INFO_PREFIX}Invalid or missing argument index for argument of type {} in context of : {kernel_name}.",
            arg.arg_type
        ));
        DecodeError::InvalidBinary
    })
}

fn ctd_offset(
    offset: u32,
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<u16, DecodeError> {
    u16::try_from(offset).map_err(|_| {
        log.error(format!(
            "{ZE_INFO_PREFIX}Cross-thread data offset out of range : {offset} in context of : {kernel_name}."
        ));
        DecodeError::InvalidBinary
    })
}

/// Populates dispatch traits, implicit args and explicit args; returns the
/// number of sampler states the kernel needs.
fn apply_payload_arguments(
    kd: &mut KernelDescriptor,
    args: &[ZeInfoPayloadArgument],
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<u32, DecodeError> {
    let mut uses_bindful = false;
    let mut uses_bindless = false;
    let mut sampler_count = 0u32;
    let mut cross_thread_end = 0u32;
    let mut implicit_source: Vec<bool> = Vec::new();

    for arg in args {
        cross_thread_end = cross_thread_end.max(arg.offset.saturating_add(arg.size));
        match arg.arg_type.as_str() {
            "arg_byvalue" => {
                let index = require_arg_index(arg, kernel_name, log)?;
                let explicit = explicit_arg_mut(&mut kd.payload.explicit_args, index);
                if !matches!(explicit.descriptor, ArgDescriptor::Value(_)) {
                    explicit.descriptor = ArgDescriptor::Value(ArgDescValue::default());
                }
                let ArgDescriptor::Value(value) = &mut explicit.descriptor else {
                    unreachable!()
                };
                if implicit_source.len() <= index {
                    implicit_source.resize(index + 1, false);
                }
                if !value.elements.is_empty() && (arg.source_offset < 0 || implicit_source[index]) {
                    log.error(format!(
                        "{ZE_INFO_PREFIX}Missing source offset value for element in argument byvalue in context of : {kernel_name}."
                    ));
                    return Err(DecodeError::InvalidBinary);
                }
                implicit_source[index] = arg.source_offset < 0;
                value.elements.push(ArgValueElement {
                    offset: ctd_offset(arg.offset, kernel_name, log)?,
                    size: arg.size as u16,
                    source_offset: arg.source_offset.max(0) as u16,
                });
            }
            "arg_bypointer" => {
                apply_pointer_argument(
                    kd,
                    arg,
                    kernel_name,
                    &mut uses_bindful,
                    &mut uses_bindless,
                    &mut sampler_count,
                    log,
                )?;
            }
            "local_size" => {
                let offsets = vec3_offsets(arg, kernel_name, log)?;
                kd.payload.dispatch.local_work_size = offsets;
            }
            "global_id_offset" => {
                let offsets = vec3_offsets(arg, kernel_name, log)?;
                kd.payload.dispatch.global_work_offset = offsets;
            }
            "group_count" => {
                let offsets = vec3_offsets(arg, kernel_name, log)?;
                kd.payload.dispatch.num_work_groups = offsets;
            }
            "global_size" => {
                let offsets = vec3_offsets(arg, kernel_name, log)?;
                kd.payload.dispatch.global_work_size = offsets;
            }
            "enqueued_local_size" => {
                let offsets = vec3_offsets(arg, kernel_name, log)?;
                kd.payload.dispatch.enqueued_local_work_size = offsets;
            }
            "work_dimensions" => {
                if arg.size != 4 {
                    log.error(format!(
                        "{ZE_INFO_PREFIX}Invalid size for argument of type work_dimensions : {} in context of : {kernel_name}. Expected 4.",
                        arg.size
                    ));
                    return Err(DecodeError::InvalidBinary);
                }
                kd.payload.dispatch.work_dim = Some(ctd_offset(arg.offset, kernel_name, log)?);
            }
            "private_base_stateless" => {
                kd.payload.implicit.private_memory.stateless =
                    Some(ctd_offset(arg.offset, kernel_name, log)?);
                kd.payload.implicit.private_memory.pointer_size = arg.size as u8;
            }
            "buffer_offset" => {
                if arg.size != 4 {
                    log.error(format!(
                        "{ZE_INFO_PREFIX}Invalid size for argument of type buffer_offset : {} in context of : {kernel_name}. Expected 4.",
                        arg.size
                    ));
                    return Err(DecodeError::InvalidBinary);
                }
                let index = require_arg_index(arg, kernel_name, log)?;
                let offset = ctd_offset(arg.offset, kernel_name, log)?;
                let explicit = explicit_arg_mut(&mut kd.payload.explicit_args, index);
                match explicit.descriptor.as_pointer_mut() {
                    Some(pointer) => pointer.buffer_offset = Some(offset),
                    None => {
                        explicit.descriptor = ArgDescriptor::Pointer(ArgDescPointer {
                            buffer_offset: Some(offset),
                            ..Default::default()
                        });
                    }
                }
            }
            "printf_buffer" => {
                kd.payload.implicit.printf_surface.stateless =
                    Some(ctd_offset(arg.offset, kernel_name, log)?);
                kd.payload.implicit.printf_surface.pointer_size = arg.size as u8;
                kd.attributes.flags.uses_printf = true;
            }
            "implicit_arg_buffer" => {
                kd.payload.implicit.implicit_args_buffer =
                    Some(ctd_offset(arg.offset, kernel_name, log)?);
                kd.attributes.flags.requires_implicit_args_buffer = true;
            }
            other => {
                log.error(format!(
                    "{ZE_INFO_PREFIX}Unhandled payload argument type : {other} in context of : {kernel_name}."
                ));
                return Err(DecodeError::InvalidBinary);
            }
        }
    }

    if uses_bindful && uses_bindless {
        log.error(format!(
            "{ZE_INFO_PREFIX}bindless and bindful addressing modes must not be mixed."
        ));
        return Err(DecodeError::InvalidBinary);
    }

    kd.attributes.cross_thread_data_size =
        align_up(u64::from(cross_thread_end), u64::from(CROSS_THREAD_DATA_ALIGNMENT)) as u32;
    Ok(sampler_count)
}

fn apply_pointer_argument(
    kd: &mut KernelDescriptor,
    arg: &ZeInfoPayloadArgument,
    kernel_name: &str,
    uses_bindful: &mut bool,
    uses_bindless: &mut bool,
    sampler_count: &mut u32,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let index = require_arg_index(arg, kernel_name, log)?;
    let address_space = match arg.addrspace.as_deref() {
        None | Some("global") => AddressSpace::Global,
        Some("constant") => AddressSpace::Constant,
        Some("local") => AddressSpace::Local,
        Some("image") => AddressSpace::Image,
        Some("sampler") => AddressSpace::Sampler,
        Some(other) => {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid address space : {other} in context of : {kernel_name}."
            ));
            return Err(DecodeError::InvalidBinary);
        }
    };
    let access = match arg.access_type.as_deref() {
        None => AccessQualifier::Unknown,
        Some("readonly") => AccessQualifier::ReadOnly,
        Some("writeonly") => AccessQualifier::WriteOnly,
        Some("readwrite") => AccessQualifier::ReadWrite,
        Some(other) => {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid access type : {other} in context of : {kernel_name}."
            ));
            return Err(DecodeError::InvalidBinary);
        }
    };

    let addrmode = arg.addrmode.as_deref();
    if address_space == AddressSpace::Sampler {
        let sampler_index = u32::try_from(arg.sampler_index).map_err(|_| {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid or missing sampler index in context of : {kernel_name}."
            ));
            DecodeError::InvalidBinary
        })?;
        let mut sampler = ArgDescSampler {
            sampler_index: Some(sampler_index),
            ..Default::default()
        };
        if addrmode == Some("bindless") {
            *uses_bindless = true;
            sampler.bindless = Some(ctd_offset(arg.offset, kernel_name, log)?);
        }
        *sampler_count = (*sampler_count).max(sampler_index + 1);
        let explicit = explicit_arg_mut(&mut kd.payload.explicit_args, index);
        explicit.descriptor = ArgDescriptor::Sampler(sampler);
        explicit.address_space = address_space;
        explicit.access = access;
        return Ok(());
    }

    if address_space == AddressSpace::Image {
        let mut image = ArgDescImage::default();
        match addrmode {
            Some("stateful") => *uses_bindful = true,
            Some("bindless") => {
                *uses_bindless = true;
                image.bindless = Some(ctd_offset(arg.offset, kernel_name, log)?);
            }
            other => {
                log.error(format!(
                    "{ZE_INFO_PREFIX}Invalid or missing memory addressing mode : {} for image argument in context of : {kernel_name}.",
                    other.unwrap_or("<none>")
                ));
                return Err(DecodeError::InvalidBinary);
            }
        }
        let explicit = explicit_arg_mut(&mut kd.payload.explicit_args, index);
        explicit.descriptor = ArgDescriptor::Image(image);
        explicit.address_space = address_space;
        explicit.access = access;
        return Ok(());
    }

    // Buffer pointers: exactly one addressing mode.
    let previous_buffer_offset = kd
        .payload
        .explicit_args
        .get(index)
        .and_then(|a| match &a.descriptor {
            ArgDescriptor::Pointer(p) => p.buffer_offset,
            _ => None,
        });
    let mut pointer = ArgDescPointer {
        buffer_offset: previous_buffer_offset,
        ..Default::default()
    };
    match addrmode {
        Some("stateless") => {
            pointer.stateless = Some(ctd_offset(arg.offset, kernel_name, log)?);
            pointer.pointer_size = arg.size as u8;
            pointer.accessed_using_statelessly = true;
        }
        Some("stateful") => {
            *uses_bindful = true;
        }
        Some("bindless") => {
            *uses_bindless = true;
            pointer.bindless = Some(ctd_offset(arg.offset, kernel_name, log)?);
            pointer.pointer_size = arg.size as u8;
        }
        Some("slm") => {
            pointer.slm_offset = Some(ctd_offset(arg.offset, kernel_name, log)?);
            pointer.required_slm_alignment = arg.slm_argument_alignment;
        }
        other => {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid or missing memory addressing mode : {} for argument in context of : {kernel_name}.",
                other.unwrap_or("<none>")
            ));
            return Err(DecodeError::InvalidBinary);
        }
    }
    let explicit = explicit_arg_mut(&mut kd.payload.explicit_args, index);
    explicit.descriptor = ArgDescriptor::Pointer(pointer);
    explicit.address_space = address_space;
    explicit.access = access;
    Ok(())
}

/// Vector dispatch arguments accept 4, 8 or 12 bytes meaning 1–3 channels.
fn vec3_offsets(
    arg: &ZeInfoPayloadArgument,
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<[Option<u16>; 3], DecodeError> {
    if !matches!(arg.size, 4 | 8 | 12) {
        log.error(format!(
            "{ZE_INFO_PREFIX}Invalid size for argument of type {} : {} in context of : {kernel_name}. Expected 4, 8 or 12.",
            arg.arg_type, arg.size
        ));
        return Err(DecodeError::InvalidBinary);
    }
    let channels = (arg.size / 4) as usize;
    let base = ctd_offset(arg.offset, kernel_name, log)?;
    let mut out = [None; 3];
    for (channel, slot) in out.iter_mut().enumerate().take(channels) {
        *slot = Some(base.saturating_add(4 * channel as u16));
    }
    Ok(out)
}

fn decode_binding_table_indices(
    node: &Value,
    context: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<Vec<ZeInfoBindingTableIndex>, DecodeError> {
    let Some(items) = node.as_sequence() else {
        return Err(read_error(tags::BINDING_TABLE_INDICES, "<non-sequence>", context, log));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(entries) = item.as_mapping() else {
            return Err(read_error(tags::BINDING_TABLE_INDICES, "<non-mapping>", context, log));
        };
        let mut bti = ZeInfoBindingTableIndex::default();
        for entry in entries {
            match entry.key {
                tags::BTI_VALUE => bti.bti_value = read_u32(&entry.value, entry.key, context, log)?,
                tags::ARG_INDEX => bti.arg_index = read_u32(&entry.value, entry.key, context, log)?,
                unknown => unknown_attribute(unknown, tags::BINDING_TABLE_INDICES, config, log)?,
            }
        }
        out.push(bti);
    }
    Ok(out)
}

/// Assigns bindful offsets and generates the surface state heap image:
/// `num` surface states followed by the binding table itself.
fn apply_binding_table(
    kernel: &mut KernelInfo<'_>,
    entries: &[ZeInfoBindingTableIndex],
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    if entries.is_empty() {
        return Ok(());
    }
    let kd = &mut kernel.descriptor;
    let mut num_entries = 0u32;
    for entry in entries {
        num_entries = num_entries.max(entry.bti_value + 1);
        let state_offset = entry.bti_value * SURFACE_STATE_SIZE;
        let Some(explicit) = kd.payload.explicit_args.get_mut(entry.arg_index as usize) else {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid binding table entry : argument index {} out of range in context of : {kernel_name}.",
                entry.arg_index
            ));
            return Err(DecodeError::InvalidBinary);
        };
        match &mut explicit.descriptor {
            ArgDescriptor::Pointer(pointer) => pointer.bindful = Some(state_offset),
            ArgDescriptor::Image(image) => image.bindful = Some(state_offset),
            _ => {
                log.error(format!(
                    "{ZE_INFO_PREFIX}Invalid binding table entry for argument : {}, only pointer and image arguments can be bound in context of : {kernel_name}.",
                    entry.arg_index
                ));
                return Err(DecodeError::InvalidBinary);
            }
        }
    }

    let table_offset = num_entries * SURFACE_STATE_SIZE;
    let heap_size = align_up(
        u64::from(table_offset + num_entries * BINDING_TABLE_ENTRY_SIZE),
        u64::from(SURFACE_STATE_SIZE),
    ) as usize;
    let mut heap = vec![0u8; heap_size];
    for i in 0..num_entries {
        let entry_offset = (table_offset + i * BINDING_TABLE_ENTRY_SIZE) as usize;
        heap[entry_offset..entry_offset + 4]
            .copy_from_slice(&(i * SURFACE_STATE_SIZE).to_le_bytes());
    }
    kernel.heap.surface_state_heap = heap;
    kd.payload.binding_table.table_offset = table_offset;
    kd.payload.binding_table.num_entries = num_entries;
    Ok(())
}

/// Generates the dynamic state heap: a border color block followed by the
/// sampler states, padded to the border color alignment.
fn apply_sampler_table(kernel: &mut KernelInfo<'_>, sampler_count: u32) {
    if sampler_count == 0 {
        return;
    }
    let kd = &mut kernel.descriptor;
    let heap_size = align_up(
        u64::from(SAMPLER_BORDER_COLOR_SIZE + sampler_count * SAMPLER_STATE_SIZE),
        u64::from(SAMPLER_BORDER_COLOR_SIZE),
    ) as usize;
    kernel.heap.dynamic_state_heap = vec![0u8; heap_size];
    kd.payload.sampler_table.border_color_offset = 0;
    kd.payload.sampler_table.table_offset = SAMPLER_BORDER_COLOR_SIZE;
    kd.payload.sampler_table.num_samplers = sampler_count;
    for explicit in &mut kd.payload.explicit_args {
        if let ArgDescriptor::Sampler(sampler) = &mut explicit.descriptor {
            if let Some(index) = sampler.sampler_index {
                sampler.bindful =
                    Some(SAMPLER_BORDER_COLOR_SIZE + index * SAMPLER_STATE_SIZE);
            }
        }
    }
}

fn decode_per_thread_memory_buffers(
    node: &Value,
    context: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<Vec<ZeInfoPerThreadMemoryBuffer>, DecodeError> {
    let Some(items) = node.as_sequence() else {
        return Err(read_error(tags::PER_THREAD_MEMORY_BUFFERS, "<non-sequence>", context, log));
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Some(entries) = item.as_mapping() else {
            return Err(read_error(tags::PER_THREAD_MEMORY_BUFFERS, "<non-mapping>", context, log));
        };
        let mut buffer = ZeInfoPerThreadMemoryBuffer::default();
        for entry in entries {
            match entry.key {
                tags::ALLOCATION_TYPE => {
                    buffer.allocation_type = read_string(&entry.value, entry.key, context, log)?
                }
                tags::MEMORY_USAGE => {
                    buffer.memory_usage = read_string(&entry.value, entry.key, context, log)?
                }
                tags::SIZE => buffer.size = read_u32(&entry.value, entry.key, context, log)?,
                tags::SLOT => buffer.slot = read_u32(&entry.value, entry.key, context, log)?,
                tags::IS_SIMT_THREAD => {
                    buffer.is_simt_thread = read_bool(&entry.value, entry.key, context, log)?
                }
                unknown => unknown_attribute(unknown, tags::PER_THREAD_MEMORY_BUFFERS, config, log)?,
            }
        }
        out.push(buffer);
    }
    Ok(out)
}

fn apply_per_thread_memory_buffers(
    kd: &mut KernelDescriptor,
    buffers: &[ZeInfoPerThreadMemoryBuffer],
    kernel_name: &str,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    for buffer in buffers {
        if buffer.size == 0 {
            log.error(format!(
                "{ZE_INFO_PREFIX}Invalid per-thread memory buffer allocation size : 0 in context of : {kernel_name}."
            ));
            return Err(DecodeError::InvalidBinary);
        }
        let size = if buffer.is_simt_thread {
            buffer.size * kd.attributes.simd_size
        } else {
            buffer.size
        };
        match buffer.allocation_type.as_str() {
            "scratch" => {
                let slot = buffer.slot as usize;
                if slot > 1 {
                    log.error(format!(
                        "{ZE_INFO_PREFIX}Invalid scratch buffer slot : {} in context of : {kernel_name}. Expected 0 or 1.",
                        buffer.slot
                    ));
                    return Err(DecodeError::InvalidBinary);
                }
                if kd.attributes.per_thread_scratch_size[slot] != 0 {
                    log.error(format!(
                        "{ZE_INFO_PREFIX}Invalid duplicated scratch buffer slot : {} in context of : {kernel_name}.",
                        buffer.slot
                    ));
                    return Err(DecodeError::InvalidBinary);
                }
                kd.attributes.per_thread_scratch_size[slot] = size;
            }
            "global" => {
                if buffer.memory_usage != "private_space" {
                    log.error(format!(
                        "{ZE_INFO_PREFIX}Invalid memory usage type for global allocation type in context of : {kernel_name}."
                    ));
                    return Err(DecodeError::InvalidBinary);
                }
                kd.attributes.per_hw_thread_private_memory_size = size;
            }
            "slm" => {
                log.error(format!(
                    "{ZE_INFO_PREFIX}Invalid per-thread memory buffer type slm in context of : {kernel_name}."
                ));
                return Err(DecodeError::InvalidBinary);
            }
            other => {
                log.error(format!(
                    "{ZE_INFO_PREFIX}Invalid per-thread memory buffer type : {other} in context of : {kernel_name}."
                ));
                return Err(DecodeError::InvalidBinary);
            }
        }
    }
    Ok(())
}

// -- shared readers ---------------------------------------------------------

fn parse_document<'d>(text: &'d str, log: &mut DecodeLog) -> Result<Value<'d>, DecodeError> {
    yaml::parse(text).map_err(|err| {
        log.error(format!("{ZE_INFO_PREFIX}{err}"));
        DecodeError::InvalidBinary
    })
}

fn unknown_attribute(
    key: &str,
    context: &str,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<(), DecodeError> {
    let message =
        format!("{ZE_INFO_PREFIX}Unknown attribute : {key} in context of : {context}");
    if config.allow_unknown_zeinfo_attributes {
        log.warn(message);
        Ok(())
    } else {
        log.error(message);
        Err(DecodeError::UnknownZeinfoAttribute)
    }
}

fn read_error(key: &str, got: &str, context: &str, log: &mut DecodeLog) -> DecodeError {
    log.error(format!(
        "{ZE_INFO_PREFIX}could not read {key} from : [{got}] in context of : {context}"
    ));
    DecodeError::InvalidBinary
}

fn read_scalar<'v, 'd>(
    value: &'v Value<'d>,
    key: &str,
    context: &str,
    log: &mut DecodeLog,
) -> Result<&'v crate::yaml::Scalar<'d>, DecodeError> {
    value
        .as_scalar()
        .ok_or_else(|| read_error(key, "<non-scalar>", context, log))
}

fn read_u32(value: &Value, key: &str, context: &str, log: &mut DecodeLog) -> Result<u32, DecodeError> {
    let scalar = read_scalar(value, key, context, log)?;
    scalar
        .as_u32()
        .map_err(|_| read_error(key, scalar.value(), context, log))
}

fn read_i32(value: &Value, key: &str, context: &str, log: &mut DecodeLog) -> Result<i32, DecodeError> {
    let scalar = read_scalar(value, key, context, log)?;
    scalar
        .as_i32()
        .map_err(|_| read_error(key, scalar.value(), context, log))
}

fn read_bool(value: &Value, key: &str, context: &str, log: &mut DecodeLog) -> Result<bool, DecodeError> {
    let scalar = read_scalar(value, key, context, log)?;
    scalar
        .as_bool()
        .map_err(|_| read_error(key, scalar.value(), context, log))
}

fn read_string(
    value: &Value,
    key: &str,
    context: &str,
    log: &mut DecodeLog,
) -> Result<String, DecodeError> {
    Ok(read_scalar(value, key, context, log)?.value().to_string())
}

fn read_u32_triple(
    value: &Value,
    key: &str,
    context: &str,
    log: &mut DecodeLog,
) -> Result<[u32; 3], DecodeError> {
    let Some(items) = value.as_sequence() else {
        return Err(read_error(key, "<non-sequence>", context, log));
    };
    if items.len() > 3 {
        return Err(read_error(key, "<more than 3 elements>", context, log));
    }
    let mut out = [0u32; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = read_u32(item, key, context, log)?;
    }
    Ok(out)
}
