//! Target-device compatibility validation.
//!
//! A zebin embeds `.note.intelgt.compat`, a standard ELF note section owned
//! by `"IntelGT"`, describing the device the binary was compiled for. Note
//! sizes are attacker-influenced, so every record is bound-checked against
//! the section before any payload is read.

use crate::config::DecodeConfig;
use crate::elf::decoder::{Elf, ElfSection};
use crate::elf::{intelgt_note, EM_INTELGT};
use crate::error::{DecodeError, DecodeLog, PREFIX};
use crate::utils::{align_up_usize, read_u32_at};
use crate::zeinfo::ZeInfoVersion;

/// Device product identifier (hardware family member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProductFamily(pub u32);

impl ProductFamily {
    pub const UNKNOWN: Self = Self(0);

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }
}

/// Device graphics-core (generation) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GfxCoreFamily(pub u32);

impl GfxCoreFamily {
    pub const UNKNOWN: Self = Self(0);

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }
}

/// Packed `major.minor.revision` product configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProductConfig(pub u32);

impl ProductConfig {
    pub const UNKNOWN: Self = Self(0);

    pub const fn from_parts(major: u8, minor: u8, revision: u8) -> Self {
        Self(((major as u32) << 16) | ((minor as u32) << 8) | revision as u32)
    }

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }
}

/// Binaries compiled for the config on the left may also be consumed by the
/// devices listed on the right when compatibility mode is enabled.
const PRODUCT_CONFIG_COMPATIBILITY: &[(ProductConfig, &[ProductConfig])] = &[
    (
        ProductConfig::from_parts(12, 0, 0),
        &[
            ProductConfig::from_parts(12, 1, 0),
            ProductConfig::from_parts(12, 2, 0),
        ],
    ),
    (
        ProductConfig::from_parts(12, 10, 0),
        &[ProductConfig::from_parts(12, 11, 0)],
    ),
    (
        ProductConfig::from_parts(12, 55, 8),
        &[ProductConfig::from_parts(12, 57, 0)],
    ),
];

fn is_compatible_product_config(device: ProductConfig, binary: ProductConfig) -> bool {
    PRODUCT_CONFIG_COMPATIBILITY
        .iter()
        .any(|(compiled, devices)| *compiled == binary && devices.contains(&device))
}

/// The device a caller wants to run the binary on.
#[derive(Debug, Clone, Copy)]
pub struct TargetDevice {
    pub product_family: ProductFamily,
    pub gfx_core: GfxCoreFamily,
    pub product_config: ProductConfig,
    /// Hardware revision (stepping).
    pub stepping: u32,
    pub max_pointer_size_in_bytes: usize,
}

impl Default for TargetDevice {
    fn default() -> Self {
        Self {
            product_family: ProductFamily::UNKNOWN,
            gfx_core: GfxCoreFamily::UNKNOWN,
            product_config: ProductConfig::UNKNOWN,
            stepping: 0,
            max_pointer_size_in_bytes: 8,
        }
    }
}

/// Packed target-metadata flags carried in note type 3.
///
/// Bit layout:
/// - `[7:0]`   generator-specific flags
/// - `[12:8]`  min compatible hardware revision
/// - `[13]`    validate revision id
/// - `[14]`    disable extended validation
/// - `[15]`    ELF machine field holds a gfx core, not a product
/// - `[20:16]` max compatible hardware revision
/// - `[23:21]` generator id
/// - `[31:24]` reserved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetMetadata {
    pub packed: u32,
}

impl TargetMetadata {
    pub fn generator_specific_flags(self) -> u32 {
        self.packed & 0xff
    }

    pub fn min_hw_revision_id(self) -> u32 {
        (self.packed >> 8) & 0x1f
    }

    pub fn validate_revision_id(self) -> bool {
        (self.packed >> 13) & 1 != 0
    }

    pub fn disable_extended_validation(self) -> bool {
        (self.packed >> 14) & 1 != 0
    }

    pub fn machine_is_gfx_core(self) -> bool {
        (self.packed >> 15) & 1 != 0
    }

    pub fn max_hw_revision_id(self) -> u32 {
        (self.packed >> 16) & 0x1f
    }

    pub fn generator_id(self) -> u32 {
        (self.packed >> 21) & 0x7
    }

    pub fn with_min_hw_revision_id(self, v: u32) -> Self {
        Self { packed: (self.packed & !(0x1f << 8)) | ((v & 0x1f) << 8) }
    }

    pub fn with_validate_revision_id(self, v: bool) -> Self {
        Self { packed: (self.packed & !(1 << 13)) | (u32::from(v) << 13) }
    }

    pub fn with_machine_is_gfx_core(self, v: bool) -> Self {
        Self { packed: (self.packed & !(1 << 15)) | (u32::from(v) << 15) }
    }

    pub fn with_max_hw_revision_id(self, v: u32) -> Self {
        Self { packed: (self.packed & !(0x1f << 16)) | ((v & 0x1f) << 16) }
    }

    pub fn with_generator_id(self, v: u32) -> Self {
        Self { packed: (self.packed & !(0x7 << 21)) | ((v & 0x7) << 21) }
    }
}

/// One raw IntelGT note record.
#[derive(Debug, Clone, Copy)]
pub struct IntelGtNote<'d> {
    pub note_type: u32,
    pub desc: &'d [u8],
}

/// Everything the note section declares about the compiled-for device.
#[derive(Debug, Clone, Default)]
pub struct IntelGtNoteBundle {
    pub product_family: Option<ProductFamily>,
    pub gfx_core: Option<GfxCoreFamily>,
    pub target_metadata: TargetMetadata,
    pub ze_info_version: Option<String>,
    pub product_config: Option<ProductConfig>,
    pub visa_abi_version: Option<u32>,
    pub indirect_detection_version: Option<u32>,
    pub indirect_access_buffer_major_version: Option<u32>,
}

/// Walks the `.note.intelgt.compat` records. Each record's padded
/// `name_size + desc_size` is checked against the section end before any
/// byte of it is read.
pub fn get_intel_gt_notes<'d>(
    section: &ElfSection<'d>,
    endian: object::Endianness,
    log: &mut DecodeLog,
) -> Result<Vec<IntelGtNote<'d>>, DecodeError> {
    let data = section.data;
    let mut notes = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let oob = || format!("{PREFIX}Out of bounds access while reading IntelGT notes section.");
        if pos + 12 > data.len() {
            log.error(oob());
            return Err(DecodeError::InvalidBinary);
        }
        let name_size = read_u32_at(endian, data, pos).unwrap() as usize;
        let desc_size = read_u32_at(endian, data, pos + 4).unwrap() as usize;
        let note_type = read_u32_at(endian, data, pos + 8).unwrap();
        let padded_name = align_up_usize(name_size, 4);
        let padded_desc = align_up_usize(desc_size, 4);
        let end = pos
            .checked_add(12)
            .and_then(|p| p.checked_add(padded_name))
            .and_then(|p| p.checked_add(padded_desc));
        match end {
            Some(end) if end <= data.len() => {}
            _ => {
                log.error(oob());
                return Err(DecodeError::InvalidBinary);
            }
        }
        let name = &data[pos + 12..pos + 12 + name_size];
        let desc = &data[pos + 12 + padded_name..pos + 12 + padded_name + desc_size];

        // Owner is length-checked; a trailing NUL is tolerated but only
        // required for the version-string note.
        let owner = intelgt_note::OWNER.as_bytes();
        let owner_matches = name == owner
            || name
                .split_last()
                .is_some_and(|(last, head)| *last == 0 && head == owner);
        if !owner_matches {
            log.warn(format!(
                "{PREFIX}Ignoring note with unexpected owner (type {note_type})."
            ));
        } else {
            notes.push(IntelGtNote { note_type, desc });
        }
        pos = end.unwrap();
    }
    Ok(notes)
}

fn desc_u32(
    note: &IntelGtNote<'_>,
    endian: object::Endianness,
    log: &mut DecodeLog,
) -> Result<u32, DecodeError> {
    if note.desc.len() != 4 {
        log.error(format!(
            "{PREFIX}Invalid IntelGT note desc size : {} for note type {}, expected 4.",
            note.desc.len(),
            note.note_type
        ));
        return Err(DecodeError::InvalidBinary);
    }
    Ok(read_u32_at(endian, note.desc, 0).unwrap())
}

/// Interprets the raw notes. Unknown note types are warned about and
/// skipped; malformed recognized notes are errors.
pub fn decode_intel_gt_note_bundle(
    notes: &[IntelGtNote<'_>],
    endian: object::Endianness,
    log: &mut DecodeLog,
) -> Result<IntelGtNoteBundle, DecodeError> {
    let mut bundle = IntelGtNoteBundle::default();
    for note in notes {
        match note.note_type {
            intelgt_note::PRODUCT_FAMILY => {
                bundle.product_family = Some(ProductFamily(desc_u32(note, endian, log)?));
            }
            intelgt_note::GFX_CORE_FAMILY => {
                bundle.gfx_core = Some(GfxCoreFamily(desc_u32(note, endian, log)?));
            }
            intelgt_note::TARGET_METADATA => {
                bundle.target_metadata = TargetMetadata {
                    packed: desc_u32(note, endian, log)?,
                };
            }
            intelgt_note::ZE_INFO_VERSION => {
                // This one must be NUL-terminated.
                match note.desc.split_last() {
                    Some((&0, head)) => match std::str::from_utf8(head) {
                        Ok(version) => bundle.ze_info_version = Some(version.to_string()),
                        Err(_) => {
                            log.error(format!(
                                "{PREFIX}Invalid UTF-8 in zeInfo version note."
                            ));
                            return Err(DecodeError::InvalidBinary);
                        }
                    },
                    _ => {
                        log.error(format!(
                            "{PREFIX}zeInfo version note is not null-terminated."
                        ));
                        return Err(DecodeError::InvalidBinary);
                    }
                }
            }
            intelgt_note::VISA_ABI_VERSION => {
                bundle.visa_abi_version = Some(desc_u32(note, endian, log)?);
            }
            intelgt_note::PRODUCT_CONFIG => {
                bundle.product_config = Some(ProductConfig(desc_u32(note, endian, log)?));
            }
            intelgt_note::INDIRECT_ACCESS_DETECTION_VERSION => {
                bundle.indirect_detection_version = Some(desc_u32(note, endian, log)?);
            }
            intelgt_note::INDIRECT_ACCESS_BUFFER_MAJOR_VERSION => {
                bundle.indirect_access_buffer_major_version = Some(desc_u32(note, endian, log)?);
            }
            unknown => {
                log.warn(format!(
                    "{PREFIX}Unknown IntelGT note type : {unknown}, ignoring it."
                ));
            }
        }
    }
    Ok(bundle)
}

/// Validates the container's compatibility notes against `target`.
///
/// Returns the decoded bundle on success so the caller can pick up the
/// feature versions. An incompatible device is an `UnhandledBinary` error
/// unless `force_device_compatibility` is set.
pub fn validate_target_device(
    elf: &Elf<'_>,
    note_section: Option<&ElfSection<'_>>,
    target: &TargetDevice,
    config: &DecodeConfig,
    log: &mut DecodeLog,
) -> Result<IntelGtNoteBundle, DecodeError> {
    if config.force_device_compatibility {
        let bundle = match note_section {
            Some(section) => {
                let notes = get_intel_gt_notes(section, elf.endian, log)?;
                decode_intel_gt_note_bundle(&notes, elf.endian, log)?
            }
            None => IntelGtNoteBundle::default(),
        };
        tracing::debug!(target: "zebin", "device validation bypassed by configuration");
        return Ok(bundle);
    }

    let Some(section) = note_section else {
        log.error(format!(
            "{PREFIX}Expected at least one .note.intelgt.compat section, got 0."
        ));
        return Err(DecodeError::UnhandledBinary);
    };
    let notes = get_intel_gt_notes(section, elf.endian, log)?;
    let bundle = decode_intel_gt_note_bundle(&notes, elf.endian, log)?;

    if let Some(version) = &bundle.ze_info_version {
        let parsed = ZeInfoVersion::parse(version).map_err(|message| {
            log.error(message);
            DecodeError::InvalidBinary
        })?;
        parsed.validate(log)?;
    }

    if !device_matches(elf, &bundle, target, config) {
        log.error(format!("{PREFIX}Unhandled target device."));
        return Err(DecodeError::UnhandledBinary);
    }
    Ok(bundle)
}

fn device_matches(
    elf: &Elf<'_>,
    bundle: &IntelGtNoteBundle,
    target: &TargetDevice,
    config: &DecodeConfig,
) -> bool {
    // A 64-bit container cannot serve a device with 32-bit pointers.
    if elf.is_64() && target.max_pointer_size_in_bytes < 8 {
        return false;
    }

    if let Some(config_note) = bundle.product_config.filter(|c| c.is_known()) {
        if config_note == target.product_config {
            return true;
        }
        return config.product_config_compat_mode
            && is_compatible_product_config(target.product_config, config_note);
    }

    let metadata = bundle.target_metadata;
    let mut product_family = bundle.product_family.unwrap_or(ProductFamily::UNKNOWN);
    let mut gfx_core = bundle.gfx_core.unwrap_or(GfxCoreFamily::UNKNOWN);

    // Legacy containers put the device id into the ELF machine field.
    if elf.machine != EM_INTELGT {
        if metadata.machine_is_gfx_core() {
            gfx_core = GfxCoreFamily(elf.machine.into());
        } else {
            product_family = ProductFamily(elf.machine.into());
        }
    }

    let matched = if product_family.is_known() {
        product_family == target.product_family
    } else if gfx_core.is_known() {
        gfx_core == target.gfx_core
    } else {
        false
    };
    if !matched {
        return false;
    }

    if metadata.validate_revision_id() {
        let min = metadata.min_hw_revision_id();
        let max = metadata.max_hw_revision_id();
        if target.stepping < min || target.stepping > max {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::encoder::ElfEncoder;
    use crate::elf::{self, section_names, Elf64};
    use object::Endianness;

    fn note_record(note_type: u32, desc: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&8u32.to_le_bytes()); // "IntelGT\0"
        out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        out.extend_from_slice(&note_type.to_le_bytes());
        out.extend_from_slice(b"IntelGT\0");
        out.extend_from_slice(desc);
        while out.len() % 4 != 0 {
            out.push(0);
        }
        out
    }

    fn container_with_notes(notes: &[u8]) -> Vec<u8> {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        enc.append_section(section_names::NOTE_INTELGT_COMPAT, object::elf::SHT_NOTE, notes);
        enc.encode()
    }

    fn decode<'a>(bytes: &'a [u8], log: &mut DecodeLog) -> Elf<'a> {
        Elf::decode::<Elf64>(bytes, log).unwrap()
    }

    fn target(product: u32) -> TargetDevice {
        TargetDevice {
            product_family: ProductFamily(product),
            ..Default::default()
        }
    }

    #[test]
    fn metadata_bit_positions_are_pinned() {
        let m = TargetMetadata { packed: 0 }
            .with_min_hw_revision_id(3)
            .with_validate_revision_id(true)
            .with_max_hw_revision_id(5)
            .with_generator_id(2)
            .with_machine_is_gfx_core(true);
        assert_eq!(
            m.packed,
            (3 << 8) | (1 << 13) | (1 << 15) | (5 << 16) | (2 << 21)
        );
        assert_eq!(m.min_hw_revision_id(), 3);
        assert!(m.validate_revision_id());
        assert!(!m.disable_extended_validation());
        assert!(m.machine_is_gfx_core());
        assert_eq!(m.max_hw_revision_id(), 5);
        assert_eq!(m.generator_id(), 2);
        assert_eq!(m.generator_specific_flags(), 0);
    }

    #[test]
    fn notes_decode_into_bundle() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&note_record(intelgt_note::PRODUCT_FAMILY, &18u32.to_le_bytes()));
        payload.extend_from_slice(&note_record(intelgt_note::GFX_CORE_FAMILY, &12u32.to_le_bytes()));
        payload.extend_from_slice(&note_record(intelgt_note::ZE_INFO_VERSION, b"1.39\0"));
        payload.extend_from_slice(&note_record(
            intelgt_note::INDIRECT_ACCESS_DETECTION_VERSION,
            &2u32.to_le_bytes(),
        ));
        payload.extend_from_slice(&note_record(99, &7u32.to_le_bytes()));
        let bytes = container_with_notes(&payload);

        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);
        let section = decoded.section_by_name(section_names::NOTE_INTELGT_COMPAT).unwrap();
        let notes = get_intel_gt_notes(section, Endianness::Little, &mut log).unwrap();
        assert_eq!(notes.len(), 5);
        let bundle = decode_intel_gt_note_bundle(&notes, Endianness::Little, &mut log).unwrap();
        assert_eq!(bundle.product_family, Some(ProductFamily(18)));
        assert_eq!(bundle.gfx_core, Some(GfxCoreFamily(12)));
        assert_eq!(bundle.ze_info_version.as_deref(), Some("1.39"));
        assert_eq!(bundle.indirect_detection_version, Some(2));
        assert!(log.warnings.contains("Unknown IntelGT note type : 99"));
        assert!(!log.has_errors());
    }

    #[test]
    fn oversized_note_is_an_out_of_bounds_error() {
        // desc_size runs past the section end.
        let mut payload = Vec::new();
        payload.extend_from_slice(&8u32.to_le_bytes());
        payload.extend_from_slice(&0x1000u32.to_le_bytes());
        payload.extend_from_slice(&intelgt_note::PRODUCT_FAMILY.to_le_bytes());
        payload.extend_from_slice(b"IntelGT\0");
        let bytes = container_with_notes(&payload);

        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);
        let section = decoded.section_by_name(section_names::NOTE_INTELGT_COMPAT).unwrap();
        let err = get_intel_gt_notes(section, Endianness::Little, &mut log).unwrap_err();
        assert_eq!(err, DecodeError::InvalidBinary);
        assert!(log.errors.contains("Out of bounds"));
    }

    #[test]
    fn version_note_requires_null_terminator() {
        let payload = note_record(intelgt_note::ZE_INFO_VERSION, b"1.39");
        let bytes = container_with_notes(&payload);
        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);
        let section = decoded.section_by_name(section_names::NOTE_INTELGT_COMPAT).unwrap();
        let notes = get_intel_gt_notes(section, Endianness::Little, &mut log).unwrap();
        let err = decode_intel_gt_note_bundle(&notes, Endianness::Little, &mut log).unwrap_err();
        assert_eq!(err, DecodeError::InvalidBinary);
        assert!(log.errors.contains("not null-terminated"));
    }

    #[test]
    fn product_family_match_and_stepping_window() {
        let metadata = TargetMetadata { packed: 0 }
            .with_validate_revision_id(true)
            .with_min_hw_revision_id(2)
            .with_max_hw_revision_id(4);
        let mut payload = Vec::new();
        payload.extend_from_slice(&note_record(intelgt_note::PRODUCT_FAMILY, &18u32.to_le_bytes()));
        payload.extend_from_slice(&note_record(
            intelgt_note::TARGET_METADATA,
            &metadata.packed.to_le_bytes(),
        ));
        let bytes = container_with_notes(&payload);
        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);
        let section = decoded.section_by_name(section_names::NOTE_INTELGT_COMPAT).unwrap();

        let mut dev = target(18);
        dev.stepping = 3;
        assert!(validate_target_device(
            &decoded,
            Some(section),
            &dev,
            &DecodeConfig::default(),
            &mut log
        )
        .is_ok());

        dev.stepping = 5;
        let mut log = DecodeLog::new();
        let err = validate_target_device(
            &decoded,
            Some(section),
            &dev,
            &DecodeConfig::default(),
            &mut log,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::UnhandledBinary);

        let mut log = DecodeLog::new();
        let err = validate_target_device(
            &decoded,
            Some(section),
            &target(19),
            &DecodeConfig::default(),
            &mut log,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::UnhandledBinary);
        assert!(log.errors.contains("Unhandled target device"));
    }

    #[test]
    fn product_config_exact_match_wins_and_compat_mode_extends_it() {
        let binary_config = ProductConfig::from_parts(12, 0, 0);
        let payload = note_record(intelgt_note::PRODUCT_CONFIG, &binary_config.0.to_le_bytes());
        let bytes = container_with_notes(&payload);
        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);
        let section = decoded.section_by_name(section_names::NOTE_INTELGT_COMPAT).unwrap();

        let exact = TargetDevice {
            product_config: binary_config,
            ..Default::default()
        };
        assert!(validate_target_device(
            &decoded,
            Some(section),
            &exact,
            &DecodeConfig::default(),
            &mut log
        )
        .is_ok());

        let newer = TargetDevice {
            product_config: ProductConfig::from_parts(12, 1, 0),
            ..Default::default()
        };
        let mut log = DecodeLog::new();
        assert!(validate_target_device(
            &decoded,
            Some(section),
            &newer,
            &DecodeConfig::default(),
            &mut log
        )
        .is_err());

        let compat = DecodeConfig {
            product_config_compat_mode: true,
            ..Default::default()
        };
        let mut log = DecodeLog::new();
        assert!(validate_target_device(&decoded, Some(section), &newer, &compat, &mut log).is_ok());
    }

    #[test]
    fn missing_notes_fail_unless_forced() {
        let mut enc = ElfEncoder::<Elf64>::new(elf::ET_ZEBIN_REL, elf::EM_INTELGT);
        enc.append_section(".ze_info", elf::SHT_ZEBIN_ZEINFO, b"version: '1.39'\n");
        let bytes = enc.encode();
        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);

        let err = validate_target_device(
            &decoded,
            None,
            &target(18),
            &DecodeConfig::default(),
            &mut log,
        )
        .unwrap_err();
        assert_eq!(err, DecodeError::UnhandledBinary);

        let forced = DecodeConfig {
            force_device_compatibility: true,
            ..Default::default()
        };
        let mut log = DecodeLog::new();
        assert!(validate_target_device(&decoded, None, &target(18), &forced, &mut log).is_ok());
    }

    #[test]
    fn pointer_width_must_cover_the_container() {
        let payload = note_record(intelgt_note::PRODUCT_FAMILY, &18u32.to_le_bytes());
        let bytes = container_with_notes(&payload);
        let mut log = DecodeLog::new();
        let decoded = decode(&bytes, &mut log);
        let section = decoded.section_by_name(section_names::NOTE_INTELGT_COMPAT).unwrap();

        let mut dev = target(18);
        dev.max_pointer_size_in_bytes = 4;
        assert!(validate_target_device(
            &decoded,
            Some(section),
            &dev,
            &DecodeConfig::default(),
            &mut log
        )
        .is_err());
    }
}
