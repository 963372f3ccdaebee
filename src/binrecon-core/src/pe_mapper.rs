//! Parses the DOS header, NT headers, section table, and the Export/Import
//! data directory entries into a navigable [`BinaryStructure`] tree and a
//! byte-accurate [`DataRegion`] map.
//!
//! A parse exception never propagates out of [`PEMapper::parse`]: it
//! attaches a "Parse Error" child to the root and stops descending. The
//! function always returns a tree.

use crate::dos_time::format_unix_timestamp;
use crate::structure::{BinaryStructure, DataRegion, RegionKind, Value};
use byteorder::{ByteOrder, LE};
use std::collections::HashMap;

/// Supplies additional [`DataRegion`]s after native parsing — e.g. a plugin
/// that classifies overlay data or highlights a signature hit. A provider
/// error is recorded in the root's metadata; the remaining providers still
/// run.
pub trait RegionProvider {
    fn provide(&self, data: &[u8], root: &BinaryStructure) -> Result<Vec<DataRegion>, String>;
}

/// Probe an ordered list of candidate field names against a decoded record,
/// returning the first hit. This is the seam that would let a different PE
/// parsing backend's field naming stand in for ours without touching the
/// rest of the mapper.
pub(crate) fn probe_field(fields: &HashMap<&'static str, u64>, candidates: &[&str]) -> Option<u64> {
    candidates.iter().find_map(|c| fields.get(c).copied())
}

struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    fn u16(&self, offset: usize) -> Result<u16, String> {
        self.data
            .get(offset..offset + 2)
            .map(LE::read_u16)
            .ok_or_else(|| format!("read u16 out of bounds at {:#x}", offset))
    }

    fn u32(&self, offset: usize) -> Result<u32, String> {
        self.data
            .get(offset..offset + 4)
            .map(LE::read_u32)
            .ok_or_else(|| format!("read u32 out of bounds at {:#x}", offset))
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8], String> {
        self.data
            .get(offset..offset + len)
            .ok_or_else(|| format!("read {} bytes out of bounds at {:#x}", len, offset))
    }
}

fn machine_name(value: u16) -> &'static str {
    match value {
        0x014c => "IMAGE_FILE_MACHINE_I386",
        0x8664 => "IMAGE_FILE_MACHINE_AMD64",
        0x01c0 => "IMAGE_FILE_MACHINE_ARM",
        0xaa64 => "IMAGE_FILE_MACHINE_ARM64",
        _ => "IMAGE_FILE_MACHINE_UNKNOWN",
    }
}

const FILE_CHARACTERISTIC_FLAGS: &[(u16, &str)] = &[
    (0x0001, "RELOCS_STRIPPED"),
    (0x0002, "EXECUTABLE_IMAGE"),
    (0x0020, "LARGE_ADDRESS_AWARE"),
    (0x0100, "32BIT_MACHINE"),
    (0x2000, "DLL"),
];

fn characteristics_flags(value: u16, table: &[(u16, &str)]) -> String {
    let names: Vec<&str> = table
        .iter()
        .filter(|(bit, _)| value & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(" | ")
    }
}

const SECTION_CNT_CODE: u32 = 0x0000_0020;
const SECTION_CNT_INITIALIZED_DATA: u32 = 0x0000_0040;
const SECTION_CNT_UNINITIALIZED_DATA: u32 = 0x0000_0080;

fn section_color(characteristics: u32) -> u32 {
    if characteristics & SECTION_CNT_CODE != 0 {
        0x00FF00
    } else if characteristics & SECTION_CNT_INITIALIZED_DATA != 0 {
        0x0000FF
    } else if characteristics & SECTION_CNT_UNINITIALIZED_DATA != 0 {
        0x808080
    } else {
        0xFFFF00
    }
}

/// Parses PE structure and emits a navigable tree plus a region map.
#[derive(Default)]
pub struct PEMapper;

impl PEMapper {
    pub fn new() -> Self {
        PEMapper
    }

    pub fn parse(
        &self,
        data: &[u8],
        providers: &[Box<dyn RegionProvider>],
    ) -> (BinaryStructure, Vec<DataRegion>) {
        let root = BinaryStructure::new("PE File", "Root");
        let mut regions = Vec::new();

        if let Err(e) = self.parse_native(data, &root, &mut regions) {
            tracing::error!(error = %e, "PE parse failed");
            root.add_child(BinaryStructure::new("Parse Error", "Error").with_display(e));
        }

        for (i, provider) in providers.iter().enumerate() {
            match provider.provide(data, &root) {
                Ok(extra) => regions.extend(extra),
                Err(e) => {
                    tracing::warn!(provider = i, error = %e, "region provider failed");
                    root.clone().with_metadata(format!("provider_error_{i}"), e);
                }
            }
        }

        (root, regions)
    }

    fn parse_native(
        &self,
        data: &[u8],
        root: &BinaryStructure,
        regions: &mut Vec<DataRegion>,
    ) -> Result<(), String> {
        let r = Reader { data };

        // --- DOS header ---
        let dos = BinaryStructure::new("DOS Header", "IMAGE_DOS_HEADER")
            .with_offset(0)
            .with_size(64);
        root.add_child(dos.clone());
        regions.push(DataRegion::new(0, 64, RegionKind::Header).with_structure(&dos).with_layer(0));

        let e_magic = r.u16(0)?;
        dos.add_child(
            BinaryStructure::new("e_magic", "Field")
                .with_offset(0)
                .with_size(2)
                .with_value(Value::Integer(e_magic as i64))
                .with_display(format!("{:#06X} (MZ)", e_magic)),
        );
        let e_cblp = r.u16(2)?;
        dos.add_child(
            BinaryStructure::new("e_cblp", "Field")
                .with_offset(2)
                .with_size(2)
                .with_value(Value::Integer(e_cblp as i64)),
        );
        let e_cp = r.u16(4)?;
        dos.add_child(
            BinaryStructure::new("e_cp", "Field")
                .with_offset(4)
                .with_size(2)
                .with_value(Value::Integer(e_cp as i64)),
        );
        let e_lfanew = r.u32(0x3C)?;
        dos.add_child(
            BinaryStructure::new("e_lfanew", "Field")
                .with_offset(0x3C)
                .with_size(4)
                .with_value(Value::Integer(e_lfanew as i64))
                .with_display(format!("{:#010X}", e_lfanew)),
        );

        // --- NT headers ---
        let nt_offset = e_lfanew as u64;
        let nt = BinaryStructure::new("NT Headers", "IMAGE_NT_HEADERS")
            .with_offset(nt_offset)
            .with_size(248);
        root.add_child(nt.clone());
        regions.push(DataRegion::new(nt_offset, 248, RegionKind::Header).with_structure(&nt));

        let file_header_offset = nt_offset as usize + 4;
        let file_header = BinaryStructure::new("File Header", "IMAGE_FILE_HEADER")
            .with_offset(file_header_offset as u64)
            .with_size(20);
        nt.add_child(file_header.clone());

        let machine = r.u16(file_header_offset)?;
        file_header.add_child(
            BinaryStructure::new("Machine", "Field")
                .with_offset(0)
                .with_size(2)
                .with_value(Value::Integer(machine as i64))
                .with_display(machine_name(machine)),
        );
        let number_of_sections = r.u16(file_header_offset + 2)?;
        file_header.add_child(
            BinaryStructure::new("NumberOfSections", "Field")
                .with_offset(2)
                .with_size(2)
                .with_value(Value::Integer(number_of_sections as i64)),
        );
        let time_date_stamp = r.u32(file_header_offset + 4)?;
        file_header.add_child(
            BinaryStructure::new("TimeDateStamp", "Field")
                .with_offset(4)
                .with_size(4)
                .with_value(Value::Integer(time_date_stamp as i64))
                .with_display(format_unix_timestamp(time_date_stamp)),
        );
        let characteristics = r.u16(file_header_offset + 16)?;
        file_header.add_child(
            BinaryStructure::new("Characteristics", "Field")
                .with_offset(16)
                .with_size(2)
                .with_value(Value::Integer(characteristics as i64))
                .with_display(characteristics_flags(characteristics, FILE_CHARACTERISTIC_FLAGS)),
        );

        // --- Optional header ---
        let optional_offset = file_header_offset + 20;
        let magic = r.u16(optional_offset)?;
        let is_pe32_plus = magic == 0x20b;
        let (image_base_rel, image_base_size): (usize, u64) =
            if is_pe32_plus { (24, 8) } else { (28, 4) };
        let optional_size: usize = if is_pe32_plus { 240 } else { 224 };

        let optional_header = BinaryStructure::new("Optional Header", "IMAGE_OPTIONAL_HEADER")
            .with_offset(optional_offset as u64)
            .with_size(optional_size as u64);
        nt.add_child(optional_header.clone());

        optional_header.add_child(
            BinaryStructure::new("Magic", "Field")
                .with_offset(0)
                .with_size(2)
                .with_value(Value::Integer(magic as i64))
                .with_display(if is_pe32_plus { "PE32+" } else { "PE32" }),
        );
        let entry_point = r.u32(optional_offset + 16)?;
        optional_header.add_child(
            BinaryStructure::new("AddressOfEntryPoint", "Field")
                .with_offset(16)
                .with_size(4)
                .with_value(Value::Integer(entry_point as i64))
                .with_display(format!("{:#010X}", entry_point)),
        );

        let image_base: u64 = if is_pe32_plus {
            r.bytes(optional_offset + image_base_rel, 8).map(LE::read_u64)?
        } else {
            r.u32(optional_offset + image_base_rel)? as u64
        };
        optional_header.add_child(
            BinaryStructure::new("ImageBase", "Field")
                .with_offset(image_base_rel as u64)
                .with_size(image_base_size)
                .with_value(Value::Integer(image_base as i64))
                .with_display(format!("{:#X}", image_base)),
        );

        let section_alignment = r.u32(optional_offset + 32)?;
        optional_header.add_child(
            BinaryStructure::new("SectionAlignment", "Field")
                .with_offset(32)
                .with_size(4)
                .with_value(Value::Integer(section_alignment as i64)),
        );
        let file_alignment = r.u32(optional_offset + 36)?;
        optional_header.add_child(
            BinaryStructure::new("FileAlignment", "Field")
                .with_offset(36)
                .with_size(4)
                .with_value(Value::Integer(file_alignment as i64)),
        );
        let size_of_image = r.u32(optional_offset + 56)?;
        optional_header.add_child(
            BinaryStructure::new("SizeOfImage", "Field")
                .with_offset(56)
                .with_size(4)
                .with_value(Value::Integer(size_of_image as i64)),
        );
        let size_of_headers = r.u32(optional_offset + 60)?;
        optional_header.add_child(
            BinaryStructure::new("SizeOfHeaders", "Field")
                .with_offset(60)
                .with_size(4)
                .with_value(Value::Integer(size_of_headers as i64)),
        );

        // --- Data directories (offsets 96/104 within the optional header) ---
        let data_directories = BinaryStructure::new("Data Directories", "DataDirectories");
        root.add_child(data_directories.clone());

        let dir_base = optional_offset + 96;
        add_directory_if_present(&r, &data_directories, dir_base, "Export")?;
        add_directory_if_present(&r, &data_directories, dir_base + 8, "Import")?;

        // --- Section table ---
        let sections_offset = optional_offset + optional_size;
        let sections_size = number_of_sections as u64 * 40;
        let sections_node = BinaryStructure::new("Sections", "Sections")
            .with_offset(sections_offset as u64)
            .with_size(sections_size);
        root.add_child(sections_node.clone());

        for i in 0..number_of_sections as usize {
            let sec_offset = sections_offset + i * 40;
            let name_bytes = r.bytes(sec_offset, 8)?;
            let name = String::from_utf8_lossy(name_bytes)
                .trim_end_matches('\0')
                .to_string();
            let section = BinaryStructure::new(name.clone(), "IMAGE_SECTION_HEADER")
                .with_offset(sec_offset as u64)
                .with_size(40);
            sections_node.add_child(section.clone());

            let mut fields: HashMap<&'static str, u64> = HashMap::new();
            let virtual_size = r.u32(sec_offset + 8)?;
            section.add_child(
                BinaryStructure::new("VirtualSize", "Field")
                    .with_offset(8)
                    .with_size(4)
                    .with_value(Value::Integer(virtual_size as i64)),
            );
            let virtual_address = r.u32(sec_offset + 12)?;
            section.add_child(
                BinaryStructure::new("VirtualAddress", "Field")
                    .with_offset(12)
                    .with_size(4)
                    .with_value(Value::Integer(virtual_address as i64)),
            );
            let size_of_raw_data = r.u32(sec_offset + 16)?;
            section.add_child(
                BinaryStructure::new("SizeOfRawData", "Field")
                    .with_offset(16)
                    .with_size(4)
                    .with_value(Value::Integer(size_of_raw_data as i64)),
            );
            let pointer_to_raw_data = r.u32(sec_offset + 20)?;
            fields.insert("PointerToRawData", pointer_to_raw_data as u64);
            section.add_child(
                BinaryStructure::new("PointerToRawData", "Field")
                    .with_offset(20)
                    .with_size(4)
                    .with_value(Value::Integer(pointer_to_raw_data as i64)),
            );
            let section_characteristics = r.u32(sec_offset + 36)?;
            section.add_child(
                BinaryStructure::new("Characteristics", "Field")
                    .with_offset(36)
                    .with_size(4)
                    .with_value(Value::Integer(section_characteristics as i64)),
            );

            let region_offset =
                probe_field(&fields, &["Header.PointerToRawData", "PointerToRawData", "Offset"])
                    .unwrap_or(pointer_to_raw_data as u64);
            regions.push(
                DataRegion::new(region_offset, size_of_raw_data as u64, RegionKind::Code)
                    .with_color(section_color(section_characteristics))
                    .with_layer(1)
                    .with_structure(&section),
            );
        }

        Ok(())
    }
}

fn add_directory_if_present(
    r: &Reader,
    parent: &BinaryStructure,
    offset: usize,
    name: &str,
) -> Result<(), String> {
    let rva = r.u32(offset)?;
    let size = r.u32(offset + 4)?;
    if rva == 0 && size == 0 {
        return Ok(());
    }
    let dir = BinaryStructure::new(name, "DataDirectory").with_offset(offset as u64).with_size(8);
    dir.add_child(
        BinaryStructure::new("RVA", "Field")
            .with_offset(0)
            .with_size(4)
            .with_value(Value::Integer(rva as i64))
            .with_display(format!("{:#010X}", rva)),
    );
    dir.add_child(
        BinaryStructure::new("Size", "Field")
            .with_offset(4)
            .with_size(4)
            .with_value(Value::Integer(size as i64)),
    );
    parent.add_child(dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pe(e_lfanew: u32, machine: u16, sections: u16) -> Vec<u8> {
        let mut data = vec![0u8; e_lfanew as usize + 4 + 20 + 224 + sections as usize * 40];
        LE::write_u16(&mut data[0..2], 0x5A4D);
        LE::write_u32(&mut data[0x3C..0x40], e_lfanew);
        let nt = e_lfanew as usize;
        data[nt..nt + 4].copy_from_slice(b"PE\0\0");
        LE::write_u16(&mut data[nt + 4..nt + 6], machine);
        LE::write_u16(&mut data[nt + 6..nt + 8], sections);
        LE::write_u32(&mut data[nt + 8..nt + 12], 0x5F000000); // TimeDateStamp
        let opt = nt + 24;
        LE::write_u16(&mut data[opt..opt + 2], 0x10b); // PE32
        LE::write_u32(&mut data[opt + 16..opt + 20], 0x1000); // AddressOfEntryPoint
        data
    }

    #[test]
    fn mz_header_with_known_lfanew() {
        let data = minimal_pe(0x80, 0x014c, 0);
        let mapper = PEMapper::new();
        let (root, _regions) = mapper.parse(&data, &[]);
        let e_magic = root.find_by_path(&["DOS Header", "e_magic"]).unwrap();
        assert_eq!(e_magic.display_value().unwrap(), "0x5A4D (MZ)");
        let e_lfanew = root.find_by_path(&["DOS Header", "e_lfanew"]).unwrap();
        assert_eq!(e_lfanew.display_value().unwrap(), "0x00000080");
        let machine = root.find_by_path(&["NT Headers", "File Header", "Machine"]).unwrap();
        assert_eq!(machine.display_value().unwrap(), "IMAGE_FILE_MACHINE_I386");
        let entry = root
            .find_by_path(&["NT Headers", "Optional Header", "AddressOfEntryPoint"])
            .unwrap();
        assert_eq!(entry.value(), Some(Value::Integer(0x1000)));
    }

    #[test]
    fn truncated_file_attaches_parse_error() {
        let data = vec![0u8; 8];
        let mapper = PEMapper::new();
        let (root, regions) = mapper.parse(&data, &[]);
        assert!(root.children().iter().any(|c| c.name() == "Parse Error"));
        assert!(regions.is_empty());
    }

    #[test]
    fn sections_carry_absolute_offsets_and_color() {
        let mut data = minimal_pe(0x80, 0x014c, 1);
        let nt = 0x80usize;
        let opt = nt + 24;
        let sec_off = opt + 224;
        data[sec_off..sec_off + 4].copy_from_slice(b".text");
        LE::write_u32(&mut data[sec_off + 8..sec_off + 12], 0x2000); // VirtualSize
        LE::write_u32(&mut data[sec_off + 16..sec_off + 20], 0x400); // SizeOfRawData
        LE::write_u32(&mut data[sec_off + 20..sec_off + 24], 0x200); // PointerToRawData
        LE::write_u32(&mut data[sec_off + 36..sec_off + 40], SECTION_CNT_CODE);

        let mapper = PEMapper::new();
        let (root, regions) = mapper.parse(&data, &[]);
        let sections = root.find_by_path(&["Sections"]).unwrap();
        assert_eq!(sections.children().len(), 1);
        let pointer = root
            .find_by_path(&["Sections", ".text", "PointerToRawData"])
            .unwrap();
        assert_eq!(pointer.value(), Some(Value::Integer(0x200)));

        let code_region = regions.iter().find(|r| r.kind == RegionKind::Code).unwrap();
        assert_eq!(code_region.offset, 0x200);
        assert_eq!(code_region.highlight_color, 0x00FF00);
    }

    struct FailingProvider;
    impl RegionProvider for FailingProvider {
        fn provide(&self, _data: &[u8], _root: &BinaryStructure) -> Result<Vec<DataRegion>, String> {
            Err("boom".to_string())
        }
    }
    struct OkProvider;
    impl RegionProvider for OkProvider {
        fn provide(&self, _data: &[u8], _root: &BinaryStructure) -> Result<Vec<DataRegion>, String> {
            Ok(vec![DataRegion::new(0, 1, RegionKind::Overlay)])
        }
    }

    #[test]
    fn provider_error_does_not_stop_remaining_providers() {
        let data = minimal_pe(0x80, 0x014c, 0);
        let mapper = PEMapper::new();
        let providers: Vec<Box<dyn RegionProvider>> = vec![Box::new(FailingProvider), Box::new(OkProvider)];
        let (root, regions) = mapper.parse(&data, &providers);
        assert!(regions.iter().any(|r| r.kind == RegionKind::Overlay));
        assert!(root.metadata().contains_key("provider_error_0"));
    }
}
