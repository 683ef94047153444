//! Binary load/save of the object container.
//!
//! File layout, all fields little-endian:
//!
//! ```text
//! [ header (64) | section headers (16 each) | LOAD section data
//!   | symbols (16 each) | string table | relocations (16 each) ]
//! ```
//!
//! The string table starts with a single NUL so offset 0 always names the
//! empty string; every referenced name appears exactly once, NUL-terminated.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::{
    Object, ObjectError, ObjectFlags, RelocKind, Relocation, Section,
    SectionFlags, SectionType, Symbol, SymbolBinding, SymbolType, HEADER_SIZE,
    MAGIC, RELOC_ENTRY_SIZE, SECTION_HEADER_SIZE, SYMBOL_ENTRY_SIZE, VERSION,
};

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read a NUL-terminated string out of the string table.
fn string_at(table: &[u8], offset: u32) -> String {
    let offset = offset as usize;
    if offset >= table.len() {
        return String::new();
    }
    let end = table[offset..]
        .iter()
        .position(|&b| b == 0)
        .map_or(table.len(), |n| offset + n);
    String::from_utf8_lossy(&table[offset..end]).into_owned()
}

/// Build the deduplicated string table for the given names.
fn build_string_table<'a>(
    names: impl Iterator<Item = &'a str>,
) -> (Vec<u8>, HashMap<&'a str, u32>) {
    let mut table = vec![0u8];
    let mut offsets = HashMap::new();
    offsets.insert("", 0);
    for name in names {
        if name.is_empty() || offsets.contains_key(name) {
            continue;
        }
        offsets.insert(name, table.len() as u32);
        table.extend_from_slice(name.as_bytes());
        table.push(0);
    }
    (table, offsets)
}

impl Object {
    /// Load and validate an object file.
    ///
    /// Any structural problem (bad magic, wrong major version, a table that
    /// reads past the end of the file, an invariant violation) rejects the
    /// whole file; no partially loaded object is ever returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ObjectError> {
        let buf = fs::read(path.as_ref())?;
        Self::from_bytes(&buf)
    }

    /// Decode an object from an in-memory image.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, ObjectError> {
        if buf.len() < HEADER_SIZE {
            return Err(ObjectError::TruncatedTable { table: "header" });
        }

        let magic = read_u32(buf, 0x00);
        if magic != MAGIC {
            return Err(ObjectError::BadMagic {
                expected: MAGIC,
                found: magic,
            });
        }

        let version = read_u32(buf, 0x04);
        let major = (version >> 24) as u8;
        let supported = (VERSION >> 24) as u8;
        if major != supported {
            return Err(ObjectError::UnsupportedMajorVersion {
                found: major,
                supported,
            });
        }

        let flags = ObjectFlags::from_bits_truncate(read_u32(buf, 0x08));
        let section_count = read_u32(buf, 0x0C) as usize;
        let symbol_offset = read_u32(buf, 0x10) as usize;
        let symbol_count = read_u32(buf, 0x14) as usize;
        let string_offset = read_u32(buf, 0x18) as usize;
        let string_size = read_u32(buf, 0x1C) as usize;
        let reloc_offset = read_u32(buf, 0x20) as usize;
        let reloc_count = read_u32(buf, 0x24) as usize;

        let headers_end = HEADER_SIZE
            .checked_add(section_count.saturating_mul(SECTION_HEADER_SIZE))
            .ok_or(ObjectError::TruncatedTable {
                table: "section header",
            })?;
        if headers_end > buf.len() {
            return Err(ObjectError::TruncatedTable {
                table: "section header",
            });
        }
        let bounded = |offset: usize, len: usize, table: &'static str| {
            match offset.checked_add(len) {
                Some(end) if end <= buf.len() => Ok(()),
                _ => Err(ObjectError::TruncatedTable { table }),
            }
        };
        if string_offset > 0 {
            bounded(string_offset, string_size, "string")?;
        }
        if symbol_offset > 0 {
            bounded(symbol_offset, symbol_count * SYMBOL_ENTRY_SIZE, "symbol")?;
        }
        if reloc_offset > 0 {
            bounded(reloc_offset, reloc_count * RELOC_ENTRY_SIZE, "relocation")?;
        }

        let strings = if string_offset > 0 {
            &buf[string_offset..string_offset + string_size]
        } else {
            &[][..]
        };

        // Section headers, then their data in table order.
        let mut object = Object::new();
        object.set_flags(flags);
        let mut data_offset = headers_end;
        for i in 0..section_count {
            let at = HEADER_SIZE + i * SECTION_HEADER_SIZE;
            let name = string_at(strings, read_u32(buf, at));
            let virtual_address = read_u32(buf, at + 0x04);
            let size = read_u32(buf, at + 0x08);
            let ty = SectionType::try_from(read_u16(buf, at + 0x0C)).map_err(
                |_| ObjectError::TruncatedTable {
                    table: "section header",
                },
            )?;
            let flags = SectionFlags::from_bits_truncate(read_u16(buf, at + 0x0E));

            let data = if flags.contains(SectionFlags::LOAD) {
                let end = data_offset
                    .checked_add(size as usize)
                    .filter(|&end| end <= buf.len())
                    .ok_or(ObjectError::TruncatedTable {
                        table: "section data",
                    })?;
                let data = buf[data_offset..end].to_vec();
                data_offset = end;
                data
            } else {
                Vec::new()
            };

            object.add_section(Section {
                name,
                virtual_address,
                size,
                ty,
                flags,
                data,
            });
        }

        // Symbols are decoded straight into the table; scoping was enforced
        // when the object was built and is re-checked by validate().
        let symbol_count = if symbol_offset > 0 { symbol_count } else { 0 };
        for i in 0..symbol_count {
            let at = symbol_offset + i * SYMBOL_ENTRY_SIZE;
            let symbol = Symbol {
                name: string_at(strings, read_u32(buf, at)),
                value: read_u32(buf, at + 0x04),
                section: read_u32(buf, at + 0x08),
                ty: SymbolType::try_from(buf[at + 0x0C]).map_err(|_| {
                    ObjectError::TruncatedTable { table: "symbol" }
                })?,
                binding: SymbolBinding::try_from(buf[at + 0x0D]).map_err(
                    |_| ObjectError::TruncatedTable { table: "symbol" },
                )?,
                flags: read_u16(buf, at + 0x0E),
            };
            object.symbols_mut().push(symbol);
        }

        let reloc_count = if reloc_offset > 0 { reloc_count } else { 0 };
        for i in 0..reloc_count {
            let at = reloc_offset + i * RELOC_ENTRY_SIZE;
            let reloc = Relocation {
                offset: read_u32(buf, at),
                symbol: read_u32(buf, at + 0x04),
                section: read_u32(buf, at + 0x08),
                kind: RelocKind::try_from(read_u16(buf, at + 0x0C)).map_err(
                    |_| ObjectError::TruncatedTable { table: "relocation" },
                )?,
                addend: read_u16(buf, at + 0x0E) as i16,
            };
            object.relocations_mut().push(reloc);
        }

        object.validate()?;
        Ok(object)
    }

    /// Validate and write the object to `path`.
    ///
    /// The file is serialized to a buffer and written atomically: a
    /// temporary file in the target directory, then a rename.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ObjectError> {
        let buf = self.to_bytes()?;
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&buf)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(std::io::Error::from)?;
        Ok(())
    }

    /// Validate and serialize the object to its file image.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ObjectError> {
        self.validate()?;

        let names = self
            .sections()
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.symbols().iter().map(|s| s.name.as_str()));
        let (strings, offsets) = build_string_table(names);

        let section_count = self.sections().len();
        let symbol_count = self.symbols().len();
        let reloc_count = self.relocations().len();
        let data_size: usize = self
            .sections()
            .iter()
            .filter(|s| s.is_loaded())
            .map(|s| s.data.len())
            .sum();

        let headers_at = HEADER_SIZE;
        let data_at = headers_at + section_count * SECTION_HEADER_SIZE;
        let symbols_at = data_at + data_size;
        let strings_at = symbols_at + symbol_count * SYMBOL_ENTRY_SIZE;
        let relocs_at = strings_at + strings.len();
        let total = relocs_at + reloc_count * RELOC_ENTRY_SIZE;

        let mut buf = vec![0u8; total];
        write_u32(&mut buf, 0x00, MAGIC);
        write_u32(&mut buf, 0x04, VERSION);
        write_u32(&mut buf, 0x08, self.flags().bits());
        write_u32(&mut buf, 0x0C, section_count as u32);
        write_u32(
            &mut buf,
            0x10,
            if symbol_count > 0 { symbols_at as u32 } else { 0 },
        );
        write_u32(&mut buf, 0x14, symbol_count as u32);
        write_u32(&mut buf, 0x18, strings_at as u32);
        write_u32(&mut buf, 0x1C, strings.len() as u32);
        write_u32(
            &mut buf,
            0x20,
            if reloc_count > 0 { relocs_at as u32 } else { 0 },
        );
        write_u32(&mut buf, 0x24, reloc_count as u32);
        // 0x28..0x40 reserved, already zero.

        let mut data_offset = data_at;
        for (i, section) in self.sections().iter().enumerate() {
            let at = headers_at + i * SECTION_HEADER_SIZE;
            write_u32(&mut buf, at, offsets[section.name.as_str()]);
            write_u32(&mut buf, at + 0x04, section.virtual_address);
            write_u32(&mut buf, at + 0x08, section.size);
            write_u16(&mut buf, at + 0x0C, section.ty as u16);
            write_u16(&mut buf, at + 0x0E, section.flags.bits());

            if section.is_loaded() {
                buf[data_offset..data_offset + section.data.len()]
                    .copy_from_slice(&section.data);
                data_offset += section.data.len();
            }
        }

        for (i, symbol) in self.symbols().iter().enumerate() {
            let at = symbols_at + i * SYMBOL_ENTRY_SIZE;
            write_u32(&mut buf, at, offsets[symbol.name.as_str()]);
            write_u32(&mut buf, at + 0x04, symbol.value);
            write_u32(&mut buf, at + 0x08, symbol.section);
            buf[at + 0x0C] = symbol.ty as u8;
            buf[at + 0x0D] = symbol.binding as u8;
            write_u16(&mut buf, at + 0x0E, symbol.flags);
        }

        buf[strings_at..strings_at + strings.len()].copy_from_slice(&strings);

        for (i, reloc) in self.relocations().iter().enumerate() {
            let at = relocs_at + i * RELOC_ENTRY_SIZE;
            write_u32(&mut buf, at, reloc.offset);
            write_u32(&mut buf, at + 0x04, reloc.symbol);
            write_u32(&mut buf, at + 0x08, reloc.section);
            write_u16(&mut buf, at + 0x0C, reloc.kind as u16);
            write_u16(&mut buf, at + 0x0E, reloc.addend as u16);
        }

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_table_starts_with_nul_and_dedups() {
        let (table, offsets) =
            build_string_table(["a", "bb", "a", "", "bb"].into_iter());
        assert_eq!(table[0], 0);
        assert_eq!(offsets[""], 0);
        assert_eq!(string_at(&table, offsets["a"]), "a");
        assert_eq!(string_at(&table, offsets["bb"]), "bb");
        // 1 leading NUL + "a\0" + "bb\0"
        assert_eq!(table.len(), 1 + 2 + 3);
    }

    #[quickcheck_macros::quickcheck]
    fn every_interned_name_reads_back(names: Vec<String>) -> bool {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.replace('\0', ""))
            .collect();
        let (table, offsets) =
            build_string_table(names.iter().map(String::as_str));
        names
            .iter()
            .all(|n| string_at(&table, offsets[n.as_str()]) == *n)
    }

    #[test]
    fn string_at_out_of_range_is_empty() {
        let (table, _) = build_string_table(["x"].into_iter());
        assert_eq!(string_at(&table, 999), "");
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(matches!(
            Object::from_bytes(&[0u8; 10]),
            Err(ObjectError::TruncatedTable { table: "header" })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert!(matches!(
            Object::from_bytes(&buf),
            Err(ObjectError::BadMagic { .. })
        ));
    }

    #[test]
    fn wrong_major_version_is_rejected() {
        let mut buf = vec![0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&0x0200_0000u32.to_le_bytes());
        assert!(matches!(
            Object::from_bytes(&buf),
            Err(ObjectError::UnsupportedMajorVersion {
                found: 2,
                supported: 1
            })
        ));
    }

    #[test]
    fn truncated_symbol_table_is_rejected() {
        let empty = Object::new().to_bytes().unwrap();
        let mut buf = empty;
        // Claim a symbol table far past the end of the file.
        write_u32(&mut buf, 0x10, 0x1000);
        write_u32(&mut buf, 0x14, 4);
        assert!(matches!(
            Object::from_bytes(&buf),
            Err(ObjectError::TruncatedTable { table: "symbol" })
        ));
    }
}
