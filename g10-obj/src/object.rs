use std::collections::HashSet;

use itertools::Itertools;

use crate::{
    ObjectError, RelocKind, Relocation, Section, SectionType, Symbol,
    SymbolBinding, SECTION_ABS, SECTION_COMMON, SECTION_UNDEF,
};

bitflags::bitflags! {
    /// Header flags of an object file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ObjectFlags: u32 {
        /// The object carries relocations for the linker to resolve.
        const RELOCATABLE = 1 << 0;
        /// The object defines a program entry point symbol.
        const HAS_ENTRY = 1 << 1;
    }
}

/// An in-memory relocatable object.
///
/// Construction goes through the `add_*` mutators, which enforce the
/// reference and scoping rules incrementally; [`Object::validate`] checks
/// the whole-container invariants and is run by both `load` and `save`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    flags: ObjectFlags,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
    relocations: Vec<Relocation>,
}

impl Object {
    /// An empty object with no flags set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header flags.
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    /// Replace the header flags.
    pub fn set_flags(&mut self, flags: ObjectFlags) {
        self.flags = flags;
    }

    /// The section table.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Mutable access to one section.
    pub fn section_mut(&mut self, index: usize) -> Option<&mut Section> {
        self.sections.get_mut(index)
    }

    /// The symbol table.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Mutable access to one symbol.
    pub fn symbol_mut(&mut self, index: usize) -> Option<&mut Symbol> {
        self.symbols.get_mut(index)
    }

    /// The relocation table.
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Append a section, returning its index.
    pub fn add_section(&mut self, section: Section) -> usize {
        tracing::debug!(
            name = %section.name,
            base = format_args!("{:#010x}", section.virtual_address),
            ty = ?section.ty,
            "adding section"
        );
        self.sections.push(section);
        self.sections.len() - 1
    }

    /// Append or update a symbol, returning its index.
    ///
    /// Scoping rules: a global may not be redefined; a name declared extern
    /// may not gain a local or global definition in the same object (and
    /// vice versa); a local may be shadowed by a later local, which updates
    /// the existing entry in place. Extern symbols must be undefined.
    pub fn add_symbol(&mut self, symbol: Symbol) -> Result<usize, ObjectError> {
        for (i, existing) in self.symbols.iter_mut().enumerate() {
            if existing.name != symbol.name {
                continue;
            }

            if existing.binding == SymbolBinding::Global {
                return Err(ObjectError::InvalidSymbolScoping {
                    name: symbol.name,
                    reason: "global symbol cannot be redefined".into(),
                });
            }

            if existing.binding == SymbolBinding::Extern
                && symbol.binding != SymbolBinding::Extern
            {
                return Err(ObjectError::InvalidSymbolScoping {
                    name: symbol.name,
                    reason: "extern symbol cannot be defined in the same object"
                        .into(),
                });
            }

            if existing.binding == SymbolBinding::Extern
                && symbol.binding == SymbolBinding::Extern
            {
                // Repeated extern declarations collapse to one entry.
                return Ok(i);
            }

            if symbol.binding == SymbolBinding::Extern {
                return Err(ObjectError::InvalidSymbolScoping {
                    name: symbol.name,
                    reason: "defined symbol cannot also be declared extern"
                        .into(),
                });
            }

            // Local shadowed by a later local or promoted to global.
            *existing = symbol;
            return Ok(i);
        }

        if symbol.binding == SymbolBinding::Extern
            && symbol.section != SECTION_UNDEF
        {
            return Err(ObjectError::InvalidSymbolScoping {
                name: symbol.name,
                reason: "extern symbol must have an undefined section index"
                    .into(),
            });
        }

        self.symbols.push(symbol);
        Ok(self.symbols.len() - 1)
    }

    /// Append a relocation, returning its index.
    ///
    /// The symbol and section indices must be in range and the offset must
    /// fall inside the section's bytes.
    pub fn add_relocation(
        &mut self,
        reloc: Relocation,
    ) -> Result<usize, ObjectError> {
        let index = self.relocations.len();
        if reloc.section as usize >= self.sections.len() {
            return Err(ObjectError::DanglingRelocation {
                index,
                reason: format!("section index {} out of range", reloc.section),
            });
        }
        if reloc.symbol as usize >= self.symbols.len() {
            return Err(ObjectError::DanglingRelocation {
                index,
                reason: format!("symbol index {} out of range", reloc.symbol),
            });
        }
        let section = &self.sections[reloc.section as usize];
        if reloc.offset >= section.data.len() as u32 {
            return Err(ObjectError::DanglingRelocation {
                index,
                reason: format!(
                    "offset {} is beyond section size {}",
                    reloc.offset,
                    section.data.len()
                ),
            });
        }
        self.relocations.push(reloc);
        Ok(index)
    }

    /// Raw symbol table access for the loader, which re-validates as a
    /// whole instead of through the scoping rules.
    pub(crate) fn symbols_mut(&mut self) -> &mut Vec<Symbol> {
        &mut self.symbols
    }

    pub(crate) fn relocations_mut(&mut self) -> &mut Vec<Relocation> {
        &mut self.relocations
    }

    /// Index of the first symbol with the given name.
    pub fn find_symbol(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    /// Index of the first section with the given name.
    pub fn find_section(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// Check every container invariant.
    ///
    /// Both `load` and `save` run this; a caller building an object by hand
    /// can run it early to catch mistakes before writing.
    pub fn validate(&self) -> Result<(), ObjectError> {
        self.validate_sections()?;
        self.validate_symbols()?;
        self.validate_relocations()
    }

    fn validate_sections(&self) -> Result<(), ObjectError> {
        for (index, section) in self.sections.iter().enumerate() {
            let in_rom = section.virtual_address & 0x8000_0000 == 0;
            let region_ok = match section.ty {
                SectionType::Null => true,
                SectionType::Code | SectionType::Data => in_rom,
                SectionType::Bss => !in_rom,
            };
            if !region_ok {
                return Err(ObjectError::RegionTypeMismatch {
                    index,
                    name: section.name.clone(),
                    ty: section.ty,
                    address: section.virtual_address,
                });
            }
            if section.is_loaded() && section.size as usize != section.data.len()
            {
                return Err(ObjectError::SectionSizeMismatch {
                    index,
                    name: section.name.clone(),
                    size: section.size,
                    actual: section.data.len(),
                });
            }
        }

        let occupied = self
            .sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.ty != SectionType::Null && s.size > 0);
        for ((i, a), (j, b)) in occupied.tuple_combinations() {
            if a.virtual_address < b.end_address()
                && b.virtual_address < a.end_address()
            {
                return Err(ObjectError::SectionOverlap {
                    first: i,
                    second: j,
                    first_start: a.virtual_address,
                    first_end: a.end_address(),
                    second_start: b.virtual_address,
                    second_end: b.end_address(),
                });
            }
        }

        Ok(())
    }

    fn validate_symbols(&self) -> Result<(), ObjectError> {
        let mut globals = HashSet::new();
        for symbol in &self.symbols {
            if symbol.binding == SymbolBinding::Global {
                if !globals.insert(symbol.name.as_str()) {
                    return Err(ObjectError::InvalidSymbolScoping {
                        name: symbol.name.clone(),
                        reason: "duplicate global definition".into(),
                    });
                }
                if symbol.section == SECTION_UNDEF {
                    return Err(ObjectError::InvalidSymbolScoping {
                        name: symbol.name.clone(),
                        reason: "global symbol must be defined".into(),
                    });
                }
            }

            if symbol.binding == SymbolBinding::Extern {
                if symbol.section != SECTION_UNDEF {
                    return Err(ObjectError::InvalidSymbolScoping {
                        name: symbol.name.clone(),
                        reason: "extern symbol must be undefined".into(),
                    });
                }
                if symbol.value != 0 {
                    return Err(ObjectError::InvalidSymbolScoping {
                        name: symbol.name.clone(),
                        reason: "extern symbol must have value 0".into(),
                    });
                }
            }

            let special = matches!(
                symbol.section,
                SECTION_UNDEF | SECTION_ABS | SECTION_COMMON
            );
            if !special && symbol.section as usize >= self.sections.len() {
                return Err(ObjectError::InvalidSymbolScoping {
                    name: symbol.name.clone(),
                    reason: format!(
                        "section index {} out of range",
                        symbol.section
                    ),
                });
            }
        }
        Ok(())
    }

    fn validate_relocations(&self) -> Result<(), ObjectError> {
        for (index, reloc) in self.relocations.iter().enumerate() {
            if reloc.section as usize >= self.sections.len() {
                return Err(ObjectError::DanglingRelocation {
                    index,
                    reason: format!(
                        "section index {} out of range",
                        reloc.section
                    ),
                });
            }
            if reloc.symbol as usize >= self.symbols.len() {
                return Err(ObjectError::DanglingRelocation {
                    index,
                    reason: format!("symbol index {} out of range", reloc.symbol),
                });
            }
            let section = &self.sections[reloc.section as usize];
            let end = u64::from(reloc.offset) + u64::from(reloc.kind.width());
            if end > section.data.len() as u64 {
                return Err(ObjectError::DanglingRelocation {
                    index,
                    reason: format!(
                        "slot {}..{} is beyond section size {}",
                        reloc.offset,
                        end,
                        section.data.len()
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_section(base: u32, bytes: usize) -> Section {
        let mut section = Section::code(".text", base);
        section.data = vec![0; bytes];
        section.size = bytes as u32;
        section
    }

    #[test]
    fn global_cannot_be_redefined() {
        let mut obj = Object::new();
        obj.add_section(code_section(0x2000, 4));
        let mut sym = Symbol::label("main", 0x2000, 0);
        sym.binding = SymbolBinding::Global;
        obj.add_symbol(sym.clone()).unwrap();
        assert!(matches!(
            obj.add_symbol(sym),
            Err(ObjectError::InvalidSymbolScoping { .. })
        ));
    }

    #[test]
    fn extern_cannot_gain_a_definition() {
        let mut obj = Object::new();
        obj.add_section(code_section(0x2000, 4));
        obj.add_symbol(Symbol::extern_("far")).unwrap();
        assert!(matches!(
            obj.add_symbol(Symbol::label("far", 0x2000, 0)),
            Err(ObjectError::InvalidSymbolScoping { .. })
        ));
    }

    #[test]
    fn repeated_extern_collapses() {
        let mut obj = Object::new();
        let a = obj.add_symbol(Symbol::extern_("far")).unwrap();
        let b = obj.add_symbol(Symbol::extern_("far")).unwrap();
        assert_eq!(a, b);
        assert_eq!(obj.symbols().len(), 1);
    }

    #[test]
    fn local_shadowing_updates_in_place() {
        let mut obj = Object::new();
        obj.add_section(code_section(0x2000, 8));
        let a = obj.add_symbol(Symbol::label("loop", 0x2000, 0)).unwrap();
        let b = obj.add_symbol(Symbol::label("loop", 0x2004, 0)).unwrap();
        assert_eq!(a, b);
        assert_eq!(obj.symbols()[a].value, 0x2004);
    }

    #[test]
    fn overlap_is_rejected() {
        let mut obj = Object::new();
        obj.add_section(code_section(0x2000, 16));
        obj.add_section(code_section(0x2008, 16));
        assert!(matches!(
            obj.validate(),
            Err(ObjectError::SectionOverlap { .. })
        ));
    }

    #[test]
    fn bss_in_rom_is_rejected() {
        let mut obj = Object::new();
        let mut bss = Section::bss(".bss", 0x4000);
        bss.size = 16;
        obj.add_section(bss);
        assert!(matches!(
            obj.validate(),
            Err(ObjectError::RegionTypeMismatch { .. })
        ));
    }

    #[test]
    fn relocation_must_fit_its_slot() {
        let mut obj = Object::new();
        obj.add_section(code_section(0x2000, 4));
        obj.add_symbol(Symbol::extern_("far")).unwrap();
        obj.add_relocation(Relocation {
            offset: 2,
            symbol: 0,
            section: 0,
            kind: RelocKind::Abs32,
            addend: 0,
        })
        .unwrap();
        // Offset 2 is in range for add_relocation, but a 4-byte slot does
        // not fit a 4-byte section.
        assert!(matches!(
            obj.validate(),
            Err(ObjectError::DanglingRelocation { .. })
        ));
    }
}
