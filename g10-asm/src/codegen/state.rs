use std::collections::{HashMap, HashSet};

use g10_isa::is_rom_address;
use g10_obj::{Object, Section, SectionType};

use crate::env::Env;

/// Default start of the ROM location counter.
pub(crate) const ROM_DEFAULT: u32 = 0x0000_2000;

/// Default start of the RAM location counter.
pub(crate) const RAM_DEFAULT: u32 = 0x8000_0000;

/// Mutable state threaded through the codegen passes.
///
/// The dual location counter keeps one position per region; `.rom`/`.ram`
/// park the inactive one. Section switching decisions use `section_sizes`,
/// a per-pass shadow of each section's length, so the emission pass can
/// replay exactly the decisions the address pass made.
pub(crate) struct CodegenState {
    pub object: Object,
    pub lc: u32,
    pub rom_lc: u32,
    pub ram_lc: u32,
    pub in_rom: bool,
    pub current_section: usize,
    pub section_sizes: Vec<u32>,
    /// Label name to (section index, address).
    pub labels: HashMap<String, (u32, u32)>,
    pub globals: HashSet<String>,
    pub externs: HashSet<String>,
    pub env: Env,
}

impl CodegenState {
    pub(crate) fn new() -> Self {
        Self {
            object: Object::new(),
            lc: ROM_DEFAULT,
            rom_lc: ROM_DEFAULT,
            ram_lc: RAM_DEFAULT,
            in_rom: true,
            current_section: 0,
            section_sizes: Vec::new(),
            labels: HashMap::new(),
            globals: HashSet::new(),
            externs: HashSet::new(),
            env: Env::new(),
        }
    }

    /// Rewind the counters for the next pass over the module. Sections,
    /// symbols, and labels survive; the per-pass size shadow restarts.
    pub(crate) fn begin_pass(&mut self) {
        self.lc = ROM_DEFAULT;
        self.rom_lc = ROM_DEFAULT;
        self.ram_lc = RAM_DEFAULT;
        self.in_rom = true;
        self.current_section = 0;
        self.section_sizes = vec![0; self.object.sections().len()];
    }

    /// Park the live counter into its region slot.
    pub(crate) fn park_counter(&mut self) {
        if self.in_rom {
            self.rom_lc = self.lc;
        } else {
            self.ram_lc = self.lc;
        }
    }

    /// Point the location counter at `addr`, switching or opening a
    /// section as needed: the current section continues when `addr` is the
    /// contiguous next byte, an existing unfilled section at exactly
    /// `addr` is re-entered, anything else opens a fresh section.
    pub(crate) fn switch_to(&mut self, addr: u32) {
        let rom = is_rom_address(addr);
        self.lc = addr;
        self.in_rom = rom;

        if !self.object.sections().is_empty() {
            let current = &self.object.sections()[self.current_section];
            let contiguous = addr
                == current
                    .virtual_address
                    .wrapping_add(self.section_sizes[self.current_section]);
            if contiguous && section_in_rom(current) == rom {
                return;
            }
        }

        let reusable = self.object.sections().iter().enumerate().find(
            |(i, section)| {
                section.virtual_address == addr
                    && self.section_sizes[*i] == 0
                    && section_in_rom(section) == rom
            },
        );
        if let Some((index, _)) = reusable {
            self.current_section = index;
            return;
        }

        let section = if rom {
            Section::code(".text", addr)
        } else {
            Section::bss(".bss", addr)
        };
        self.current_section = self.object.add_section(section);
        self.section_sizes.push(0);
    }

    /// Advance the location counter without emitting bytes.
    pub(crate) fn advance(&mut self, bytes: u32) {
        self.lc = self.lc.wrapping_add(bytes);
        self.section_sizes[self.current_section] += bytes;
    }

    /// Offset of the next emitted byte inside the current section.
    pub(crate) fn section_offset(&self) -> u32 {
        self.object.sections()[self.current_section].data.len() as u32
    }

    pub(crate) fn emit_byte(&mut self, byte: u8) {
        self.object
            .section_mut(self.current_section)
            .expect("current section exists")
            .data
            .push(byte);
        self.advance(1);
    }

    pub(crate) fn emit_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.emit_byte(byte);
        }
    }

    pub(crate) fn emit_word(&mut self, word: u16) {
        self.emit_bytes(&word.to_le_bytes());
    }

    pub(crate) fn emit_dword(&mut self, dword: u32) {
        self.emit_bytes(&dword.to_le_bytes());
    }

    /// Record the per-pass sizes into the section table.
    pub(crate) fn store_section_sizes(&mut self) {
        for (index, size) in self.section_sizes.clone().into_iter().enumerate()
        {
            self.object
                .section_mut(index)
                .expect("section exists")
                .size = size;
        }
    }
}

fn section_in_rom(section: &Section) -> bool {
    section.ty != SectionType::Bss
}
