/// Section type discriminant, persisted as a u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum SectionType {
    /// Placeholder; carries no bytes and no address meaning.
    Null = 0,
    /// Executable machine code, ROM region.
    Code = 1,
    /// Initialized data, ROM region.
    Data = 2,
    /// Zero-initialized reservation, RAM region.
    Bss = 3,
}

impl TryFrom<u16> for SectionType {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Null),
            1 => Ok(Self::Code),
            2 => Ok(Self::Data),
            3 => Ok(Self::Bss),
            other => Err(other),
        }
    }
}

bitflags::bitflags! {
    /// Section attribute flags, persisted as a u16.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SectionFlags: u16 {
        /// Occupies address space in the final image.
        const ALLOC = 1 << 0;
        /// Has bytes stored in the object file.
        const LOAD = 1 << 1;
        /// Writable at run time.
        const WRITE = 1 << 2;
        /// Executable.
        const EXEC = 1 << 3;
    }
}

/// One section of an object: a named, typed span of the address space.
///
/// `size` is the virtual size of the section. For sections carrying the
/// [`SectionFlags::LOAD`] flag it must equal `data.len()`; BSS sections keep
/// `data` empty and record their reservation in `size` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section {
    /// Section name, e.g. `.text`.
    pub name: String,
    /// Base address the section is linked at.
    pub virtual_address: u32,
    /// Virtual size in bytes.
    pub size: u32,
    /// Section type.
    pub ty: SectionType,
    /// Attribute flags.
    #[cfg_attr(feature = "serde", serde(with = "flag_bits"))]
    pub flags: SectionFlags,
    /// Section bytes; empty for BSS.
    pub data: Vec<u8>,
}

impl Section {
    /// An executable `.text`-style section at `base`.
    pub fn code(name: impl Into<String>, base: u32) -> Self {
        Self {
            name: name.into(),
            virtual_address: base,
            size: 0,
            ty: SectionType::Code,
            flags: SectionFlags::ALLOC | SectionFlags::LOAD | SectionFlags::EXEC,
            data: Vec::new(),
        }
    }

    /// A zero-initialized `.bss`-style reservation at `base`.
    pub fn bss(name: impl Into<String>, base: u32) -> Self {
        Self {
            name: name.into(),
            virtual_address: base,
            size: 0,
            ty: SectionType::Bss,
            flags: SectionFlags::ALLOC | SectionFlags::WRITE,
            data: Vec::new(),
        }
    }

    /// Whether this section's bytes are stored in the object file.
    pub fn is_loaded(&self) -> bool {
        self.flags.contains(SectionFlags::LOAD)
    }

    /// Address one past the section's last byte.
    pub fn end_address(&self) -> u32 {
        self.virtual_address.wrapping_add(self.size)
    }
}

#[cfg(feature = "serde")]
mod flag_bits {
    use super::SectionFlags;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        flags: &SectionFlags,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.serialize_u16(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        de: D,
    ) -> Result<SectionFlags, D::Error> {
        Ok(SectionFlags::from_bits_truncate(u16::deserialize(de)?))
    }
}
