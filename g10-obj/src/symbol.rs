/// Sentinel section index: the symbol is not defined in this object.
pub const SECTION_UNDEF: u32 = 0xFFFF_FFFF;

/// Sentinel section index: the symbol's value is an absolute number.
pub const SECTION_ABS: u32 = 0xFFFF_FFFE;

/// Sentinel section index: common (tentative) definition.
pub const SECTION_COMMON: u32 = 0xFFFF_FFFD;

/// Symbol type discriminant, persisted as a u8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SymbolType {
    /// No particular type.
    NoType = 0,
    /// A code or data label.
    Label = 1,
}

impl TryFrom<u8> for SymbolType {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::NoType),
            1 => Ok(Self::Label),
            other => Err(other),
        }
    }
}

/// Symbol binding, persisted as a u8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum SymbolBinding {
    /// Visible only inside this object; later locals may shadow it.
    Local = 0,
    /// Exported to the linker; must be defined exactly once.
    Global = 1,
    /// Imported; must stay undefined in this object.
    Extern = 2,
}

impl TryFrom<u8> for SymbolBinding {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Local),
            1 => Ok(Self::Global),
            2 => Ok(Self::Extern),
            other => Err(other),
        }
    }
}

/// One entry of the symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Address, or absolute value for `SECTION_ABS` symbols.
    pub value: u32,
    /// Index of the defining section, or one of the sentinels.
    pub section: u32,
    /// Symbol type.
    pub ty: SymbolType,
    /// Binding.
    pub binding: SymbolBinding,
    /// Reserved flag bits, persisted verbatim.
    pub flags: u16,
}

impl Symbol {
    /// A local label defined at `value` inside section `section`.
    pub fn label(name: impl Into<String>, value: u32, section: u32) -> Self {
        Self {
            name: name.into(),
            value,
            section,
            ty: SymbolType::Label,
            binding: SymbolBinding::Local,
            flags: 0,
        }
    }

    /// An imported symbol.
    pub fn extern_(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
            section: SECTION_UNDEF,
            ty: SymbolType::Label,
            binding: SymbolBinding::Extern,
            flags: 0,
        }
    }

    /// Whether the symbol is defined inside this object.
    pub fn is_defined(&self) -> bool {
        self.section != SECTION_UNDEF
    }
}
