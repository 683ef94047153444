/// Relocation kind, persisted as a u16.
///
/// `Quick16` and `Port8` are specialized absolute fixups for the short
/// addressing windows: the linker writes the target's offset from
/// `$FFFF0000` and `$FFFFFF00` respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum RelocKind {
    /// 8-bit absolute address.
    Abs8 = 1,
    /// 16-bit absolute address.
    Abs16 = 2,
    /// 32-bit absolute address.
    Abs32 = 3,
    /// 8-bit PC-relative offset.
    Rel8 = 4,
    /// 16-bit PC-relative offset.
    Rel16 = 5,
    /// 32-bit PC-relative offset.
    Rel32 = 6,
    /// 16-bit offset into the Quick window.
    Quick16 = 7,
    /// 8-bit offset into the Port window.
    Port8 = 8,
}

impl RelocKind {
    /// Width in bytes of the slot this relocation patches.
    pub const fn width(self) -> u32 {
        match self {
            Self::Abs8 | Self::Rel8 | Self::Port8 => 1,
            Self::Abs16 | Self::Rel16 | Self::Quick16 => 2,
            Self::Abs32 | Self::Rel32 => 4,
        }
    }
}

impl TryFrom<u16> for RelocKind {
    type Error = u16;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        match raw {
            1 => Ok(Self::Abs8),
            2 => Ok(Self::Abs16),
            3 => Ok(Self::Abs32),
            4 => Ok(Self::Rel8),
            5 => Ok(Self::Rel16),
            6 => Ok(Self::Rel32),
            7 => Ok(Self::Quick16),
            8 => Ok(Self::Port8),
            other => Err(other),
        }
    }
}

/// One entry of the relocation table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Relocation {
    /// Byte offset of the patched slot inside its section's data.
    pub offset: u32,
    /// Index of the symbol the slot refers to.
    pub symbol: u32,
    /// Index of the section containing the slot.
    pub section: u32,
    /// What to write and how wide.
    pub kind: RelocKind,
    /// Signed addend applied to the symbol's value.
    pub addend: i16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn discriminant_round_trip() {
        for kind in RelocKind::iter() {
            assert_eq!(RelocKind::try_from(kind as u16), Ok(kind));
        }
        assert_eq!(RelocKind::try_from(0), Err(0));
        assert_eq!(RelocKind::try_from(9), Err(9));
    }

    #[test]
    fn widths() {
        assert_eq!(RelocKind::Abs8.width(), 1);
        assert_eq!(RelocKind::Quick16.width(), 2);
        assert_eq!(RelocKind::Abs32.width(), 4);
        assert_eq!(RelocKind::Port8.width(), 1);
    }
}
