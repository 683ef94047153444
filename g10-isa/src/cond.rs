use core::fmt;

use crate::Flags;

/// Condition codes for the branching instructions.
///
/// Encoded as a 3-bit field in the X nibble of the opcode word. Value 7 is
/// unassigned: the assembler refuses to emit it and the CPU treats it as an
/// invalid argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Cond {
    /// `NC` - no condition, always taken.
    None = 0,
    /// `ZS` - zero flag set.
    ZSet = 1,
    /// `ZC` - zero flag clear.
    ZClear = 2,
    /// `CS` - carry flag set.
    CSet = 3,
    /// `CC` - carry flag clear.
    CClear = 4,
    /// `VS` - overflow flag set.
    VSet = 5,
    /// `VC` - overflow flag clear.
    VClear = 6,
}

impl Cond {
    /// Evaluate the condition against the current flags.
    pub const fn holds(self, flags: Flags) -> bool {
        match self {
            Self::None => true,
            Self::ZSet => flags.zero(),
            Self::ZClear => !flags.zero(),
            Self::CSet => flags.carry(),
            Self::CClear => !flags.carry(),
            Self::VSet => flags.overflow(),
            Self::VClear => !flags.overflow(),
        }
    }

    /// The 3-bit field value.
    pub const fn encode(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Cond {
    type Error = u8;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0 => Ok(Self::None),
            1 => Ok(Self::ZSet),
            2 => Ok(Self::ZClear),
            3 => Ok(Self::CSet),
            4 => Ok(Self::CClear),
            5 => Ok(Self::VSet),
            6 => Ok(Self::VClear),
            other => Err(other),
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "nc",
            Self::ZSet => "zs",
            Self::ZClear => "zc",
            Self::CSet => "cs",
            Self::CClear => "cc",
            Self::VSet => "vs",
            Self::VClear => "vc",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_round_trip() {
        for bits in 0..7u8 {
            assert_eq!(Cond::try_from(bits).unwrap().encode(), bits);
        }
        assert_eq!(Cond::try_from(7), Err(7));
    }

    #[test]
    fn evaluation() {
        let z = Flags::Z;
        let c = Flags::C;
        let v = Flags::V;
        assert!(Cond::None.holds(Flags::empty()));
        assert!(Cond::ZSet.holds(z) && !Cond::ZSet.holds(Flags::empty()));
        assert!(Cond::ZClear.holds(Flags::empty()) && !Cond::ZClear.holds(z));
        assert!(Cond::CSet.holds(c) && !Cond::CClear.holds(c));
        assert!(Cond::VSet.holds(v) && !Cond::VClear.holds(v));
    }
}
