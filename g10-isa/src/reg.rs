use core::fmt;
use core::str::FromStr;

/// Identifies one register of the G10 register file.
///
/// The low nibble is the register index and the high bits select the view
/// onto the underlying 32-bit slot: `Dn` is the full dword, `Wn` its low
/// word, and `Hn`/`Ln` the high and low bytes of `Wn`. Writing through a
/// narrow view leaves the remaining bits of the slot unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct RegId(u8);

/// Width class of a register view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// `Hn`/`Ln` 8-bit views.
    Byte,
    /// `Wn` 16-bit views.
    Word,
    /// `Dn` 32-bit views.
    Dword,
    /// `PC`, `SP`, `FLAGS`, `EC`.
    Special,
}

/// Fully resolved view of a register id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegView {
    /// Full 32-bit register `Dn`.
    Dword(u8),
    /// Low 16 bits, `Wn`.
    Word(u8),
    /// Bits 8..=15, `Hn`.
    HighByte(u8),
    /// Bits 0..=7, `Ln`.
    LowByte(u8),
    /// Program counter.
    Pc,
    /// Stack pointer.
    Sp,
    /// Flags register.
    Flags,
    /// Exception code register.
    Ec,
}

const CLASS_D: u8 = 0b0000_0000;
const CLASS_W: u8 = 0b0001_0000;
const CLASS_H: u8 = 0b0010_0000;
const CLASS_L: u8 = 0b0100_0000;

impl RegId {
    /// Program counter.
    pub const PC: Self = Self(0b1000_0000);
    /// Stack pointer.
    pub const SP: Self = Self(0b1000_0001);
    /// Flags register.
    pub const FLAGS: Self = Self(0b1000_0010);
    /// Exception code register.
    pub const EC: Self = Self(0b1000_0011);

    /// 8-bit accumulator.
    pub const L0: Self = Self(CLASS_L);
    /// 16-bit accumulator.
    pub const W0: Self = Self(CLASS_W);
    /// 32-bit accumulator.
    pub const D0: Self = Self(CLASS_D);

    /// Full register `Dn`. The index is masked to four bits.
    pub const fn d(index: u8) -> Self {
        Self(CLASS_D | (index & 0x0F))
    }

    /// Word register `Wn`.
    pub const fn w(index: u8) -> Self {
        Self(CLASS_W | (index & 0x0F))
    }

    /// High byte register `Hn`.
    pub const fn h(index: u8) -> Self {
        Self(CLASS_H | (index & 0x0F))
    }

    /// Low byte register `Ln`.
    pub const fn l(index: u8) -> Self {
        Self(CLASS_L | (index & 0x0F))
    }

    /// Index of the underlying 32-bit slot, `0..=15`.
    ///
    /// Meaningless for the special registers.
    pub const fn index(self) -> u8 {
        self.0 & 0x0F
    }

    /// Raw identifier byte.
    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Width class of this register.
    pub const fn class(self) -> RegClass {
        match self.0 & 0xF0 {
            CLASS_D => RegClass::Dword,
            CLASS_W => RegClass::Word,
            CLASS_H | CLASS_L => RegClass::Byte,
            _ => RegClass::Special,
        }
    }

    /// Resolved view of this register.
    pub const fn view(self) -> RegView {
        match self.0 & 0xF0 {
            CLASS_D => RegView::Dword(self.index()),
            CLASS_W => RegView::Word(self.index()),
            CLASS_H => RegView::HighByte(self.index()),
            CLASS_L => RegView::LowByte(self.index()),
            _ => match self.0 {
                0b1000_0000 => RegView::Pc,
                0b1000_0001 => RegView::Sp,
                0b1000_0010 => RegView::Flags,
                _ => RegView::Ec,
            },
        }
    }

    /// True for `L0`, `W0` and `D0`, the arithmetic accumulators.
    pub const fn is_accumulator(self) -> bool {
        matches!(self.0, CLASS_L | CLASS_W | CLASS_D)
    }
}

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            RegView::Dword(i) => write!(f, "d{i}"),
            RegView::Word(i) => write!(f, "w{i}"),
            RegView::HighByte(i) => write!(f, "h{i}"),
            RegView::LowByte(i) => write!(f, "l{i}"),
            RegView::Pc => f.write_str("pc"),
            RegView::Sp => f.write_str("sp"),
            RegView::Flags => f.write_str("flags"),
            RegView::Ec => f.write_str("ec"),
        }
    }
}

impl FromStr for RegId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pc" | "PC" => return Ok(Self::PC),
            "sp" | "SP" => return Ok(Self::SP),
            "flags" | "FLAGS" => return Ok(Self::FLAGS),
            "ec" | "EC" => return Ok(Self::EC),
            _ => {}
        }

        let (class, rest) = s.split_at(1);
        let index: u8 = rest.parse().map_err(|_| ())?;
        if index > 15 {
            return Err(());
        }
        match class {
            "d" | "D" => Ok(Self::d(index)),
            "w" | "W" => Ok(Self::w(index)),
            "h" | "H" => Ok(Self::h(index)),
            "l" | "L" => Ok(Self::l(index)),
            _ => Err(()),
        }
    }
}
