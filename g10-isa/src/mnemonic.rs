use core::fmt;
use core::str::FromStr;

/// Instruction mnemonics accepted by the assembler.
///
/// The alias mnemonics (`tcf`, `jp`, `jr`, `cp`, `cpl`) are distinct
/// variants so diagnostics can echo what the programmer wrote; use
/// [`Mnemonic::canonical`] when deciding semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum Mnemonic {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    Eii,
    Daa,
    Scf,
    Ccf,
    Clv,
    Sev,
    Ld,
    Ldq,
    Ldp,
    St,
    Stq,
    Stp,
    Mv,
    Mwh,
    Mwl,
    Lsp,
    Pop,
    Ssp,
    Push,
    Spo,
    Spi,
    Jmp,
    Jpb,
    Call,
    Int,
    Ret,
    Reti,
    Add,
    Adc,
    Sub,
    Sbc,
    Inc,
    Dec,
    And,
    Or,
    Xor,
    Not,
    Cmp,
    Sla,
    Sra,
    Srl,
    Swap,
    Rla,
    Rl,
    Rlca,
    Rlc,
    Rra,
    Rr,
    Rrca,
    Rrc,
    Bit,
    Set,
    Res,
    Tog,
    /// Alias for [`Mnemonic::Ccf`].
    Tcf,
    /// Alias for [`Mnemonic::Jmp`].
    Jp,
    /// Alias for [`Mnemonic::Jpb`].
    Jr,
    /// Alias for [`Mnemonic::Cmp`].
    Cp,
    /// Alias for `NOT l0`.
    Cpl,
}

impl Mnemonic {
    /// Resolve aliases to the mnemonic that carries the semantics.
    ///
    /// `cpl` stays distinct: it is an alias for a whole instruction
    /// (`NOT l0`), not just a mnemonic spelling.
    pub const fn canonical(self) -> Self {
        match self {
            Self::Tcf => Self::Ccf,
            Self::Jp => Self::Jmp,
            Self::Jr => Self::Jpb,
            Self::Cp => Self::Cmp,
            other => other,
        }
    }
}

impl FromStr for Mnemonic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let mnemonic = match lower.as_str() {
            "nop" => Self::Nop,
            "stop" => Self::Stop,
            "halt" => Self::Halt,
            "di" => Self::Di,
            "ei" => Self::Ei,
            "eii" => Self::Eii,
            "daa" => Self::Daa,
            "scf" => Self::Scf,
            "ccf" => Self::Ccf,
            "clv" => Self::Clv,
            "sev" => Self::Sev,
            "ld" => Self::Ld,
            "ldq" => Self::Ldq,
            "ldp" => Self::Ldp,
            "st" => Self::St,
            "stq" => Self::Stq,
            "stp" => Self::Stp,
            "mv" => Self::Mv,
            "mwh" => Self::Mwh,
            "mwl" => Self::Mwl,
            "lsp" => Self::Lsp,
            "pop" => Self::Pop,
            "ssp" => Self::Ssp,
            "push" => Self::Push,
            "spo" => Self::Spo,
            "spi" => Self::Spi,
            "jmp" => Self::Jmp,
            "jpb" => Self::Jpb,
            "call" => Self::Call,
            "int" => Self::Int,
            "ret" => Self::Ret,
            "reti" => Self::Reti,
            "add" => Self::Add,
            "adc" => Self::Adc,
            "sub" => Self::Sub,
            "sbc" => Self::Sbc,
            "inc" => Self::Inc,
            "dec" => Self::Dec,
            "and" => Self::And,
            "or" => Self::Or,
            "xor" => Self::Xor,
            "not" => Self::Not,
            "cmp" => Self::Cmp,
            "sla" => Self::Sla,
            "sra" => Self::Sra,
            "srl" => Self::Srl,
            "swap" => Self::Swap,
            "rla" => Self::Rla,
            "rl" => Self::Rl,
            "rlca" => Self::Rlca,
            "rlc" => Self::Rlc,
            "rra" => Self::Rra,
            "rr" => Self::Rr,
            "rrca" => Self::Rrca,
            "rrc" => Self::Rrc,
            "bit" => Self::Bit,
            "set" => Self::Set,
            "res" => Self::Res,
            "tog" => Self::Tog,
            "tcf" => Self::Tcf,
            "jp" => Self::Jp,
            "jr" => Self::Jr,
            "cp" => Self::Cp,
            "cpl" => Self::Cpl,
            _ => return Err(()),
        };
        Ok(mnemonic)
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = format!("{self:?}").to_ascii_lowercase();
        f.write_str(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(Mnemonic::Tcf.canonical(), Mnemonic::Ccf);
        assert_eq!(Mnemonic::Jp.canonical(), Mnemonic::Jmp);
        assert_eq!(Mnemonic::Jr.canonical(), Mnemonic::Jpb);
        assert_eq!(Mnemonic::Cp.canonical(), Mnemonic::Cmp);
        assert_eq!(Mnemonic::Cpl.canonical(), Mnemonic::Cpl);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("LD".parse::<Mnemonic>(), Ok(Mnemonic::Ld));
        assert_eq!("rlca".parse::<Mnemonic>(), Ok(Mnemonic::Rlca));
        assert_eq!("Jr".parse::<Mnemonic>(), Ok(Mnemonic::Jr));
        assert!("mov".parse::<Mnemonic>().is_err());
    }
}
