//! The `.let`/`.const` environment.
//!
//! Owned by one codegen run and cleared with it; nothing here is global,
//! so successive assembly invocations cannot bleed state into each other.

use std::collections::HashMap;

use crate::ast::AssignOp;
use crate::codegen::CgValue;
use crate::diag::AsmErrorKind;

#[derive(Debug, Clone)]
struct Binding {
    value: CgValue,
    constant: bool,
}

/// Assembly-time variable bindings.
#[derive(Debug, Default)]
pub struct Env {
    bindings: HashMap<String, Binding>,
}

impl Env {
    /// An empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a mutable variable. Rebinding an existing name is allowed and
    /// replaces the value, unless the name is a constant.
    pub fn define_let(
        &mut self,
        name: &str,
        value: CgValue,
    ) -> Result<(), AsmErrorKind> {
        if let Some(existing) = self.bindings.get(name) {
            if existing.constant {
                return Err(AsmErrorKind::ConstReassignment(name.to_owned()));
            }
        }
        self.bindings.insert(
            name.to_owned(),
            Binding {
                value,
                constant: false,
            },
        );
        Ok(())
    }

    /// Bind an immutable constant. The name must be fresh.
    pub fn define_const(
        &mut self,
        name: &str,
        value: CgValue,
    ) -> Result<(), AsmErrorKind> {
        if self.bindings.contains_key(name) {
            return Err(AsmErrorKind::ConstReassignment(name.to_owned()));
        }
        self.bindings.insert(
            name.to_owned(),
            Binding {
                value,
                constant: true,
            },
        );
        Ok(())
    }

    /// Current value of a binding.
    pub fn get(&self, name: &str) -> Option<&CgValue> {
        self.bindings.get(name).map(|b| &b.value)
    }

    /// Apply `<op>=` to an existing variable.
    pub fn assign(
        &mut self,
        name: &str,
        op: AssignOp,
        rhs: CgValue,
    ) -> Result<(), AsmErrorKind> {
        let Some(binding) = self.bindings.get(name) else {
            return Err(AsmErrorKind::UndefinedVariable(name.to_owned()));
        };
        if binding.constant {
            return Err(AsmErrorKind::ConstReassignment(name.to_owned()));
        }

        let new_value = if op == AssignOp::Set {
            rhs
        } else {
            let current = binding.value.to_int()?;
            let rhs = rhs.to_int()?;
            CgValue::Int(apply_compound(op, current, rhs)?)
        };

        self.bindings
            .get_mut(name)
            .expect("binding just looked up")
            .value = new_value;
        Ok(())
    }
}

fn apply_compound(
    op: AssignOp,
    current: i64,
    rhs: i64,
) -> Result<i64, AsmErrorKind> {
    let value = match op {
        AssignOp::Set => rhs,
        AssignOp::Add => current.wrapping_add(rhs),
        AssignOp::Sub => current.wrapping_sub(rhs),
        AssignOp::Mul => current.wrapping_mul(rhs),
        AssignOp::Div => {
            if rhs == 0 {
                return Err(AsmErrorKind::DivideByZero);
            }
            current.wrapping_div(rhs)
        }
        AssignOp::Rem => {
            if rhs == 0 {
                return Err(AsmErrorKind::DivideByZero);
            }
            current.wrapping_rem(rhs)
        }
        AssignOp::And => current & rhs,
        AssignOp::Or => current | rhs,
        AssignOp::Xor => current ^ rhs,
        AssignOp::Shl => {
            if !(0..=63).contains(&rhs) {
                return Err(AsmErrorKind::ShiftOutOfRange(rhs));
            }
            current.wrapping_shl(rhs as u32)
        }
        AssignOp::Shr => {
            if !(0..=63).contains(&rhs) {
                return Err(AsmErrorKind::ShiftOutOfRange(rhs));
            }
            current.wrapping_shr(rhs as u32)
        }
        AssignOp::Pow => {
            if rhs < 0 {
                return Err(AsmErrorKind::NegativeExponent);
            }
            let mut result: i64 = 1;
            let mut base = current;
            let mut exp = rhs;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
    };
    Ok(value)
}
