//! Code generation: four ordered passes over the AST.
//!
//! Pass 0 binds `.let`/`.const` variables, pass 1 lays out sections and
//! resolves label addresses, pass 2 emits machine code and relocations,
//! and finalization stamps the object flags and runs the container
//! validator. The first error aborts its pass; no partial object escapes.

mod encode;
mod state;

use g10_isa::{vector_address, OpWord, IVT_SLOTS, PORT_BASE, QUICK_BASE};
use g10_obj::{
    Object, ObjectFlags, RelocKind, Relocation, Symbol, SymbolBinding,
};
use tracing::debug;

use crate::ast::{
    BinaryOp, Directive, Expr, Instruction, Item, Module, UnaryOp,
};
use crate::diag::{AsmError, AsmErrorKind, SourceLoc};

use encode::{select_form, ImmSlot, InstrForm, OpPatch};
use state::CodegenState;

/// Symbol names that mark an object as carrying a program entry point.
const ENTRY_SYMBOLS: [&str; 4] = ["_start", "start", "main", "_main"];

/// A value produced by the codegen expression evaluator.
///
/// Unlike the preprocessor's evaluator, label references resolve here, so
/// an address kind exists alongside the plain integer.
#[derive(Debug, Clone, PartialEq)]
pub enum CgValue {
    /// 64-bit signed integer.
    Int(i64),
    /// A resolved address.
    Addr(u32),
    /// 32.32 fixed-point number.
    Fixed(u64),
    /// String (only `.byte` consumes these).
    Str(String),
}

impl CgValue {
    /// Coerce to integer; fixed-point keeps its integer part.
    pub fn to_int(&self) -> Result<i64, AsmErrorKind> {
        match self {
            CgValue::Int(v) => Ok(*v),
            CgValue::Addr(a) => Ok(i64::from(*a)),
            CgValue::Fixed(v) => Ok((*v as i64) >> 32),
            CgValue::Str(_) => Err(AsmErrorKind::TypeMismatch(
                "expected a number, found a string".into(),
            )),
        }
    }

    fn to_addr(&self) -> Result<u32, AsmErrorKind> {
        match self {
            CgValue::Addr(a) => Ok(*a),
            CgValue::Fixed(v) => Ok(((*v as i64) >> 32) as u32),
            CgValue::Int(v) => {
                if (0..=i64::from(u32::MAX)).contains(v) {
                    Ok(*v as u32)
                } else {
                    Err(AsmErrorKind::AddressOutOfRange(*v))
                }
            }
            CgValue::Str(_) => Err(AsmErrorKind::TypeMismatch(
                "expected an address, found a string".into(),
            )),
        }
    }
}

/// The code generator. One [`Codegen::process`] call assembles one module
/// into one object.
pub struct Codegen;

impl Codegen {
    /// Run all passes over `module` and return the finished object.
    pub fn process(module: &Module) -> Result<Object, AsmError> {
        let mut state = CodegenState::new();

        debug!("variable pass");
        variable_pass(&mut state, module)?;
        debug!("address pass");
        address_pass(&mut state, module)?;
        debug!("emission pass");
        emission_pass(&mut state, module)?;
        debug!("finalize");
        finalize(&mut state)?;

        Ok(state.object)
    }
}

/* Pass 0: variables *********************************************************/

fn variable_pass(
    state: &mut CodegenState,
    module: &Module,
) -> Result<(), AsmError> {
    for item in &module.items {
        let Item::Directive { dir, loc } = item else {
            continue;
        };
        match dir {
            Directive::Let { name, value } => {
                let value = eval_expr(state, value)?;
                state
                    .env
                    .define_let(name, value)
                    .map_err(|kind| kind.at(loc.clone()))?;
            }
            Directive::Const { name, value } => {
                let value = eval_expr(state, value)?;
                state
                    .env
                    .define_const(name, value)
                    .map_err(|kind| kind.at(loc.clone()))?;
            }
            Directive::Assign { name, op, value } => {
                let value = eval_expr(state, value)?;
                state
                    .env
                    .assign(name, *op, value)
                    .map_err(|kind| kind.at(loc.clone()))?;
            }
            _ => {}
        }
    }
    Ok(())
}

/* Pass 1: addresses *********************************************************/

fn address_pass(
    state: &mut CodegenState,
    module: &Module,
) -> Result<(), AsmError> {
    state.begin_pass();
    state.switch_to(state.lc);

    for item in &module.items {
        match item {
            Item::Label { name, loc } => define_label(state, name, loc)?,
            Item::Instruction(instr) => {
                if !state.in_rom {
                    return Err(AsmErrorKind::InstructionsNotAllowedInRam
                        .at(instr.loc.clone()));
                }
                let form = select_form(instr)?;
                state.advance(form.encoded_len());
            }
            Item::Directive { dir, loc } => match dir {
                Directive::Org(expr) => directive_org(state, expr)?,
                Directive::Rom => directive_rom(state),
                Directive::Ram => directive_ram(state),
                Directive::Int(expr) => directive_int(state, expr)?,
                Directive::Byte(values) => {
                    let size = data_size(state, values, 1, true)?;
                    state.advance(size);
                }
                Directive::Word(values) => {
                    let size = data_size(state, values, 2, false)?;
                    state.advance(size);
                }
                Directive::Dword(values) => {
                    let size = data_size(state, values, 4, false)?;
                    state.advance(size);
                }
                Directive::Global(names) => {
                    declare_globals(state, names, loc)?
                }
                Directive::Extern(names) => {
                    declare_externs(state, names, loc)?
                }
                Directive::Let { .. }
                | Directive::Const { .. }
                | Directive::Assign { .. } => {}
            },
        }
    }
    Ok(())
}

fn define_label(
    state: &mut CodegenState,
    name: &str,
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    if state.labels.contains_key(name) {
        return Err(
            AsmErrorKind::LabelRedefinition(name.to_owned()).at(loc.clone())
        );
    }
    let section = state.current_section as u32;
    let address = state.lc;
    state.labels.insert(name.to_owned(), (section, address));

    let mut symbol = Symbol::label(name, address, section);
    if state.globals.contains(name) {
        symbol.binding = SymbolBinding::Global;
    }
    state
        .object
        .add_symbol(symbol)
        .map_err(|err| AsmErrorKind::from(err).at(loc.clone()))?;
    Ok(())
}

fn directive_org(
    state: &mut CodegenState,
    expr: &Expr,
) -> Result<(), AsmError> {
    let loc = expr.loc().clone();
    let addr = eval_expr(state, expr)?
        .to_addr()
        .map_err(|kind| kind.at(loc))?;
    state.park_counter();
    state.switch_to(addr);
    state.park_counter();
    Ok(())
}

fn directive_rom(state: &mut CodegenState) {
    if !state.in_rom {
        state.ram_lc = state.lc;
    }
    state.switch_to(state.rom_lc);
}

fn directive_ram(state: &mut CodegenState) {
    if state.in_rom {
        state.rom_lc = state.lc;
    }
    state.switch_to(state.ram_lc);
}

fn directive_int(
    state: &mut CodegenState,
    expr: &Expr,
) -> Result<(), AsmError> {
    let loc = expr.loc().clone();
    let vector = eval_expr(state, expr)?
        .to_int()
        .map_err(|kind| kind.at(loc.clone()))?;
    if !(0..i64::from(IVT_SLOTS)).contains(&vector) {
        return Err(AsmErrorKind::VectorOutOfRange(vector).at(loc));
    }

    if !state.in_rom {
        state.ram_lc = state.lc;
    }
    let addr = vector_address(vector as u32);
    state.switch_to(addr);
    state.rom_lc = addr;
    Ok(())
}

fn declare_globals(
    state: &mut CodegenState,
    names: &[String],
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    for name in names {
        if state.externs.contains(name) {
            return Err(
                AsmErrorKind::GlobalExternConflict(name.clone()).at(loc.clone())
            );
        }
        if !state.globals.insert(name.clone()) {
            // Repeated `.global` of one name is harmless.
            continue;
        }
        // Promote an already-defined label.
        if let Some(index) = state.object.find_symbol(name) {
            state
                .object
                .symbol_mut(index)
                .expect("symbol just found")
                .binding = SymbolBinding::Global;
        }
    }
    Ok(())
}

fn declare_externs(
    state: &mut CodegenState,
    names: &[String],
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    for name in names {
        if state.globals.contains(name) {
            return Err(
                AsmErrorKind::GlobalExternConflict(name.clone()).at(loc.clone())
            );
        }
        if !state.externs.insert(name.clone()) {
            continue;
        }
        state
            .object
            .add_symbol(Symbol::extern_(name))
            .map_err(|err| AsmErrorKind::from(err).at(loc.clone()))?;
    }
    Ok(())
}

/// Size contributed by a `.byte`/`.word`/`.dword` directive.
///
/// ROM data is literal: every value contributes one element (strings in
/// `.byte` contribute their length). RAM data is a reservation: each value
/// is a count of elements to reserve.
fn data_size(
    state: &CodegenState,
    values: &[Expr],
    element_size: u32,
    strings_allowed: bool,
) -> Result<u32, AsmError> {
    if state.in_rom {
        let mut total = 0u32;
        for value in values {
            match value {
                Expr::Str(s, _) if strings_allowed => {
                    total += s.len() as u32;
                }
                _ => total += element_size,
            }
        }
        Ok(total)
    } else {
        let mut count = 0u32;
        for value in values {
            let loc = value.loc().clone();
            let n = eval_expr(state, value)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?;
            if n < 0 {
                return Err(AsmErrorKind::NegativeReservation(n).at(loc));
            }
            count += n as u32;
        }
        Ok(count * element_size)
    }
}

/* Pass 2: emission **********************************************************/

fn emission_pass(
    state: &mut CodegenState,
    module: &Module,
) -> Result<(), AsmError> {
    state.begin_pass();
    state.switch_to(state.lc);

    for item in &module.items {
        match item {
            Item::Label { .. } => {}
            Item::Instruction(instr) => emit_instruction(state, instr)?,
            Item::Directive { dir, .. } => match dir {
                Directive::Org(expr) => directive_org(state, expr)?,
                Directive::Rom => directive_rom(state),
                Directive::Ram => directive_ram(state),
                Directive::Int(expr) => directive_int(state, expr)?,
                Directive::Byte(values) => {
                    emit_data(state, values, 1, RelocKind::Abs8)?
                }
                Directive::Word(values) => {
                    emit_data(state, values, 2, RelocKind::Abs16)?
                }
                Directive::Dword(values) => {
                    emit_data(state, values, 4, RelocKind::Abs32)?
                }
                _ => {}
            },
        }
    }
    Ok(())
}

fn emit_instruction(
    state: &mut CodegenState,
    instr: &Instruction,
) -> Result<(), AsmError> {
    let form = select_form(instr)?;
    let InstrForm { op, patch, imm } = form;

    let op = apply_patch(state, op, patch, &instr.loc)?;
    state.emit_bytes(&op.to_bytes());
    emit_slot(state, imm, &instr.loc)
}

fn apply_patch(
    state: &CodegenState,
    op: OpWord,
    patch: OpPatch<'_>,
    loc: &SourceLoc,
) -> Result<OpWord, AsmError> {
    match patch {
        OpPatch::None => Ok(op),
        OpPatch::BitIndex(expr) => {
            let bit = eval_expr(state, expr)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?;
            if !(0..8).contains(&bit) {
                return Err(AsmErrorKind::ImmediateOutOfRange {
                    value: bit,
                    bits: 3,
                }
                .at(loc.clone()));
            }
            Ok(OpWord::new(op.form(), op.x(), bit as u8))
        }
        OpPatch::IntVector(expr) => {
            let vector = eval_expr(state, expr)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?;
            if !(0..i64::from(IVT_SLOTS)).contains(&vector) {
                return Err(AsmErrorKind::VectorOutOfRange(vector)
                    .at(loc.clone()));
            }
            Ok(OpWord::with_operand_byte(op.form(), vector as u8))
        }
    }
}

fn emit_slot(
    state: &mut CodegenState,
    slot: ImmSlot<'_>,
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    match slot {
        ImmSlot::None => Ok(()),
        ImmSlot::Abs8(expr) => emit_abs(state, expr, 1, RelocKind::Abs8, loc),
        ImmSlot::Abs16(expr) => emit_abs(state, expr, 2, RelocKind::Abs16, loc),
        ImmSlot::Abs32(expr) => emit_abs(state, expr, 4, RelocKind::Abs32, loc),
        ImmSlot::Quick16(expr) => emit_window(
            state,
            expr,
            QUICK_BASE,
            0xFFFF,
            RelocKind::Quick16,
            loc,
        ),
        ImmSlot::Port8(expr) => {
            emit_window(state, expr, PORT_BASE, 0xFF, RelocKind::Port8, loc)
        }
        ImmSlot::Rel16(expr) => emit_rel16(state, expr, loc),
    }
}

/// Emit an absolute immediate of `width` bytes: zeros plus a relocation
/// when the expression references an external symbol, the evaluated value
/// otherwise.
fn emit_abs(
    state: &mut CodegenState,
    expr: &Expr,
    width: u32,
    kind: RelocKind,
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    if let Some((name, addend)) = extern_ref(state, expr, loc)? {
        return emit_reloc(state, &name, kind, addend, loc);
    }

    let value = eval_expr(state, expr)?
        .to_int()
        .map_err(|kind| kind.at(loc.clone()))?;
    let bits = width * 8;
    if !fits(value, bits) {
        return Err(
            AsmErrorKind::ImmediateOutOfRange { value, bits }.at(loc.clone())
        );
    }
    state.emit_bytes(&value.to_le_bytes()[..width as usize]);
    Ok(())
}

/// Emit a Quick/Port window address: the slot stores the offset from the
/// window base. Absolute addresses inside the window and raw offsets are
/// both accepted.
fn emit_window(
    state: &mut CodegenState,
    expr: &Expr,
    base: u32,
    max_offset: u32,
    kind: RelocKind,
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    if let Some((name, addend)) = extern_ref(state, expr, loc)? {
        return emit_reloc(state, &name, kind, addend, loc);
    }

    let value = eval_expr(state, expr)?
        .to_int()
        .map_err(|kind| kind.at(loc.clone()))?;
    let offset = if (i64::from(base)..=i64::from(u32::MAX)).contains(&value) {
        (value as u32).wrapping_sub(base)
    } else if (0..=i64::from(max_offset)).contains(&value) {
        value as u32
    } else {
        return Err(AsmErrorKind::ImmediateOutOfRange {
            value,
            bits: if max_offset > 0xFF { 16 } else { 8 },
        }
        .at(loc.clone()));
    };

    if max_offset > 0xFF {
        state.emit_word(offset as u16);
    } else {
        state.emit_byte(offset as u8);
    }
    Ok(())
}

/// Emit a JPB offset: relative to the first byte after the instruction.
fn emit_rel16(
    state: &mut CodegenState,
    expr: &Expr,
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    if let Some((name, addend)) = extern_ref(state, expr, loc)? {
        return emit_reloc(state, &name, RelocKind::Rel16, addend, loc);
    }

    let value = eval_expr(state, expr)?;
    let offset = match value {
        CgValue::Addr(target) => {
            // The opcode word is already emitted; the slot occupies the
            // next two bytes.
            let next_pc = state.lc.wrapping_add(2);
            i64::from(target) - i64::from(next_pc)
        }
        other => other.to_int().map_err(|kind| kind.at(loc.clone()))?,
    };

    if i16::try_from(offset).is_err() {
        return Err(
            AsmErrorKind::RelativeOffsetOutOfRange(offset).at(loc.clone())
        );
    }
    state.emit_word(offset as i16 as u16);
    Ok(())
}

fn emit_reloc(
    state: &mut CodegenState,
    name: &str,
    kind: RelocKind,
    addend: i16,
    loc: &SourceLoc,
) -> Result<(), AsmError> {
    let symbol = state
        .object
        .find_symbol(name)
        .expect("extern symbols are created in the address pass")
        as u32;
    let offset = state.section_offset();
    let section = state.current_section as u32;

    // Zeros occupy the slot; the linker patches them.
    for _ in 0..kind.width() {
        state.emit_byte(0);
    }

    state
        .object
        .add_relocation(Relocation {
            offset,
            symbol,
            section,
            kind,
            addend,
        })
        .map_err(|err| AsmErrorKind::from(err).at(loc.clone()))?;
    Ok(())
}

/// Match expressions that reference an external symbol.
///
/// Supported shapes are a bare identifier and `ident ± constant` (the
/// constant becomes the relocation addend); anything more complex around
/// an external name cannot be expressed as a single fixup.
fn extern_ref(
    state: &CodegenState,
    expr: &Expr,
    loc: &SourceLoc,
) -> Result<Option<(String, i16)>, AsmError> {
    if !references_external(state, expr) {
        return Ok(None);
    }

    fn addend_of(
        state: &CodegenState,
        expr: &Expr,
    ) -> Option<(String, i64)> {
        match expr {
            Expr::Ident(name, _) if state.externs.contains(name) => {
                Some((name.clone(), 0))
            }
            Expr::Group(inner, _) => addend_of(state, inner),
            Expr::Binary { op, lhs, rhs, .. } => {
                let (name, base) = addend_of(state, lhs)?;
                let Expr::Int(k, _) = rhs.as_ref() else {
                    return None;
                };
                match op {
                    BinaryOp::Add => Some((name, base + k)),
                    BinaryOp::Sub => Some((name, base - k)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    match addend_of(state, expr) {
        Some((name, addend)) => {
            let addend = i16::try_from(addend).map_err(|_| {
                AsmErrorKind::ImmediateOutOfRange {
                    value: addend,
                    bits: 16,
                }
                .at(loc.clone())
            })?;
            Ok(Some((name, addend)))
        }
        None => Err(AsmErrorKind::UnsupportedExternExpression(
            "an external symbol may only be offset by a constant".into(),
        )
        .at(loc.clone())),
    }
}

fn references_external(state: &CodegenState, expr: &Expr) -> bool {
    match expr {
        Expr::Ident(name, _) => state.externs.contains(name),
        Expr::Unary { operand, .. } => references_external(state, operand),
        Expr::Binary { lhs, rhs, .. } => {
            references_external(state, lhs) || references_external(state, rhs)
        }
        Expr::Group(inner, _) => references_external(state, inner),
        _ => false,
    }
}

fn emit_data(
    state: &mut CodegenState,
    values: &[Expr],
    width: u32,
    kind: RelocKind,
) -> Result<(), AsmError> {
    if !state.in_rom {
        let element_size = width;
        let size = data_size(state, values, element_size, width == 1)?;
        state.advance(size);
        return Ok(());
    }

    for value in values {
        let loc = value.loc().clone();
        if width == 1 {
            if let Expr::Str(s, _) = value {
                for byte in s.bytes() {
                    state.emit_byte(byte);
                }
                continue;
            }
        }
        emit_abs(state, value, width, kind, &loc)?;
    }
    Ok(())
}

/// Accept a value that fits the slot in either its signed or unsigned
/// reading; anything else is a hard error, never a silent wrap.
fn fits(value: i64, bits: u32) -> bool {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    (min..=max).contains(&value)
}

/* Expression evaluation *****************************************************/

fn eval_expr(state: &CodegenState, expr: &Expr) -> Result<CgValue, AsmError> {
    match expr {
        Expr::Int(v, _) => Ok(CgValue::Int(*v)),
        Expr::Fixed(n, _) => {
            let magnitude = (n.abs() * 4_294_967_296.0) as u64;
            Ok(CgValue::Fixed(if *n < 0.0 {
                magnitude.wrapping_neg()
            } else {
                magnitude
            }))
        }
        Expr::Char(c, _) => Ok(CgValue::Int(i64::from(*c))),
        Expr::Str(s, _) => Ok(CgValue::Str(s.clone())),
        Expr::Ident(name, loc) => {
            if let Some((_, address)) = state.labels.get(name) {
                return Ok(CgValue::Addr(*address));
            }
            if state.externs.contains(name) {
                // Unknown until link time; the relocation carries the truth.
                return Ok(CgValue::Addr(0));
            }
            Err(AsmErrorKind::UndefinedIdentifier(name.clone()).at(loc.clone()))
        }
        Expr::Var(name, loc) => state
            .env
            .get(name)
            .cloned()
            .ok_or_else(|| {
                AsmErrorKind::UndefinedVariable(name.clone()).at(loc.clone())
            }),
        Expr::Unary { op, operand, loc } => {
            let value = eval_expr(state, operand)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?;
            let result = match op {
                UnaryOp::Plus => value,
                UnaryOp::Neg => value.wrapping_neg(),
                UnaryOp::Not => !value,
                UnaryOp::LogicalNot => i64::from(value == 0),
            };
            Ok(CgValue::Int(result))
        }
        Expr::Binary { op, lhs, rhs, loc } => {
            let a = eval_expr(state, lhs)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?;
            let b = eval_expr(state, rhs)?
                .to_int()
                .map_err(|kind| kind.at(loc.clone()))?;
            let result = apply_binary(*op, a, b)
                .map_err(|kind| kind.at(loc.clone()))?;
            Ok(CgValue::Int(result))
        }
        Expr::Group(inner, _) => eval_expr(state, inner),
    }
}

fn apply_binary(op: BinaryOp, a: i64, b: i64) -> Result<i64, AsmErrorKind> {
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(AsmErrorKind::DivideByZero);
            }
            a.wrapping_div(b)
        }
        BinaryOp::Rem => {
            if b == 0 {
                return Err(AsmErrorKind::DivideByZero);
            }
            a.wrapping_rem(b)
        }
        BinaryOp::Pow => {
            if b < 0 {
                return Err(AsmErrorKind::NegativeExponent);
            }
            let mut result: i64 = 1;
            let mut base = a;
            let mut exp = b;
            while exp > 0 {
                if exp & 1 == 1 {
                    result = result.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            result
        }
        BinaryOp::Shl | BinaryOp::Shr => {
            if !(0..=63).contains(&b) {
                return Err(AsmErrorKind::ShiftOutOfRange(b));
            }
            if op == BinaryOp::Shl {
                a.wrapping_shl(b as u32)
            } else {
                a.wrapping_shr(b as u32)
            }
        }
        BinaryOp::Lt => i64::from(a < b),
        BinaryOp::Le => i64::from(a <= b),
        BinaryOp::Gt => i64::from(a > b),
        BinaryOp::Ge => i64::from(a >= b),
        BinaryOp::Eq => i64::from(a == b),
        BinaryOp::Ne => i64::from(a != b),
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::LogicalAnd => i64::from(a != 0 && b != 0),
        BinaryOp::LogicalOr => i64::from(a != 0 || b != 0),
    };
    Ok(value)
}

/* Finalization **************************************************************/

fn finalize(state: &mut CodegenState) -> Result<(), AsmError> {
    state.store_section_sizes();

    let mut flags = ObjectFlags::empty();
    if !state.object.relocations().is_empty() {
        flags |= ObjectFlags::RELOCATABLE;
    }
    for name in ENTRY_SYMBOLS {
        if let Some(index) = state.object.find_symbol(name) {
            if state.object.symbols()[index].is_defined() {
                flags |= ObjectFlags::HAS_ENTRY;
                break;
            }
        }
    }
    state.object.set_flags(flags);

    let undefined: Vec<&str> = state
        .globals
        .iter()
        .filter(|name| {
            state
                .object
                .find_symbol(name)
                .map_or(true, |i| !state.object.symbols()[i].is_defined())
        })
        .map(String::as_str)
        .collect();
    if !undefined.is_empty() {
        return Err(AsmErrorKind::GlobalSymbolUndefined(undefined.join(", "))
            .at(SourceLoc::default()));
    }

    state
        .object
        .validate()
        .map_err(|err| AsmErrorKind::from(err).at(SourceLoc::default()))
}
