use std::fmt;
use std::sync::Arc;

/// A position in assembler input: file, 1-based line, 1-based column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// Originating file name (or a placeholder for in-memory input).
    pub file: Arc<str>,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl SourceLoc {
    /// A location inside `file`.
    pub fn new(file: &Arc<str>, line: u32, column: u32) -> Self {
        Self {
            file: Arc::clone(file),
            line,
            column,
        }
    }
}

impl Default for SourceLoc {
    fn default() -> Self {
        Self {
            file: Arc::from("<input>"),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// An assembler diagnostic: what went wrong and where.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} ({loc})")]
pub struct AsmError {
    /// What went wrong.
    pub kind: AsmErrorKind,
    /// Where it went wrong.
    pub loc: SourceLoc,
}

impl AsmError {
    /// Attach a location to an error kind.
    pub fn new(kind: AsmErrorKind, loc: SourceLoc) -> Self {
        Self { kind, loc }
    }
}

/// Every failure the evaluator, preprocessor, and code generator surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum AsmErrorKind {
    // Expression evaluation.
    #[error("undefined identifier '{0}'")]
    UndefinedIdentifier(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("shift amount {0} outside 0..=63")]
    ShiftOutOfRange(i64),
    #[error("negative exponent")]
    NegativeExponent,

    // Preprocessor.
    #[error("macro '{0}' is already defined")]
    MacroRedefinition(String),
    #[error("unclosed conditional block opened at line {0}")]
    UnclosedConditional(u32),
    #[error("'{0}' after '.else'")]
    ElseAfterElse(&'static str),
    #[error("'{0}' without a matching '.if'")]
    DanglingConditional(&'static str),
    #[error("'{0}' without a matching loop directive")]
    DanglingLoopEnd(&'static str),
    #[error("'{0}' outside of a loop")]
    BreakOutsideLoop(&'static str),
    #[error("loop exceeded {0} iterations")]
    InfiniteLoop(usize),
    #[error("unmatched '{{' in {0}")]
    UnmatchedBrace(&'static str),
    #[error("empty braced expression")]
    EmptyBracedExpression,
    #[error("braces are not allowed in '{0}' expressions")]
    BracesNotAllowedHere(&'static str),
    #[error("step value cannot be zero in '.for'")]
    ZeroForStep,
    #[error("unexpected {found}; expected {expected}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("unterminated {0} literal")]
    UnterminatedLiteral(&'static str),
    #[error("malformed number literal '{0}'")]
    MalformedNumber(String),

    // Code generation.
    #[error("label '{0}' redefined")]
    LabelRedefinition(String),
    #[error("instructions are not allowed in the RAM region")]
    InstructionsNotAllowedInRam,
    #[error("operand mismatch for '{mnemonic}': {detail}")]
    OperandTypeMismatch {
        mnemonic: String,
        detail: String,
    },
    #[error("immediate {value} does not fit in {bits} bits")]
    ImmediateOutOfRange {
        value: i64,
        bits: u32,
    },
    #[error("relative offset {0} does not fit in 16 bits")]
    RelativeOffsetOutOfRange(i64),
    #[error("undefined global symbol(s): {0}")]
    GlobalSymbolUndefined(String),
    #[error("symbol '{0}' cannot be both global and extern")]
    GlobalExternConflict(String),
    #[error("undefined variable '${0}'")]
    UndefinedVariable(String),
    #[error("cannot modify constant '${0}'")]
    ConstReassignment(String),
    #[error("address {0:#x} is out of the 32-bit address space")]
    AddressOutOfRange(i64),
    #[error("interrupt vector {0} outside 0..=31")]
    VectorOutOfRange(i64),
    #[error("negative reservation count {0}")]
    NegativeReservation(i64),
    #[error("external reference too complex: {0}")]
    UnsupportedExternExpression(String),

    // Container faults bubbling up from the object being built.
    #[error("object error: {0}")]
    Object(String),
}

impl AsmErrorKind {
    /// Pair this kind with a location.
    pub fn at(self, loc: SourceLoc) -> AsmError {
        AsmError::new(self, loc)
    }
}

impl From<g10_obj::ObjectError> for AsmErrorKind {
    fn from(err: g10_obj::ObjectError) -> Self {
        Self::Object(err.to_string())
    }
}
