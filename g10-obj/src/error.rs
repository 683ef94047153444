/// Failures loading, building, or validating an object.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ObjectError {
    /// The file does not start with the container magic.
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// The magic this build understands.
        expected: u32,
        /// What the file actually started with.
        found: u32,
    },

    /// The file's major version is not one this build can read.
    #[error("unsupported major version {found} (supported: {supported})")]
    UnsupportedMajorVersion {
        /// Major version in the file.
        found: u8,
        /// Major version this build reads and writes.
        supported: u8,
    },

    /// A table's offset and size reach past the end of the file.
    #[error("{table} table extends beyond the end of the file")]
    TruncatedTable {
        /// Which table was truncated.
        table: &'static str,
    },

    /// Two non-empty sections occupy overlapping address ranges.
    #[error(
        "sections {first} and {second} overlap \
         ({first_start:#010x}..{first_end:#010x} and \
         {second_start:#010x}..{second_end:#010x})"
    )]
    SectionOverlap {
        /// Index of the lower-indexed section.
        first: usize,
        /// Index of the higher-indexed section.
        second: usize,
        /// Start of the first section.
        first_start: u32,
        /// End of the first section (exclusive).
        first_end: u32,
        /// Start of the second section.
        second_start: u32,
        /// End of the second section (exclusive).
        second_end: u32,
    },

    /// A section's type disagrees with the region its address lives in.
    #[error(
        "section {index} ({name}) of type {ty:?} has address {address:#010x} \
         in the wrong region"
    )]
    RegionTypeMismatch {
        /// Section index.
        index: usize,
        /// Section name.
        name: String,
        /// Section type.
        ty: crate::SectionType,
        /// Offending base address.
        address: u32,
    },

    /// A loaded section's recorded size disagrees with its byte count.
    #[error(
        "section {index} ({name}) records size {size} but carries {actual} \
         bytes"
    )]
    SectionSizeMismatch {
        /// Section index.
        index: usize,
        /// Section name.
        name: String,
        /// Recorded virtual size.
        size: u32,
        /// Actual data length.
        actual: usize,
    },

    /// A symbol definition violates the local/global/extern scoping rules.
    #[error("symbol '{name}': {reason}")]
    InvalidSymbolScoping {
        /// Symbol name.
        name: String,
        /// Which rule was broken.
        reason: String,
    },

    /// A relocation points outside the symbol or section tables, or outside
    /// its section's bytes.
    #[error("relocation {index}: {reason}")]
    DanglingRelocation {
        /// Relocation index.
        index: usize,
        /// Which reference was dangling.
        reason: String,
    },

    /// Underlying file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
