//! Per-run conversion settings

/// Default edge length of a `.vox` model chunk
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Largest chunk a `.vox` model can hold (local coordinates are one byte)
pub const MAX_CHUNK_SIZE: u32 = 256;

/// Settings that every converter and the writer read during one run
///
/// Built once at the start of a conversion and passed by reference, so two
/// conversions with different settings never observe each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    /// Edge length of the models the writer splits a grid into
    pub chunk_size: u32,
    /// Enables extra diagnostics (read-back after writing)
    pub debug: bool,
    /// Skip the color-limit pass in converters
    pub disable_quantization: bool,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            debug: false,
            disable_quantization: false,
        }
    }
}

impl RunContext {
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_disable_quantization(mut self, disable: bool) -> Self {
        self.disable_quantization = disable;
        self
    }
}
