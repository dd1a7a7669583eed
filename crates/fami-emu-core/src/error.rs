use thiserror::Error;

/// Failure to turn a cartridge image into a running machine.
///
/// Always surfaced before any chip state exists.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("not an iNES image (bad magic)")]
    BadMagic,

    #[error("image truncated in {section}: expected {expected} bytes, found {actual}")]
    Truncated {
        section: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("image declares no PRG ROM")]
    EmptyPrg,

    #[error("unsupported mapper #{0}")]
    UnsupportedMapper(u8),

    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal condition raised while executing guest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    #[error("processor jammed by opcode {opcode:#04x} at {pc:#06x}")]
    Jammed { opcode: u8, pc: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let e = LoadError::Truncated {
            section: "PRG",
            expected: 0x4000,
            actual: 12,
        };
        assert_eq!(
            e.to_string(),
            "image truncated in PRG: expected 16384 bytes, found 12"
        );
        assert_eq!(
            LoadError::UnsupportedMapper(42).to_string(),
            "unsupported mapper #42"
        );
        let j = ExecutionFault::Jammed {
            opcode: 0x02,
            pc: 0x8000,
        };
        assert_eq!(j.to_string(), "processor jammed by opcode 0x02 at 0x8000");
    }
}
