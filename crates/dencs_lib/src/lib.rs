//! Decompiler for compiled `NCS V1.0` stack-machine scripts.
//!
//! The pipeline is a straight line: [`bytecode::decode_program`] turns the
//! container bytes into an operation sequence, [`analysis`] finds the globals
//! block, entry stub and subroutine boundaries, [`emit::decompile_ops`]
//! translates every range into flat commands, and [`emit::render_program`]
//! prints the result. Only the decoder can fail; everything after it accepts
//! any operation sequence.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod analysis;
pub mod ast;
pub mod bytecode;
pub mod emit;
pub mod names;
pub mod ops;
pub mod translate;

pub use ast::Program;
pub use bytecode::decode_program;
pub use emit::{decompile_ops, disassemble, render_program};
pub use names::recover_names;

#[derive(Debug, Error)]
pub enum DencsError {
    #[error("unexpected end of input")]
    Eof,
    #[error("not an NCS V1.0 program")]
    BadSignature,
    #[error("bad size marker byte {0:#04x}")]
    BadSizeMarker(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Reconstructed listing: globals block, prototypes, bodies.
    Listing,
    /// Flat per-operation disassembly of the decoded stream.
    Disasm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub mode: OutputMode,
    pub recover_names: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            mode: OutputMode::Listing,
            recover_names: true,
        }
    }
}

/// Decompiles a complete compiled-script image with default options.
pub fn decompile(bytes: &[u8]) -> Result<String, DencsError> {
    decompile_with_options(bytes, DecompileOptions::default())
}

/// Decompiles a complete compiled-script image.
///
/// Errors only on container-level problems (bad signature, truncated
/// operands). Structural oddities past the header degrade to the stub entry
/// function instead of failing.
pub fn decompile_with_options(
    bytes: &[u8],
    options: DecompileOptions,
) -> Result<String, DencsError> {
    let ops = decode_program(bytes)?;
    match options.mode {
        OutputMode::Disasm => Ok(disassemble(&ops)),
        OutputMode::Listing => {
            let mut program = decompile_ops(&ops);
            if options.recover_names {
                recover_names(&mut program);
            }
            Ok(render_program(&program))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::from(*b"NCS V1.0");
        out.push(0x42);
        out.extend_from_slice(&((13 + body.len()) as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn end_to_end_listing_from_bytes() {
        // RSADD int; JSR +8; RETN; ACTION 7 #0; RETN
        let bytes = image(&[
            0x02, 0x03, // 13
            0x1e, 0x00, 0x00, 0x00, 0x00, 0x08, // 15 -> 23
            0x20, 0x00, // 21
            0x05, 0x00, 0x00, 0x07, 0x00, // 23
            0x20, 0x00, // 28
        ]);
        let text = decompile(&bytes).unwrap();
        assert!(text.contains("int main() {"));
        assert!(text.contains("ACTION 7 #0"));
    }

    #[test]
    fn disasm_mode_lists_raw_operations() {
        let bytes = image(&[0x05, 0x00, 0x00, 0x07, 0x00, 0x20, 0x00]);
        let text = decompile_with_options(
            &bytes,
            DecompileOptions {
                mode: OutputMode::Disasm,
                recover_names: false,
            },
        )
        .unwrap();
        assert!(text.contains("ACTION"));
        assert!(text.contains("RETN"));
    }

    #[test]
    fn header_only_image_degrades_to_the_stub() {
        let text = decompile(&image(&[])).unwrap();
        assert!(text.contains("void main() {"));
    }

    #[test]
    fn garbage_is_rejected_at_the_container_level() {
        assert!(decompile(b"MOD V1.0\x42\x00\x00\x00\x0d").is_err());
    }
}
