pub mod invaders;
pub mod twin_z80;

use crate::machine::Machine;

pub use invaders::InvadersBoard;
pub use twin_z80::TwinZ80Board;

pub const BOARD_NAMES: [&str; 2] = [TwinZ80Board::NAME, InvadersBoard::NAME];

/// Builds a board by its `Machine::name`.
pub fn create(name: &str) -> Result<Box<dyn Machine>, String> {
    match name {
        TwinZ80Board::NAME => Ok(Box::new(TwinZ80Board::new()?)),
        InvadersBoard::NAME => Ok(Box::new(InvadersBoard::new()?)),
        _ => Err(format!(
            "unknown board '{}' (available: {})",
            name,
            BOARD_NAMES.join(", ")
        )),
    }
}
