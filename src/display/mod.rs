// src/display/mod.rs
//! Display modules for different interfaces

pub mod terminal;

use crossterm::tty::IsTty;

/// The live status view only makes sense on an interactive terminal
pub fn should_use_terminal() -> bool {
    std::io::stdout().is_tty()
}
