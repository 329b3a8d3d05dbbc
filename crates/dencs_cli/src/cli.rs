use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum, builder::{Styles, styling::{AnsiColor, Effects}}, crate_description, crate_name, crate_version};
use clap_complete::Shell;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputModeCli {
    Listing,
    Disasm,
}

#[derive(Parser)]
#[command(name = crate_name!(),
    version = crate_version!(),
    about = crate_description!(),
    styles = Styles::styled()
        .header(AnsiColor::BrightGreen.on_default() | Effects::BOLD | Effects::UNDERLINE)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default()))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<TopLevel>,
}

#[derive(Subcommand)]
pub enum TopLevel {
    /// Decompiles a compiled NCS script file
    Decompile {
        #[command(subcommand)]
        command: DecompileCommand,
    },
    /// Generate shell completion
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum DecompileCommand {
    /// Decompiles a compiled NCS script file
    File {
        /// Path to the compiled NCS file
        path: PathBuf,

        /// Output mode
        #[arg(long, value_enum, default_value_t = OutputModeCli::Listing)]
        mode: OutputModeCli,

        /// Keep sequential subroutine names instead of recovering well-known ones
        #[arg(long, default_value_t = false)]
        no_recover_names: bool,
    }
}
