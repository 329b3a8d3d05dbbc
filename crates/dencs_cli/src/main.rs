use clap::{CommandFactory, Parser};

use crate::cli::{Cli, TopLevel, DecompileCommand, OutputModeCli};

mod cli;

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(TopLevel::Decompile { command }) => match command {
            DecompileCommand::File {
                path,
                mode,
                no_recover_names,
            } => {
                let mode = match mode {
                    OutputModeCli::Listing => dencs_lib::OutputMode::Listing,
                    OutputModeCli::Disasm => dencs_lib::OutputMode::Disasm,
                };
                match std::fs::read(&path) {
                    Ok(bytes) => match dencs_lib::decompile_with_options(
                        &bytes,
                        dencs_lib::DecompileOptions {
                            mode,
                            recover_names: !no_recover_names,
                        },
                    ) {
                        Ok(out) => {
                            print!("{out}");
                        }
                        Err(e) => {
                            eprintln!("decompile error: {e}");
                            std::process::exit(1);
                        }
                    },
                    Err(e) => {
                        eprintln!("failed to read {path:?}: {e}");
                        std::process::exit(1);
                    }
                }
            }
        },
        Some(TopLevel::Completion { shell }) => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }
        None => {
            Cli::command().print_help().unwrap();
        }
    }
}
