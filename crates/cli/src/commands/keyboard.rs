//! `testdeck keyboard`

use clap::Subcommand;

use testdeck_runner::keyboard::catalogue;

use crate::output::{print_list, OutputFormat};

#[derive(Subcommand)]
pub enum KeyboardCommands {
    /// List the available checks
    List,
}

pub fn execute(cmd: KeyboardCommands, format: OutputFormat) {
    match cmd {
        KeyboardCommands::List => print_list(&catalogue(), format),
    }
}
