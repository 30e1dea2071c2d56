//! completions command - Generate shell completion scripts

use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::exit_code::ExitCode;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Execute the completions command
pub fn execute(args: CompletionsArgs) -> ExitCode {
    let mut command = crate::Cli::command();
    clap_complete::generate(args.shell, &mut command, "b2", &mut std::io::stdout());
    ExitCode::Success
}
