use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "altaira",
    version,
    about = "Multi-tenant AI assistant gateway with tiered subscriptions"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the user-facing and administrative bots.
    Run,
    /// Check configuration and report what is missing.
    Doctor,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn run_subcommand_parses() {
        let cli = Cli::parse_from(["altaira", "run"]);
        assert!(matches!(cli.command, Some(Command::Run)));
    }

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let cli = Cli::parse_from(["altaira"]);
        assert!(cli.command.is_none());
    }
}
