//! Formgate CLI: the `formgate` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    support::init_tracing(cli.verbose);

    match cli.command {
        Commands::Init { path, json } => commands::init::run(path, json),

        Commands::Form { command } => commands::form::run(command),

        Commands::Question { command } => commands::question::run(command),

        Commands::Share { command } => commands::share::run(command),

        Commands::Member { command } => commands::member::run(command),

        Commands::Access {
            form_id,
            actor,
            common,
        } => commands::access::run_access(form_id, actor, common),

        Commands::Accept {
            form_id,
            at,
            actor,
            common,
        } => commands::access::run_accept(form_id, at, actor, common),

        Commands::Submit {
            form_id,
            answers,
            at,
            actor,
            common,
        } => commands::submit::run_submit(form_id, answers, at, actor, common),

        Commands::Submission { command } => commands::submit::run(command),

        Commands::Results { command } => commands::results::run(command),

        Commands::Lease { command } => commands::lease::run(command),
    }
}
