use crucible_core::types::Language;
use crucible_interp::kit_for;

/// Run the `languages` subcommand: list every binding and how it executes.
pub fn run() {
    for language in Language::all() {
        let kind = match kit_for(*language).repl_command() {
            Some(cmd) => format!("repl: {}", cmd.join(" ")),
            None => "one-shot".to_string(),
        };
        println!("{:<12} {kind}", language.as_str());
    }
}
