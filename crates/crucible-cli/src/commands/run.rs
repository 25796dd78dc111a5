use std::io::Read;
use std::path::Path;

use anyhow::Context;
use crucible_core::config::Config;
use crucible_interp::InterpreterRegistry;

/// Run the `run` subcommand: submit a code block to an interpreter session
/// and print each execution event as one JSON line.
pub fn run(config: &Config, language: &str, file: Option<&Path>) -> anyhow::Result<()> {
    let code = read_code(file)?;

    let registry = InterpreterRegistry::new(config.interpreter.clone());
    let mut session = registry.create(language)?;
    for event in session.run(&code) {
        println!("{}", event.to_message());
    }

    Ok(())
}

fn read_code(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("failed to read code from stdin")?;
            Ok(code)
        }
    }
}
