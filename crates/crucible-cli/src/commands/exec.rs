use std::io::Write;
use std::time::Duration;

use crucible_core::config::Config;
use crucible_shell::ShellSession;

/// Run the `exec` subcommand: one command through the persistent shell,
/// streaming output live and exiting nonzero on timeout.
pub async fn run(config: &Config, command: &str, timeout_secs: Option<u64>) -> anyhow::Result<()> {
    let mut session = ShellSession::new(config.shell.clone());
    session.set_listener(|chunk| {
        print!("{chunk}");
        let _ = std::io::stdout().flush();
    });
    session.start()?;

    let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.shell.command_timeout_secs));
    let result = session.run_with_timeout(command, timeout).await?;
    // The listener already printed output as it streamed; only stderr from
    // pipe mode still needs surfacing.
    if !result.error.is_empty() {
        eprintln!("{}", result.error);
    }

    session.stop()?;
    Ok(())
}
