//! Operator console
//!
//! Reads commands from stdin while the gateway runs. `quit` stops the gateway;
//! closing stdin only stops the console.

use crate::core::listener::Gateway;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

/// Console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Stop the gateway
    Quit,
    /// Print counters
    Status,
    /// List commands
    Help,
    /// Anything else
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one console line; blank lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim();
        if word.is_empty() {
            return None;
        }
        Some(match word.to_lowercase().as_str() {
            "quit" | "exit" | "salir" => Self::Quit,
            "status" | "estado" => Self::Status,
            "help" | "?" => Self::Help,
            _ => Self::Unknown(word.to_string()),
        })
    }
}

/// Render the status report
pub fn status_report(gateway: &Gateway) -> String {
    let stats = gateway.stats();
    let link = gateway.link_stats();
    format!(
        "sessions: {} open, {} accepted | commands: {} forwarded, {} rejected, {} device failures | \
         telemetry: {} lines | link: {} ({} frames, {} bytes, {} errors)",
        gateway.session_count(),
        stats.sessions_accepted,
        stats.commands_forwarded,
        stats.commands_rejected,
        stats.device_failures,
        stats.telemetry_lines,
        if gateway.context().coordinator.is_available() { "up" } else { "down" },
        link.frames_written,
        link.bytes_written,
        link.errors,
    )
}

/// Serve console commands until `quit`, end of input or gateway shutdown
pub async fn run_console<R>(input: R, gateway: Gateway)
where
    R: AsyncBufRead + Unpin,
{
    let shutdown = gateway.shutdown_token();
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                return;
            }
            Err(e) => {
                debug!("Console read failed: {}", e);
                return;
            }
        };

        match ConsoleCommand::parse(&line) {
            Some(ConsoleCommand::Quit) => {
                info!("Shutdown requested from console");
                gateway.shutdown();
                return;
            }
            Some(ConsoleCommand::Status) => println!("{}", status_report(&gateway)),
            Some(ConsoleCommand::Help) => println!("Commands: status, quit"),
            Some(ConsoleCommand::Unknown(word)) => println!("Unknown command `{word}`, try `help`"),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    #[test]
    fn test_parse() {
        assert_eq!(ConsoleCommand::parse(" QUIT "), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("salir"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("estado"), Some(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse(""), None);
        assert_eq!(
            ConsoleCommand::parse("reboot"),
            Some(ConsoleCommand::Unknown("reboot".into()))
        );
    }

    #[tokio::test]
    async fn test_quit_cancels_gateway() {
        let gateway = Gateway::new(&GatewayConfig::default(), None).unwrap();
        let token = gateway.shutdown_token();
        run_console(&b"status\nquit\nstatus\n"[..], gateway).await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_eof_does_not_cancel() {
        let gateway = Gateway::new(&GatewayConfig::default(), None).unwrap();
        let token = gateway.shutdown_token();
        run_console(&b"help\n"[..], gateway).await;
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_status_report_mentions_link_state() {
        let gateway = Gateway::new(&GatewayConfig::default(), None).unwrap();
        let report = status_report(&gateway);
        assert!(report.contains("0 open"));
        assert!(report.contains("link: down"));
    }
}
