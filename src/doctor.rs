//! Startup preflight, also exposed as `plexbrowse doctor`.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogError, PlexClient};
use crate::config::Config;

/// Deadline for each request made by the preflight
const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

const WRITE_TEST_FILE: &str = ".plexbrowse-write-test";

/// The things checked before browsing starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Server,
    Token,
    Picker,
    Player,
    Downloads,
}

impl Check {
    pub fn name(self) -> &'static str {
        match self {
            Check::Server => "Server",
            Check::Token => "Token",
            Check::Picker => "Picker",
            Check::Player => "Player",
            Check::Downloads => "Downloads",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    /// Usable, but something the user should know about
    Notice,
    /// Browsing cannot start
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub check: Check,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(check: Check, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            check,
            status,
            detail: detail.into(),
        }
    }

    fn marker(&self, color: bool) -> String {
        let (symbol, ansi) = match self.status {
            CheckStatus::Pass => ("✓", "\x1b[32m"),
            CheckStatus::Notice => ("!", "\x1b[33m"),
            CheckStatus::Fail => ("✗", "\x1b[31m"),
        };
        if color {
            format!("{}{}\x1b[0m", ansi, symbol)
        } else {
            symbol.to_string()
        }
    }
}

pub async fn run_checks(config: &Config) -> Vec<CheckResult> {
    let client = PlexClient::new(&config.server);

    let mut results = vec![check_server(&client).await];

    // A token can only be judged by a server that answers
    if results[0].status == CheckStatus::Pass {
        results.push(check_token(&client).await);
    }

    results.push(check_command(Check::Picker, &config.picker.command));
    results.push(check_command(Check::Player, &config.player.command));
    results.push(check_downloads(&config.storage.download_dir()));

    for result in &results {
        match result.status {
            CheckStatus::Fail => warn!(check = result.check.name(), detail = %result.detail, "preflight failed"),
            _ => info!(check = result.check.name(), detail = %result.detail, "preflight"),
        }
    }

    results
}

pub fn has_errors(results: &[CheckResult]) -> bool {
    results.iter().any(|r| r.status == CheckStatus::Fail)
}

async fn check_server(client: &PlexClient) -> CheckResult {
    match timeout(PREFLIGHT_TIMEOUT, client.identity()).await {
        Ok(Ok(version)) if version.is_empty() => {
            CheckResult::new(Check::Server, CheckStatus::Pass, "reachable")
        }
        Ok(Ok(version)) => CheckResult::new(
            Check::Server,
            CheckStatus::Pass,
            format!("reachable, Plex Media Server {}", version),
        ),
        Ok(Err(e)) => CheckResult::new(Check::Server, CheckStatus::Fail, format!("unreachable: {}", e)),
        Err(_) => CheckResult::new(
            Check::Server,
            CheckStatus::Fail,
            format!("no answer within {}s", PREFLIGHT_TIMEOUT.as_secs()),
        ),
    }
}

async fn check_token(client: &PlexClient) -> CheckResult {
    let sections = match timeout(PREFLIGHT_TIMEOUT, client.list_sections()).await {
        Ok(Ok(sections)) => sections,
        Ok(Err(CatalogError::Unauthorized)) => {
            return CheckResult::new(
                Check::Token,
                CheckStatus::Fail,
                "rejected by the server, check server.token or PLEX_TOKEN",
            );
        }
        Ok(Err(e)) => {
            return CheckResult::new(Check::Token, CheckStatus::Fail, format!("library request failed: {}", e));
        }
        Err(_) => {
            return CheckResult::new(
                Check::Token,
                CheckStatus::Fail,
                format!("no answer within {}s", PREFLIGHT_TIMEOUT.as_secs()),
            );
        }
    };

    if sections.is_empty() {
        CheckResult::new(
            Check::Token,
            CheckStatus::Notice,
            "accepted, but no movie, show or music libraries are shared with it",
        )
    } else {
        let names: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        CheckResult::new(
            Check::Token,
            CheckStatus::Pass,
            format!("accepted, libraries: {}", names.join(", ")),
        )
    }
}

fn check_command(check: Check, command: &str) -> CheckResult {
    match which::which(command) {
        Ok(path) => CheckResult::new(check, CheckStatus::Pass, path.display().to_string()),
        Err(_) => CheckResult::new(
            check,
            CheckStatus::Fail,
            format!("'{}' is not on PATH", command),
        ),
    }
}

/// The download root must exist (it is created if missing) and accept a
/// new file.
fn check_downloads(dir: &Path) -> CheckResult {
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult::new(
            Check::Downloads,
            CheckStatus::Fail,
            format!("cannot create {}: {}", dir.display(), e),
        );
    }

    let test_file = dir.join(WRITE_TEST_FILE);
    let written = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&test_file);

    match written {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_file);
            CheckResult::new(Check::Downloads, CheckStatus::Pass, dir.display().to_string())
        }
        Err(e) => CheckResult::new(
            Check::Downloads,
            CheckStatus::Fail,
            format!("{} is not writable: {}", dir.display(), e),
        ),
    }
}

/// Text of the report. The last line says whether browsing can start.
pub fn render(results: &[CheckResult], color: bool) -> String {
    let width = results
        .iter()
        .map(|r| r.check.name().len())
        .max()
        .unwrap_or(0);

    let mut out = String::from("plexbrowse preflight\n\n");
    for result in results {
        let _ = writeln!(
            out,
            "  {} {:<width$}  {}",
            result.marker(color),
            result.check.name(),
            result.detail,
            width = width
        );
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .map(|r| r.check.name())
        .collect();

    out.push('\n');
    if !failed.is_empty() {
        let _ = writeln!(out, "  Cannot start: fix {}.", failed.join(", "));
    } else if results.iter().any(|r| r.status == CheckStatus::Notice) {
        out.push_str("  Ready, though the remote menus may come up empty.\n");
    } else {
        out.push_str("  Ready to browse.\n");
    }
    out
}

pub fn print_results(results: &[CheckResult]) {
    println!("{}", render(results, std::io::stdout().is_terminal()));
}
