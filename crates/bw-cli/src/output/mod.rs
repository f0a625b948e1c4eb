//! Output formatting utilities for the CLI
//!
//! Status messages go to stderr so they never mix with session output on
//! stdout.

use burrow_core::config::Config;

/// Render the effective configuration as `key = value` lines
///
/// The password part of `auth` is masked.
pub fn format_config(config: &Config) -> String {
    let mut output = String::new();

    let host_id = if config.host_id.is_empty() {
        "-"
    } else {
        config.host_id.as_str()
    };

    output.push_str(&format!("server   = {}\n", config.relay_server));
    output.push_str(&format!("host_id  = {}\n", host_id));
    output.push_str(&format!(
        "auth     = {}\n",
        config.auth.as_deref().map(mask_credential).unwrap_or_else(|| "-".to_string())
    ));
    output.push_str(&format!("proxy    = {}\n", config.proxy.as_deref().unwrap_or("-")));
    output.push_str(&format!(
        "retry    = {}\n",
        humantime::format_duration(config.retry_period)
    ));
    output.push_str(&format!("sftp     = {}\n", config.enable_sftp));

    output
}

/// Keep the user part of `user:password`, hide the rest
fn mask_credential(auth: &str) -> String {
    match auth.split_once(':') {
        Some((user, _)) => format!("{}:****", user),
        None => "****".to_string(),
    }
}

fn print_marked(color: crossterm::style::Color, mark: &str, msg: &str) {
    use crossterm::style::{Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(color),
        Print(mark),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    print_marked(crossterm::style::Color::Red, "✗ ", msg);
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    print_marked(crossterm::style::Color::Cyan, "ℹ ", msg);
}
