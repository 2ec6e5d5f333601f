use colored::*;
use lanwatch_common::models::{Device, SshStatus, Status};

pub const TOTAL_WIDTH: usize = 64;

pub fn header(msg: &str) {
    let formatted = format!("⟦ {msg} ⟧");
    let dashes = TOTAL_WIDTH.saturating_sub(formatted.chars().count());
    let left = dashes / 2;
    let line = format!(
        "{}{}{}",
        "─".repeat(left),
        formatted.to_uppercase().bright_green(),
        "─".repeat(dashes - left)
    );
    println!("{}", line.bright_black());
}

/// One line per update: state, address, hostname and OS.
pub fn device(device: &Device) {
    let status = match device.status {
        Status::Online => "online ".green().bold(),
        Status::Offline => "offline".red().bold(),
        Status::Unknown => "unknown".dimmed(),
    };
    let ssh = match device.ssh_status {
        SshStatus::Enabled => "ssh".cyan(),
        SshStatus::Disabled => "---".bright_black(),
    };
    println!(
        "{} {} {:<15} {} {} {}",
        ">".bright_black(),
        status,
        device.ip.to_string().bright_white(),
        ssh,
        device.hostname.bright_green(),
        format!("({})", device.os).bright_black(),
    );
}
