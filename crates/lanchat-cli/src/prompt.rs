//! Terminal prompts

use dialoguer::Input;
use lanchat_core::{Device, TargetPrompt};

/// Lists devices and reads a 1-based number or `ip:port`
pub struct TerminalPrompt;

impl TargetPrompt for TerminalPrompt {
    fn choose(&self, devices: &[Device]) -> Option<String> {
        println!("📋 Online devices:");
        for (i, device) in devices.iter().enumerate() {
            println!("   {}. {} ({})", i + 1, device.name, device.address);
        }

        Input::<String>::new()
            .with_prompt("Select a device (number or ip:port)")
            .interact_text()
            .ok()
    }
}

pub fn ask_username() -> Option<String> {
    Input::<String>::new()
        .with_prompt("Your name")
        .interact_text()
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Free-form `ip:port` when no device is known yet
pub fn ask_address(what: &str) -> Option<String> {
    Input::<String>::new()
        .with_prompt(format!("{} (ip:port)", what))
        .interact_text()
        .ok()
}
