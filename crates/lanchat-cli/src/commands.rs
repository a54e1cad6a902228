//! Interactive commands
//!
//! Leading slash is optional: `/devices` and `devices` are the same.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chat,
    Devices,
    Upload { path: PathBuf, target: Option<String> },
    Download { name: String, source: Option<String> },
    Share { path: PathBuf },
    Help,
    Quit,
}

/// Parse one input line; `Ok(None)` for a blank line
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    let line = line.strip_prefix('/').unwrap_or(line);
    let mut parts = line.split_whitespace();

    let Some(word) = parts.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = parts.collect();

    let command = match (word, args.as_slice()) {
        ("chat", []) => Command::Chat,
        ("devices", []) => Command::Devices,
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        ("upload", [path]) => Command::Upload {
            path: PathBuf::from(path),
            target: None,
        },
        ("upload", [path, target]) => Command::Upload {
            path: PathBuf::from(path),
            target: Some(target.to_string()),
        },
        ("download", [name]) => Command::Download {
            name: name.to_string(),
            source: None,
        },
        ("download", [name, source]) => Command::Download {
            name: name.to_string(),
            source: Some(source.to_string()),
        },
        ("share", [path]) => Command::Share {
            path: PathBuf::from(path),
        },
        ("upload", _) => return Err("usage: /upload <path> [target]".into()),
        ("download", _) => return Err("usage: /download <name> [ip:port]".into()),
        ("share", _) => return Err("usage: /share <path>".into()),
        (other, _) => return Err(format!("unknown command '{}', try /help", other)),
    };

    Ok(Some(command))
}

/// Lines that end chat mode
pub fn is_chat_exit(line: &str) -> bool {
    matches!(line.trim().to_lowercase().as_str(), "/quit" | "/exit")
}

pub fn print_help() {
    println!("📖 Commands:");
    println!("   /chat                       Join the chat (/quit to leave it)");
    println!("   /devices                    List online devices");
    println!("   /upload <path> [target]     Send a file (target: ip:port or -N)");
    println!("   /download <name> [ip:port]  Fetch a shared file");
    println!("   /share <path>               Share a file with everyone in chat");
    println!("   /help                       Show this help");
    println!("   /quit                       Exit");
}
