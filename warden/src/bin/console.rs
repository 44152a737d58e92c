use std::io::{self, BufRead, Write};

use anyhow::Result;
use warden::{Command, Registry, Reply};

// One JSON command per input line, one JSON reply per output line.
// Unparseable input is itself just a failed reply; the console only
// stops at end of input.
fn main() -> Result<()> {
    env_logger::init();
    let mut registry = Registry::new();
    let stdin = io::stdin();
    let mut out = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<Command>(&line) {
            Ok(cmd) => registry.dispatch(cmd),
            Err(e) => Reply::fail(format!("bad command: {e}")),
        };
        writeln!(out, "{}", serde_json::to_string(&reply)?)?;
    }

    Ok(())
}
