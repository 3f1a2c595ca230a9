use std::path::{Path, PathBuf};

use crate::RawCommand;

/// Advance `i` to the end of one shell subcommand: an unescaped, unquoted
/// `&&` (or, with `stop_at_space`, horizontal whitespace), or end of input.
/// Double- and single-quote state is tracked independently; a backslash
/// escapes exactly the next byte.
pub(crate) fn consume_command(bytes: &[u8], mut i: usize, stop_at_space: bool) -> usize {
    const NO_QUOTE: u8 = 0;
    const DOUBLE: u8 = 1;
    const SINGLE: u8 = 2;

    let mut in_string = NO_QUOTE;
    let mut escaped = false;
    while i + 1 < bytes.len() {
        let ch = bytes[i];
        let at_boundary = (ch == b'&' && bytes[i + 1] == b'&')
            || (stop_at_space && (ch == b' ' || ch == b'\t'));
        if in_string == NO_QUOTE && !escaped && at_boundary {
            break;
        }
        if !escaped && ch == b'"' && in_string != SINGLE {
            in_string = if in_string == NO_QUOTE { DOUBLE } else { NO_QUOTE };
        } else if !escaped && ch == b'\'' && in_string != DOUBLE {
            in_string = if in_string == NO_QUOTE { SINGLE } else { NO_QUOTE };
        }
        escaped = !escaped && ch == b'\\';
        i += 1;
    }
    if i + 1 == bytes.len() {
        i += 1;
    }
    i
}

/// Split one transcript line into `(cwd, text)` pairs. `cd` subcommands
/// update the running directory for the rest of the line and are not
/// emitted themselves.
pub fn split_commands(line: &str, dir: &Path) -> Vec<RawCommand> {
    let bytes = line.as_bytes();
    let mut dir = dir.to_path_buf();
    let mut commands = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        i = consume_command(bytes, i, false);
        let segment = line[start..i].trim();
        let tokens = shlex::split(segment).unwrap_or_default();
        if let Some(first) = tokens.first() {
            if first == "cd" {
                dir = match tokens.get(1) {
                    Some(target) => dir.join(target),
                    None => dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
                };
            } else {
                commands.push(RawCommand {
                    cwd: dir.clone(),
                    text: segment.to_owned(),
                });
            }
        }
        while i < bytes.len() && bytes[i] == b'&' {
            i += 1;
        }
        while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
            i += 1;
        }
    }
    commands
}
