use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use thiserror::Error;

use crate::{
    split::{consume_command, split_commands},
    RawCommand, WhichCache,
};

/// Nested make calls deeper than this are assumed to be a misconfigured
/// (usually self-referential) build.
pub const MAX_RECURSION_DEPTH: usize = 64;

const RANLIB_SUFFIXES: &[&str] = &["-ranlib", "/ranlib"];
const AR_SUFFIXES: &[&str] = &["-ar", "/ar"];

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("could not run dry run `{command}` in {}: {source}", .dir.display())]
    DryRunSpawn {
        dir: PathBuf,
        command: String,
        source: io::Error,
    },
    #[error("dry run `{command}` in {} exited with {status}", .dir.display())]
    DryRunFailed {
        dir: PathBuf,
        command: String,
        status: ExitStatus,
    },
    #[error("could not read link script {}: {source}", .path.display())]
    LinkScript {
        path: PathBuf,
        source: io::Error,
    },
    #[error("nested make expansion exceeded depth {0}")]
    RecursionLimit(usize),
    #[error("nested make cycle: `{command}` in {}", .dir.display())]
    Cycle { dir: PathBuf, command: String },
}

enum Neutralized {
    /// A make invocation, rewritten for a dry, always-rebuild run.
    Make(String),
    /// `cmake -E cmake_link_script <path>`; the script holds the real commands.
    LinkScript(PathBuf),
    /// Anything else, including already-materialized cmake invocations.
    Plain,
}

struct Expander<'a> {
    cache: &'a mut WhichCache,
    in_flight: HashSet<(PathBuf, String)>,
    depth: usize,
}

/// Flatten `lines` into the ordered list of commands the build would run,
/// recursively expanding nested make invocations and cmake link scripts.
pub fn list_commands(
    lines: &[String],
    dir: &Path,
    cache: &mut WhichCache,
) -> Result<Vec<RawCommand>, ExpandError> {
    let mut commands = Vec::new();
    {
        let mut expander = Expander {
            cache,
            in_flight: HashSet::new(),
            depth: 0,
        };
        expander.expand_lines(lines, dir, &mut commands)?;
    }
    Ok(fuse_archive_index(commands, cache))
}

impl<'a> Expander<'a> {
    fn expand_lines(
        &mut self,
        lines: &[String],
        dir: &Path,
        out: &mut Vec<RawCommand>,
    ) -> Result<(), ExpandError> {
        for line in lines {
            for raw in split_commands(line, dir) {
                match self.neutralize(&raw.text) {
                    Neutralized::Make(neutralized) => {
                        self.run_dry_run(&raw.cwd, &neutralized, out)?;
                    }
                    Neutralized::LinkScript(path) => {
                        let script = raw.cwd.join(&path);
                        let contents =
                            fs::read_to_string(&script).map_err(|source| {
                                ExpandError::LinkScript {
                                    path: script.clone(),
                                    source,
                                }
                            })?;
                        let script_lines: Vec<String> =
                            contents.lines().map(|l| l.trim().to_owned()).collect();
                        self.descend(&raw.cwd, &script_lines, out)?;
                    }
                    Neutralized::Plain => out.push(raw),
                }
            }
        }
        Ok(())
    }

    fn neutralize(&mut self, text: &str) -> Neutralized {
        let tokens = match shlex::split(text) {
            Some(tokens) => tokens,
            None => return Neutralized::Plain,
        };
        let binary = match tokens.first() {
            Some(binary) => binary,
            None => return Neutralized::Plain,
        };
        if self.cache.is_make(binary) {
            let rest_start = consume_command(text.as_bytes(), 0, true);
            let rest = text[rest_start..].trim();
            let neutralized = if rest.is_empty() {
                format!("{} -n -B", binary)
            } else {
                format!("{} -n -B {}", binary, rest)
            };
            return Neutralized::Make(neutralized);
        }
        if self.cache.is_cmake(binary) {
            if tokens.len() >= 4 && tokens[1] == "-E" && tokens[2] == "cmake_link_script" {
                return Neutralized::LinkScript(PathBuf::from(&tokens[3]));
            }
            // Direct cmake invocations are already fully materialized; leave
            // them for the classifier. Known limitation for builds that mix
            // make with `cmake --build` steps.
            return Neutralized::Plain;
        }
        Neutralized::Plain
    }

    fn run_dry_run(
        &mut self,
        cwd: &Path,
        command: &str,
        out: &mut Vec<RawCommand>,
    ) -> Result<(), ExpandError> {
        let key = (cwd.to_path_buf(), command.to_owned());
        if !self.in_flight.insert(key.clone()) {
            return Err(ExpandError::Cycle {
                dir: cwd.to_path_buf(),
                command: command.to_owned(),
            });
        }
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .map_err(|source| ExpandError::DryRunSpawn {
                dir: cwd.to_path_buf(),
                command: command.to_owned(),
                source,
            })?;
        if !output.status.success() {
            return Err(ExpandError::DryRunFailed {
                dir: cwd.to_path_buf(),
                command: command.to_owned(),
                status: output.status,
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<String> = stdout.lines().map(|l| l.to_owned()).collect();
        let result = self.descend(cwd, &lines, out);
        self.in_flight.remove(&key);
        result
    }

    fn descend(
        &mut self,
        cwd: &Path,
        lines: &[String],
        out: &mut Vec<RawCommand>,
    ) -> Result<(), ExpandError> {
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(ExpandError::RecursionLimit(MAX_RECURSION_DEPTH));
        }
        self.depth += 1;
        let result = self.expand_lines(lines, cwd, out);
        self.depth -= 1;
        result
    }
}

/// Collapse an `ar` line followed by a `ranlib` line into a single archive
/// invocation that asks for a symbol table. The standalone `ranlib` line is
/// dropped either way.
fn fuse_archive_index(commands: Vec<RawCommand>, cache: &mut WhichCache) -> Vec<RawCommand> {
    let mut fused: Vec<RawCommand> = Vec::with_capacity(commands.len());
    for command in commands {
        if first_token_has_suffix(cache, &command.text, RANLIB_SUFFIXES) {
            if let Some(previous) = fused.last_mut() {
                if first_token_has_suffix(cache, &previous.text, AR_SUFFIXES) {
                    previous.text = request_symbol_table(&previous.text);
                    continue;
                }
            }
        }
        fused.push(command);
    }
    fused
}

fn first_token_has_suffix(cache: &mut WhichCache, text: &str, suffixes: &[&str]) -> bool {
    let tokens = match shlex::split(text) {
        Some(tokens) => tokens,
        None => return false,
    };
    match tokens.first() {
        Some(binary) => cache.resolves_with_suffix(binary, suffixes),
        None => false,
    }
}

fn request_symbol_table(text: &str) -> String {
    let mut tokens = match shlex::split(text) {
        Some(tokens) if tokens.len() >= 2 => tokens,
        _ => return text.to_owned(),
    };
    let stripped = tokens[1].trim_start_matches('-');
    let mode_like = !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_alphabetic());
    if mode_like {
        if !tokens[1].contains('s') {
            tokens[1].push('s');
        }
    } else {
        tokens.insert(1, "s".to_owned());
    }
    shlex::try_join(tokens.iter().map(String::as_str)).unwrap_or_else(|_| tokens.join(" "))
}
