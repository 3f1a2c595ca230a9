/*
 * Copyright 2026 The powergen developers
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Classifies flat transcript commands into structured build actions by
//! resolving each command's binary and pattern-matching compiler/archiver
//! drivers. Anything unrecognized is preserved as an opaque action.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use thiserror::Error;

use powergen_transcript::{RawCommand, WhichCache};

const COMPILER_SUFFIXES: &[&str] = &[
    "-gcc", "/gcc", "-g++", "/g++", "-clang", "/clang", "-clang++", "/clang++", "-cc", "/cc",
    "-c++", "/c++",
];
const ARCHIVER_SUFFIXES: &[&str] = &["-ar", "/ar"];
const HOUSEKEEPING: &[&str] = &["mkdir", "echo", "printf"];

/// Extensions a compile action is allowed to depend on. Case matters: `.C`
/// is C++, `.c` is C.
pub const SOURCE_EXTENSIONS: &[&str] = &[".c", ".cpp", ".cc", ".C", ".s", ".S", ".asm", ".rc"];
pub const ARCHIVE_EXTENSION: &str = ".a";

/// Flags that only describe debug/optimization/dependency bookkeeping and
/// carry no information worth reproducing.
const NOISE_FLAGS: &[&str] = &[
    "-g",
    "-ggdb",
    "-fdiagnostics-color",
    "-O0",
    "-Og",
    "-O",
    "-O1",
    "-O2",
    "-O3",
    "-Os",
    "-Oz",
    "-Ofast",
    "-fomit-frame-pointer",
    "-M",
    "-MM",
    "-MG",
    "-MP",
    "-MD",
    "-MMD",
];

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("more than one output file in `{command}`")]
    MultipleOutputs { command: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileAction {
    pub defines: Vec<String>,
    pub include_dirs: Vec<String>,
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAction {
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveAction {
    pub args: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildAction {
    Compile(CompileAction),
    Link(LinkAction),
    SharedLink(LinkAction),
    Archive(ArchiveAction),
    Opaque(RawCommand),
}

impl BuildAction {
    pub fn is_compile(&self) -> bool {
        matches!(self, BuildAction::Compile(_))
    }

    pub fn output(&self) -> Option<&Path> {
        match self {
            BuildAction::Compile(action) => Some(&action.output),
            BuildAction::Link(action) | BuildAction::SharedLink(action) => Some(&action.output),
            BuildAction::Archive(action) => Some(&action.output),
            BuildAction::Opaque(_) => None,
        }
    }

    pub fn dependencies(&self) -> &[PathBuf] {
        match self {
            BuildAction::Compile(action) => &action.inputs,
            BuildAction::Link(action) | BuildAction::SharedLink(action) => &action.inputs,
            BuildAction::Archive(action) => &action.inputs,
            BuildAction::Opaque(_) => &[],
        }
    }
}

/// What a compiler invocation turned out to be once its arguments were read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompilerMode {
    Compile,
    Link,
    SharedLink,
}

#[derive(Debug)]
struct CompilerInvocation {
    mode: CompilerMode,
    defines: Vec<String>,
    include_dirs: Vec<String>,
    args: Vec<String>,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
}

#[derive(Debug)]
struct ArchiverInvocation {
    args: Vec<String>,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
}

/// Classify every transcript command, in order. Housekeeping commands are
/// dropped, compiler/archiver invocations without an output file are
/// dropped, and a second action targeting an already-seen output file is
/// dropped (first one wins).
pub fn classify_all(
    entries: Vec<RawCommand>,
    cache: &mut WhichCache,
) -> Result<Vec<BuildAction>, ClassifyError> {
    let mut seen_outputs: HashSet<PathBuf> = HashSet::new();
    let mut actions = Vec::new();
    for entry in entries {
        let tokens = match shlex::split(&entry.text) {
            Some(tokens) => tokens,
            None => continue,
        };
        let binary = match tokens.first() {
            Some(binary) => binary.clone(),
            None => continue,
        };
        let action = if cache.resolves_with_suffix(&binary, COMPILER_SUFFIXES) {
            let mut invocation = extract_compiler(&tokens, &entry)?;
            match invocation.output.take() {
                Some(output) => compiler_action(invocation, output),
                None => continue,
            }
        } else if cache.resolves_with_suffix(&binary, ARCHIVER_SUFFIXES) {
            let invocation = extract_archiver(&tokens, &entry.cwd);
            match invocation.output {
                Some(output) => BuildAction::Archive(ArchiveAction {
                    args: invocation.args,
                    inputs: invocation.inputs,
                    output,
                }),
                None => continue,
            }
        } else if is_housekeeping(cache, &binary) {
            // mkdir/echo/printf are redundant; PowerMake creates output
            // directories itself.
            continue;
        } else {
            actions.push(BuildAction::Opaque(entry));
            continue;
        };
        if let Some(output) = action.output() {
            let output = output.to_path_buf();
            if seen_outputs.insert(output) {
                actions.push(action);
            }
        }
    }
    Ok(actions)
}

fn compiler_action(invocation: CompilerInvocation, output: PathBuf) -> BuildAction {
    match invocation.mode {
        CompilerMode::Compile => BuildAction::Compile(CompileAction {
            defines: invocation.defines,
            include_dirs: invocation.include_dirs,
            args: invocation.args,
            inputs: invocation.inputs,
            output,
        }),
        CompilerMode::Link => BuildAction::Link(LinkAction {
            args: invocation.args,
            inputs: invocation.inputs,
            output,
        }),
        CompilerMode::SharedLink => BuildAction::SharedLink(LinkAction {
            args: invocation.args,
            inputs: invocation.inputs,
            output,
        }),
    }
}

fn is_housekeeping(cache: &mut WhichCache, binary: &str) -> bool {
    let resolved = match cache.resolve(binary) {
        Some(resolved) => resolved,
        None => return false,
    };
    HOUSEKEEPING.iter().any(|tool| {
        let target = cache
            .resolve(tool)
            .unwrap_or_else(|| PathBuf::from(*tool));
        resolved == target
    })
}

fn extract_compiler(
    tokens: &[String],
    entry: &RawCommand,
) -> Result<CompilerInvocation, ClassifyError> {
    let mut invocation = CompilerInvocation {
        mode: CompilerMode::Link,
        defines: Vec::new(),
        include_dirs: Vec::new(),
        args: Vec::new(),
        inputs: Vec::new(),
        output: None,
    };
    let set_output = |invocation: &mut CompilerInvocation, file: &str| {
        if invocation.output.is_some() {
            return Err(ClassifyError::MultipleOutputs {
                command: entry.text.clone(),
            });
        }
        invocation.output = Some(entry.cwd.join(file));
        Ok(())
    };

    let mut i = 1;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        if token == "-D" {
            i += 1;
            if let Some(name) = tokens.get(i) {
                if name != "NDEBUG" && name != "DEBUG" {
                    invocation.defines.push(name.clone());
                }
            }
        } else if let Some(name) = strip_prefix(token, "-D") {
            if name != "NDEBUG" && name != "DEBUG" {
                invocation.defines.push(name.to_owned());
            }
        } else if token == "-I" {
            i += 1;
            if let Some(dir) = tokens.get(i) {
                invocation.include_dirs.push(dir.clone());
            }
        } else if let Some(dir) = strip_prefix(token, "-I") {
            invocation.include_dirs.push(dir.to_owned());
        } else if token == "-o" {
            i += 1;
            if let Some(file) = tokens.get(i) {
                set_output(&mut invocation, file)?;
            }
        } else if let Some(file) = strip_prefix(token, "-o") {
            set_output(&mut invocation, file)?;
        } else if token == "-MF" || token == "-MT" || token == "-MQ" {
            // Dependency-file bookkeeping; the following argument goes too.
            i += 1;
        } else if token.starts_with('-') {
            if token == "-c" {
                invocation.mode = CompilerMode::Compile;
            } else if token == "-shared" {
                invocation.mode = CompilerMode::SharedLink;
            } else if !NOISE_FLAGS.contains(&token)
                && !token.starts_with("-Wl,--dependency-file=")
            {
                invocation.args.push(token.to_owned());
            }
        } else {
            invocation.inputs.push(entry.cwd.join(token));
        }
        i += 1;
    }

    if invocation.mode == CompilerMode::Compile {
        invocation.inputs.retain(|input| has_source_extension(input));
    }
    Ok(invocation)
}

fn extract_archiver(tokens: &[String], cwd: &Path) -> ArchiverInvocation {
    let mut invocation = ArchiverInvocation {
        args: Vec::new(),
        inputs: Vec::new(),
        output: None,
    };
    for token in &tokens[1..] {
        if token.starts_with('-') {
            if let Some(arg) = strip_archive_modes(token) {
                invocation.args.push(arg);
            }
        } else if invocation.output.is_none() && token.ends_with(ARCHIVE_EXTENSION) {
            invocation.output = Some(cwd.join(token));
        } else if invocation.output.is_some() {
            invocation.inputs.push(cwd.join(token));
        } else if let Some(arg) = strip_archive_modes(token) {
            invocation.args.push(arg);
        }
    }
    invocation
}

/// Remove the replace/quick/create mode letters; they say nothing about the
/// archive worth reproducing. Whatever remains is a real flag.
fn strip_archive_modes(token: &str) -> Option<String> {
    let stripped: String = token
        .chars()
        .filter(|c| !matches!(c, 'r' | 'q' | 'c'))
        .collect();
    if stripped.is_empty() || stripped == "-" {
        None
    } else {
        Some(stripped)
    }
}

fn has_source_extension(path: &Path) -> bool {
    let path = path.to_string_lossy();
    SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

// str::strip_prefix, but available to edition-2018 era toolchains.
fn strip_prefix<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    if token.len() > prefix.len() && token.starts_with(prefix) {
        Some(&token[prefix.len()..])
    } else {
        None
    }
}
