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

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;

use powergen_classify::classify_all;
use powergen_emit::{generate, render_script};
use powergen_groups::build_groups;
use powergen_transcript::{list_commands, WhichCache};

/// Placeholder when no link produced a usable project name.
const FALLBACK_PROJECT_NAME: &str = "PROJECT_NAME";

#[derive(Debug)]
pub struct Config {
    pub directory: Option<PathBuf>,
}

pub fn run(config: Config) -> anyhow::Result<()> {
    print_banner();

    let directory = match config.directory {
        Some(directory) => directory,
        None => prompt_directory()?,
    };

    let code = generate_build_file(&directory)?;
    fs::write("generated.py", code).context("writing generated.py")?;
    Ok(())
}

/// The whole pipeline: force a dry run of the build in `directory`, classify
/// what it would have executed, group and reorder the actions, then render
/// the PowerMake script.
pub fn generate_build_file(directory: &Path) -> anyhow::Result<String> {
    let mut cache = WhichCache::new();
    let commands = list_commands(&["make".to_owned()], directory, &mut cache)?;
    let actions = classify_all(commands, &mut cache)?;
    let groups = build_groups(actions);
    let generated = generate(&groups)?;

    let project_name = generated
        .project_name
        .as_deref()
        .unwrap_or(FALLBACK_PROJECT_NAME);
    Ok(render_script(
        project_name,
        generated.total_operations,
        &generated.instructions,
    ))
}

fn print_banner() {
    println!("====================================================");
    println!("==        Experimental PowerMake generator        ==");
    println!("==                                                ==");
    println!("==       This Program is not 100% reliable,       ==");
    println!("==      it will try to generate a PowerMake,      ==");
    println!("==   but you have to verify the generated file.   ==");
    println!("==    Watch out for the `powermake.run_command`   ==");
    println!("==     lines, they will most likely be wrong.     ==");
    println!("====================================================\n");
}

fn prompt_directory() -> anyhow::Result<PathBuf> {
    print!("Enter makefile's folder path: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("reading makefile folder path")?;
    Ok(PathBuf::from(line.trim()))
}
