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

//! Walks the ordered groups, diffing flag state between them, resolving
//! dependency file sets through the glob synthesizer and binding symbolic
//! variables for produced object sets, archives and shared libraries.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use console::style;
use thiserror::Error;

use powergen_globs::best_glob_match;
use powergen_groups::{Group, Operation};

mod ast;
pub use ast::{
    render_script, ArchiveVar, Binding, FlagCategory, Instruction, Library, ObjectsExpr,
    ObjectsVar, SharedLibVar,
};

#[derive(Debug, Error)]
pub enum EmitError {
    #[error("unhandled file extension: {}", .0.display())]
    UnhandledExtension(PathBuf),
    #[error("no object variable covers the inputs of `{target}`")]
    UnresolvedObjects { target: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub project_name: Option<String>,
    pub total_operations: usize,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FlagState {
    values: [Vec<String>; 10],
}

impl FlagState {
    fn get(&self, category: FlagCategory) -> &[String] {
        &self.values[category.index()]
    }

    fn set(&mut self, category: FlagCategory, values: Vec<String>) {
        self.values[category.index()] = values;
    }
}

/// Bindings produced so far in this run. Object sets are an arena ordered
/// by creation; archives and shared libraries are keyed by target base
/// name, which is how later link lines refer back to them.
#[derive(Debug, Default)]
struct SymbolTable {
    objects: Vec<BTreeSet<PathBuf>>,
    archives: HashMap<String, ArchiveVar>,
    shared_libs: HashMap<String, SharedLibVar>,
    next_archive: u32,
    next_shared_lib: u32,
}

impl SymbolTable {
    fn bind_objects(&mut self, outputs: BTreeSet<PathBuf>) -> ObjectsVar {
        self.objects.push(outputs);
        ObjectsVar(self.objects.len() as u32)
    }

    fn bind_archive(&mut self, target: String) -> ArchiveVar {
        self.next_archive += 1;
        let var = ArchiveVar(self.next_archive);
        self.archives.insert(target, var);
        var
    }

    fn bind_shared_lib(&mut self, target: String) -> SharedLibVar {
        self.next_shared_lib += 1;
        let var = SharedLibVar(self.next_shared_lib);
        self.shared_libs.insert(target, var);
        var
    }
}

/// Walk the groups and produce the final instruction sequence. The total
/// operation count is the number of file records across all groups,
/// declared up front so the generated build can report progress.
pub fn generate(groups: &[Group]) -> Result<Generated, EmitError> {
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut last_state = FlagState::default();
    let mut symbols = SymbolTable::default();
    let mut project_name: Option<String> = None;
    let mut total_operations = 0;

    for group in groups {
        total_operations += group.files.len();

        if group.operation == Operation::Command {
            let raw = match &group.raw {
                Some(raw) => raw,
                None => continue,
            };
            let instruction = Instruction::RunCommand {
                command: raw.text.clone(),
                cwd: raw.cwd.to_string_lossy().into_owned(),
            };
            warn_opaque(&instruction);
            instructions.push(instruction);
            continue;
        }

        let mut state = last_state.clone();
        match group.operation {
            Operation::Compile => {
                state.set(FlagCategory::Defines, group.defines.clone());
                state.set(FlagCategory::IncludeDirs, group.include_dirs.clone());
                for file in &group.files {
                    for dep in &file.dependencies {
                        let category = language_flags(dep)?;
                        state.set(category, group.args.clone());
                    }
                }
            }
            Operation::Link => state.set(FlagCategory::LdFlags, group.args.clone()),
            Operation::SharedLink => {
                state.set(FlagCategory::SharedLinkerFlags, group.args.clone())
            }
            Operation::Archive => state.set(FlagCategory::ArFlags, group.args.clone()),
            Operation::Command => {}
        }
        diff_flags(&last_state, &state, &mut instructions);

        if group.operation == Operation::Compile {
            let dependencies: BTreeSet<PathBuf> = group.required().cloned().collect();
            let globbed = best_glob_match(&dependencies);
            instructions.push(Instruction::GetFiles {
                binding: Binding::Files,
                include: globbed.include,
                exclude: globbed.exclude,
            });
            let outputs: BTreeSet<PathBuf> = group.outputs().cloned().collect();
            let var = symbols.bind_objects(outputs);
            instructions.push(Instruction::CompileFiles { var });
        } else {
            emit_target(group, &mut symbols, &mut project_name, &mut instructions)?;
        }

        last_state = state;
    }

    Ok(Generated {
        project_name,
        total_operations,
        instructions,
    })
}

fn warn_opaque(instruction: &Instruction) {
    eprintln!(
        "{} Verify this line in the generated powermake:",
        style("Warning:").yellow()
    );
    eprintln!("{}", style(instruction.render()).dim());
}

fn diff_flags(last: &FlagState, current: &FlagState, instructions: &mut Vec<Instruction>) {
    for category in FlagCategory::ALL.iter().copied() {
        let old = last.get(category);
        let new = current.get(category);
        let mut seen: BTreeSet<&String> = BTreeSet::new();
        let to_add: Vec<String> = new
            .iter()
            .filter(|value| !old.contains(*value) && seen.insert(*value))
            .cloned()
            .collect();
        let mut seen: BTreeSet<&String> = BTreeSet::new();
        let to_remove: Vec<String> = old
            .iter()
            .filter(|value| !new.contains(*value) && seen.insert(*value))
            .cloned()
            .collect();
        if !to_add.is_empty() {
            instructions.push(Instruction::AddFlags {
                category,
                values: to_add,
            });
        }
        if !to_remove.is_empty() {
            instructions.push(Instruction::RemoveFlags {
                category,
                values: to_remove,
            });
        }
    }
}

fn emit_target(
    group: &Group,
    symbols: &mut SymbolTable,
    project_name: &mut Option<String>,
    instructions: &mut Vec<Instruction>,
) -> Result<(), EmitError> {
    let first_output = match group.files.first() {
        Some(file) => &file.output,
        None => return Ok(()),
    };
    let target_name = file_base_name(first_output);

    let required: Vec<&PathBuf> = group.required().collect();
    let required_objects: BTreeSet<PathBuf> = required
        .iter()
        .filter(|path| !is_archive(path) && !is_so_version(path))
        .map(|path| (*path).clone())
        .collect();

    // Names never produced by this run are external/system libraries and
    // are silently left out.
    let mut libraries: Vec<Library> = Vec::new();
    for path in &required {
        if is_archive(path) {
            if let Some(var) = symbols.archives.get(&file_base_name(path)) {
                libraries.push(Library::Archive(*var));
            }
        }
    }
    for path in &required {
        if is_so_version(path) {
            if let Some(var) = symbols.shared_libs.get(&file_base_name(path)) {
                libraries.push(Library::SharedLib(*var));
            }
        }
    }

    // Cover the object requirements from the most recently bound object set
    // backwards, then fall back to discovering leftovers on disk.
    let mut chosen: Vec<ObjectsVar> = Vec::new();
    let mut covered: BTreeSet<PathBuf> = BTreeSet::new();
    for index in (0..symbols.objects.len()).rev() {
        if required_objects.difference(&covered).next().is_none() {
            break;
        }
        let set = &symbols.objects[index];
        let intersects = set.intersection(&required_objects).next().is_some();
        let contributes = set.difference(&covered).next().is_some();
        if intersects && contributes {
            chosen.push(ObjectsVar(index as u32 + 1));
            covered.extend(set.iter().cloned());
        }
    }
    let leftovers: BTreeSet<PathBuf> = required_objects.difference(&covered).cloned().collect();
    if !leftovers.is_empty() {
        let globbed = best_glob_match(&leftovers);
        let var = symbols.bind_objects(leftovers);
        instructions.push(Instruction::GetFiles {
            binding: Binding::Objects(var),
            include: globbed.include,
            exclude: globbed.exclude,
        });
        chosen.push(var);
    }
    let objects = match chosen.split_first() {
        Some((base, rest)) => ObjectsExpr {
            base: *base,
            rest: rest.to_vec(),
        },
        None => {
            return Err(EmitError::UnresolvedObjects {
                target: target_name,
            })
        }
    };

    match group.operation {
        Operation::Link => {
            *project_name = Some(target_name.clone());
            instructions.push(Instruction::LinkExecutable {
                objects,
                libraries,
                executable_name: target_name,
            });
        }
        Operation::SharedLink => {
            if project_name.is_none() {
                *project_name = Some(target_name.clone());
            }
            let var = symbols.bind_shared_lib(target_name.clone());
            instructions.push(Instruction::LinkSharedLib {
                var,
                objects,
                libraries,
                lib_name: target_name,
            });
        }
        Operation::Archive => {
            let var = symbols.bind_archive(target_name.clone());
            instructions.push(Instruction::ArchiveFiles {
                var,
                objects,
                archive_name: target_name,
            });
        }
        Operation::Compile | Operation::Command => {}
    }
    Ok(())
}

fn language_flags(path: &Path) -> Result<FlagCategory, EmitError> {
    let name = path.to_string_lossy();
    if name.ends_with(".c") {
        Ok(FlagCategory::CFlags)
    } else if name.ends_with(".cpp") || name.ends_with(".cc") || name.ends_with(".C") {
        Ok(FlagCategory::CppFlags)
    } else if name.ends_with(".s") || name.ends_with(".S") {
        Ok(FlagCategory::AsFlags)
    } else if name.ends_with(".asm") {
        Ok(FlagCategory::AsmFlags)
    } else if name.ends_with(".rc") {
        Ok(FlagCategory::RcFlags)
    } else {
        Err(EmitError::UnhandledExtension(path.to_path_buf()))
    }
}

fn is_archive(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".a")
}

/// Shared libraries are referenced as `<name>.so` possibly followed by
/// version components (`libfoo.so.1.2`).
fn is_so_version(path: &Path) -> bool {
    let name = path.to_string_lossy();
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
    !trimmed.is_empty() && trimmed.ends_with(".so")
}

/// Base name without the final extension; the symbol tables and the
/// generated target names key on this.
fn file_base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;
    use powergen_classify::classify_all;
    use powergen_groups::{build_groups, FileEntry, RawCommand};
    use powergen_transcript::WhichCache;
    use std::fs;

    fn compile_group(files: Vec<FileEntry>, defines: &[&str], args: &[&str]) -> Group {
        Group {
            operation: Operation::Compile,
            defines: defines.iter().map(|d| d.to_string()).collect(),
            include_dirs: Vec::new(),
            args: args.iter().map(|a| a.to_string()).collect(),
            files,
            raw: None,
            batch: 0,
        }
    }

    fn entry(deps: &[&str], output: &str) -> FileEntry {
        FileEntry {
            dependencies: deps.iter().map(PathBuf::from).collect(),
            output: PathBuf::from(output),
        }
    }

    #[test]
    fn test_so_version_detection() {
        assert!(is_so_version(Path::new("libfoo.so")));
        assert!(is_so_version(Path::new("libfoo.so.1")));
        assert!(is_so_version(Path::new("libfoo.so.1.2.3")));
        assert!(!is_so_version(Path::new("foo.o")));
        assert!(!is_so_version(Path::new("libfoo.a")));
        assert!(!is_so_version(Path::new("1.2.3")));
    }

    #[test]
    fn test_unhandled_extension_is_fatal() {
        let groups = vec![compile_group(
            vec![entry(&["weird.zig"], "weird.o")],
            &[],
            &[],
        )];
        assert!(matches!(
            generate(&groups),
            Err(EmitError::UnhandledExtension(_))
        ));
    }

    #[test]
    fn test_flag_transitions_only() {
        let groups = vec![
            compile_group(vec![entry(&["a.c"], "a.o")], &["FOO"], &["-Wall"]),
            compile_group(vec![entry(&["b.c"], "b.o")], &["FOO"], &[]),
        ];
        let generated = generate(&groups).expect("generated");
        let adds: Vec<&Instruction> = generated
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::AddFlags { .. }))
            .collect();
        // FOO and -Wall are added once for the first group; the second group
        // only removes -Wall, it never re-adds FOO.
        assert_eq!(adds.len(), 2);
        let removes: Vec<&Instruction> = generated
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::RemoveFlags { .. }))
            .collect();
        assert_eq!(
            removes,
            vec![&Instruction::RemoveFlags {
                category: FlagCategory::CFlags,
                values: vec!["-Wall".to_owned()],
            }]
        );
    }

    #[test]
    fn test_opaque_pass_through() {
        let groups = vec![Group {
            operation: Operation::Command,
            defines: Vec::new(),
            include_dirs: Vec::new(),
            args: Vec::new(),
            files: Vec::new(),
            raw: Some(RawCommand {
                cwd: PathBuf::from("/build"),
                text: "./configure --strange".to_owned(),
            }),
            batch: 0,
        }];
        let generated = generate(&groups).expect("generated");
        assert_eq!(
            generated.instructions,
            vec![Instruction::RunCommand {
                command: "./configure --strange".to_owned(),
                cwd: "/build".to_owned(),
            }]
        );
        assert_eq!(generated.total_operations, 0);
        assert_eq!(generated.project_name, None);
    }

    #[test]
    fn test_unresolved_objects_is_fatal() {
        // A link whose object requirements were never produced and cannot
        // be satisfied by any bound variable.
        let groups = vec![Group {
            operation: Operation::Link,
            defines: Vec::new(),
            include_dirs: Vec::new(),
            args: Vec::new(),
            files: vec![entry(&["libext.a"], "prog")],
            raw: None,
            batch: 0,
        }];
        assert!(matches!(
            generate(&groups),
            Err(EmitError::UnresolvedObjects { .. })
        ));
    }

    #[test]
    fn test_end_to_end_three_commands() {
        // The canonical scenario: two compiles sharing flags, then a link.
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.c"), b"").expect("write");
        fs::write(dir.path().join("b.c"), b"").expect("write");

        let mut cache = WhichCache::preloaded(vec![(
            "cc".to_owned(),
            PathBuf::from("/usr/bin/cc"),
        )]);
        let raw = |text: &str| RawCommand {
            cwd: dir.path().to_path_buf(),
            text: text.to_owned(),
        };
        let actions = classify_all(
            vec![
                raw("cc -DFOO -Iinc -c a.c -o a.o"),
                raw("cc -DFOO -Iinc -c b.c -o b.o"),
                raw("cc -o prog a.o b.o"),
            ],
            &mut cache,
        )
        .expect("classified");
        let groups = build_groups(actions);
        let generated = generate(&groups).expect("generated");

        assert_eq!(generated.project_name.as_deref(), Some("prog"));
        assert_eq!(generated.total_operations, 3);
        assert_eq!(
            generated.instructions,
            vec![
                Instruction::AddFlags {
                    category: FlagCategory::Defines,
                    values: vec!["FOO".to_owned()],
                },
                Instruction::AddFlags {
                    category: FlagCategory::IncludeDirs,
                    values: vec!["inc".to_owned()],
                },
                Instruction::GetFiles {
                    binding: Binding::Files,
                    include: vec![dir.path().join("*.c").to_string_lossy().into_owned()],
                    exclude: vec![],
                },
                Instruction::CompileFiles {
                    var: ObjectsVar(1)
                },
                Instruction::LinkExecutable {
                    objects: ObjectsExpr {
                        base: ObjectsVar(1),
                        rest: vec![],
                    },
                    libraries: vec![],
                    executable_name: "prog".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn test_archive_then_link_resolves_symbols() {
        let groups = vec![
            compile_group(vec![entry(&["a.c"], "a.o")], &[], &[]),
            compile_group(vec![entry(&["b.c"], "b.o")], &[], &[]),
            Group {
                operation: Operation::Archive,
                defines: Vec::new(),
                include_dirs: Vec::new(),
                args: Vec::new(),
                files: vec![entry(&["a.o"], "libx.a")],
                raw: None,
                batch: 0,
            },
            Group {
                operation: Operation::Link,
                defines: Vec::new(),
                include_dirs: Vec::new(),
                args: Vec::new(),
                files: vec![entry(&["b.o", "libx.a", "libexternal.a"], "prog")],
                raw: None,
                batch: 0,
            },
        ];
        let generated = generate(&groups).expect("generated");
        assert_eq!(generated.project_name.as_deref(), Some("prog"));

        let archive = generated
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::ArchiveFiles { var, objects, archive_name } => {
                    Some((var, objects, archive_name))
                }
                _ => None,
            })
            .expect("archive instruction");
        assert_eq!(archive.2, "libx");
        assert_eq!(archive.1.base, ObjectsVar(1));

        let link = generated
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::LinkExecutable { objects, libraries, .. } => {
                    Some((objects, libraries))
                }
                _ => None,
            })
            .expect("link instruction");
        // b.o came from the second compile group; the external archive is
        // silently dropped, the internal one resolves to its variable.
        assert_eq!(link.0.base, ObjectsVar(2));
        assert_eq!(link.1.as_slice(), &[Library::Archive(ArchiveVar(1))]);
    }

    #[test]
    fn test_shared_lib_claims_project_name_once() {
        let groups = vec![
            compile_group(vec![entry(&["a.c"], "a.o")], &[], &[]),
            Group {
                operation: Operation::SharedLink,
                defines: Vec::new(),
                include_dirs: Vec::new(),
                args: Vec::new(),
                files: vec![entry(&["a.o"], "libfoo.so")],
                raw: None,
                batch: 0,
            },
        ];
        let generated = generate(&groups).expect("generated");
        assert_eq!(generated.project_name.as_deref(), Some("libfoo"));
    }

    #[test]
    fn test_leftover_objects_discovered_on_disk() {
        // A link needing objects never produced by a compile group in this
        // run falls back to a fresh file discovery bound to a new variable.
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("ext.o"), b"").expect("write");
        let ext = dir.path().join("ext.o");

        let groups = vec![
            compile_group(vec![entry(&["a.c"], "a.o")], &[], &[]),
            Group {
                operation: Operation::Link,
                defines: Vec::new(),
                include_dirs: Vec::new(),
                args: Vec::new(),
                files: vec![FileEntry {
                    dependencies: vec![PathBuf::from("a.o"), ext.clone()],
                    output: PathBuf::from("prog"),
                }],
                raw: None,
                batch: 0,
            },
        ];
        let generated = generate(&groups).expect("generated");
        let discovery = generated
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::GetFiles {
                    binding: Binding::Objects(var),
                    include,
                    ..
                } => Some((var, include)),
                _ => None,
            })
            .expect("leftover discovery");
        assert_eq!(*discovery.0, ObjectsVar(2));
        assert_eq!(discovery.1, &vec![ext.to_string_lossy().into_owned()]);
        let link = generated
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::LinkExecutable { objects, .. } => Some(objects),
                _ => None,
            })
            .expect("link instruction");
        assert_eq!(link.base, ObjectsVar(1));
        assert_eq!(link.rest, vec![ObjectsVar(2)]);
    }
}
