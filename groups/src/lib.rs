//! Assigns a parallel-safety batch id to every classified action, coalesces
//! adjacent same-flavor actions into groups and splits any group whose
//! outputs are only partially required later. The batch id is a design-time
//! tag for the generated build description; nothing here runs concurrently.

use std::{
    cmp::Reverse,
    collections::HashSet,
    path::PathBuf,
};

use powergen_classify::BuildAction;
pub use powergen_transcript::RawCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Compile,
    Link,
    SharedLink,
    Archive,
    /// An opaque pass-through command.
    Command,
}

/// One produced output together with the inputs it was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub dependencies: Vec<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub operation: Operation,
    pub defines: Vec<String>,
    pub include_dirs: Vec<String>,
    pub args: Vec<String>,
    pub files: Vec<FileEntry>,
    /// Set for `Operation::Command` groups only.
    pub raw: Option<RawCommand>,
    pub batch: u32,
}

impl Group {
    fn metadata_only(&self) -> Group {
        Group {
            operation: self.operation,
            defines: self.defines.clone(),
            include_dirs: self.include_dirs.clone(),
            args: self.args.clone(),
            files: Vec::new(),
            raw: self.raw.clone(),
            batch: self.batch,
        }
    }

    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().map(|file| &file.output)
    }

    pub fn required(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter().flat_map(|file| file.dependencies.iter())
    }
}

struct Batched {
    batch: u32,
    action: BuildAction,
}

/// Build the ordered group list the emitter consumes.
pub fn build_groups(actions: Vec<BuildAction>) -> Vec<Group> {
    let batched = assign_batches(actions);
    let groups = coalesce(batched);
    split_partial_overlaps(groups)
}

/// Backward scan. Non-compile actions are synchronization barriers and get
/// a batch of their own; a compile joins the tentative batch unless some
/// already-assigned action in it consumes this compile's output.
fn assign_batches(actions: Vec<BuildAction>) -> Vec<Batched> {
    let mut batched: Vec<Batched> = actions
        .into_iter()
        .map(|action| Batched { batch: 0, action })
        .collect();
    let mut current = 0u32;
    for i in (0..batched.len()).rev() {
        if !batched[i].action.is_compile() {
            current += 1;
            batched[i].batch = current;
            current += 1;
            continue;
        }
        if output_consumed_in_batch(&batched, i, current) {
            current += 1;
        }
        batched[i].batch = current;
    }
    // Ids grow towards the chronological start, so descending order restores
    // chronological order; the sort is stable, keeping co-batched actions in
    // their original relative order.
    batched.sort_by_key(|b| Reverse(b.batch));
    batched
}

fn output_consumed_in_batch(batched: &[Batched], i: usize, current: u32) -> bool {
    let output = match batched[i].action.output() {
        Some(output) => output,
        None => return false,
    };
    for later in &batched[i + 1..] {
        if later.batch != current {
            // Ids only grow leftward; past this point everything is in an
            // earlier batch already.
            break;
        }
        if later.action.dependencies().iter().any(|dep| dep == output) {
            return true;
        }
    }
    false
}

/// Fingerprint deciding whether adjacent compiles can share a group.
#[derive(PartialEq)]
struct Template<'a> {
    batch: u32,
    defines: &'a [String],
    include_dirs: &'a [String],
    args: &'a [String],
}

fn coalesce(batched: Vec<Batched>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut merging = false;
    for item in batched {
        let batch = item.batch;
        match item.action {
            BuildAction::Opaque(raw) => {
                groups.push(Group {
                    operation: Operation::Command,
                    defines: Vec::new(),
                    include_dirs: Vec::new(),
                    args: Vec::new(),
                    files: Vec::new(),
                    raw: Some(raw),
                    batch,
                });
                merging = false;
            }
            BuildAction::Archive(archive) => {
                groups.push(Group {
                    operation: Operation::Archive,
                    defines: Vec::new(),
                    include_dirs: Vec::new(),
                    args: archive.args,
                    files: vec![FileEntry {
                        dependencies: archive.inputs,
                        output: archive.output,
                    }],
                    raw: None,
                    batch,
                });
                merging = false;
            }
            BuildAction::Link(link) => {
                groups.push(Group {
                    operation: Operation::Link,
                    defines: Vec::new(),
                    include_dirs: Vec::new(),
                    args: link.args,
                    files: vec![FileEntry {
                        dependencies: link.inputs,
                        output: link.output,
                    }],
                    raw: None,
                    batch,
                });
                merging = false;
            }
            BuildAction::SharedLink(link) => {
                groups.push(Group {
                    operation: Operation::SharedLink,
                    defines: Vec::new(),
                    include_dirs: Vec::new(),
                    args: link.args,
                    files: vec![FileEntry {
                        dependencies: link.inputs,
                        output: link.output,
                    }],
                    raw: None,
                    batch,
                });
                merging = false;
            }
            BuildAction::Compile(compile) => {
                let matches_last = merging
                    && groups.last().map_or(false, |group| {
                        Template {
                            batch: group.batch,
                            defines: &group.defines,
                            include_dirs: &group.include_dirs,
                            args: &group.args,
                        } == Template {
                            batch,
                            defines: &compile.defines,
                            include_dirs: &compile.include_dirs,
                            args: &compile.args,
                        }
                    });
                let entry = FileEntry {
                    dependencies: compile.inputs,
                    output: compile.output,
                };
                if matches_last {
                    if let Some(group) = groups.last_mut() {
                        group.files.push(entry);
                    }
                } else {
                    groups.push(Group {
                        operation: Operation::Compile,
                        defines: compile.defines,
                        include_dirs: compile.include_dirs,
                        args: compile.args,
                        files: vec![entry],
                        raw: None,
                        batch,
                    });
                }
                merging = true;
            }
        }
    }
    groups
}

/// Files from `earlier`'s outputs that `later` requires, and those it does
/// not.
fn used_unused(later: &Group, earlier: &Group) -> (HashSet<PathBuf>, HashSet<PathBuf>) {
    let required: HashSet<&PathBuf> = later.required().collect();
    let mut used = HashSet::new();
    let mut unused = HashSet::new();
    for output in earlier.outputs() {
        if required.contains(output) {
            used.insert(output.clone());
        } else {
            unused.insert(output.clone());
        }
    }
    (used, unused)
}

/// Fix-point pass: while any later group needs only part of an earlier
/// group's outputs, split the earlier group in two. Afterwards, every
/// ordered pair of groups has either disjoint or fully-contained
/// output/requirement sets.
fn split_partial_overlaps(mut groups: Vec<Group>) -> Vec<Group> {
    let mut i = 0;
    while i < groups.len() {
        let mut partial: Option<HashSet<PathBuf>> = None;
        for j in i..groups.len() {
            let (used, unused) = used_unused(&groups[j], &groups[i]);
            if !used.is_empty() && !unused.is_empty() {
                partial = Some(used);
                break;
            }
        }
        match partial {
            Some(used) => {
                let group = groups.remove(i);
                let mut wanted = group.metadata_only();
                let mut rest = group.metadata_only();
                for file in group.files {
                    if used.contains(&file.output) {
                        wanted.files.push(file);
                    } else {
                        rest.files.push(file);
                    }
                }
                groups.insert(i, wanted);
                groups.insert(i, rest);
            }
            None => i += 1,
        }
    }
    groups
}
