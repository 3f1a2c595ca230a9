//! The structured instruction set the emitter produces. Instructions stay
//! symbolic until `render_script` serializes them to the PowerMake textual
//! form; the flag-diffing and symbol-binding logic never touches strings.

use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagCategory {
    Defines,
    IncludeDirs,
    CFlags,
    CppFlags,
    AsFlags,
    AsmFlags,
    RcFlags,
    LdFlags,
    SharedLinkerFlags,
    ArFlags,
}

impl FlagCategory {
    pub const ALL: [FlagCategory; 10] = [
        FlagCategory::Defines,
        FlagCategory::IncludeDirs,
        FlagCategory::CFlags,
        FlagCategory::CppFlags,
        FlagCategory::AsFlags,
        FlagCategory::AsmFlags,
        FlagCategory::RcFlags,
        FlagCategory::LdFlags,
        FlagCategory::SharedLinkerFlags,
        FlagCategory::ArFlags,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            FlagCategory::Defines => 0,
            FlagCategory::IncludeDirs => 1,
            FlagCategory::CFlags => 2,
            FlagCategory::CppFlags => 3,
            FlagCategory::AsFlags => 4,
            FlagCategory::AsmFlags => 5,
            FlagCategory::RcFlags => 6,
            FlagCategory::LdFlags => 7,
            FlagCategory::SharedLinkerFlags => 8,
            FlagCategory::ArFlags => 9,
        }
    }

    /// The `config.add_<key>` / `config.remove_<key>` suffix.
    pub fn key(self) -> &'static str {
        match self {
            FlagCategory::Defines => "defines",
            FlagCategory::IncludeDirs => "includedirs",
            FlagCategory::CFlags => "c_flags",
            FlagCategory::CppFlags => "cpp_flags",
            FlagCategory::AsFlags => "as_flags",
            FlagCategory::AsmFlags => "asm_flags",
            FlagCategory::RcFlags => "rc_flags",
            FlagCategory::LdFlags => "ld_flags",
            FlagCategory::SharedLinkerFlags => "shared_linker_flags",
            FlagCategory::ArFlags => "ar_flags",
        }
    }
}

/// A symbolic object-set variable, `objects<n>` in the rendered script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectsVar(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveVar(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedLibVar(pub u32);

impl Display for ObjectsVar {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "objects{}", self.0)
    }
}

impl Display for ArchiveVar {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "archives{}", self.0)
    }
}

impl Display for SharedLibVar {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "shared_lib{}", self.0)
    }
}

/// What a file-discovery instruction binds its result to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// The scratch `files` variable feeding the next compile.
    Files,
    /// A fresh object-set variable (leftover objects found on disk).
    Objects(ObjectsVar),
}

impl Display for Binding {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Binding::Files => write!(f, "files"),
            Binding::Objects(var) => write!(f, "{}", var),
        }
    }
}

/// A union of previously bound object-set variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectsExpr {
    pub base: ObjectsVar,
    pub rest: Vec<ObjectsVar>,
}

impl Display for ObjectsExpr {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        if self.rest.is_empty() {
            return write!(f, "{}", self.base);
        }
        write!(f, "{}.union(", self.base)?;
        for (i, var) in self.rest.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", var)?;
        }
        write!(f, ")")
    }
}

/// An archive or shared-library variable referenced from a link line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    Archive(ArchiveVar),
    SharedLib(SharedLibVar),
}

impl Display for Library {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Library::Archive(var) => write!(f, "{}", var),
            Library::SharedLib(var) => write!(f, "{}", var),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Verbatim pass-through of a command nothing else understood.
    RunCommand { command: String, cwd: String },
    AddFlags {
        category: FlagCategory,
        values: Vec<String>,
    },
    RemoveFlags {
        category: FlagCategory,
        values: Vec<String>,
    },
    GetFiles {
        binding: Binding,
        include: Vec<String>,
        exclude: Vec<String>,
    },
    CompileFiles { var: ObjectsVar },
    LinkExecutable {
        objects: ObjectsExpr,
        libraries: Vec<Library>,
        executable_name: String,
    },
    LinkSharedLib {
        var: SharedLibVar,
        objects: ObjectsExpr,
        libraries: Vec<Library>,
        lib_name: String,
    },
    ArchiveFiles {
        var: ArchiveVar,
        objects: ObjectsExpr,
        archive_name: String,
    },
}

fn quoted(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

fn quoted_list(values: &[String]) -> String {
    values
        .iter()
        .map(|value| quoted(value))
        .collect::<Vec<String>>()
        .join(", ")
}

fn libraries_argument(libraries: &[Library]) -> String {
    if libraries.is_empty() {
        return String::new();
    }
    let names: Vec<String> = libraries.iter().map(Library::to_string).collect();
    format!(", archives=[{}]", names.join(", "))
}

fn discovery_expression(include: &[String], exclude: &[String]) -> String {
    if exclude.is_empty() {
        format!("powermake.get_files({})", quoted_list(include))
    } else {
        format!(
            "powermake.filter_files(powermake.get_files({}), {})",
            quoted_list(include),
            quoted_list(exclude)
        )
    }
}

impl Instruction {
    /// One line of the generated build callback.
    pub fn render(&self) -> String {
        match self {
            Instruction::RunCommand { command, cwd } => format!(
                "powermake.run_command(config, {}, shell=True, cwd={})",
                quoted(command),
                quoted(cwd)
            ),
            Instruction::AddFlags { category, values } => {
                format!("config.add_{}({})", category.key(), quoted_list(values))
            }
            Instruction::RemoveFlags { category, values } => {
                format!("config.remove_{}({})", category.key(), quoted_list(values))
            }
            Instruction::GetFiles {
                binding,
                include,
                exclude,
            } => format!("{} = {}", binding, discovery_expression(include, exclude)),
            Instruction::CompileFiles { var } => {
                format!("{} = powermake.compile_files(config, files)", var)
            }
            Instruction::LinkExecutable {
                objects,
                libraries,
                executable_name,
            } => format!(
                "powermake.link_files(config, {}{}, executable_name={})",
                objects,
                libraries_argument(libraries),
                quoted(executable_name)
            ),
            Instruction::LinkSharedLib {
                var,
                objects,
                libraries,
                lib_name,
            } => format!(
                "{} = powermake.link_shared_lib(config, {}{}, lib_name={})",
                var,
                objects,
                libraries_argument(libraries),
                quoted(lib_name)
            ),
            Instruction::ArchiveFiles {
                var,
                objects,
                archive_name,
            } => format!(
                "{} = powermake.archive_files(config, {}, archive_name={})",
                var,
                objects,
                quoted(archive_name)
            ),
        }
    }
}

/// Serialize the whole run: header import, the build callback with its
/// up-front operation count, and the trailing `powermake.run` invocation.
pub fn render_script(project_name: &str, total_operations: usize, instructions: &[Instruction]) -> String {
    let mut code = String::from("import powermake\n\n\n");
    code.push_str("def on_build(config: powermake.Config):\n");
    code.push_str(&format!(
        "    config.nb_total_operations = {}\n\n",
        total_operations
    ));
    for instruction in instructions {
        code.push_str(&format!("    {}\n\n", instruction.render()));
    }
    code.push_str(&format!(
        "\n\npowermake.run({}, build_callback=on_build)\n",
        quoted(project_name)
    ));
    code
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_objects_expr_rendering() {
        let lone = ObjectsExpr {
            base: ObjectsVar(2),
            rest: vec![],
        };
        assert_eq!(lone.to_string(), "objects2");
        let union = ObjectsExpr {
            base: ObjectsVar(3),
            rest: vec![ObjectsVar(1), ObjectsVar(2)],
        };
        assert_eq!(union.to_string(), "objects3.union(objects1, objects2)");
    }

    #[test]
    fn test_instruction_rendering() {
        assert_eq!(
            Instruction::AddFlags {
                category: FlagCategory::Defines,
                values: vec!["FOO".to_owned(), "BAR=1".to_owned()],
            }
            .render(),
            r#"config.add_defines("FOO", "BAR=1")"#
        );
        assert_eq!(
            Instruction::GetFiles {
                binding: Binding::Files,
                include: vec!["src/*.c".to_owned()],
                exclude: vec!["src/skip.c".to_owned()],
            }
            .render(),
            r#"files = powermake.filter_files(powermake.get_files("src/*.c"), "src/skip.c")"#
        );
        assert_eq!(
            Instruction::CompileFiles {
                var: ObjectsVar(1)
            }
            .render(),
            "objects1 = powermake.compile_files(config, files)"
        );
        assert_eq!(
            Instruction::LinkExecutable {
                objects: ObjectsExpr {
                    base: ObjectsVar(1),
                    rest: vec![],
                },
                libraries: vec![Library::Archive(ArchiveVar(1))],
                executable_name: "prog".to_owned(),
            }
            .render(),
            r#"powermake.link_files(config, objects1, archives=[archives1], executable_name="prog")"#
        );
    }

    #[test]
    fn test_script_shape() {
        let script = render_script(
            "prog",
            3,
            &[Instruction::CompileFiles {
                var: ObjectsVar(1),
            }],
        );
        assert!(script.starts_with("import powermake\n\n\n"));
        assert!(script.contains("def on_build(config: powermake.Config):\n"));
        assert!(script.contains("    config.nb_total_operations = 3\n"));
        assert!(script.contains("    objects1 = powermake.compile_files(config, files)\n"));
        assert!(script.ends_with("powermake.run(\"prog\", build_callback=on_build)\n"));
    }
}
