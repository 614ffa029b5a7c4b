use std::path::{Path, PathBuf};

use anyhow::{Context, Error};

use oj_worker_dag::{Affinity, ExecutionLimits};

/// What the compiler invocation for a language looks like, realized as a concrete sandboxed
/// command (spec §3 "Compile task" turned into something `oj-worker-exec` can run).
#[derive(Debug, Clone)]
pub struct CompileSpec {
    /// What to execute to compile the source.
    pub affinity: Affinity,
    /// Full argv, including the `-o <binary>`-style output flag and the source file name.
    pub argv: Vec<String>,
}

/// What running the (possibly already-compiled) program looks like.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// What to execute: the compiled binary, or an interpreter with the source as its first
    /// argument.
    pub affinity: Affinity,
    /// Arguments that must come before whatever the caller passes as the program's own argv
    /// (e.g. the source file name, for an interpreted language).
    pub argv_prefix: Vec<String>,
}

/// A programming language supported by the judge: how to detect it, how to compile it (if it
/// needs compiling), and how to run it.
///
/// Implementations are expected to be stateless and `'static`; [`crate::LanguageRegistry`] hands
/// out `&'static dyn Language` references.
pub trait Language: std::fmt::Debug + Send + Sync {
    /// Name of the language, as stored in a `CompileTask`'s `language` field. Must be unique
    /// among registered languages.
    fn name(&self) -> &'static str;

    /// File extensions (without the dot) recognized as this language.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether source files in this language need a compilation step before they can run.
    fn need_compilation(&self) -> bool;

    /// Build the compiler invocation. `source_name` and `binary_name` are paths relative to the
    /// sandbox's working directory, where the source has already been placed and where the
    /// compiler is expected to write its output.
    ///
    /// Panics if `need_compilation` returns `false`.
    fn compile(&self, _source_name: &str, _binary_name: &str) -> Result<CompileSpec, Error> {
        panic!("language {} cannot be compiled", self.name());
    }

    /// Append an extra source/grader file (spec §3 `extraSourceFiles`) to an in-progress
    /// compiler invocation. The default passes it as another positional compiler argument, which
    /// is what every currently-registered compiled language wants.
    fn add_compile_file(&self, argv: &mut Vec<String>, sandbox_path: &Path) {
        argv.push(sandbox_path.to_string_lossy().into_owned());
    }

    /// Build the invocation to run the program. `executable_name` is the name produced by
    /// [`Language::executable_name`] — the compiled binary for compiled languages, or the source
    /// file itself for interpreted ones — relative to the sandbox.
    fn run(&self, executable_name: &str) -> Result<RunSpec, Error>;

    /// Adjust resource limits for this language's runtime peculiarities (e.g. an interpreter
    /// that forks a helper process of its own needs one extra allowed process).
    fn custom_limits(&self, _limits: &mut ExecutionLimits) {}

    /// Name to give the file that ends up being directly executed inside the sandbox: the
    /// compiled binary (typically the source's file stem) for compiled languages, or the source
    /// file's own name, unchanged, for interpreted ones.
    fn executable_name(&self, source_name: &str) -> String {
        source_name.to_string()
    }
}

/// Resolve `name` to an absolute host path via `$PATH`, for building an `Affinity::Executable`
/// pointing at a system compiler/interpreter rather than something inside the sandbox.
pub(crate) fn resolve_system_command(name: &str) -> Result<PathBuf, Error> {
    which::which(name).with_context(|| format!("{} was not found in $PATH", name))
}
