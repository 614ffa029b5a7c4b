use anyhow::Error;
use std::path::Path;

use oj_worker_dag::Affinity;

use crate::language::{resolve_system_command, CompileSpec, Language, RunSpec};

/// C++17 compiled with `g++`.
#[derive(Debug, Default)]
pub struct LanguageCpp;

impl Language for LanguageCpp {
    fn name(&self) -> &'static str {
        "C++17 / gcc"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cpp", "cc", "c++"]
    }

    fn need_compilation(&self) -> bool {
        true
    }

    fn compile(&self, source_name: &str, binary_name: &str) -> Result<CompileSpec, Error> {
        let gxx = resolve_system_command("g++")?;
        Ok(CompileSpec {
            affinity: Affinity::Executable(gxx),
            argv: vec![
                "-O2".into(),
                "-Wall".into(),
                "-ggdb3".into(),
                "-DEVAL".into(),
                "-std=c++17".into(),
                "-o".into(),
                binary_name.to_string(),
                source_name.to_string(),
            ],
        })
    }

    fn run(&self, executable_name: &str) -> Result<RunSpec, Error> {
        Ok(RunSpec {
            affinity: Affinity::Executable(Path::new(executable_name).to_owned()),
            argv_prefix: vec![],
        })
    }

    /// The executable name is the source file's one without the extension.
    fn executable_name(&self, source_name: &str) -> String {
        Path::new(source_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_name.to_string())
    }
}
