use anyhow::Error;

use oj_worker_dag::Affinity;

use crate::language::{resolve_system_command, Language, RunSpec};

/// Python, run with the system `python3` interpreter.
#[derive(Debug, Default)]
pub struct LanguagePython;

impl Language for LanguagePython {
    fn name(&self) -> &'static str {
        "Python3"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn need_compilation(&self) -> bool {
        false
    }

    fn run(&self, executable_name: &str) -> Result<RunSpec, Error> {
        let python3 = resolve_system_command("python3")?;
        Ok(RunSpec {
            affinity: Affinity::Executable(python3),
            argv_prefix: vec![executable_name.to_string()],
        })
    }
}
