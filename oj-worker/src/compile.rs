//! Compile glue (spec §4.B/§4.G): turns a source file plus extra-source files into a
//! `oj_worker_format::checker::CompiledProgram`, going through the task-slot scheduler, a real
//! sandbox run, and the compile cache's dedup/eviction.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Error};
use oj_worker_cache::{CompileCache, CompileOutcome, CompileTask, RawCompileRun};
use oj_worker_dag::{CpuAffinityTarget, Redirect, SandboxParams};
use oj_worker_exec::{Sandbox, SandboxRunner, Scheduler};
use oj_worker_format::checker::CompiledProgram;
use oj_worker_lang::{Language, LanguageRegistry};

/// Result of compiling (or, for interpreted languages, merely staging) one program.
pub struct CompileResult {
    pub program: CompiledProgram,
    pub success: bool,
    pub message: String,
}

/// Compile `source`, written in `language_name`, caching the result by content hash.
///
/// `extra_sources` maps a filename (as it should appear alongside the source) to its bytes,
/// mirroring spec §3's `extraSourceFiles` map once resolved against the testdata manifest.
#[allow(clippy::too_many_arguments)]
pub async fn compile_program(
    language_name: &str,
    source: &str,
    compile_options: &[String],
    extra_sources: &BTreeMap<String, Vec<u8>>,
    cache: &CompileCache,
    scheduler: &Scheduler,
    sandboxes_dir: PathBuf,
    runner: Arc<dyn SandboxRunner>,
    max_binary_size: u64,
) -> Result<CompileResult, Error> {
    let lang = LanguageRegistry::from_name(language_name)
        .ok_or_else(|| anyhow!("Unknown language {language_name:?}"))?;

    if !lang.need_compilation() {
        // Interpreted language: nothing to cache, just stage the source under its own directory
        // so it has the same shape (`binary_dir` containing the executable) the runners expect.
        let dir = sandboxes_dir.join("scripts").join(uuid::Uuid::new_v4().to_string());
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let source_name = format!("source.{}", lang.extensions().first().copied().unwrap_or("src"));
        std::fs::write(dir.join(&source_name), source)
            .with_context(|| format!("Failed to write source into {}", dir.display()))?;
        for (name, bytes) in extra_sources {
            std::fs::write(dir.join(name), bytes)
                .with_context(|| format!("Failed to write extra source {name} into {}", dir.display()))?;
        }
        let run_spec = lang.run(&lang.executable_name(&source_name))?;
        let source_file = dir.join(&source_name);
        return Ok(CompileResult {
            program: CompiledProgram {
                affinity: run_spec.affinity,
                argv_prefix: run_spec.argv_prefix,
                binary_dir: dir,
                source_file: Some(source_file),
            },
            success: true,
            message: String::new(),
        });
    }

    let extra_keys: BTreeMap<PathBuf, oj_worker_store::FileStoreKey> = extra_sources
        .iter()
        .map(|(name, bytes)| (PathBuf::from(name), oj_worker_store::FileStoreKey::from_bytes(bytes)))
        .collect();
    let task = CompileTask {
        language: lang.name().to_string(),
        source: source.to_string(),
        compile_options: compile_options.to_vec(),
        extra_sources: extra_keys,
    };

    let extra_sources = extra_sources.clone();
    let compile_options = compile_options.to_vec();
    let source = source.to_string();
    let compile_runner = runner.clone();
    let outcome = cache
        .compile(&task, max_binary_size, || {
            run_compile(lang, source, compile_options, extra_sources, scheduler, sandboxes_dir, compile_runner)
        })
        .await?;

    match outcome {
        CompileOutcome::Success(handle) => {
            let run_spec = lang.run(&lang.executable_name("binary"))?;
            let ext = lang.extensions().first().copied().unwrap_or("src");
            let source_file = handle.binary_dir.join(format!("source.{ext}"));
            Ok(CompileResult {
                program: CompiledProgram {
                    affinity: run_spec.affinity,
                    argv_prefix: run_spec.argv_prefix,
                    binary_dir: handle.binary_dir,
                    source_file: Some(source_file),
                },
                success: true,
                message: handle.extra_info.clone().unwrap_or_default(),
            })
        }
        CompileOutcome::Failure { message } => Ok(CompileResult {
            program: CompiledProgram {
                affinity: oj_worker_dag::Affinity::InlineScript(String::new()),
                argv_prefix: vec![],
                binary_dir: PathBuf::new(),
                source_file: None,
            },
            success: false,
            message,
        }),
    }
}

async fn run_compile(
    lang: &'static dyn Language,
    source: String,
    compile_options: Vec<String>,
    extra_sources: BTreeMap<String, Vec<u8>>,
    scheduler: &Scheduler,
    sandboxes_dir: PathBuf,
    runner: Arc<dyn SandboxRunner>,
) -> Result<RawCompileRun, Error> {
    scheduler
        .run_queued(move |workdir, _disposer| async move {
            let ext = lang.extensions().first().copied().unwrap_or("src");
            let source_name = format!("source.{ext}");
            std::fs::write(workdir.join(&source_name), &source)
                .with_context(|| format!("Failed to write {}", workdir.join(&source_name).display()))?;
            for (name, bytes) in &extra_sources {
                std::fs::write(workdir.join(name), bytes)
                    .with_context(|| format!("Failed to write extra source {name}"))?;
            }

            let binary_name = "binary";
            let mut compile_spec = lang.compile(&source_name, binary_name)?;
            for name in extra_sources.keys() {
                lang.add_compile_file(&mut compile_spec.argv, &PathBuf::from(name));
            }
            compile_spec.argv.extend(compile_options.iter().cloned());

            let mut params = SandboxParams::new(
                compile_spec.affinity,
                PathBuf::from("/sandbox/working"),
                CpuAffinityTarget::Compiler,
            );
            params.argv = compile_spec.argv;
            params.mounts = vec![oj_worker_dag::BindMount {
                outside: workdir.clone(),
                inside: PathBuf::from("/sandbox/working"),
                read_only: false,
            }];
            params.stdin = Redirect::Null;
            params.stdout = Redirect::File(workdir.join("message.txt"));
            params.stderr = Redirect::File(workdir.join("message.txt"));
            params.limits = oj_worker_dag::ExecutionLimits::new(20_000, 1 << 30);

            let sandbox = Sandbox::new(&sandboxes_dir, &params, None)?;
            let result = tokio::task::spawn_blocking(move || sandbox.run(runner.as_ref()))
                .await
                .context("compile sandbox task panicked")??;

            let message = std::fs::read_to_string(workdir.join("message.txt")).unwrap_or_default();
            if !result.status.is_ok() {
                return Ok(RawCompileRun {
                    sandbox_ok: false,
                    sandbox_status_message: format!("{:?}", result.status),
                    exit_code: result.exit_code,
                    message,
                    extra_info: None,
                    binary_dir: workdir.clone(),
                });
            }
            if result.exit_code == 0 && !workdir.join(binary_name).exists() {
                bail!("Compiler reported success but produced no binary");
            }
            Ok(RawCompileRun {
                sandbox_ok: true,
                sandbox_status_message: String::new(),
                exit_code: result.exit_code,
                message,
                extra_info: None,
                binary_dir: workdir.clone(),
            })
        })
        .await
        .context("task-slot scheduler closed")?
}
