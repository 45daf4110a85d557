//! Policy gate and environment preparation for script execution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::{Result, SkilldockError};
use crate::exec::local::LocalProcessSandbox;
use crate::exec::sandbox::{Sandbox, SpawnSpec};
use crate::model::ExecutionResult;
use crate::policy::{ExecutionPolicy, WorkdirMode};
use crate::resources::PathResolver;

/// Skill subtrees staged into a tempdir workdir.
const STAGED_SUBDIRS: [&str; 3] = ["references", "assets", "scripts"];

/// Orchestrates pre-execution checks and delegates the actual run to a
/// [`Sandbox`] backend.
///
/// Check order is fixed: execution enabled, skill allowlist, script glob,
/// path resolution, regular-file check. The glob is matched against the
/// caller's original relative path, before any workdir staging.
pub struct ScriptRunner {
    policy: ExecutionPolicy,
    sandbox: Arc<dyn Sandbox>,
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|error| {
                SkilldockError::InvalidArgument(format!("bad script glob '{pattern}': {error}"))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|error| SkilldockError::InvalidArgument(format!("bad script globs: {error}")))
}

#[cfg(unix)]
fn has_executable_bit(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn has_executable_bit(_path: &Path) -> bool {
    true
}

#[cfg(not(unix))]
fn copy_directory_recursive(source: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let source_path = entry.path();
        let target_path = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() || (source_path.is_dir() && entry.file_type()?.is_symlink()) {
            copy_directory_recursive(&source_path, &target_path)?;
        } else {
            std::fs::copy(&source_path, &target_path)?;
        }
    }
    Ok(())
}

/// Stage `references/`, `assets/`, and `scripts/` into a fresh directory,
/// by symlink where the platform allows and by copy otherwise.
fn stage_workdir(skill_root: &Path, staged: &Path) -> Result<()> {
    for subdir in STAGED_SUBDIRS {
        let source = skill_root.join(subdir);
        if !source.is_dir() {
            continue;
        }
        let target = staged.join(subdir);
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&source, &target)?;
        }
        #[cfg(not(unix))]
        {
            copy_directory_recursive(&source, &target)?;
        }
    }
    Ok(())
}

impl ScriptRunner {
    pub fn new(policy: ExecutionPolicy, sandbox: Arc<dyn Sandbox>) -> Self {
        Self { policy, sandbox }
    }

    pub fn with_local_sandbox(policy: ExecutionPolicy) -> Self {
        Self::new(policy, Arc::new(LocalProcessSandbox::new()))
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Resolve the interpreter invocation for a validated script path.
    fn dispatch(&self, script: &Path, args: &[String]) -> Result<(PathBuf, Vec<String>)> {
        let extension = script
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let script_str = script.to_string_lossy().into_owned();

        match extension.as_str() {
            "py" => {
                let mut full = vec![script_str];
                full.extend_from_slice(args);
                Ok((self.policy.python_interpreter.clone(), full))
            }
            "sh" => {
                let mut full = vec![script_str];
                full.extend_from_slice(args);
                Ok((PathBuf::from("/bin/sh"), full))
            }
            _ => {
                if !has_executable_bit(script) {
                    return Err(SkilldockError::PolicyViolation(format!(
                        "script '{}' has no interpreter mapping and is not executable",
                        script.display()
                    )));
                }
                Ok((script.to_path_buf(), args.to_vec()))
            }
        }
    }

    fn build_env(&self, skill_root: &Path, skill_name: &str) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for name in &self.policy.env_allowlist {
            if let Ok(value) = std::env::var(name) {
                env.insert(name.clone(), value);
            }
        }
        env.insert(
            "SKILL_ROOT".to_string(),
            skill_root.to_string_lossy().into_owned(),
        );
        env.insert("SKILL_NAME".to_string(), skill_name.to_string());
        env
    }

    /// Run `rel_path` inside the skill under full policy enforcement.
    pub fn run(
        &self,
        skill_root: &Path,
        skill_name: &str,
        rel_path: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout_s: Option<u64>,
    ) -> Result<ExecutionResult> {
        if !self.policy.enabled {
            return Err(SkilldockError::ScriptExecutionDisabled);
        }

        if !self.policy.allow_skills.contains(skill_name) {
            return Err(SkilldockError::PolicyViolation(format!(
                "skill '{skill_name}' is not in the execution allowlist"
            )));
        }

        let globs = build_glob_set(&self.policy.allow_scripts_glob)?;
        if !globs.is_match(Path::new(rel_path)) {
            return Err(SkilldockError::PolicyViolation(format!(
                "script path '{rel_path}' matches no allowed pattern"
            )));
        }

        let resolver = PathResolver::new(skill_root)?;
        let script = match resolver.resolve(rel_path) {
            Ok(script) => script,
            Err(SkilldockError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(SkilldockError::PolicyViolation(format!(
                    "script '{rel_path}' does not exist"
                )));
            }
            Err(error) => return Err(error),
        };
        let metadata = std::fs::metadata(&script)?;
        if !metadata.is_file() {
            return Err(SkilldockError::PolicyViolation(format!(
                "script path '{rel_path}' is not a regular file"
            )));
        }
        // Readability check up front; exec would fail later and less clearly.
        std::fs::File::open(&script)?;

        let (program, args) = self.dispatch(&script, args)?;
        let env = self.build_env(resolver.skill_root(), skill_name);

        let timeout_s = timeout_s
            .map(|caller| caller.min(self.policy.timeout_s_default))
            .unwrap_or(self.policy.timeout_s_default);

        // Held for the duration of the run in tempdir mode; dropping it
        // removes the staged directory whatever the outcome.
        let staged: Option<tempfile::TempDir>;
        let cwd = match self.policy.workdir_mode {
            WorkdirMode::SkillRoot => {
                staged = None;
                resolver.skill_root().to_path_buf()
            }
            WorkdirMode::Tempdir => {
                let dir = tempfile::tempdir()?;
                stage_workdir(resolver.skill_root(), dir.path())?;
                let path = dir.path().to_path_buf();
                staged = Some(dir);
                path
            }
        };

        let spec = SpawnSpec {
            program,
            args,
            cwd,
            env,
            stdin: stdin.map(<[u8]>::to_vec),
            timeout: Duration::from_secs(timeout_s),
            network_access: self.policy.network_access,
        };

        let result = self.sandbox.spawn(&spec);
        drop(staged);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn skill_with_script(script_name: &str, body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().expect("temp dir should be created");
        let skill = dir.path().join("demo");
        fs::create_dir_all(skill.join("scripts")).expect("scripts dir");
        fs::write(skill.join("SKILL.md"), "---\nname: demo\ndescription: d\n---\n").expect("skill");
        fs::write(skill.join("scripts").join(script_name), body).expect("script");
        (dir, skill)
    }

    fn open_policy() -> ExecutionPolicy {
        ExecutionPolicy::allowing(["demo"], ["scripts/*.sh"])
    }

    #[test]
    fn execution_disabled_fails_before_any_other_check() {
        let (_dir, skill) = skill_with_script("x.sh", "echo hi\n");
        let runner = ScriptRunner::with_local_sandbox(ExecutionPolicy::default());
        let error = runner
            .run(&skill, "demo", "scripts/x.sh", &[], None, None)
            .expect_err("disabled policy should refuse");
        assert_eq!(error.class_name(), "ScriptExecutionDisabledError");
    }

    #[test]
    fn a_skill_outside_the_allowlist_is_refused() {
        let (_dir, skill) = skill_with_script("x.sh", "echo hi\n");
        let policy = ExecutionPolicy::allowing(["other-skill"], ["scripts/*.sh"]);
        let runner = ScriptRunner::with_local_sandbox(policy);
        let error = runner
            .run(&skill, "demo", "scripts/x.sh", &[], None, None)
            .expect_err("non-allow-listed skill should refuse");
        assert_eq!(error.class_name(), "PolicyViolationError");
        assert!(error.to_string().contains("allowlist"), "{error}");
    }

    #[test]
    fn a_script_matching_no_glob_is_refused() {
        let (_dir, skill) = skill_with_script("x.sh", "echo hi\n");
        let policy = ExecutionPolicy::allowing(["demo"], ["scripts/*.py"]);
        let runner = ScriptRunner::with_local_sandbox(policy);
        let error = runner
            .run(&skill, "demo", "scripts/x.sh", &[], None, None)
            .expect_err("glob mismatch should refuse");
        assert!(error.to_string().contains("pattern"), "{error}");
    }

    #[test]
    fn single_star_does_not_cross_segments_but_double_star_does() {
        let globs = build_glob_set(&["scripts/*.sh".to_string()]).expect("globs");
        assert!(globs.is_match(Path::new("scripts/run.sh")));
        assert!(!globs.is_match(Path::new("scripts/nested/run.sh")));

        let deep = build_glob_set(&["scripts/**/*.sh".to_string()]).expect("globs");
        assert!(deep.is_match(Path::new("scripts/nested/run.sh")));
    }

    #[test]
    fn a_missing_script_is_a_policy_violation_not_an_io_error() {
        let (_dir, skill) = skill_with_script("x.sh", "echo hi\n");
        let runner = ScriptRunner::with_local_sandbox(open_policy());
        let error = runner
            .run(&skill, "demo", "scripts/absent.sh", &[], None, None)
            .expect_err("missing script should refuse");
        assert_eq!(error.class_name(), "PolicyViolationError");
        assert!(error.to_string().contains("does not exist"), "{error}");
    }

    #[test]
    fn traversal_in_the_script_path_is_refused() {
        let (_dir, skill) = skill_with_script("x.sh", "echo hi\n");
        let policy = ExecutionPolicy::allowing(["demo"], ["**"]);
        let runner = ScriptRunner::with_local_sandbox(policy);
        let error = runner
            .run(&skill, "demo", "../demo/scripts/x.sh", &[], None, None)
            .expect_err("traversal should refuse");
        assert_eq!(error.class_name(), "PathTraversalError");
    }

    #[cfg(unix)]
    #[test]
    fn a_shell_script_runs_via_sh_without_an_executable_bit() {
        let (_dir, skill) = skill_with_script("x.sh", "echo from-script\n");
        let runner = ScriptRunner::with_local_sandbox(open_policy());
        let result = runner
            .run(&skill, "demo", "scripts/x.sh", &[], None, None)
            .expect("script should run");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout.trim(), "from-script");
    }

    #[cfg(unix)]
    #[test]
    fn skill_root_and_name_are_injected_and_the_rest_is_filtered() {
        let (_dir, skill) = skill_with_script(
            "env.sh",
            "printf '%s|%s|%s' \"$SKILL_NAME\" \"${SKILL_ROOT:+set}\" \"${SKILLDOCK_TEST_LEAK:-absent}\"\n",
        );
        std::env::set_var("SKILLDOCK_TEST_LEAK", "leaked");
        let runner = ScriptRunner::with_local_sandbox(open_policy());
        let result = runner
            .run(&skill, "demo", "scripts/env.sh", &[], None, None)
            .expect("script should run");
        std::env::remove_var("SKILLDOCK_TEST_LEAK");
        assert_eq!(result.stdout, "demo|set|absent");
    }

    #[cfg(unix)]
    #[test]
    fn arguments_and_stdin_reach_the_script() {
        let (_dir, skill) = skill_with_script("io.sh", "printf '%s:' \"$1\"; cat\n");
        let runner = ScriptRunner::with_local_sandbox(open_policy());
        let result = runner
            .run(
                &skill,
                "demo",
                "scripts/io.sh",
                &["arg-one".to_string()],
                Some(b"stdin body"),
                None,
            )
            .expect("script should run");
        assert_eq!(result.stdout, "arg-one:stdin body");
    }

    #[cfg(unix)]
    #[test]
    fn the_caller_can_shorten_but_not_extend_the_deadline() {
        let (_dir, skill) = skill_with_script("sleep.sh", "sleep 5\n");
        let mut policy = open_policy();
        policy.timeout_s_default = 1;
        let runner = ScriptRunner::with_local_sandbox(policy);
        // Caller asks for 60s; policy default of 1s wins.
        let result = runner
            .run(&skill, "demo", "scripts/sleep.sh", &[], None, Some(60))
            .expect("run should complete with timeout result");
        assert!(result.timed_out());
        assert!(result.duration_ms >= 1_000);
    }

    #[cfg(unix)]
    #[test]
    fn tempdir_mode_stages_subtrees_and_runs_there() {
        let (_dir, skill) = skill_with_script("where.sh", "pwd; ls\n");
        fs::create_dir_all(skill.join("references")).expect("refs dir");
        fs::write(skill.join("references/doc.md"), "# doc\n").expect("ref");
        let mut policy = open_policy();
        policy.workdir_mode = WorkdirMode::Tempdir;
        let runner = ScriptRunner::with_local_sandbox(policy);

        let result = runner
            .run(&skill, "demo", "scripts/where.sh", &[], None, None)
            .expect("script should run");
        assert_eq!(result.exit_code, 0);
        let skill_str = skill.canonicalize().unwrap().to_string_lossy().into_owned();
        let first_line = result.stdout.lines().next().unwrap_or_default().to_string();
        assert_ne!(first_line, skill_str, "cwd must be the staging dir");
        assert!(result.stdout.contains("references"));
        assert!(result.stdout.contains("scripts"));
    }

    #[cfg(unix)]
    #[test]
    fn an_unmapped_extension_without_exec_bit_is_refused() {
        let (_dir, skill) = skill_with_script("tool.rb", "puts 'hi'\n");
        let policy = ExecutionPolicy::allowing(["demo"], ["scripts/*"]);
        let runner = ScriptRunner::with_local_sandbox(policy);
        let error = runner
            .run(&skill, "demo", "scripts/tool.rb", &[], None, None)
            .expect_err("unmapped non-executable should refuse");
        assert!(error.to_string().contains("not executable"), "{error}");
    }
}
