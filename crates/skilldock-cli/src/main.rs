//! Skilldock CLI binary entry point.

mod cli;
mod errors;

use std::path::PathBuf;

use clap::Parser;
use skilldock_core::discovery::{descriptor_from_candidate, scan_roots};
use skilldock_core::{
    ExecutionPolicy, PromptFormat, Result, SkillDescriptor, SkilldockError, SkillsRepository,
};

use cli::{Cli, Commands, ListArgs, PromptArgs, RunArgs, ValidateArgs};
use errors::exit_code_for;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::List(args) => handle_list(args),
        Commands::Prompt(args) => handle_prompt(args),
        Commands::Validate(args) => handle_validate(args),
        Commands::Run(args) => handle_run(args),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("Error: {error}");
            std::process::exit(exit_code_for(&error));
        }
    }
}

fn build_repository(roots: Vec<PathBuf>, cache_dir: Option<PathBuf>) -> SkillsRepository {
    let mut repo = SkillsRepository::new(roots);
    if let Some(cache_dir) = cache_dir {
        repo = repo.with_cache_dir(&cache_dir);
    }
    repo
}

fn handle_list(args: ListArgs) -> Result<i32> {
    let repo = build_repository(args.roots, args.cache_dir);
    let skills = repo.refresh()?;

    if skills.is_empty() {
        println!("No skills found.");
        return Ok(0);
    }

    println!("Found {} skill(s):\n", skills.len());
    for skill in &skills {
        print!("{}", format_skill_entry(skill));
    }
    Ok(0)
}

fn format_skill_entry(skill: &SkillDescriptor) -> String {
    let mut entry = format!(
        "  {}\n    Description: {}\n    Location: {}\n",
        skill.name,
        skill.description,
        skill.path.display()
    );
    if let Some(license) = &skill.license {
        entry.push_str(&format!("    License: {license}\n"));
    }
    if !skill.allowed_tools.is_empty() {
        entry.push_str(&format!("    Tools: {}\n", skill.allowed_tools.join(", ")));
    }
    entry.push('\n');
    entry
}

fn handle_prompt(args: PromptArgs) -> Result<i32> {
    let format: PromptFormat = args.format.parse()?;
    let repo = build_repository(args.roots, args.cache_dir);
    repo.refresh()?;
    println!("{}", repo.to_prompt(format, args.include_location));
    Ok(0)
}

fn handle_validate(args: ValidateArgs) -> Result<i32> {
    let (candidates, issues) = scan_roots(&args.roots);
    let mut failures = issues.len();

    for issue in &issues {
        eprintln!("error {}: {}", issue.path.display(), issue.message);
    }
    for candidate in &candidates {
        match descriptor_from_candidate(candidate) {
            Ok(descriptor) => println!("ok {} ({})", descriptor.name, candidate.dir.display()),
            Err(error) => {
                failures += 1;
                eprintln!("error {}: {error}", candidate.dir.display());
            }
        }
    }

    if candidates.is_empty() && issues.is_empty() {
        println!("No skills found.");
    }
    Ok(if failures == 0 { 0 } else { 1 })
}

fn handle_run(args: RunArgs) -> Result<i32> {
    let mut allow_skills = args.allow_skill;
    allow_skills.push(args.skill.clone());
    let allow_globs = if args.allow_glob.is_empty() {
        vec![args.script.clone()]
    } else {
        args.allow_glob
    };

    let mut policy = ExecutionPolicy::allowing(allow_skills, allow_globs);
    if let Some(timeout) = args.timeout {
        policy.timeout_s_default = policy.timeout_s_default.max(timeout);
    }

    let repo = build_repository(args.roots, None).with_execution_policy(policy);
    repo.refresh()?;

    let handle = repo.open(&args.skill)?;
    let manager = skilldock_core::SessionManager::new();
    let session_id = manager.create(Some(&args.skill));
    let result = manager.with_session(&session_id, |session| {
        handle.run_script(
            session,
            &args.script,
            &args.args,
            args.stdin.as_deref().map(str::as_bytes),
            args.timeout,
        )
    })?;

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);

    if result.timed_out() {
        return Err(SkilldockError::ScriptTimeout {
            timeout_s: args.timeout.unwrap_or(60),
        });
    }
    if result.exit_code != 0 {
        return Err(SkilldockError::ScriptFailed {
            exit_code: result.exit_code,
        });
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;

    fn descriptor() -> SkillDescriptor {
        SkillDescriptor {
            name: "demo".to_string(),
            description: "A demo".to_string(),
            path: PathBuf::from("/skills/demo"),
            license: Some("MIT".to_string()),
            compatibility: Map::new(),
            metadata: Map::new(),
            allowed_tools: vec!["bash".to_string()],
            hash: String::new(),
            mtime: Utc::now(),
        }
    }

    #[test]
    fn skill_entries_print_name_description_and_location() {
        let entry = format_skill_entry(&descriptor());
        assert!(entry.contains("demo"));
        assert!(entry.contains("Description: A demo"));
        assert!(entry.contains("Location: /skills/demo"));
        assert!(entry.contains("License: MIT"));
        assert!(entry.contains("Tools: bash"));
    }

    #[test]
    fn cli_parses_a_run_invocation() {
        let cli = Cli::parse_from([
            "skilldock",
            "run",
            "demo",
            "scripts/x.sh",
            "--roots",
            "./skills",
            "--args",
            "--input",
            "--args",
            "data.csv",
            "--timeout",
            "30",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.skill, "demo");
                assert_eq!(args.script, "scripts/x.sh");
                assert_eq!(args.args, vec!["--input", "data.csv"]);
                assert_eq!(args.timeout, Some(30));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_prompt_with_unknown_format() {
        let result = Cli::try_parse_from([
            "skilldock",
            "prompt",
            "--roots",
            "./skills",
            "--format",
            "yaml",
        ]);
        assert!(result.is_err());
    }
}
