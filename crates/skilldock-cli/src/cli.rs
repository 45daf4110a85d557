//! CLI argument definitions for Skilldock.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Skilldock CLI
#[derive(Parser, Debug)]
#[command(name = "skilldock", version, about = "Skilldock agent skills runtime CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all discovered skills
    List(ListArgs),
    /// Render the skill catalog for an agent prompt
    Prompt(PromptArgs),
    /// Check SKILL.md structure and frontmatter for every skill
    Validate(ValidateArgs),
    /// Execute a script from a skill's scripts/ directory
    Run(RunArgs),
}

/// Arguments for `skilldock list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Root directory to scan for skills (repeatable)
    #[arg(long, required = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Directory for the skills metadata cache
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for `skilldock prompt`.
#[derive(Parser, Debug)]
pub struct PromptArgs {
    /// Root directory to scan for skills (repeatable)
    #[arg(long, required = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Output format
    #[arg(long, default_value = "claude_xml", value_parser = ["claude_xml", "json"])]
    pub format: String,

    /// Include filesystem paths in the output
    #[arg(long)]
    pub include_location: bool,

    /// Directory for the skills metadata cache
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for `skilldock validate`.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Root directory to scan for skills (repeatable)
    #[arg(long, required = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,
}

/// Arguments for `skilldock run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Name of the skill
    pub skill: String,

    /// Script path relative to the skill directory (e.g. scripts/process.py)
    pub script: String,

    /// Root directory to scan for skills (repeatable)
    #[arg(long, required = true, value_name = "DIR")]
    pub roots: Vec<PathBuf>,

    /// Script argument (repeatable)
    #[arg(long = "args", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Standard input passed to the script
    #[arg(long)]
    pub stdin: Option<String>,

    /// Timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Additional skill allowed to execute (the named skill is always allowed)
    #[arg(long = "allow-skill", value_name = "NAME")]
    pub allow_skill: Vec<String>,

    /// Script glob to allow (defaults to exactly the requested script)
    #[arg(long = "allow-glob", value_name = "GLOB")]
    pub allow_glob: Vec<String>,
}
