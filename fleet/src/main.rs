use clap::{Parser, Subcommand};
use fleet::compare::DEFAULT_TARGET_PATTERN;
use fleet::manifest::DEFAULT_MANIFEST;
use fleet::prelude::*;
use fleet::steps::autograding::DEFAULT_LINT_MAX;
use fleet::steps::requirements::{parse_pin, PackageSpec};
use hosting::{GitHubConfig, GitHubProvider, GitHubToken};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleet")]
#[command(about = "Batch maintenance for fleets of GitHub classroom template repositories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone every repository in the manifest and apply its steps on each branch
    Run {
        /// Batch manifest
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
        /// Apply steps and report changes without committing or pushing
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare templates with their deployed classroom copies and update the copies
    Compare {
        /// Organization holding the templates (defaults to the manifest's)
        #[arg(long)]
        source_org: Option<String>,
        /// Organization holding the deployed copies
        #[arg(long)]
        target_org: String,
        /// Name of the deployed copy; `{org}` is the target org, `{repo}` the template name
        #[arg(long, default_value = DEFAULT_TARGET_PATTERN)]
        pattern: String,
        /// Only log differences
        #[arg(long)]
        report_only: bool,
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Transfer the manifest's repositories to another owner
    Transfer {
        #[arg(long)]
        new_owner: String,
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Delete the manifest's repositories
    Delete {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Mark the manifest's repositories as templates
    MakeTemplate {
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// Delete and recreate the manifest's repositories, pushing their branches back
    Recreate {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
        #[arg(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },
    /// List an organization's repositories as a manifest-ready list
    List {
        #[arg(long)]
        org: String,
        /// Keep only names containing this text
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Convert a local checkout from classroom autograding to unittests.json/lint.json
    Convert {
        dir: PathBuf,
        #[arg(long, default_value = "templates_for_repo_converter")]
        template_dir: PathBuf,
        #[arg(long, default_value_t = DEFAULT_LINT_MAX)]
        lint_max: u32,
    },
    /// Edit requirements.txt in a local checkout
    Requirements {
        dir: PathBuf,
        /// Package pin to add or update, as name==version
        #[arg(long = "add")]
        add: Vec<String>,
        /// Package to remove
        #[arg(long = "remove")]
        remove: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    hosting::load_env_file();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            manifest,
            dry_run,
            json,
        } => {
            run_batch(&manifest, dry_run, json).await?;
        }
        Commands::Compare {
            source_org,
            target_org,
            pattern,
            report_only,
            manifest,
        } => {
            run_compare(&manifest, source_org, target_org, pattern, report_only).await?;
        }
        Commands::Transfer {
            new_owner,
            manifest,
        } => {
            run_action(&manifest, HostingAction::Transfer { new_owner }).await?;
        }
        Commands::Delete { yes, manifest } => {
            require_confirmation(yes, "delete")?;
            run_action(&manifest, HostingAction::Delete).await?;
        }
        Commands::MakeTemplate { manifest } => {
            run_action(&manifest, HostingAction::MakeTemplate).await?;
        }
        Commands::Recreate { yes, manifest } => {
            require_confirmation(yes, "recreate")?;
            run_recreate(&manifest).await?;
        }
        Commands::List { org, filter } => {
            run_list(&org, filter.as_deref()).await?;
        }
        Commands::Convert {
            dir,
            template_dir,
            lint_max,
        } => {
            let step = ConvertRepository::new(template_dir).with_lint_max(lint_max);
            let touched = step.apply(&dir)?;
            println!("✓ Converted {} ({} paths written or removed)", dir.display(), touched);
        }
        Commands::Requirements { dir, add, remove } => {
            let mut pins = PackageSpec::new();
            for value in &add {
                let (name, version) = parse_pin(value)?;
                pins.insert(name, version);
            }
            let step = RequirementsStep::new(pins, remove);
            if step.apply(&dir)? > 0 {
                println!("✓ Updated {}", dir.join("requirements.txt").display());
            } else {
                println!("requirements.txt already up to date");
            }
        }
    }

    Ok(())
}

fn require_confirmation(yes: bool, command: &str) -> Result<(), Box<dyn std::error::Error>> {
    if yes {
        Ok(())
    } else {
        Err(format!(
            "'{}' deletes repositories on the hosting service; pass --yes to confirm",
            command
        )
        .into())
    }
}

/// The token is read before any network call so a missing credential fails
/// the command up front.
fn github_access() -> Result<(GitHubConfig, GitHubToken), Box<dyn std::error::Error>> {
    let config = GitHubConfig::from_env();
    config.validate()?;
    let token = GitHubToken::from_env()?;
    Ok((config, token))
}

fn git_cli(config: &GitHubConfig, token: GitHubToken) -> GitCli {
    GitCli::new(config.git_host.clone(), Some(token))
}

async fn run_batch(
    manifest_path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = BatchManifest::load(manifest_path)?;
    let (config, token) = github_access()?;

    let driver_config = manifest.driver_config(dry_run);
    driver_config.validate()?;

    let pipeline = manifest.build_pipeline();
    info!(steps = ?pipeline.descriptions(), "pipeline ready");

    let driver = BatchDriver::new(Box::new(git_cli(&config, token)), pipeline, driver_config);
    let report = driver.run(&manifest.repository_refs()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_batch_report(&report);
    }
    Ok(())
}

fn describe_branch(outcome: &BranchOutcome) -> String {
    match outcome {
        BranchOutcome::Committed { pushed: true } => "committed and pushed".to_string(),
        BranchOutcome::Committed { pushed: false } => {
            "committed locally (branch missing on remote)".to_string()
        }
        BranchOutcome::Unchanged => "unchanged".to_string(),
        BranchOutcome::PendingChanges => "would commit".to_string(),
        BranchOutcome::CheckoutFailed { reason } => format!("checkout failed: {}", reason),
        BranchOutcome::Failed { reason } => format!("failed: {}", reason),
    }
}

fn print_batch_report(report: &BatchReport) {
    println!("\n--- Batch Report ---");
    for repo in &report.repositories {
        let mark = if repo.is_success() { "✓" } else { "✗" };
        match &repo.outcome {
            RepositoryOutcome::Processed => println!("{} {}", mark, repo.repository),
            RepositoryOutcome::InvalidName { reason } => {
                println!("{} {}: {}", mark, repo.repository, reason)
            }
            RepositoryOutcome::CloneFailed { reason } => {
                println!("{} {}: clone failed: {}", mark, repo.repository, reason)
            }
            RepositoryOutcome::Halted { branch, reason } => {
                println!("{} {}: halted on {}: {}", mark, repo.repository, branch, reason)
            }
        }
        for branch in &repo.branches {
            println!("    {}: {}", branch.branch, describe_branch(&branch.outcome));
            for skipped in &branch.steps.skipped {
                println!("      skipped {}: {}", skipped.step, skipped.reason);
            }
        }
    }
    println!(
        "\nRepositories: {} ok, {} with errors. Commits: {}, pushed: {}.{}",
        report.succeeded(),
        report.failed(),
        report.commits(),
        report.pushes(),
        if report.dry_run { " (dry run)" } else { "" }
    );
    println!("Elapsed: {}s", report.elapsed().num_seconds());
}

async fn run_compare(
    manifest_path: &Path,
    source_org: Option<String>,
    target_org: String,
    pattern: String,
    report_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = BatchManifest::load(manifest_path)?;
    let (config, token) = github_access()?;

    let mut compare_config = CompareConfig::new(
        source_org.unwrap_or_else(|| manifest.organization.clone()),
        target_org,
    )
    .with_pattern(pattern)
    .with_branches(manifest.branches.iter().cloned())
    .with_workdir(manifest.workdir_path())
    .with_report_only(report_only);
    if let Some(message) = &manifest.commit_message {
        compare_config = compare_config.with_commit_message(message.clone());
    }
    compare_config.validate()?;

    let runner = TemplateComparison::new(Box::new(git_cli(&config, token)), compare_config);
    let reports = runner.run(&manifest.repositories).await;

    println!("\n--- Comparison Report ---");
    for report in &reports {
        println!("{} -> {}", report.source, report.target);
        if let Some(error) = &report.error {
            println!("    ✗ {}", error);
        }
        for branch in &report.branches {
            let summary = match &branch.outcome {
                ComparisonOutcome::Identical => "identical".to_string(),
                ComparisonOutcome::Differs { diff } => format!("{} paths differ", diff.len()),
                ComparisonOutcome::Updated { diff, result } => {
                    format!("{} paths differed, {}", diff.len(), describe_branch(result))
                }
                ComparisonOutcome::CheckoutFailed { reason } => {
                    format!("checkout failed: {}", reason)
                }
                ComparisonOutcome::Failed { reason } => format!("failed: {}", reason),
            };
            println!("    {}: {}", branch.branch, summary);
        }
    }
    Ok(())
}

fn print_action_report(action: &str, report: &ActionReport) {
    for repo in &report.succeeded {
        println!("✓ {} {}", action, repo);
    }
    for (repo, reason) in &report.failed {
        println!("✗ {} {}: {}", action, repo, reason);
    }
    println!(
        "\n{} succeeded, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
}

async fn run_action(
    manifest_path: &Path,
    action: HostingAction,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = BatchManifest::load(manifest_path)?;
    let (config, token) = github_access()?;
    let provider = GitHubProvider::new(config, token)?;

    let report = apply_to_all(&provider, &action, &manifest.repository_refs()).await;
    print_action_report(&action.describe(), &report);
    Ok(())
}

async fn run_recreate(manifest_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = BatchManifest::load(manifest_path)?;
    if manifest.branches.is_empty() {
        return Err(format!(
            "{} lists no branches; recreate would delete every repository without restoring anything",
            manifest_path.display()
        )
        .into());
    }
    let (config, token) = github_access()?;
    let git = git_cli(&config, token.clone());
    let provider = GitHubProvider::new(config, token)?;

    let recreate = Recreate::new(
        &git,
        &provider,
        manifest.workdir_path(),
        manifest.branches.clone(),
    );
    let report = recreate.run(&manifest.repository_refs()).await;
    print_action_report("recreate", &report);
    Ok(())
}

async fn run_list(org: &str, filter: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let (config, token) = github_access()?;
    let provider = GitHubProvider::new(config, token)?;

    let names = list_matching(&provider, org, filter).await?;
    if names.is_empty() {
        println!("No repositories found");
    } else {
        println!("Found repositories:");
        print!("{}", format_name_list(&names));
    }
    Ok(())
}
