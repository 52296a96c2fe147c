use std::process;

use anyhow::Result;
use clap::{ArgMatches, Command};

const BIN_NAME: &str = "batchren";

fn main() -> Result<()> {
    let args = clap::command!()
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(Command::new("install").about("Install the batchren binary locally"))
        .subcommand(
            Command::new("run")
                .about("Build and run batchren with arguments")
                .trailing_var_arg(true)
                .allow_hyphen_values(true)
                .arg(
                    clap::Arg::new("args")
                        .help("Arguments to pass to batchren")
                        .action(clap::ArgAction::Append)
                        .num_args(0..),
                ),
        )
        .subcommand(
            Command::new("test")
                .about("Test Operations")
                .subcommand(Command::new("all").about("Run every test suite in the workspace"))
                .subcommand(Command::new("core").about("Run tests for batchren-core"))
                .subcommand(Command::new("bin").about("Run tests for batchren-bin")),
        )
        .get_matches();

    match args.subcommand() {
        Some(("install", _args)) => install(),
        Some(("run", args)) => run(args),
        Some(("test", args)) => handle_test_commands(args),
        Some((command, _)) => anyhow::bail!("Unexpected command: {command}"),
        None => anyhow::bail!("Expected subcommand"),
    }
}

fn cargo(args: &[&str], failure: &str) -> Result<()> {
    let status = process::Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("{failure}");
    }
    Ok(())
}

fn install() -> Result<()> {
    println!("Installing {BIN_NAME}...");
    cargo(&["install", "--path", "crates/batchren-bin"], "Failed to install batchren")?;
    println!("✓ {BIN_NAME} installed successfully");
    Ok(())
}

fn run(args: &ArgMatches) -> Result<()> {
    println!("Building and running {BIN_NAME}...");

    let run_args: Vec<&str> = args
        .get_many::<String>("args")
        .map_or(Vec::new(), |vals| vals.map(String::as_str).collect());

    let mut command = vec!["run", "--bin", BIN_NAME, "--"];
    command.extend(run_args);
    cargo(&command, "Failed to run batchren")
}

fn handle_test_commands(args: &ArgMatches) -> Result<()> {
    match args.subcommand() {
        Some(("all", _args)) => test_all(),
        Some(("core", _args)) => cargo(&["test", "--package", "batchren-core"], "Core tests failed"),
        Some(("bin", _args)) => cargo(&["test", "--package", "batchren-bin"], "Binary tests failed"),
        _ => {
            println!("Available test commands:");
            println!("  all   - Run every test suite in the workspace");
            println!("  core  - Run tests for batchren-core");
            println!("  bin   - Run tests for batchren-bin");
            Ok(())
        }
    }
}

fn test_all() -> Result<()> {
    println!("🧪 Running all tests for batchren...\n");

    let suites: [(&str, &[&str]); 4] = [
        ("📚 batchren-core", &["test", "--package", "batchren-core"]),
        ("🔧 batchren-bin", &["test", "--package", "batchren-bin"]),
        ("🏗️  workspace", &["test", "--workspace"]),
        ("📖 documentation", &["test", "--doc", "--package", "batchren-core"]),
    ];

    let mut failed = Vec::new();
    for (label, args) in suites {
        println!("{label} tests...");
        match cargo(args, "tests failed") {
            Ok(()) => println!("✅ passed\n"),
            Err(err) => {
                println!("❌ {err}\n");
                failed.push(label);
            }
        }
    }

    if failed.is_empty() {
        println!("🎉 All tests passed successfully!");
        Ok(())
    } else {
        anyhow::bail!("Test suite failed: {}", failed.join(", "))
    }
}
