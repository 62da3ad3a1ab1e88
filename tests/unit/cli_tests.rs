//! Unit tests for CLI argument parsing and validation

use clap::Parser;
use datasnap::cli::{Cli, Commands, OutputFormat};
use std::path::PathBuf;

#[test]
fn test_cli_init_command() {
    let cli = Cli::try_parse_from(["datasnap", "init"]).unwrap();
    match cli.command {
        Commands::Init { force, peername } => {
            assert!(!force);
            assert!(peername.is_none());
        }
        _ => panic!("Expected Init command"),
    }
}

#[test]
fn test_cli_init_with_peername() {
    let cli = Cli::try_parse_from(["datasnap", "init", "--force", "--peername", "cassie"]).unwrap();
    match cli.command {
        Commands::Init { force, peername } => {
            assert!(force);
            assert_eq!(peername.as_deref(), Some("cassie"));
        }
        _ => panic!("Expected Init command"),
    }
}

#[test]
fn test_cli_save_defaults() {
    let cli = Cli::try_parse_from(["datasnap", "save", "cities", "--body", "cities.csv"]).unwrap();
    match cli.command {
        Commands::Save {
            name,
            body,
            dir,
            meta,
            title,
            force,
            pin,
            batch_size,
            quiet,
            ..
        } => {
            assert_eq!(name, "cities");
            assert_eq!(body, Some(PathBuf::from("cities.csv")));
            assert!(dir.is_none());
            assert!(meta.is_none());
            assert!(title.is_none());
            assert!(!force);
            assert!(!pin);
            assert!(batch_size.is_none());
            assert!(!quiet);
        }
        _ => panic!("Expected Save command"),
    }
}

#[test]
fn test_cli_save_all_components() {
    let cli = Cli::try_parse_from([
        "datasnap",
        "save",
        "cities",
        "--meta",
        "meta.json",
        "--structure",
        "structure.json",
        "--readme",
        "readme.md",
        "--title",
        "t",
        "--message",
        "m",
        "--pin",
        "--batch-size",
        "100",
    ])
    .unwrap();
    match cli.command {
        Commands::Save {
            meta,
            structure,
            readme,
            title,
            message,
            pin,
            batch_size,
            ..
        } => {
            assert_eq!(meta, Some(PathBuf::from("meta.json")));
            assert_eq!(structure, Some(PathBuf::from("structure.json")));
            assert_eq!(readme, Some(PathBuf::from("readme.md")));
            assert_eq!(title.as_deref(), Some("t"));
            assert_eq!(message.as_deref(), Some("m"));
            assert!(pin);
            assert_eq!(batch_size, Some(100));
        }
        _ => panic!("Expected Save command"),
    }
}

#[test]
fn test_cli_save_rejects_zero_batch_size() {
    assert!(Cli::try_parse_from(["datasnap", "save", "c", "--batch-size", "0"]).is_err());
}

#[test]
fn test_cli_save_body_conflicts_with_dir() {
    assert!(Cli::try_parse_from(["datasnap", "save", "c", "--body", "a.csv", "--dir", "d"]).is_err());
}

#[test]
fn test_cli_log_command() {
    let cli = Cli::try_parse_from(["datasnap", "log", "cities", "--limit", "3"]).unwrap();
    match cli.command {
        Commands::Log { name, limit, format } => {
            assert_eq!(name, "cities");
            assert_eq!(limit, Some(3));
            assert_eq!(format, "pretty");
        }
        _ => panic!("Expected Log command"),
    }
}

#[test]
fn test_cli_show_and_export() {
    let cli = Cli::try_parse_from(["datasnap", "show", "cities@/fs/abc", "--format", "json"]).unwrap();
    match cli.command {
        Commands::Show { reference, format } => {
            assert_eq!(reference, "cities@/fs/abc");
            assert_eq!(OutputFormat::parse(&format), Ok(OutputFormat::Json));
        }
        _ => panic!("Expected Show command"),
    }

    let cli = Cli::try_parse_from(["datasnap", "export", "cities"]).unwrap();
    match cli.command {
        Commands::Export { reference, output } => {
            assert_eq!(reference, "cities");
            assert_eq!(output, PathBuf::from("."));
        }
        _ => panic!("Expected Export command"),
    }
}

#[test]
fn test_cli_global_flags() {
    let cli = Cli::try_parse_from(["datasnap", "list", "--verbose", "--workspace", "/tmp/ws"]).unwrap();
    assert!(cli.verbose);
    assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/ws")));
}

#[test]
fn test_cli_requires_subcommand() {
    assert!(Cli::try_parse_from(["datasnap"]).is_err());
    assert!(Cli::try_parse_from(["datasnap", "snapshot"]).is_err());
}
