use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use clap_complete::Shell;
use std::path::Path;

#[test]
fn cli_parse_serve_default_config() {
    match parse(&["jobmirror", "serve"]) {
        CliCommand::Serve { config } => assert!(config.is_none()),
        _ => panic!("expected Serve"),
    }
}

#[test]
fn cli_parse_serve_with_config() {
    match parse(&["jobmirror", "serve", "--config", "/etc/jobmirror.toml"]) {
        CliCommand::Serve { config } => {
            assert_eq!(config.as_deref(), Some(Path::new("/etc/jobmirror.toml")))
        }
        _ => panic!("expected Serve with --config"),
    }
}

#[test]
fn cli_parse_status() {
    match parse(&["jobmirror", "status"]) {
        CliCommand::Status { config } => assert!(config.is_none()),
        _ => panic!("expected Status"),
    }
}

#[test]
fn cli_parse_fetch_keeps_spaces() {
    match parse(&["jobmirror", "fetch", "Benchy v2.gcode"]) {
        CliCommand::Fetch { name, config } => {
            assert_eq!(name, "Benchy v2.gcode");
            assert!(config.is_none());
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_requires_name() {
    assert!(Cli::try_parse_from(["jobmirror", "fetch"]).is_err());
}

#[test]
fn cli_parse_completions() {
    match parse(&["jobmirror", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["jobmirror", "add", "x"]).is_err());
}
