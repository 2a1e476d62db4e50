//! `testdeck scan`

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use testdeck_common::{AppConfig, TestScanner, TestType};

use crate::output::{print_list, OutputFormat};

#[derive(Args)]
pub struct ScanArgs {
    /// Directory to scan, defaults to the configured tests directory
    root: Option<PathBuf>,

    /// Only show tests of this type
    #[arg(short = 't', long = "type")]
    test_type: Option<String>,

    /// Also treat files with this suffix as tests (repeatable)
    #[arg(long = "match")]
    suffixes: Vec<String>,
}

pub fn execute(args: ScanArgs, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let root = args.root.unwrap_or_else(|| config.paths.tests_dir.clone());
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let wanted = match args.test_type.as_deref() {
        Some(name) => match TestType::from_name(name) {
            Some(t) => Some(t),
            None => bail!("Unknown test type: {}", name),
        },
        None => None,
    };

    let scanner = args
        .suffixes
        .into_iter()
        .fold(TestScanner::new(), |scanner, suffix| scanner.also_match(suffix));
    let mut tests = scanner.scan(&root);
    if let Some(wanted) = wanted {
        tests.retain(|t| t.test_type == wanted);
    }

    print_list(&tests, format);
    Ok(())
}
