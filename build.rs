//! Build script rendering the `gridop` manual pages.
//!
//! Writes `gridop.1` plus one `gridop-<subcommand>.1` page per subcommand
//! into the build output directory for packaging.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

fn render(command: Command, page: &str, dir: &Path) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).title(page.to_uppercase()).render(&mut buffer)?;
    fs::write(dir.join(format!("{page}.1")), buffer)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let root = cli::Cli::command();
    for sub in root.get_subcommands() {
        let page = format!("{}-{}", root.get_name(), sub.get_name());
        render(sub.clone(), &page, &out_dir)?;
    }
    let page = root.get_name().to_owned();
    render(root, &page, &out_dir)?;
    Ok(())
}
