//! `coverscope clean` command

use anyhow::Result;

use coverscope::core::workspace::workspace_dir_name;
use coverscope::util::fs::remove_dir_all_if_exists;

use crate::cli::CleanArgs;
use crate::commands::current_dir;

pub fn execute(args: CleanArgs) -> Result<()> {
    let cwd = current_dir()?;
    let project = match args.path {
        Some(path) => cwd.join(path),
        None => cwd,
    };

    let workspace = std::env::temp_dir().join(workspace_dir_name(&project));
    remove_dir_all_if_exists(&workspace)?;
    eprintln!("       Removed {}", workspace.display());

    Ok(())
}
