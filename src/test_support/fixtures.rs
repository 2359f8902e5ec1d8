//! Test fixtures for common test scenarios.
//!
//! Package records in the shapes the lister reports for module, legacy and
//! standalone projects, plus helpers to lay small projects out on disk.

use std::path::{Path, PathBuf};

use crate::core::package::{ModuleInfo, Package};
use crate::test_support::MockProcessOutput;

/// Package of a manifest-rooted module.
pub fn module_package(
    import_path: &str,
    name: &str,
    dir: &Path,
    module_root: &Path,
    module_path: &str,
) -> Package {
    Package {
        dir: dir.to_path_buf(),
        import_path: import_path.to_string(),
        name: name.to_string(),
        root: Some(module_root.to_path_buf()),
        module: Some(ModuleInfo {
            path: module_path.to_string(),
            main: true,
            dir: module_root.to_path_buf(),
            go_mod: Some(module_root.join("go.mod")),
            ..Default::default()
        }),
        go_files: vec![format!("{}.go", name)],
        ..Default::default()
    }
}

/// Package of a legacy-flat project under the search-path entry `root`.
pub fn legacy_package(import_path: &str, name: &str, dir: &Path, root: &Path) -> Package {
    Package {
        dir: dir.to_path_buf(),
        import_path: import_path.to_string(),
        name: name.to_string(),
        root: Some(root.to_path_buf()),
        go_files: vec![format!("{}.go", name)],
        ..Default::default()
    }
}

/// Standard-library package.
pub fn standard_package(import_path: &str) -> Package {
    Package {
        dir: PathBuf::from("/usr/local/go/src").join(import_path),
        import_path: import_path.to_string(),
        name: import_path.rsplit('/').next().unwrap_or(import_path).to_string(),
        standard: true,
        go_files: vec!["doc.go".to_string()],
        ..Default::default()
    }
}

/// Lister output reporting `packages`, one JSON record each.
pub fn list_output<'a>(packages: impl IntoIterator<Item = &'a Package>) -> MockProcessOutput {
    let stdout: String = packages
        .into_iter()
        .map(|pkg| serde_json::to_string_pretty(pkg).unwrap() + "\n")
        .collect();
    MockProcessOutput::success(stdout)
}

/// Write `files` (relative path, contents) under `root`.
pub fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

/// Minimal entry-point source.
pub fn main_source() -> &'static str {
    "package main\n\nfunc main() {}\n"
}

/// Minimal module manifest.
pub fn go_mod(module_path: &str) -> String {
    format!("module {}\n\ngo 1.21\n", module_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::list::decode_packages;
    use crate::util::process::ProcessOutput;

    #[test]
    fn test_list_output_decodes_back() {
        let app = module_package(
            "example.com/app",
            "main",
            Path::new("/src/app"),
            Path::new("/src/app"),
            "example.com/app",
        );
        let fmt = standard_package("fmt");
        let output: ProcessOutput = list_output([&app, &fmt]).into();

        let graph = decode_packages(&output.stdout).unwrap();
        assert_eq!(graph["example.com/app"], app);
        assert!(graph["fmt"].standard);
    }

    #[test]
    fn test_write_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        write_files(tmp.path(), &[("go.mod", &go_mod("example.com/app")), ("main.go", main_source())]);

        assert!(tmp.path().join("go.mod").is_file());
        let text = std::fs::read_to_string(tmp.path().join("main.go")).unwrap();
        assert!(text.starts_with("package main"));
    }
}
