//! Mirroring a project into an isolated, buildable workspace.
//!
//! Manifest-rooted projects are copied as a single tree and keep resolving
//! dependencies through their manifest; local `replace` redirects are made
//! absolute because the mirror lives elsewhere on disk. Legacy-flat
//! projects need every dependency under the search path, so each package
//! and each dependency found under the original root is copied to
//! `<workspace>/src/<import path>`.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::manifest::{ModFile, MANIFEST_NAME};
use crate::core::package::{Package, PackageGraph};
use crate::core::workspace::{workspace_dir_name, Layout, Workspace, SEARCH_PATH_VAR, SOURCE_DIR};
use crate::core::ManifestError;
use crate::util::fs::{copy_tree, remove_dir_all_if_exists};

/// Build flag selecting vendored dependencies.
pub const VENDOR_FLAG: &str = "-mod=vendor";

/// Error mirroring a project.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("must be executed inside the project: {} is not under any package root", working_dir.display())]
    NotInProject { working_dir: PathBuf },

    #[error("cannot mirror an empty project")]
    EmptyProject,

    #[error("failed to copy {} to {}: {cause:#}", src.display(), dst.display())]
    Copy {
        src: PathBuf,
        dst: PathBuf,
        cause: anyhow::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Mirror `working_dir` into a workspace under the system temp directory.
pub fn mirror(
    graph: &PackageGraph,
    working_dir: &Path,
    build_flags: &str,
) -> Result<Workspace, MirrorError> {
    mirror_in(
        &std::env::temp_dir(),
        graph,
        working_dir,
        build_flags,
        std::env::var_os(SEARCH_PATH_VAR),
    )
}

/// Mirror `working_dir` into a workspace under `base`.
///
/// `original_search_path` is the caller's search-path value; legacy layouts
/// get the mirror prepended to it.
pub fn mirror_in(
    base: &Path,
    graph: &PackageGraph,
    working_dir: &Path,
    build_flags: &str,
    original_search_path: Option<OsString>,
) -> Result<Workspace, MirrorError> {
    let tmp_dir = base.join(workspace_dir_name(working_dir));
    remove_dir_all_if_exists(&tmp_dir)?;

    let layout = classify(graph)?;
    tracing::info!("mod project? {}", layout.is_module());

    let tmp_working_dir = match &layout {
        Layout::Standalone => tmp_dir.clone(),
        _ => mirrored_working_dir(graph, &layout, working_dir, &tmp_dir)?,
    };

    let workspace = Workspace::new(
        working_dir.to_path_buf(),
        tmp_dir.clone(),
        tmp_working_dir,
        layout.clone(),
        build_flags.to_string(),
    );
    let cover_var_dir = workspace.cover_var_dir();
    fs::create_dir_all(&cover_var_dir).map_err(|e| {
        anyhow::anyhow!(
            "fail to create the temporary build directory {}: {}",
            cover_var_dir.display(),
            e
        )
    })?;
    tracing::info!("Tmp project generated in: {}", tmp_dir.display());

    match &layout {
        Layout::Module { root, .. } => {
            copy_module_project(graph, root, &tmp_dir)?;
            rewrite_manifest(root, &tmp_dir, build_flags)?;
        }
        Layout::Legacy { .. } => copy_legacy_project(graph, &tmp_dir)?,
        Layout::Standalone => copy_standalone_project(graph, &tmp_dir)?,
    }

    let search_path = if layout.is_module() {
        None
    } else {
        Some(compose_search_path(&tmp_dir, original_search_path)?)
    };
    if let Some(path) = &search_path {
        tracing::info!("New {}: {}", SEARCH_PATH_VAR, path.to_string_lossy());
    }
    tracing::info!(
        "New workingdir in tmp directory in: {}",
        workspace.tmp_working_dir().display()
    );

    Ok(workspace.with_search_path(search_path))
}

/// Classify the project by the first package's module info.
pub fn classify(graph: &PackageGraph) -> Result<Layout, MirrorError> {
    let first = graph.values().next().ok_or(MirrorError::EmptyProject)?;
    Ok(match (&first.module, first.root()) {
        (Some(module), _) => Layout::Module {
            root: module.dir.clone(),
            path: module.path.clone(),
        },
        (None, Some(root)) => Layout::Legacy {
            root: root.to_path_buf(),
        },
        (None, None) => Layout::Standalone,
    })
}

/// Replicate `working_dir`'s position under its project root inside `tmp_dir`.
pub fn mirrored_working_dir(
    graph: &PackageGraph,
    layout: &Layout,
    working_dir: &Path,
    tmp_dir: &Path,
) -> Result<PathBuf, MirrorError> {
    let roots = graph.values().filter_map(|pkg| match layout {
        Layout::Module { .. } => pkg.module.as_ref().map(|m| m.dir.as_path()),
        Layout::Legacy { .. } | Layout::Standalone => pkg.root(),
    });

    for root in roots {
        if let Ok(suffix) = working_dir.strip_prefix(root) {
            return Ok(tmp_dir.join(suffix));
        }
    }
    Err(MirrorError::NotInProject {
        working_dir: working_dir.to_path_buf(),
    })
}

fn copy(src: &Path, dst: &Path) -> Result<(), MirrorError> {
    copy_tree(src, dst).map_err(|cause| MirrorError::Copy {
        src: src.to_path_buf(),
        dst: dst.to_path_buf(),
        cause,
    })
}

fn first_main(graph: &PackageGraph) -> Option<&Package> {
    graph.values().find(|pkg| pkg.is_main())
}

fn copy_module_project(
    graph: &PackageGraph,
    module_root: &Path,
    tmp_dir: &Path,
) -> Result<(), MirrorError> {
    let src = first_main(graph)
        .and_then(|pkg| pkg.module.as_ref())
        .map(|module| module.dir.as_path())
        .unwrap_or(module_root);
    copy(src, tmp_dir)
}

fn copy_standalone_project(graph: &PackageGraph, tmp_dir: &Path) -> Result<(), MirrorError> {
    match first_main(graph) {
        Some(pkg) => copy(&pkg.dir, tmp_dir),
        None => {
            tracing::warn!("no main package found, nothing copied");
            Ok(())
        }
    }
}

fn copy_legacy_project(graph: &PackageGraph, tmp_dir: &Path) -> Result<(), MirrorError> {
    let mut visited: HashSet<PathBuf> = HashSet::new();
    for (import_path, pkg) in graph {
        if !visited.insert(pkg.dir.clone()) {
            continue;
        }
        copy(&pkg.dir, &tmp_dir.join(SOURCE_DIR).join(import_path))?;
        copy_dep_packages(pkg, tmp_dir, &mut visited)?;
    }
    Ok(())
}

fn copy_dep_packages(
    pkg: &Package,
    tmp_dir: &Path,
    visited: &mut HashSet<PathBuf>,
) -> Result<(), MirrorError> {
    let Some(root) = pkg.root() else {
        return Ok(());
    };
    for dep in &pkg.deps {
        let src = root.join(SOURCE_DIR).join(dep);
        if visited.contains(&src) || !src.exists() {
            continue;
        }
        copy(&src, &tmp_dir.join(SOURCE_DIR).join(dep))?;
        visited.insert(src);
    }
    Ok(())
}

/// Make local `replace` redirects of the mirrored manifest absolute.
///
/// Returns whether the manifest was rewritten. Skipped when the build uses
/// vendored dependencies and the original module has a vendor directory.
pub fn rewrite_manifest(
    module_root: &Path,
    tmp_dir: &Path,
    build_flags: &str,
) -> Result<bool, MirrorError> {
    if build_flags.contains(VENDOR_FLAG) && module_root.join("vendor").is_dir() {
        tracing::debug!("vendored build, manifest left as is");
        return Ok(false);
    }

    let manifest_path = tmp_dir.join(MANIFEST_NAME);
    let text = match fs::read_to_string(&manifest_path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("cannot read {}: {}", manifest_path.display(), e);
            return Ok(false);
        }
    };

    let mut manifest = ModFile::parse(&manifest_path.to_string_lossy(), &text)?;
    if manifest.absolutize_local_replaces(module_root) == 0 {
        return Ok(false);
    }

    tracing::info!("{} needs rewrite", MANIFEST_NAME);
    fs::write(&manifest_path, manifest.format()).map_err(|e| {
        anyhow::anyhow!("fail to update {}: {}", manifest_path.display(), e)
    })?;
    Ok(true)
}

/// Prefix the mirror to the original search path.
pub fn compose_search_path(
    tmp_dir: &Path,
    original: Option<OsString>,
) -> Result<OsString, MirrorError> {
    let mut entries = vec![tmp_dir.to_path_buf()];
    if let Some(original) = original.filter(|o| !o.is_empty()) {
        entries.extend(std::env::split_paths(&original));
    }
    std::env::join_paths(entries)
        .map_err(|e| MirrorError::Io(anyhow::anyhow!("invalid {}: {}", SEARCH_PATH_VAR, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{legacy_package, module_package};
    use tempfile::TempDir;

    fn graph_of(pkgs: Vec<Package>) -> PackageGraph {
        pkgs.into_iter()
            .map(|p| (p.import_path.clone(), p))
            .collect()
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn read_tree(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().strip_prefix(root).unwrap().to_path_buf(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_empty_project() {
        let tmp = TempDir::new().unwrap();
        let err = mirror_in(tmp.path(), &PackageGraph::new(), tmp.path(), "", None).unwrap_err();
        assert!(matches!(err, MirrorError::EmptyProject));
    }

    #[test]
    fn test_module_project_mirror() {
        let tmp = TempDir::new().unwrap();
        let proj = tmp.path().join("proj");
        let app = proj.join("app");
        write(&app.join("go.mod"), "module example.com/app\n\nreplace example.com/lib v1.0.0 => ../local/pkg\n");
        write(&app.join("cmd/api/main.go"), "package main\n");
        write(&app.join(".git/HEAD"), "ref\n");
        let base = tmp.path().join("base");

        let graph = graph_of(vec![module_package(
            "example.com/app/cmd/api",
            "main",
            &app.join("cmd/api"),
            &app,
            "example.com/app",
        )]);
        let working_dir = app.join("cmd/api");
        let ws = mirror_in(&base, &graph, &working_dir, "", None).unwrap();

        assert!(ws.is_module());
        assert_eq!(ws.tmp_working_dir(), ws.tmp_dir().join("cmd/api"));
        assert!(ws.tmp_dir().join("cmd/api/main.go").exists());
        assert!(!ws.tmp_dir().join(".git").exists());
        assert!(ws.cover_var_dir().is_dir());
        assert!(ws.search_path().is_none());

        let manifest = fs::read_to_string(ws.tmp_dir().join("go.mod")).unwrap();
        let expected = format!(
            "replace example.com/lib v1.0.0 => {}",
            proj.join("local/pkg").display()
        );
        assert!(manifest.contains(&expected), "{}", manifest);
        // the original is untouched
        let original = fs::read_to_string(app.join("go.mod")).unwrap();
        assert!(original.contains("=> ../local/pkg"));
    }

    #[test]
    fn test_manifest_without_relative_redirects_is_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let text = "module m\n\nreplace   a v1 =>   /abs/a\n";
        write(&tmp.path().join("mirror/go.mod"), text);

        let rewritten = rewrite_manifest(tmp.path(), &tmp.path().join("mirror"), "").unwrap();
        assert!(!rewritten);
        // spacing preserved: the file was not written back
        assert_eq!(fs::read_to_string(tmp.path().join("mirror/go.mod")).unwrap(), text);
    }

    #[test]
    fn test_vendored_build_skips_manifest_rewrite() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("orig");
        fs::create_dir_all(root.join("vendor")).unwrap();
        let text = "module m\nreplace a => ../a\n";
        write(&tmp.path().join("mirror/go.mod"), text);

        let rewritten =
            rewrite_manifest(&root, &tmp.path().join("mirror"), "-mod=vendor -tags x").unwrap();
        assert!(!rewritten);

        let rewritten = rewrite_manifest(&root, &tmp.path().join("mirror"), "-tags x").unwrap();
        assert!(rewritten);
    }

    #[test]
    fn test_legacy_project_mirror() {
        let tmp = TempDir::new().unwrap();
        let gopath = tmp.path().join("gopath");
        let app = gopath.join("src/example.com/app");
        write(&app.join("main.go"), "package main\n");
        write(&gopath.join("src/example.com/lib/lib.go"), "package lib\n");
        write(&gopath.join("src/example.com/util/util.go"), "package util\n");
        let base = tmp.path().join("base");

        let mut main = legacy_package("example.com/app", "main", &app, &gopath);
        main.deps = vec![
            "fmt".to_string(),
            "example.com/lib".to_string(),
            "example.com/util".to_string(),
        ];
        let mut lib = legacy_package("example.com/lib", "lib", &gopath.join("src/example.com/lib"), &gopath);
        lib.deps = vec!["example.com/util".to_string()];
        let graph = graph_of(vec![main, lib]);

        let ws = mirror_in(&base, &graph, &app, "", Some(OsString::from("/opt/go"))).unwrap();

        assert_eq!(
            ws.layout(),
            &Layout::Legacy {
                root: gopath.clone()
            }
        );
        assert_eq!(ws.tmp_working_dir(), ws.tmp_dir().join("src/example.com/app"));
        assert!(ws.tmp_dir().join("src/example.com/app/main.go").exists());
        assert!(ws.tmp_dir().join("src/example.com/lib/lib.go").exists());
        assert!(ws.tmp_dir().join("src/example.com/util/util.go").exists());
        assert!(!ws.tmp_dir().join("src/fmt").exists());

        let expected = std::env::join_paths([ws.tmp_dir().to_path_buf(), PathBuf::from("/opt/go")]).unwrap();
        assert_eq!(ws.search_path(), Some(&expected));
    }

    #[test]
    fn test_standalone_project_uses_workspace_root() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("somewhere/app");
        write(&app.join("main.go"), "package main\n");
        let base = tmp.path().join("base");

        let mut pkg = legacy_package("_/somewhere/app", "main", &app, Path::new(""));
        pkg.root = None;
        let graph = graph_of(vec![pkg]);

        let ws = mirror_in(&base, &graph, &app.join("nested"), "", None).unwrap();
        assert_eq!(ws.layout(), &Layout::Standalone);
        assert_eq!(ws.tmp_working_dir(), ws.tmp_dir());
        assert!(ws.tmp_dir().join("main.go").exists());
        assert_eq!(ws.search_path(), Some(&ws.tmp_dir().as_os_str().to_os_string()));
    }

    #[test]
    fn test_not_in_project() {
        let tmp = TempDir::new().unwrap();
        let gopath = tmp.path().join("gopath");
        let app = gopath.join("src/example.com/app");
        write(&app.join("main.go"), "package main\n");

        let graph = graph_of(vec![legacy_package("example.com/app", "main", &app, &gopath)]);
        let err = mirror_in(tmp.path(), &graph, Path::new("/elsewhere"), "", None).unwrap_err();
        assert!(matches!(err, MirrorError::NotInProject { .. }));
    }

    #[test]
    fn test_mirror_is_deterministic() {
        let tmp = TempDir::new().unwrap();
        let app = tmp.path().join("app");
        write(&app.join("go.mod"), "module example.com/app\n");
        write(&app.join("main.go"), "package main\n");
        write(&app.join("internal/db/db.go"), "package db\n");
        let base = tmp.path().join("base");
        let graph = graph_of(vec![module_package("example.com/app", "main", &app, &app, "example.com/app")]);

        let first = mirror_in(&base, &graph, &app, "", None).unwrap();
        let first_tree = read_tree(first.tmp_dir());
        // stale state from a previous run must not survive
        write(&first.tmp_dir().join("stale.go"), "package stale\n");

        let second = mirror_in(&base, &graph, &app, "", None).unwrap();
        assert_eq!(first.tmp_dir(), second.tmp_dir());
        assert_eq!(first_tree, read_tree(second.tmp_dir()));
    }

    #[test]
    fn test_compose_search_path() {
        let tmp = Path::new("/tmp/ws");
        assert_eq!(compose_search_path(tmp, None).unwrap(), OsString::from("/tmp/ws"));
        assert_eq!(
            compose_search_path(tmp, Some(OsString::new())).unwrap(),
            OsString::from("/tmp/ws")
        );
    }
}
