//! Loading the package graph from the external package lister.

use std::path::Path;

use thiserror::Error;

use crate::core::package::{Package, PackageGraph};
use crate::core::workspace::SEARCH_PATH_VAR;
use crate::util::process::{ProcessBuilder, ProcessRunner};

/// Recursive package pattern appended to every listing.
pub const PACKAGE_PATTERN: &str = "./...";

/// Error loading the package graph.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("fail to list package dependencies: {0}")]
    ListFailed(String),

    #[error("list package {import_path} failed: {message}")]
    PackageError {
        import_path: String,
        message: String,
    },
}

/// Lister command line for the given caller flags.
pub fn list_command_line(flags: &str) -> String {
    let mut parts = vec!["go", "list", "-json"];
    let flags = flags.trim();
    if !flags.is_empty() {
        parts.push(flags);
    }
    parts.push(PACKAGE_PATTERN);
    parts.join(" ")
}

/// List every package under `dir`.
///
/// `flags` is passed to the lister verbatim. `search_path` replaces the
/// search-path variable for the listing when given. Any package carrying an
/// error aborts the load.
pub fn list_packages(
    runner: &dyn ProcessRunner,
    dir: &Path,
    flags: &str,
    search_path: Option<&str>,
) -> Result<PackageGraph, ListError> {
    let cmd = ProcessBuilder::shell(list_command_line(flags))
        .cwd(dir)
        .env_opt(SEARCH_PATH_VAR, search_path);
    tracing::debug!("package list cmd is: {}", cmd.display_command());

    let output = runner
        .run(&cmd)
        .map_err(|e| ListError::ListFailed(format!("{:#}", e)))?;
    if !output.success() {
        tracing::error!(
            "`{}` failed with exit code {:?}, stderr: {}",
            cmd.display_command(),
            output.code,
            output.stderr_lossy()
        );
        return Err(ListError::ListFailed(format!(
            "exit code {:?}: {}",
            output.code,
            output.stderr_lossy().trim()
        )));
    }
    if !output.stderr.is_empty() {
        tracing::debug!("{}", output.stderr_lossy());
    }

    decode_packages(&output.stdout)
}

/// Decode a stream of concatenated package records.
pub fn decode_packages(stdout: &[u8]) -> Result<PackageGraph, ListError> {
    let mut graph = PackageGraph::new();
    for record in serde_json::Deserializer::from_slice(stdout).into_iter::<Package>() {
        let pkg =
            record.map_err(|e| ListError::ListFailed(format!("fail to decode package list: {}", e)))?;
        if let Some(err) = &pkg.error {
            tracing::error!("list package {} failed with output: {}", pkg.import_path, err);
            return Err(ListError::PackageError {
                import_path: pkg.import_path.clone(),
                message: err.to_string(),
            });
        }
        graph.insert(pkg.import_path.clone(), pkg);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockRunner, MockProcessOutput};

    const TWO_PACKAGES: &str = r#"{"Dir": "/src/app", "ImportPath": "example.com/app", "Name": "main", "Deps": ["example.com/app/lib"]}
{"Dir": "/src/app/lib", "ImportPath": "example.com/app/lib", "Name": "lib"}
"#;

    #[test]
    fn test_list_command_line() {
        assert_eq!(list_command_line(""), "go list -json ./...");
        assert_eq!(
            list_command_line(" -tags integration -mod=vendor "),
            "go list -json -tags integration -mod=vendor ./..."
        );
    }

    #[test]
    fn test_list_packages() {
        let runner = MockRunner::new();
        runner.expect_contains("go list", MockProcessOutput::success(TWO_PACKAGES));

        let graph = list_packages(&runner, Path::new("/src/app"), "-tags x", Some("/tmp/ws")).unwrap();

        assert_eq!(graph.len(), 2);
        assert!(graph["example.com/app"].is_main());
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].get_args()[1], "go list -json -tags x ./...");
        assert_eq!(calls[0].get_cwd(), Some(Path::new("/src/app")));
        assert_eq!(calls[0].get_env(SEARCH_PATH_VAR), Some("/tmp/ws"));
    }

    #[test]
    fn test_list_failure_is_fatal() {
        let runner = MockRunner::new();
        runner.expect_contains("go list", MockProcessOutput::failure(1, "no Go files"));

        let err = list_packages(&runner, Path::new("/src/app"), "", None).unwrap_err();
        assert!(matches!(err, ListError::ListFailed(_)));
    }

    #[test]
    fn test_decode_failure_mid_stream_is_fatal() {
        let stream = format!("{}{{\"ImportPath\": ", TWO_PACKAGES);
        let err = decode_packages(stream.as_bytes()).unwrap_err();
        match err {
            ListError::ListFailed(message) => {
                assert!(message.starts_with("fail to decode package list"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_package_error_aborts_load() {
        let stream = r#"{"ImportPath": "example.com/ok", "Name": "ok"}
{"ImportPath": "example.com/bad", "Name": "bad", "Error": {"Err": "no Go files"}}
"#;
        let err = decode_packages(stream.as_bytes()).unwrap_err();
        match err {
            ListError::PackageError { import_path, message } => {
                assert_eq!(import_path, "example.com/bad");
                assert_eq!(message, "no Go files");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
