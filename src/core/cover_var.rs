//! Counter-variable naming.
//!
//! Every instrumented file gets its own counter symbol. Symbols of different
//! packages must not collide even when one package dot-imports several
//! instrumented ones, so each name carries a short hash of the package's
//! import path plus a per-file index.

use std::collections::BTreeMap;

use crate::core::package::Package;
use crate::util::hash::short_hash;

/// Prefix of generated counter symbols.
pub const COVER_VAR_PREFIX: &str = "GoCover";

/// Counter variable assigned to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverVar {
    /// Import path joined with the file name, as shown in profiles.
    pub file: String,
    /// Counter symbol name.
    pub var: String,
}

/// Instrumentation result of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCover {
    /// Import path of the package.
    pub import_path: String,
    /// File name to its counter variable.
    pub vars: BTreeMap<String, CoverVar>,
}

/// Assign counter variables to every ordinary and interop file of `pkg`.
pub fn declare_cover_vars(pkg: &Package) -> BTreeMap<String, CoverVar> {
    let suffix = short_hash(&pkg.import_path);

    pkg.source_files()
        .enumerate()
        .map(|(index, file)| {
            let var = CoverVar {
                file: format!("{}/{}", pkg.import_path, file),
                var: format!("{}_{}_{}", COVER_VAR_PREFIX, index, suffix),
            };
            (file.to_string(), var)
        })
        .collect()
}
