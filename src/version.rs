#![allow(clippy::doc_markdown)] // Generated file contains OPT_LEVEL without backticks

use std::sync::LazyLock;

include!(concat!(env!("OUT_DIR"), "/built.rs"));

/// Full version string, logged at startup and stamped into @PG records.
///
/// Package version plus the git commit hash, with a `-dirty` suffix when the
/// tree had uncommitted changes at build time. Falls back to the bare package
/// version outside a git checkout (e.g. a crates.io build).
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let prefix = match GIT_COMMIT_HASH {
        Some(hash) => format!("{PKG_VERSION}-{hash}"),
        None => PKG_VERSION.to_string(),
    };
    let dirty = if GIT_DIRTY == Some(true) { "-dirty" } else { "" };
    format!("{prefix}{dirty}")
});
