//! Local enumerator: every file under a directory tree.

use std::fs;
use std::path::{Path, PathBuf};

use mb_core::Result;

use crate::runner::{BatchOptions, BatchSummary, CommandRunner, run_batch};
use crate::template::CommandTemplate;

/// What to collect while walking.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Keep only files with this extension (case-insensitive, no leading dot).
    pub extension: Option<String>,
    /// Sort the result lexicographically instead of keeping traversal order.
    pub sorted: bool,
}

/// Collect regular files under `root`, depth-first in `read_dir` order.
///
/// Symlinks are skipped. Paths are `root` joined with the relative path.
pub fn walk_files(root: &Path, opts: &WalkOptions) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    walk_dir(root, opts, &mut out)?;
    if opts.sorted {
        out.sort();
    }
    Ok(out)
}

fn walk_dir(dir: &Path, opts: &WalkOptions, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let ft = entry.file_type()?;

        // Avoid symlink loops on shared storage mounts.
        if ft.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }

        let path = entry.path();
        if ft.is_dir() {
            walk_dir(&path, opts, out)?;
            continue;
        }

        if ft.is_file() && matches_extension(&path, opts.extension.as_deref()) {
            out.push(path);
        }
    }
    Ok(())
}

fn matches_extension(path: &Path, want: Option<&str>) -> bool {
    match want {
        None => true,
        Some(want) => path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(want.trim_start_matches('.'))),
    }
}

/// Walk `root` and run the template once per file with its full path.
///
/// Paths that are not valid UTF-8 are skipped with a warning and counted in
/// [`BatchSummary::skipped`].
pub fn run_local<R: CommandRunner + ?Sized>(
    root: &Path,
    walk: &WalkOptions,
    template: &CommandTemplate,
    runner: &mut R,
    opts: &BatchOptions,
) -> Result<BatchSummary> {
    tracing::info!(root = %root.display(), "walking local directory");
    let files = walk_files(root, walk)?;
    tracing::info!(files = files.len(), "files found");
    run_batch(&files, template, runner, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_dir(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        p.push(format!("mb-batch-{}-{}-{}", name, std::process::id(), nanos));
        p
    }

    fn rm_rf(path: &Path) {
        let _ = std::fs::remove_dir_all(path);
    }

    #[test]
    fn one_invocation_per_file_with_full_path() {
        let root = tmp_dir("walk");
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("a.root"), b"").unwrap();
        std::fs::write(root.join("sub/b.root"), b"").unwrap();

        let t = CommandTemplate::default();
        let mut r = RecordingRunner::default();
        let s = run_local(&root, &WalkOptions::default(), &t, &mut r, &BatchOptions::default())
            .unwrap();
        assert_eq!(s.invoked, 2);

        let mut args: Vec<String> = r.seen.iter().map(|i| i.args[3].clone()).collect();
        args.sort();
        let a = root.join("a.root");
        let b = root.join("sub").join("b.root");
        let mut expected = vec![
            format!("TMVAClassificationApplication.C(\"{}\")", a.display()),
            format!("TMVAClassificationApplication.C(\"{}\")", b.display()),
        ];
        expected.sort();
        assert_eq!(args, expected);

        rm_rf(&root);
    }

    #[test]
    fn sorted_and_extension_filter() {
        let root = tmp_dir("filter");
        std::fs::create_dir_all(root.join("z")).unwrap();
        std::fs::write(root.join("z/c.ROOT"), b"").unwrap();
        std::fs::write(root.join("b.root"), b"").unwrap();
        std::fs::write(root.join("notes.txt"), b"").unwrap();

        let opts = WalkOptions { extension: Some(".root".into()), sorted: true };
        let files = walk_files(&root, &opts).unwrap();
        assert_eq!(files, vec![root.join("b.root"), root.join("z/c.ROOT")]);

        let all = walk_files(&root, &WalkOptions::default()).unwrap();
        assert_eq!(all.len(), 3);

        rm_rf(&root);
    }

    #[test]
    fn empty_directory_runs_nothing() {
        let root = tmp_dir("empty");
        std::fs::create_dir_all(&root).unwrap();
        let mut r = RecordingRunner::default();
        let s = run_local(
            &root,
            &WalkOptions::default(),
            &CommandTemplate::default(),
            &mut r,
            &BatchOptions::default(),
        )
        .unwrap();
        assert_eq!(s.invoked, 0);
        assert!(r.seen.is_empty());
        rm_rf(&root);
    }

    #[test]
    fn missing_root_is_an_error() {
        let root = tmp_dir("missing");
        assert!(walk_files(&root, &WalkOptions::default()).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_file_name_is_skipped() {
        use std::os::unix::ffi::OsStrExt;

        let root = tmp_dir("nonutf8");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("good.root"), b"").unwrap();
        std::fs::write(root.join(std::ffi::OsStr::from_bytes(b"bad\xff.root")), b"").unwrap();

        let t = CommandTemplate::default();
        let mut r = RecordingRunner::default();
        let s = run_local(&root, &WalkOptions::default(), &t, &mut r, &BatchOptions::default())
            .unwrap();
        assert_eq!(s.invoked, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(r.seen, vec![t.invocation(root.join("good.root").to_str().unwrap())]);
        rm_rf(&root);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let root = tmp_dir("symlink");
        std::fs::create_dir_all(root.join("d")).unwrap();
        std::fs::write(root.join("d/x.root"), b"").unwrap();
        std::os::unix::fs::symlink(&root, root.join("d/loop")).unwrap();
        let files = walk_files(&root, &WalkOptions::default()).unwrap();
        assert_eq!(files, vec![root.join("d/x.root")]);
        rm_rf(&root);
    }
}
