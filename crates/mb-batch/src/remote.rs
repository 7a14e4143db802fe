//! Remote enumerator: entries of an XRootD directory listing.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use mb_core::{Error, Result};

use crate::runner::{Batch, BatchOptions, BatchSummary, CommandRunner};
use crate::template::CommandTemplate;

/// Where the listing comes from.
#[derive(Debug, Clone)]
pub enum ListingSource {
    /// Spawn `<lister> <endpoint> ls <path>` and read its stdout.
    Command { lister: String, endpoint: String, path: String },
    /// Read a previously captured listing; entries are prefixed with `endpoint`.
    File { path: PathBuf, endpoint: String },
}

impl ListingSource {
    fn endpoint(&self) -> &str {
        match self {
            ListingSource::Command { endpoint, .. } | ListingSource::File { endpoint, .. } => {
                endpoint
            }
        }
    }
}

/// `endpoint + "/" + entry`. Absolute entries give the usual
/// `root://host//store/...` form.
pub fn remote_url(endpoint: &str, entry: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), entry)
}

/// One non-blank line of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEntry {
    /// `endpoint/entry`.
    Url(String),
    /// A line that is not valid UTF-8, shown with replacement characters.
    NotUtf8(String),
}

/// Iterator over the entries of a listing, see [`listing_entries`].
pub struct ListingEntries<'e, R> {
    reader: R,
    endpoint: &'e str,
    buf: Vec<u8>,
}

/// Read a listing line by line. Blank lines are dropped; a line that is not
/// valid UTF-8 is yielded as [`ListingEntry::NotUtf8`] and does not end the
/// iteration.
pub fn listing_entries<R: BufRead>(reader: R, endpoint: &str) -> ListingEntries<'_, R> {
    ListingEntries { reader, endpoint, buf: Vec::new() }
}

impl<R: BufRead> Iterator for ListingEntries<'_, R> {
    type Item = Result<ListingEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            match std::str::from_utf8(&self.buf) {
                Ok(line) => {
                    if let Some(entry) = listing_entry(line) {
                        return Some(Ok(ListingEntry::Url(remote_url(self.endpoint, entry))));
                    }
                }
                Err(_) => {
                    let line = String::from_utf8_lossy(&self.buf);
                    return Some(Ok(ListingEntry::NotUtf8(line.trim().to_string())));
                }
            }
        }
    }
}

fn listing_entry(line: &str) -> Option<&str> {
    let entry = line.trim();
    if entry.is_empty() { None } else { Some(entry) }
}

/// Feed every entry of `listing` to `batch`, stopping when the batch does.
fn submit_listing<L: BufRead, R: CommandRunner + ?Sized>(
    listing: L,
    endpoint: &str,
    batch: &mut Batch<'_, R>,
) -> Result<()> {
    for entry in listing_entries(listing, endpoint) {
        let keep_going = match entry? {
            ListingEntry::Url(url) => batch.submit(&url)?,
            ListingEntry::NotUtf8(line) => {
                batch.skip(&line, "listing entry is not valid UTF-8");
                true
            }
        };
        if !keep_going {
            break;
        }
    }
    Ok(())
}

/// Run the template once per listing entry.
///
/// Entries are processed as they are read. A lister that exits unsuccessfully
/// is reported as [`Error::Listing`] after the entries it did print have run,
/// unless `fail_fast` already stopped the batch.
pub fn run_remote<R: CommandRunner + ?Sized>(
    source: &ListingSource,
    template: &CommandTemplate,
    runner: &mut R,
    opts: &BatchOptions,
) -> Result<BatchSummary> {
    let endpoint = source.endpoint();
    let mut batch = Batch::new(template, runner, opts);
    match source {
        ListingSource::File { path, .. } => {
            tracing::info!(path = %path.display(), "reading captured listing");
            let reader = BufReader::new(std::fs::File::open(path)?);
            submit_listing(reader, endpoint, &mut batch)?;
            Ok(batch.finish())
        }
        ListingSource::Command { lister, path, .. } => {
            tracing::info!(%lister, %endpoint, %path, "listing remote directory");
            let mut child = Command::new(lister)
                .arg(endpoint)
                .arg("ls")
                .arg(path)
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|source| Error::Spawn { program: lister.clone(), source })?;
            let Some(stdout) = child.stdout.take() else {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Listing(format!("no stdout from `{lister}`")));
            };

            if let Err(err) = submit_listing(BufReader::new(stdout), endpoint, &mut batch) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
            let summary = batch.finish();

            let status = child.wait()?;
            if !status.success() && !summary.stopped_early {
                return Err(Error::Listing(format!(
                    "`{lister} {endpoint} ls {path}` exited with {status}"
                )));
            }
            Ok(summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use std::io::Cursor;
    use std::time::{SystemTime, UNIX_EPOCH};

    const LISTING: &str = "/store/user/x/WJets.root\n\n  /store/user/x/TTbar.root  \n/store/user/x/ZZ.root\n";

    #[test]
    fn url_joins_endpoint_and_entry() {
        assert_eq!(
            remote_url("root://cmseos.fnal.gov", "/store/a.root"),
            "root://cmseos.fnal.gov//store/a.root"
        );
        assert_eq!(
            remote_url("root://cmseos.fnal.gov/", "/store/a.root"),
            "root://cmseos.fnal.gov//store/a.root"
        );
    }

    #[test]
    fn n_entries_give_n_urls() {
        let urls: Vec<ListingEntry> =
            listing_entries(Cursor::new(LISTING), "root://cmseos.fnal.gov")
                .collect::<Result<_>>()
                .unwrap();
        assert_eq!(
            urls,
            vec![
                ListingEntry::Url("root://cmseos.fnal.gov//store/user/x/WJets.root".into()),
                ListingEntry::Url("root://cmseos.fnal.gov//store/user/x/TTbar.root".into()),
                ListingEntry::Url("root://cmseos.fnal.gov//store/user/x/ZZ.root".into()),
            ]
        );
    }

    #[test]
    fn non_utf8_line_does_not_end_the_listing() {
        let listing: &[u8] = b"/store/a.root\n/store/b\xff.root\n/store/c.root";
        let entries: Vec<ListingEntry> =
            listing_entries(listing, "root://eos").collect::<Result<_>>().unwrap();
        assert_eq!(
            entries,
            vec![
                ListingEntry::Url("root://eos//store/a.root".into()),
                ListingEntry::NotUtf8("/store/b\u{FFFD}.root".into()),
                ListingEntry::Url("root://eos//store/c.root".into()),
            ]
        );
    }

    fn tmp_file(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        p.push(format!("mb-batch-{}-{}-{}.txt", name, std::process::id(), nanos));
        p
    }

    #[test]
    fn captured_listing_runs_once_per_entry() {
        let p = tmp_file("listing");
        std::fs::write(&p, LISTING).unwrap();

        let source =
            ListingSource::File { path: p.clone(), endpoint: "root://cmseos.fnal.gov".into() };
        let t = CommandTemplate::default();
        let mut r = RecordingRunner::default();
        let s = run_remote(&source, &t, &mut r, &BatchOptions::default()).unwrap();
        assert_eq!(s.invoked, 3);
        assert_eq!(r.seen[0], t.invocation("root://cmseos.fnal.gov//store/user/x/WJets.root"));
        assert_eq!(r.seen[2], t.invocation("root://cmseos.fnal.gov//store/user/x/ZZ.root"));

        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn captured_listing_skips_non_utf8_entries() {
        let p = tmp_file("nonutf8");
        std::fs::write(&p, b"/store/a.root\n/store/b\xff.root\n/store/c.root\n").unwrap();

        let source = ListingSource::File { path: p.clone(), endpoint: "root://eos".into() };
        let t = CommandTemplate::default();
        let mut r = RecordingRunner::default();
        let s = run_remote(&source, &t, &mut r, &BatchOptions::default()).unwrap();
        assert_eq!(s.invoked, 2);
        assert_eq!(s.skipped, 1);
        assert_eq!(
            r.seen,
            vec![t.invocation("root://eos//store/a.root"), t.invocation("root://eos//store/c.root")]
        );

        let _ = std::fs::remove_file(&p);
    }

    /// `sh <script> ls <path>`: the endpoint slot carries the script path.
    #[cfg(unix)]
    fn script_lister(name: &str, body: &str) -> (ListingSource, PathBuf) {
        let script = tmp_file(name);
        std::fs::write(&script, body).unwrap();
        let source = ListingSource::Command {
            lister: "sh".into(),
            endpoint: script.to_string_lossy().into_owned(),
            path: "/store/dir".into(),
        };
        (source, script)
    }

    #[cfg(unix)]
    #[test]
    fn failing_lister_reported_after_printed_entries_ran() {
        let (source, script) =
            script_lister("exit3", "echo /a.root\necho /b.root\nexit 3\n");
        let t = CommandTemplate::default();
        let mut r = RecordingRunner::default();
        let err = run_remote(&source, &t, &mut r, &BatchOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Listing(_)), "{err}");
        assert_eq!(r.seen.len(), 2);
        assert!(r.seen[0].args[3].ends_with("//a.root\")"), "{}", r.seen[0]);
        assert!(r.seen[1].args[3].ends_with("//b.root\")"), "{}", r.seen[1]);
        let _ = std::fs::remove_file(&script);
    }

    #[cfg(unix)]
    #[test]
    fn fail_fast_stop_suppresses_listing_error() {
        let (source, script) =
            script_lister("failfast", "echo /a.root\necho /b.root\nexit 3\n");
        let t = CommandTemplate::default();
        let mut r = RecordingRunner { fail_marker: Some("a.root".into()), ..Default::default() };
        let s = run_remote(&source, &t, &mut r, &BatchOptions { fail_fast: true }).unwrap();
        assert_eq!(s.invoked, 1);
        assert!(s.stopped_early);
        let _ = std::fs::remove_file(&script);
    }

    #[cfg(unix)]
    #[test]
    fn lister_stdout_is_streamed() {
        // `echo <endpoint> ls <path>` prints one line: the three arguments.
        let source = ListingSource::Command {
            lister: "echo".into(),
            endpoint: "root://eos.example".into(),
            path: "/store/dir".into(),
        };
        let t = CommandTemplate::default();
        let mut r = RecordingRunner::default();
        let s = run_remote(&source, &t, &mut r, &BatchOptions::default()).unwrap();
        assert_eq!(s.invoked, 1);
        assert_eq!(
            r.seen[0],
            t.invocation("root://eos.example/root://eos.example ls /store/dir")
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_lister_is_a_listing_error() {
        let source = ListingSource::Command {
            lister: "false".into(),
            endpoint: "root://eos.example".into(),
            path: "/store/dir".into(),
        };
        let mut r = RecordingRunner::default();
        let err =
            run_remote(&source, &CommandTemplate::default(), &mut r, &BatchOptions::default())
                .unwrap_err();
        assert!(matches!(err, Error::Listing(_)), "{err}");
        assert!(r.seen.is_empty());
    }

    #[test]
    fn missing_lister_is_a_spawn_error() {
        let source = ListingSource::Command {
            lister: "mvabatch-no-such-lister".into(),
            endpoint: "root://eos.example".into(),
            path: "/".into(),
        };
        let mut r = RecordingRunner::default();
        let err =
            run_remote(&source, &CommandTemplate::default(), &mut r, &BatchOptions::default())
                .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
