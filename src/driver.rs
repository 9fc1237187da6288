//! The reconciliation driver (C5): a single pre-order walk of the source
//! tree that decides, per entry, between skip / create-directory /
//! move-file / move-directory / copy / compare-and-maybe-copy, dispatches
//! copies to a bounded worker pool, and optionally runs a mirror-deletion
//! pass afterward.

use crate::config::{Config, HashMode, Mode};
use crate::fingerprint::{self, Fingerprint};
use crate::ignore::IgnoreMatcher;
use crate::index::DestinationIndex;
use crate::io::{self, DRIFT_JOURNAL_FILE, DRIFT_TEMP_DIR};
use crate::log::{Severity, Sink};
use crate::path;
use ahash::{AHashMap, AHashSet};
use crossbeam_channel::{bounded, Sender};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use walkdir::WalkDir;

type SinkRef = Arc<dyn Sink>;

/// Directory-level move threshold: the minimum fraction of a source
/// directory's fingerprints that must be present in a destination
/// candidate for the two to be considered the same subtree, renamed.
/// Chosen to tolerate a renamed directory that has also had a few files
/// added or removed.
pub const DIR_MOVE_THRESHOLD: f64 = 0.85;

/// Copy-channel capacity is a small multiple of the worker count: enough
/// that the single-threaded walk can get ahead without every enqueue
/// blocking, while a genuinely overloaded pool still applies backpressure.
const CHANNEL_CAPACITY_MULTIPLIER: usize = 4;

#[derive(Debug, Default)]
pub struct Summary {
    pub created_dirs: usize,
    pub copied_files: usize,
    pub moved_files: usize,
    pub moved_dirs: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

struct CopyJob {
    source: PathBuf,
    dest: PathBuf,
}

/// Run a full reconciliation and return a summary of what happened (or, in
/// dry-run mode, what would have happened).
pub fn run(config: &Config, sink: SinkRef) -> Summary {
    let mut driver = Driver::new(config, sink);
    driver.execute()
}

struct Driver<'a> {
    config: &'a Config,
    sink: SinkRef,
    ignore: IgnoreMatcher,
    index: Option<DestinationIndex>,
    reserved_paths: AHashSet<String>,
    reserved_dirs: Vec<String>,
    moved_source_roots: Vec<PathBuf>,
    dir_fp_cache: AHashMap<String, Arc<AHashSet<Fingerprint>>>,
    summary: Summary,
}

enum VisitAction {
    Continue,
    SkipSubtree,
}

impl<'a> Driver<'a> {
    fn new(config: &'a Config, sink: SinkRef) -> Self {
        Driver {
            config,
            sink,
            ignore: IgnoreMatcher::new(&config.ignore),
            index: None,
            reserved_paths: AHashSet::new(),
            reserved_dirs: Vec::new(),
            moved_source_roots: Vec::new(),
            dir_fp_cache: AHashMap::new(),
            summary: Summary::default(),
        }
    }

    fn execute(&mut self) -> Summary {
        if let Some(threads) = self.config.threads {
            // Only the first call in a process wins; later, more specific
            // requests are silently ignored rather than treated as fatal.
            let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
        }

        if self.config.mode == Mode::File {
            return self.execute_file_mode();
        }

        let src_root = self.config.src.clone();
        let dst_root = self.config.dst.clone();

        let temp_dir = dst_root.join(DRIFT_TEMP_DIR);
        let journal_path = dst_root.join(DRIFT_JOURNAL_FILE);

        if !self.config.dry_run {
            io::ensure_directory(&dst_root).ok();
            if let Err(e) = crate::io::SyncJournal::recover(&journal_path, &temp_dir) {
                self.sink
                    .log(Severity::Warn, &format!("journal recovery failed: {e}"));
            }
            io::ensure_directory(&temp_dir).ok();
        }

        self.index = build_destination_index(
            &dst_root,
            &src_root,
            &self.ignore,
            self.config.hash_mode,
            self.sink.as_ref(),
        );

        let worker_errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel = Arc::new(AtomicBool::new(false));

        let (tx, handles, journal) = if self.config.dry_run {
            (None, Vec::new(), None)
        } else {
            let journal = match crate::io::SyncJournal::create(journal_path.clone()) {
                Ok(j) => Some(Arc::new(j)),
                Err(e) => {
                    self.sink
                        .log(Severity::Warn, &format!("could not create journal: {e}"));
                    None
                }
            };
            let capacity = self.config.max_copy_workers * CHANNEL_CAPACITY_MULTIPLIER;
            let (tx, rx) = bounded::<CopyJob>(capacity.max(1));
            let mut handles = Vec::with_capacity(self.config.max_copy_workers);
            for _ in 0..self.config.max_copy_workers {
                let rx = rx.clone();
                let temp_dir = temp_dir.clone();
                let errors = Arc::clone(&worker_errors);
                let cancel = Arc::clone(&cancel);
                let journal = journal.clone();
                let sink = Arc::clone(&self.sink);
                handles.push(thread::spawn(move || {
                    for job in rx.iter() {
                        if cancel.load(Ordering::Relaxed) {
                            continue;
                        }
                        match perform_copy(&job, &temp_dir, journal.as_deref()) {
                            Ok(()) => {
                                sink.log(Severity::Action, &format!("Copied {}", job.dest.display()));
                            }
                            Err(e) => {
                                let msg = format!("copy {} -> {}: {e}", job.source.display(), job.dest.display());
                                sink.log(Severity::Error, &msg);
                                errors.lock().unwrap().push(msg);
                            }
                        }
                    }
                }));
            }
            (Some(tx), handles, journal)
        };

        self.walk_source(&src_root, &dst_root, tx.as_ref());

        // Dropping the sender closes the channel once in-flight sends
        // drain; the mirror pass can then run on the driver thread while
        // workers finish, since the reservation sets are already complete.
        drop(tx);

        if self.config.mirror {
            self.run_mirror_pass(&src_root, &dst_root);
        }

        for handle in handles {
            let _ = handle.join();
        }

        if let Some(journal) = journal {
            if let Ok(journal) = Arc::try_unwrap(journal) {
                let _ = journal.remove();
            }
        }
        if !self.config.dry_run {
            io::remove_dir_recursive(&temp_dir).ok();
            io::fsync_directory(&dst_root).ok();
        }

        self.summary.errors.extend(worker_errors.lock().unwrap().drain(..));

        std::mem::take(&mut self.summary)
    }

    /// `--file <src> <dst>`: a single compare-and-maybe-copy decision, not a
    /// tree walk. No ignore list, no destination index, no move detection,
    /// no mirror pass — the user already named the exact destination path,
    /// so none of those apply. Reuses the Case A/B decision from §4.5.3.
    fn execute_file_mode(&mut self) -> Summary {
        let src = self.config.src.clone();
        let dst = self.config.dst.clone();

        if !src.is_file() {
            self.summary
                .errors
                .push(format!("--file source is not a regular file: {}", src.display()));
            return std::mem::take(&mut self.summary);
        }

        let needs_copy = if dst.exists() {
            self.decide_overwrite(&src, &dst)
        } else {
            true
        };

        if !needs_copy {
            self.sink.log(Severity::Info, &format!("Unchanged {}", dst.display()));
            return std::mem::take(&mut self.summary);
        }

        self.summary.copied_files += 1;
        if self.config.dry_run {
            self.sink.log(
                Severity::Action,
                &format!("[DRY-RUN] Would copy {} -> {}", src.display(), dst.display()),
            );
            return std::mem::take(&mut self.summary);
        }

        let parent = match dst.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if let Err(e) = io::ensure_directory(&parent) {
            self.summary
                .errors
                .push(format!("create directory {}: {e}", parent.display()));
            return std::mem::take(&mut self.summary);
        }

        let temp_path = io::generate_temp_path(&parent);
        match io::atomic_copy_file_with_metadata(&src, &dst, &temp_path, true, false, None) {
            Ok(()) => {
                self.sink.log(Severity::Action, &format!("Copied {}", dst.display()));
            }
            Err(e) => {
                self.summary
                    .errors
                    .push(format!("copy {} -> {}: {e}", src.display(), dst.display()));
            }
        }

        std::mem::take(&mut self.summary)
    }

    fn walk_source(&mut self, src_root: &Path, dst_root: &Path, tx: Option<&Sender<CopyJob>>) {
        let mut it = WalkDir::new(src_root).follow_links(false).into_iter();
        loop {
            let entry = match it.next() {
                Some(Ok(e)) => e,
                Some(Err(e)) => {
                    self.summary.errors.push(format!("walk error: {e}"));
                    continue;
                }
                None => break,
            };

            let p = entry.path();
            if p == src_root {
                continue;
            }

            match self.visit_entry(&entry, src_root, dst_root, tx) {
                VisitAction::SkipSubtree => {
                    it.skip_current_dir();
                }
                VisitAction::Continue => {}
            }
        }
    }

    fn visit_entry(
        &mut self,
        entry: &walkdir::DirEntry,
        src_root: &Path,
        dst_root: &Path,
        tx: Option<&Sender<CopyJob>>,
    ) -> VisitAction {
        let p = entry.path();

        // Pre-filter 1: already satisfied by a directory-level move.
        if self
            .moved_source_roots
            .iter()
            .any(|root| path::is_under(root, p))
        {
            return VisitAction::SkipSubtree;
        }

        // Pre-filter 2: ignore list.
        if self.ignore.source_ignored(p) {
            self.sink.log(Severity::Info, &format!("Ignored {}", p.display()));
            return if entry.file_type().is_dir() {
                VisitAction::SkipSubtree
            } else {
                VisitAction::Continue
            };
        }

        let rel = path::relative(src_root, p).expect("entry is under src_root");
        let target = dst_root.join(&rel);

        if entry.file_type().is_dir() {
            self.visit_directory(p, &target, src_root, dst_root)
        } else if entry.file_type().is_symlink() {
            self.visit_symlink(p, &target);
            VisitAction::Continue
        } else {
            self.visit_file(p, &target, dst_root, tx);
            VisitAction::Continue
        }
    }

    fn visit_directory(&mut self, entry: &Path, target: &Path, src_root: &Path, dst_root: &Path) -> VisitAction {
        if target.exists() {
            return VisitAction::Continue;
        }

        if self.config.hash_mode == HashMode::Strong {
            if self.attempt_directory_move(entry, target, src_root, dst_root) {
                return VisitAction::SkipSubtree;
            }
        }

        if !self.config.dry_run {
            if let Err(e) = io::ensure_directory(target) {
                self.summary
                    .errors
                    .push(format!("create directory {}: {e}", target.display()));
                return VisitAction::Continue;
            }
        }
        self.reserved_paths.insert(path::normalize(target));
        self.summary.created_dirs += 1;
        self.sink
            .log(Severity::Action, &format!("Create Directory {}", target.display()));
        VisitAction::Continue
    }

    fn attempt_directory_move(&mut self, entry: &Path, target: &Path, src_root: &Path, dst_root: &Path) -> bool {
        let src_fps = self.directory_fingerprints(entry, true);
        if src_fps.is_empty() {
            return false;
        }

        let dst_parent = match target.parent() {
            Some(p) => p,
            None => return false,
        };
        if !dst_parent.is_dir() {
            return false;
        }

        let candidates: Vec<PathBuf> = match std::fs::read_dir(dst_parent) {
            Ok(entries) => entries
                .flatten()
                .filter(|e| e.path().is_dir())
                .map(|e| e.path())
                .collect(),
            Err(_) => return false,
        };

        for candidate in candidates {
            if self.reserved_dirs.iter().any(|r| r == &path::normalize(&candidate)) {
                continue;
            }
            if self.ignore.dest_equivalent_ignored(dst_root, &candidate, src_root) {
                continue;
            }
            let cand_fps = self.directory_fingerprints(&candidate, false);
            if cand_fps.is_empty() {
                continue;
            }

            let overlap = src_fps.intersection(&cand_fps).count();
            let ratio = overlap as f64 / src_fps.len() as f64;
            if ratio < DIR_MOVE_THRESHOLD {
                continue;
            }

            if !self.config.dry_run {
                if let Err(e) = io::rename_or_copy(&candidate, target) {
                    self.summary
                        .errors
                        .push(format!("move directory {} -> {}: {e}", candidate.display(), target.display()));
                    continue;
                }
            }

            self.reserved_dirs.push(path::normalize(&candidate));
            self.reserved_dirs.push(path::normalize(target));
            self.moved_source_roots.push(entry.to_path_buf());
            if let Some(index) = self.index.as_mut() {
                index.remove_subtree(&candidate);
            }
            self.summary.moved_dirs += 1;
            self.sink.log(
                Severity::Action,
                &format!("Renamed directory {} -> {}", candidate.display(), target.display()),
            );
            return true;
        }

        false
    }

    /// Directory Fingerprint Set (§3): fingerprints of all non-ignored
    /// regular-file descendants, memoized per directory. `apply_source_ignore`
    /// is true for source-side subtrees (filtered through the ignore list)
    /// and false for destination-side candidates (already screened via
    /// `dest_equivalent_ignored` at the call site, one directory at a time).
    fn directory_fingerprints(&mut self, dir: &Path, apply_source_ignore: bool) -> Arc<AHashSet<Fingerprint>> {
        let key = path::normalize(dir);
        if let Some(cached) = self.dir_fp_cache.get(&key) {
            return Arc::clone(cached);
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p == dir || !entry.file_type().is_file() {
                continue;
            }
            if apply_source_ignore && self.ignore.source_ignored(p) {
                continue;
            }
            candidates.push(p.to_path_buf());
        }

        let hash_mode = self.config.hash_mode;
        let set: AHashSet<Fingerprint> = candidates
            .into_par_iter()
            .map(|p| fingerprint::fingerprint(&p, hash_mode))
            .filter(Fingerprint::is_present)
            .collect();

        let set = Arc::new(set);
        self.dir_fp_cache.insert(key, Arc::clone(&set));
        set
    }

    fn visit_symlink(&mut self, entry: &Path, target: &Path) {
        if target.exists() {
            self.reserved_paths.insert(path::normalize(target));
            return;
        }
        if !self.config.dry_run {
            if let Err(e) = io::recreate_symlink(entry, target) {
                self.summary
                    .errors
                    .push(format!("create symlink {}: {e}", target.display()));
                return;
            }
        }
        self.reserved_paths.insert(path::normalize(target));
        self.sink
            .log(Severity::Action, &format!("Created symlink {}", target.display()));
    }

    fn visit_file(&mut self, entry: &Path, target: &Path, dst_root: &Path, tx: Option<&Sender<CopyJob>>) {
        if !target.exists() {
            self.visit_new_file(entry, target, dst_root, tx);
            return;
        }

        self.reserved_paths.insert(path::normalize(target));
        if self.decide_overwrite(entry, target) {
            self.enqueue_copy(entry, target, tx);
        }
    }

    fn visit_new_file(&mut self, entry: &Path, target: &Path, dst_root: &Path, tx: Option<&Sender<CopyJob>>) {
        if self.config.hash_mode == HashMode::Strong {
            let fp = fingerprint::fingerprint(entry, self.config.hash_mode);
            if fp.is_present() {
                let src_root = &self.config.src;
                let candidate = self
                    .index
                    .as_ref()
                    .into_iter()
                    .flat_map(|idx| idx.find(&fp))
                    .cloned()
                    .find(|c| {
                        !self.ignore.dest_equivalent_ignored(dst_root, c, src_root)
                            && !self.reserved_paths.contains(&path::normalize(c))
                            && c.exists()
                    });

                if let Some(candidate) = candidate {
                    if !self.config.dry_run {
                        if let Err(e) = io::rename_or_copy(&candidate, target) {
                            self.summary
                                .errors
                                .push(format!("move file {} -> {}: {e}", candidate.display(), target.display()));
                            self.enqueue_copy(entry, target, tx);
                            return;
                        }
                    }
                    if let Some(index) = self.index.as_mut() {
                        index.remove(&fp, &candidate);
                    }
                    self.reserved_paths.insert(path::normalize(target));
                    self.summary.moved_files += 1;
                    self.sink.log(
                        Severity::Action,
                        &format!("Renamed file {} -> {}", candidate.display(), target.display()),
                    );
                    return;
                }
            }
        }

        self.reserved_paths.insert(path::normalize(target));
        self.enqueue_copy(entry, target, tx);
    }

    /// Case B overwrite decision from §4.5.3.
    fn decide_overwrite(&self, entry: &Path, target: &Path) -> bool {
        let entry_mtime = std::fs::metadata(entry).and_then(|m| m.modified());
        let target_mtime = std::fs::metadata(target).and_then(|m| m.modified());

        if self.config.hash_mode == HashMode::Fast {
            return match (entry_mtime, target_mtime) {
                (Ok(e), Ok(t)) => e > t,
                _ => true,
            };
        }

        let entry_size = std::fs::metadata(entry).map(|m| m.len());
        let target_size = std::fs::metadata(target).map(|m| m.len());
        match (entry_size, target_size) {
            (Ok(_), Ok(_)) => {}
            _ => {
                return match (entry_mtime, target_mtime) {
                    (Ok(e), Ok(t)) => e > t,
                    _ => true,
                };
            }
        }
        if entry_size.unwrap() != target_size.unwrap() {
            return true;
        }

        let fp_entry = fingerprint::fingerprint(entry, HashMode::Strong);
        let fp_target = fingerprint::fingerprint(target, HashMode::Strong);
        !fp_entry.is_present() || !fp_target.is_present() || !fp_entry.matches(&fp_target)
    }

    fn enqueue_copy(&mut self, entry: &Path, target: &Path, tx: Option<&Sender<CopyJob>>) {
        self.summary.copied_files += 1;
        if self.config.dry_run {
            self.sink.log(
                Severity::Action,
                &format!("[DRY-RUN] Would copy {} -> {}", entry.display(), target.display()),
            );
            return;
        }
        if let Some(tx) = tx {
            let _ = tx.send(CopyJob {
                source: entry.to_path_buf(),
                dest: target.to_path_buf(),
            });
        }
    }

    fn run_mirror_pass(&mut self, src_root: &Path, dst_root: &Path) {
        if !dst_root.exists() {
            return;
        }

        let mut candidates: Vec<(PathBuf, bool)> = Vec::new();
        let mut it = WalkDir::new(dst_root).follow_links(false).into_iter();
        loop {
            let entry = match it.next() {
                Some(Ok(e)) => e,
                Some(Err(_)) => continue,
                None => break,
            };
            let p = entry.path();
            if p == dst_root {
                continue;
            }
            if is_control_path(dst_root, p) {
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                continue;
            }

            let norm = path::normalize(p);
            if self.reserved_paths.contains(&norm) {
                continue;
            }
            if self.reserved_dirs.iter().any(|d| path::is_under_normalized(d, &norm)) {
                continue;
            }
            if self.ignore.dest_equivalent_ignored(dst_root, p, src_root) {
                continue;
            }

            let src_equivalent = match path::relative(dst_root, p) {
                Some(rel) => src_root.join(rel),
                None => continue,
            };
            if !src_equivalent.exists() {
                candidates.push((p.to_path_buf(), entry.file_type().is_dir()));
            }
        }

        // Reverse-sorted path order: children removed before parents.
        candidates.sort_by(|a, b| b.0.cmp(&a.0));

        for (victim, is_dir) in candidates {
            let label = if is_dir { "Deleted (directory)" } else { "Deleted" };
            if self.config.dry_run {
                self.sink
                    .log(Severity::Action, &format!("[DRY-RUN] Would delete {}", victim.display()));
                self.summary.deleted += 1;
                continue;
            }
            let result = if is_dir {
                io::remove_dir_recursive(&victim)
            } else {
                io::remove_file_safe(&victim)
            };
            match result {
                Ok(()) => {
                    self.summary.deleted += 1;
                    self.sink.log(Severity::Action, &format!("{label} {}", victim.display()));
                }
                Err(e) => {
                    self.summary
                        .errors
                        .push(format!("delete {}: {e}", victim.display()));
                }
            }
        }
    }
}

fn is_control_path(dst_root: &Path, p: &Path) -> bool {
    let temp = dst_root.join(DRIFT_TEMP_DIR);
    let journal = dst_root.join(DRIFT_JOURNAL_FILE);
    p == temp || p == journal || p.starts_with(&temp)
}

fn build_destination_index(
    dst_root: &Path,
    src_root: &Path,
    ignore: &IgnoreMatcher,
    mode: HashMode,
    sink: &dyn Sink,
) -> Option<DestinationIndex> {
    if mode != HashMode::Strong {
        return None;
    }
    let mut index = DestinationIndex::new();
    if !dst_root.exists() {
        return Some(index);
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    let mut it = WalkDir::new(dst_root).follow_links(false).into_iter();
    loop {
        let entry = match it.next() {
            Some(Ok(e)) => e,
            Some(Err(e)) => {
                sink.log(Severity::Warn, &format!("index build error: {e}"));
                continue;
            }
            None => break,
        };
        let p = entry.path();
        if p == dst_root {
            continue;
        }
        if is_control_path(dst_root, p) {
            if entry.file_type().is_dir() {
                it.skip_current_dir();
            }
            continue;
        }
        if ignore.dest_equivalent_ignored(dst_root, p, src_root) {
            if entry.file_type().is_dir() {
                it.skip_current_dir();
            }
            continue;
        }
        if entry.file_type().is_file() {
            candidates.push(p.to_path_buf());
        }
    }

    // The walk itself stays single-threaded (skip_current_dir needs a
    // sequential iterator); only the fingerprinting, the part that actually
    // reads file content, is handed to rayon.
    let fingerprinted: Vec<(Fingerprint, PathBuf)> = candidates
        .into_par_iter()
        .map(|p| {
            let fp = fingerprint::fingerprint(&p, mode);
            (fp, p)
        })
        .collect();

    for (fp, path) in fingerprinted {
        index.insert(fp, path);
    }

    Some(index)
}

fn perform_copy(job: &CopyJob, temp_dir: &Path, journal: Option<&crate::io::SyncJournal>) -> std::io::Result<()> {
    if let Some(parent) = job.dest.parent() {
        io::ensure_directory(parent)?;
    }
    if job.dest.exists() {
        io::remove_file_safe(&job.dest)?;
    }
    let temp_path = io::generate_temp_path(temp_dir);
    if let Some(journal) = journal {
        journal.record_pending("COPY", &temp_path, &job.dest).ok();
    }
    io::atomic_copy_file_with_metadata(&job.source, &job.dest, &temp_path, true, false, None)?;
    if let Some(journal) = journal {
        journal.record_committed("COPY", &temp_path, &job.dest).ok();
    }
    Ok(())
}
