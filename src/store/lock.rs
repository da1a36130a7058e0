use crate::config::StatePaths;
use crate::shared::errors::{io_error, RelayError};
use crate::shared::logging::{record_event, RuntimeEvent};
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// Per-run writer exclusion. Threads of one process queue on `held`; processes
/// meet at `runs/<runId>.lock`, whose content is the holder's `<pid> <nonce>`.
#[derive(Debug, Clone, Default)]
pub struct RunLocks {
    held: Arc<(Mutex<HashSet<PathBuf>>, Condvar)>,
}

#[derive(Debug)]
pub struct RunLockGuard {
    locks: RunLocks,
    run_id: String,
    lock_path: PathBuf,
    token: String,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_wide() -> Self {
        static LOCKS: OnceLock<RunLocks> = OnceLock::new();
        LOCKS.get_or_init(RunLocks::default).clone()
    }

    pub fn acquire(
        &self,
        paths: &StatePaths,
        run_id: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<RunLockGuard, RelayError> {
        let start = Instant::now();
        let lock_path = canonical_lock_path(paths, run_id)?;
        self.wait_local(&lock_path, run_id, start, timeout)?;

        let token = format!("{} {}", std::process::id(), uuid::Uuid::new_v4().simple());
        let claimed = claim_lock_file(paths, run_id, &lock_path, &token, start, timeout, poll);
        match claimed {
            Ok(()) => Ok(RunLockGuard {
                locks: self.clone(),
                run_id: run_id.to_string(),
                lock_path,
                token,
            }),
            Err(err) => {
                self.release_local(&lock_path);
                Err(err)
            }
        }
    }

    fn wait_local(
        &self,
        lock_path: &Path,
        run_id: &str,
        start: Instant,
        timeout: Duration,
    ) -> Result<(), RelayError> {
        let (held, available) = &*self.held;
        let mut held_paths = held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while held_paths.contains(lock_path) {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(lock_timeout(run_id, start));
            }
            held_paths = available
                .wait_timeout(held_paths, remaining)
                .map(|(held_paths, _)| held_paths)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
        held_paths.insert(lock_path.to_path_buf());
        Ok(())
    }

    fn release_local(&self, lock_path: &Path) {
        let (held, available) = &*self.held;
        let mut held_paths = held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held_paths.remove(lock_path);
        available.notify_all();
    }
}

impl RunLockGuard {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        let still_ours = fs::read_to_string(&self.lock_path)
            .map(|content| content == self.token)
            .unwrap_or(false);
        if still_ours {
            let _ = fs::remove_file(&self.lock_path);
        }
        self.locks.release_local(&self.lock_path);
    }
}

// `/x` and `/x/.` must contend for the same key.
fn canonical_lock_path(paths: &StatePaths, run_id: &str) -> Result<PathBuf, RelayError> {
    let runs_dir = paths.runs_dir();
    fs::create_dir_all(&runs_dir).map_err(|source| io_error(&runs_dir, source))?;
    let runs_dir = fs::canonicalize(&runs_dir).map_err(|source| io_error(&runs_dir, source))?;
    Ok(runs_dir.join(format!("{run_id}.lock")))
}

fn claim_lock_file(
    paths: &StatePaths,
    run_id: &str,
    lock_path: &Path,
    token: &str,
    start: Instant,
    timeout: Duration,
    poll: Duration,
) -> Result<(), RelayError> {
    loop {
        let created = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(lock_path)
            .and_then(|mut file| file.write_all(token.as_bytes()));
        match created {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(io_error(lock_path, err)),
        }

        let observed = match fs::read_to_string(lock_path) {
            Ok(observed) => observed,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_error(lock_path, err)),
        };
        if let Some(owner) = dead_owner(&observed) {
            if break_stale_lock(lock_path, &observed)? {
                record_event(
                    paths,
                    RuntimeEvent::StoreLockBroken,
                    run_id,
                    &format!("owner_pid={owner}"),
                );
            }
            continue;
        }

        if start.elapsed() >= timeout {
            return Err(lock_timeout(run_id, start));
        }
        thread::sleep(poll);
    }
}

/// The pid recorded in a lock file, when that process is gone. This process
/// never counts as gone: its own locks are arbitrated by `RunLocks`.
fn dead_owner(content: &str) -> Option<u32> {
    let pid = content.split_whitespace().next()?.parse::<u32>().ok()?;
    if pid == std::process::id() || is_process_alive(pid) {
        return None;
    }
    Some(pid)
}

/// Moves the lock aside and deletes it only if it still holds `observed`.
/// A lock claimed by someone else in between is linked back into place.
fn break_stale_lock(lock_path: &Path, observed: &str) -> Result<bool, RelayError> {
    let aside = lock_path.with_extension(format!("lock.stale-{}", uuid::Uuid::new_v4().simple()));
    match fs::rename(lock_path, &aside) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(io_error(lock_path, err)),
    }
    let moved = fs::read_to_string(&aside).unwrap_or_default();
    if moved == observed {
        let _ = fs::remove_file(&aside);
        return Ok(true);
    }
    let _ = fs::hard_link(&aside, lock_path);
    let _ = fs::remove_file(&aside);
    Ok(false)
}

fn lock_timeout(run_id: &str, start: Instant) -> RelayError {
    RelayError::LockTimeout {
        run_id: run_id.to_string(),
        waited_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const RUN: &str = "0b6c3f4e-2d1a-4c8b-9e7f-5a4b3c2d1e0f";

    fn reaped_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("reap true");
        pid
    }

    #[test]
    fn guard_removes_its_lock_file_on_drop() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        let locks = RunLocks::new();
        {
            let guard = locks
                .acquire(&paths, RUN, Duration::from_secs(1), Duration::from_millis(5))
                .expect("acquire");
            assert_eq!(guard.run_id(), RUN);
            let token = fs::read_to_string(guard.lock_path()).expect("token");
            assert!(token.starts_with(&format!("{} ", std::process::id())));
        }
        assert!(!paths.run_lock_path(RUN).exists());
    }

    #[test]
    fn second_acquire_in_process_times_out_while_held() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        let locks = RunLocks::new();
        let _held = locks
            .acquire(&paths, RUN, Duration::from_secs(1), Duration::from_millis(5))
            .expect("acquire");
        let err = locks
            .acquire(&paths, RUN, Duration::from_millis(50), Duration::from_millis(5))
            .expect_err("should time out");
        assert!(matches!(err, RelayError::LockTimeout { .. }));

        locks
            .acquire(&paths, "other-run", Duration::from_millis(50), Duration::from_millis(5))
            .expect("other runs are independent");
    }

    #[test]
    fn differently_spelled_roots_share_one_lock() {
        let dir = tempdir().expect("tempdir");
        let plain = StatePaths::new(dir.path());
        let dotted = StatePaths::new(dir.path().join("."));
        let locks = RunLocks::new();

        let _held = locks
            .acquire(&plain, RUN, Duration::from_secs(1), Duration::from_millis(5))
            .expect("acquire");
        let err = locks
            .acquire(&dotted, RUN, Duration::from_millis(60), Duration::from_millis(5))
            .expect_err("same run under another spelling");
        assert!(matches!(err, RelayError::LockTimeout { .. }));
    }

    #[test]
    fn lock_left_by_exited_process_is_broken_and_journaled() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        fs::create_dir_all(paths.runs_dir()).expect("runs dir");
        let dead = reaped_pid();
        fs::write(paths.run_lock_path(RUN), format!("{dead} leftover")).expect("stale lock");

        RunLocks::new()
            .acquire(&paths, RUN, Duration::from_millis(500), Duration::from_millis(5))
            .expect("stale lock is broken");
        let journal = fs::read_to_string(paths.runtime_log_path()).expect("runtime log");
        assert!(journal.contains("store.lock_broken"));
        assert!(journal.contains(&format!("owner_pid={dead}")));
        let strays = fs::read_dir(paths.runs_dir())
            .expect("runs")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains("stale-"))
            .count();
        assert_eq!(strays, 0);
    }

    #[test]
    fn lock_naming_this_process_is_never_broken() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        fs::create_dir_all(paths.runs_dir()).expect("runs dir");
        let foreign = format!("{} someone-else", std::process::id());
        fs::write(paths.run_lock_path(RUN), &foreign).expect("live lock");

        let err = RunLocks::new()
            .acquire(&paths, RUN, Duration::from_millis(60), Duration::from_millis(5))
            .expect_err("live lock holds");
        assert!(matches!(err, RelayError::LockTimeout { .. }));
        assert_eq!(
            fs::read_to_string(paths.run_lock_path(RUN)).expect("lock"),
            foreign
        );
    }

    #[test]
    fn guard_leaves_a_lock_it_no_longer_owns() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        let guard = RunLocks::new()
            .acquire(&paths, RUN, Duration::from_secs(1), Duration::from_millis(5))
            .expect("acquire");
        fs::write(guard.lock_path(), "1 replaced").expect("replace");
        drop(guard);
        assert_eq!(
            fs::read_to_string(paths.run_lock_path(RUN)).expect("lock"),
            "1 replaced"
        );
    }

    #[test]
    fn stale_break_restores_a_lock_claimed_in_between() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run.lock");
        fs::write(&path, "77 fresh").expect("fresh lock");

        let broken = break_stale_lock(&path, "66 stale").expect("break");
        assert!(!broken);
        assert_eq!(fs::read_to_string(&path).expect("restored"), "77 fresh");
    }

    #[test]
    fn concurrent_holders_are_serialized() {
        let dir = tempdir().expect("tempdir");
        let paths = StatePaths::new(dir.path());
        let locks = RunLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let workers = (0..4)
            .map(|_| {
                let locks = locks.clone();
                let paths = paths.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..5 {
                        let _guard = locks
                            .acquire(&paths, RUN, Duration::from_secs(5), Duration::from_millis(1))
                            .expect("acquire");
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().expect("join");
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
