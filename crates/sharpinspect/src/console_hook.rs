//! Redirects stdout/stderr writes (and, optionally, `tracing` events) into
//! [`ConsoleEntry`] values (spec §4.4).

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sharpinspect_core::{
    ConsoleEntry, ConsoleEntryEvent, EventBus, LogLevel, Options, SharedClock, Store,
};

const PARTIAL_WRITE_FLUSH_BYTES: usize = 64 * 1024;

type ConsoleStore = Store<ConsoleEntry>;

/// Handle to the installed hook. Dropping (or calling [`ConsoleHook::uninstall`])
/// restores the original stdout/stderr file descriptors.
pub struct ConsoleHook {
    #[cfg(unix)]
    inner: Option<unix::Installed>,
    installed: Arc<AtomicBool>,
}

impl ConsoleHook {
    /// Install fd-level capture of stdout and stderr. Installation errors
    /// leave the original streams intact (spec §4.4 "Fails gracefully").
    pub fn install(options: Arc<Options>, store: Arc<ConsoleStore>, bus: Arc<EventBus>) -> Self {
        Self::install_with_clock(options, store, bus, sharpinspect_core::system_clock())
    }

    pub fn install_with_clock(
        options: Arc<Options>,
        store: Arc<ConsoleStore>,
        bus: Arc<EventBus>,
        clock: SharedClock,
    ) -> Self {
        let installed = Arc::new(AtomicBool::new(false));

        #[cfg(unix)]
        {
            match unix::install(options, store, bus, clock, installed.clone()) {
                Ok(inner) => {
                    installed.store(true, Ordering::SeqCst);
                    return Self {
                        inner: Some(inner),
                        installed,
                    };
                }
                Err(err) => {
                    tracing::warn!(error = %err, "sharpinspect: failed to install console hook, leaving stdio untouched");
                    return Self {
                        inner: None,
                        installed,
                    };
                }
            }
        }

        #[cfg(not(unix))]
        {
            tracing::warn!("sharpinspect: raw stdio capture is only implemented on unix; console capture limited to the tracing layer");
            Self { installed }
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::SeqCst)
    }

    pub fn uninstall(&mut self) {
        #[cfg(unix)]
        if let Some(inner) = self.inner.take() {
            inner.restore();
        }
        self.installed.store(false, Ordering::SeqCst);
    }
}

impl Drop for ConsoleHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

fn append_and_publish(
    store: &ConsoleStore,
    bus: &EventBus,
    options: &Options,
    clock: &dyn sharpinspect_core::Clock,
    message: String,
    level: LogLevel,
    category: &str,
) {
    if level < options.min_log_level {
        return;
    }
    let category = category.to_string();
    let (_id, entry) = store.append_and_get(|id| ConsoleEntry {
        id,
        timestamp: clock.now_utc(),
        message: message.clone(),
        level,
        category: category.clone(),
        source: None,
    });
    bus.console.publish_async(ConsoleEntryEvent(entry));
}

/// Splits a byte stream on `\n`, force-flushing a line if it exceeds
/// `PARTIAL_WRITE_FLUSH_BYTES` without a terminator (spec §4.4).
struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop(); // drop '\n'
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                lines.push(String::from_utf8_lossy(&line).into_owned());
            } else if self.buffer.len() > PARTIAL_WRITE_FLUSH_BYTES {
                let line: Vec<u8> = self.buffer.drain(..).collect();
                lines.push(String::from_utf8_lossy(&line).into_owned());
            } else {
                break;
            }
        }
        lines
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};
    use std::os::unix::io::OwnedFd;

    pub struct Installed {
        stdout: RedirectedStream,
        stderr: RedirectedStream,
    }

    impl Installed {
        pub fn restore(self) {
            sharpinspect_core::clear_panic_fallback_fd();
            self.stdout.restore();
            self.stderr.restore();
        }
    }

    struct RedirectedStream {
        target_fd: RawFd,
        saved_original: OwnedFd,
    }

    impl RedirectedStream {
        fn restore(self) {
            unsafe {
                libc::dup2(self.saved_original.as_raw_fd(), self.target_fd);
            }
        }
    }

    pub fn install(
        options: Arc<Options>,
        store: Arc<ConsoleStore>,
        bus: Arc<EventBus>,
        clock: SharedClock,
        _installed: Arc<AtomicBool>,
    ) -> std::io::Result<Installed> {
        let stdout = redirect(
            libc::STDOUT_FILENO,
            "stdout",
            LogLevel::Information,
            options.clone(),
            store.clone(),
            bus.clone(),
            clock.clone(),
        )?;
        let stderr = redirect(
            libc::STDERR_FILENO,
            "stderr",
            LogLevel::Error,
            options,
            store,
            bus,
            clock,
        )?;
        // The panic-isolation path in sharpinspect-core needs a route to the
        // real stderr that doesn't loop back through the now-redirected fd 2.
        sharpinspect_core::set_panic_fallback_fd(stderr.saved_original.as_raw_fd());
        Ok(Installed { stdout, stderr })
    }

    fn redirect(
        target_fd: RawFd,
        category: &'static str,
        level: LogLevel,
        options: Arc<Options>,
        store: Arc<ConsoleStore>,
        bus: Arc<EventBus>,
        clock: SharedClock,
    ) -> std::io::Result<RedirectedStream> {
        let mut fds: [RawFd; 2] = [-1, -1];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let read_fd = fds[0];
        let write_fd = fds[1];

        let saved_original = unsafe {
            let dup = libc::dup(target_fd);
            if dup < 0 {
                return Err(std::io::Error::last_os_error());
            }
            OwnedFd::from_raw_fd(dup)
        };

        if unsafe { libc::dup2(write_fd, target_fd) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        unsafe { libc::close(write_fd) };

        std::thread::Builder::new()
            .name(format!("sharpinspect-console-{category}"))
            .spawn(move || {
                let mut file = unsafe { std::fs::File::from_raw_fd(read_fd) };
                let mut splitter = LineSplitter::new();
                let mut chunk = [0u8; 8192];
                loop {
                    match file.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            for line in splitter.feed(&chunk[..n]) {
                                append_and_publish(
                                    &store,
                                    &bus,
                                    &options,
                                    clock.as_ref(),
                                    line,
                                    level,
                                    category,
                                );
                            }
                        }
                        Err(_) => break,
                    }
                }
            })?;

        Ok(RedirectedStream {
            target_fd,
            saved_original,
        })
    }
}
