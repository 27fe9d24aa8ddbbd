//! Process helpers: detached forks, command execution and namespaces
//!
//! [`Exec`] runs a program by path with an optional output capture pipe and
//! a hook that runs in the child just before `execve`. Output capture shares
//! one pipe between stdout and (optionally) stderr.

use crate::error::{io_error, process_error, Error, Result};
use nix::sys::signal::{pthread_sigmask, SigSet, SigmaskHow};
use nix::unistd::{fork, ForkResult, Pid};
use std::ffi::OsString;
use std::io::{pipe, PipeReader};
use std::os::fd::OwnedFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, Stdio};
use std::thread;
use tracing::{debug, error, warn};

/// Fork a child whose parent does not need to reap it
///
/// The intermediate child forks again and exits at once, so the grandchild
/// is reparented to init. Returns the intermediate pid in the caller and
/// `None` in the grandchild.
///
/// # Errors
///
/// Returns an error if the first fork fails. The intermediate child exits
/// whether or not the second fork succeeds, so only the caller and the
/// grandchild ever return.
pub fn fork_dont_care() -> Result<Option<Pid>> {
    // SAFETY: the child only forks again or exits before touching shared state
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            let _ = nix::sys::wait::waitpid(child, None);
            Ok(Some(child))
        }
        Ok(ForkResult::Child) => {
            // SAFETY: as above
            match intermediate_exit_code(unsafe { fork() }) {
                Some(code) => std::process::exit(code),
                None => Ok(None),
            }
        }
        Err(e) => Err(fork_failed(e)),
    }
}

/// Exit status for the intermediate child of [`fork_dont_care`], or `None`
/// in the grandchild that carries on
fn intermediate_exit_code(second: nix::Result<ForkResult>) -> Option<i32> {
    match second {
        Ok(ForkResult::Child) => None,
        Ok(ForkResult::Parent { .. }) => Some(0),
        Err(e) => {
            error!("fork failed: {e}");
            Some(1)
        }
    }
}

/// Fork a child that is killed when its parent dies
///
/// Returns the child pid in the parent and `None` in the child. A child that
/// finds itself already orphaned exits with status 1.
///
/// # Errors
///
/// Returns an error if the fork fails.
pub fn fork_no_orphan() -> Result<Option<Pid>> {
    // SAFETY: the child only adjusts its own process state before returning
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(Some(child)),
        Ok(ForkResult::Child) => {
            #[cfg(target_os = "linux")]
            {
                let _ = nix::sys::prctl::set_pdeathsig(nix::sys::signal::Signal::SIGKILL);
                if nix::unistd::getppid() == Pid::from_raw(1) {
                    std::process::exit(1);
                }
            }
            Ok(None)
        }
        Err(e) => Err(fork_failed(e)),
    }
}

fn fork_failed(e: nix::Error) -> Error {
    error!("fork failed: {e}");
    process_error(&format!("fork: {e}"))
}

/// Where the child's stdout goes
#[derive(Debug, Default)]
pub enum Output {
    /// Keep the parent's stdout
    #[default]
    Inherit,
    /// Capture into a pipe readable from [`Spawned::output`]
    Capture,
    /// Redirect to an open descriptor
    Fd(OwnedFd),
}

type PreExec = Box<dyn FnMut() + Send + Sync>;

/// Builder for running an external program
#[derive(Default)]
pub struct Exec {
    argv: Vec<OsString>,
    capture_stderr: bool,
    output: Output,
    pre_exec: Option<PreExec>,
}

impl std::fmt::Debug for Exec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exec")
            .field("argv", &self.argv)
            .field("capture_stderr", &self.capture_stderr)
            .field("output", &self.output)
            .field("pre_exec", &self.pre_exec.is_some())
            .finish()
    }
}

/// A running child started by [`Exec::spawn`]
#[derive(Debug)]
pub struct Spawned {
    child: Child,
    /// Read end of the capture pipe, when [`Output::Capture`] was requested
    pub output: Option<PipeReader>,
}

impl Spawned {
    /// Pid of the child
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the child and return its exit code (-1 if killed by a signal)
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub fn wait(mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .map_err(|e| io_error(format!("wait for {}", self.child.id()), e))?;
        if let Some(signal) = status.signal() {
            debug!("child {} killed by signal {signal}", self.child.id());
        }
        Ok(status.code().unwrap_or(-1))
    }
}

impl Exec {
    /// Run `argv[0]` with the given arguments
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Send stderr to the same destination as stdout
    #[must_use]
    pub fn capture_stderr(mut self, yes: bool) -> Self {
        self.capture_stderr = yes;
        self
    }

    /// Choose where stdout goes
    #[must_use]
    pub fn output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Run `hook` in the child after redirection and before `execve`
    #[must_use]
    pub fn pre_exec<F>(mut self, hook: F) -> Self
    where
        F: FnMut() + Send + Sync + 'static,
    {
        self.pre_exec = Some(Box::new(hook));
        self
    }

    /// Start the program
    ///
    /// # Errors
    ///
    /// Returns an error if `argv` is empty, the pipe cannot be created or the
    /// program cannot be started.
    pub fn spawn(self) -> Result<Spawned> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(process_error("empty argv"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args);

        let mut reader = None;
        let sink: Option<OwnedFd> = match self.output {
            Output::Inherit => None,
            Output::Capture => {
                let (r, w) = pipe().map_err(|e| io_error("pipe", e))?;
                reader = Some(r);
                Some(w.into())
            }
            Output::Fd(fd) => Some(fd),
        };
        if let Some(sink) = sink {
            if self.capture_stderr {
                let err = sink.try_clone().map_err(|e| io_error("dup", e))?;
                cmd.stderr(Stdio::from(err));
            }
            cmd.stdout(Stdio::from(sink));
        }

        let mut hook = self.pre_exec;
        // SAFETY: the closure only changes the child's signal mask and runs
        // the caller's hook, both before execve
        unsafe {
            cmd.pre_exec(move || {
                pthread_sigmask(SigmaskHow::SIG_UNBLOCK, Some(&SigSet::all()), None)?;
                if let Some(hook) = hook.as_mut() {
                    hook();
                }
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| io_error(format!("exec {}", program.to_string_lossy()), e))?;
        debug!("started {} as {}", program.to_string_lossy(), child.id());
        // Close the parent's copies of the write ends
        drop(cmd);
        Ok(Spawned {
            child,
            output: reader,
        })
    }

    /// Run the program to completion and return its exit code
    ///
    /// A child killed by a signal reports -1.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or waited for.
    pub fn run_sync(self) -> Result<i32> {
        self.spawn()?.wait()
    }

    /// Start the program without waiting for it
    ///
    /// The child is reaped on a detached thread. Returns its pid.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    pub fn run_async(self) -> Result<u32> {
        let spawned = self.spawn()?;
        let pid = spawned.pid();
        new_daemon_thread(move || {
            if let Err(e) = spawned.wait() {
                warn!("reaping {pid}: {e}");
            }
        })?;
        Ok(pid)
    }
}

/// Run `argv` to completion with inherited output
///
/// # Errors
///
/// See [`Exec::run_sync`].
pub fn exec_sync<I, S>(argv: I) -> Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    Exec::new(argv).run_sync()
}

/// Start a detached thread running `f`
///
/// # Errors
///
/// Returns an error if the thread cannot be created.
pub fn new_daemon_thread<F>(f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .spawn(f)
        .map(drop)
        .map_err(|e| io_error("spawn thread", e))
}

/// Enter the mount namespace of `pid`
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the process is gone, or the `open` or
/// `setns` failure.
#[cfg(target_os = "linux")]
pub fn switch_mnt_ns(pid: i32) -> Result<()> {
    use std::os::fd::AsRawFd;
    use std::path::PathBuf;

    let path = PathBuf::from(format!("/proc/{pid}/ns/mnt"));
    let ns = match std::fs::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(Error::NotFound(path)),
        Err(e) => return Err(io_error(format!("open {}", path.display()), e)),
    };
    // SAFETY: `ns` is an open namespace descriptor
    if unsafe { libc::setns(ns.as_raw_fd(), libc::CLONE_NEWNS) } == -1 {
        let e = std::io::Error::last_os_error();
        return Err(io_error(format!("setns {}", path.display()), e));
    }
    debug!("entered mount namespace of {pid}");
    Ok(())
}

/// Set the name of the calling thread as shown by `ps` and `/proc/<pid>/comm`
///
/// No-op where the kernel offers no such control.
///
/// # Errors
///
/// Returns an error if `name` contains a NUL byte or `prctl` fails.
pub fn set_nice_name(name: &str) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        let name = std::ffi::CString::new(name)
            .map_err(|_| process_error("process name contains NUL"))?;
        nix::sys::prctl::set_name(&name)
            .map_err(|e| io_error("prctl(PR_SET_NAME)", std::io::Error::from(e)))?;
    }
    #[cfg(not(target_os = "linux"))]
    let _ = name;
    Ok(())
}
