//! Child process management: fork/exec under `PTRACE_TRACEME`, stdio pipes, and a traced
//! variant that hands a [`Tracer`] to callers instead of letting the child run free.
//!
//! Grounded on the original's `Subprocess`/`TracedSubprocess` pair: a plain `Subprocess` owns
//! the pipes and does the fork/exec dance, while `TracedSubprocess` additionally stops the
//! child immediately after `exec` so a `Tracer` can take over before any of the target's own
//! code runs. Move-only ownership here falls out of ordinary Rust semantics (no `Clone` impl)
//! rather than the original's explicit deleted-copy-constructor plus manual move constructor.

use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use nix::sys::ptrace;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, ForkResult, Pid};

use crate::error::{ErrorKind, Result, ResultExt};
use crate::tracer::{RunResult, Tracer};

/// A forked child process with its stdin/stdout/stderr connected via pipes.
pub struct Subprocess {
    child_pid: Pid,
    is_running: bool,
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    stderr_fd: RawFd,
}

impl Subprocess {
    /// Forks and execs `exec` with `args`. The child's stdin/stdout/stderr are redirected to
    /// pipes; environment is inherited unchanged, matching the original's "ENV variables remain
    /// as default" note.
    pub fn new(exec: &str, args: &[String]) -> Result<Self> {
        let (stdin_read, stdin_write) = new_pipe()?;
        let (stdout_read, stdout_write) = new_pipe()?;
        let (stderr_read, stderr_write) = new_pipe()?;

        match unsafe { unistd::fork() }.map_err(|_| ErrorKind::SyscallFailure).context("fork")? {
            ForkResult::Parent { child } => {
                let _ = unistd::close(stdin_read);
                let _ = unistd::close(stdout_write);
                let _ = unistd::close(stderr_write);
                set_nonblocking(stdout_read)?;
                set_nonblocking(stderr_read)?;
                Ok(Subprocess {
                    child_pid: child,
                    is_running: true,
                    stdin_fd: stdin_write,
                    stdout_fd: stdout_read,
                    stderr_fd: stderr_read,
                })
            }
            ForkResult::Child => {
                let _ = unistd::close(stdin_write);
                run_child(exec, args, stdin_read, stdout_write, stderr_write, false);
                unreachable!("run_child never returns");
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.child_pid
    }

    /// Sends `str` on the child's stdin.
    pub fn send_stdin(&mut self, s: &str) -> Result<()> {
        unistd::write(self.stdin_fd, s.as_bytes())
            .map_err(|_| ErrorKind::SyscallFailure)
            .context("writing to child stdin")?;
        Ok(())
    }

    /// Reads whatever the child has written to stdout so far, polling up to `timeout`. Returned
    /// as raw bytes rather than a `String`: a student binary under test is free to write
    /// arbitrary, non-UTF-8 data, and a grading test needs to see exactly what was written rather
    /// than have the harness reject it.
    pub fn read_stdout(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        read_pipe(self.stdout_fd, timeout).context("reading child stdout")
    }

    /// Reads whatever the child has written to stderr so far, polling up to `timeout`.
    pub fn read_stderr(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        read_pipe(self.stderr_fd, timeout).context("reading child stderr")
    }

    /// Blocks until the child exits. Should be called (or implied by `Drop`) before this value
    /// goes out of scope unless the caller already knows the process has exited.
    pub fn wait(&mut self) -> Result<i32> {
        match waitpid(self.child_pid, None) {
            Ok(WaitStatus::Exited(_, code)) => {
                self.is_running = false;
                Ok(code)
            }
            Ok(_) => self.wait(),
            Err(_) => Err(ErrorKind::SyscallFailure).context("waitpid"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        let _ = unistd::close(self.stdin_fd);
        let _ = unistd::close(self.stdout_fd);
        let _ = unistd::close(self.stderr_fd);
        if self.is_running {
            let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
        }
    }
}

/// Drains a non-blocking pipe fd for up to `timeout`, accumulating whatever bytes show up.
fn read_pipe(fd: RawFd, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match unistd::read(fd, &mut chunk) {
            Ok(0) => {}
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(nix::Error::Sys(nix::errno::Errno::EAGAIN)) => {}
            Err(_) => return Err(ErrorKind::SyscallFailure).context("reading from pipe"),
        }

        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(buf)
}

/// A [`Subprocess`] started under `PTRACE_TRACEME`, stopped immediately after `exec` so a
/// [`Tracer`] can drive it from the very first instruction.
pub struct TracedSubprocess {
    inner: Subprocess,
    tracer: Tracer,
}

impl TracedSubprocess {
    pub fn new(exec: &str, args: &[String], arch: crate::arch::SupportedArch) -> Result<Self> {
        let (stdin_read, stdin_write) = new_pipe()?;
        let (stdout_read, stdout_write) = new_pipe()?;
        let (stderr_read, stderr_write) = new_pipe()?;

        match unsafe { unistd::fork() }.map_err(|_| ErrorKind::SyscallFailure).context("fork")? {
            ForkResult::Parent { child } => {
                let _ = unistd::close(stdin_read);
                let _ = unistd::close(stdout_write);
                let _ = unistd::close(stderr_write);
                set_nonblocking(stdout_read)?;
                set_nonblocking(stderr_read)?;

                // The child raised SIGSTOP (or the exec-induced SIGTRAP, depending on kernel)
                // right after `PTRACE_TRACEME` + `execvp`; reap that first stop before handing
                // control to the tracer.
                waitpid(child, None)
                    .map_err(|_| ErrorKind::SyscallFailure)
                    .context("waiting for initial exec-stop")?;

                let tracer = Tracer::new(child, arch);
                tracer.set_default_options()?;

                Ok(TracedSubprocess {
                    inner: Subprocess {
                        child_pid: child,
                        is_running: true,
                        stdin_fd: stdin_write,
                        stdout_fd: stdout_read,
                        stderr_fd: stderr_read,
                    },
                    tracer,
                })
            }
            ForkResult::Child => {
                let _ = unistd::close(stdin_write);
                run_child(exec, args, stdin_read, stdout_write, stderr_write, true);
                unreachable!("run_child never returns");
            }
        }
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn tracer_mut(&mut self) -> &mut Tracer {
        &mut self.tracer
    }

    pub fn run(&mut self, timeout: Option<Duration>) -> Result<RunResult> {
        self.tracer.run(timeout)
    }

    pub fn run_until(
        &mut self,
        timeout: Duration,
        pred: impl FnMut(&crate::registers::Registers) -> bool,
    ) -> Result<RunResult> {
        self.tracer.run_until(timeout, pred)
    }

    /// Blocks until the task exits, honoring `timeout` the way the original's
    /// `wait_for_exit(timeout)` override does, rather than `Subprocess::wait`'s unconditional
    /// block.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> Result<i32> {
        let deadline = Instant::now() + timeout;
        loop {
            match waitpid(self.inner.child_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => {
                    self.inner.is_running = false;
                    return Ok(code);
                }
                Ok(WaitStatus::StillAlive) => {
                    if Instant::now() >= deadline {
                        return Err(ErrorKind::TimedOut).context("waiting for child exit");
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Ok(_) => continue,
                Err(_) => return Err(ErrorKind::SyscallFailure).context("waitpid"),
            }
        }
    }

    pub fn send_stdin(&mut self, s: &str) -> Result<()> {
        self.inner.send_stdin(s)
    }

    pub fn read_stdout(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.inner.read_stdout(timeout)
    }

    pub fn read_stderr(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.inner.read_stderr(timeout)
    }
}

fn new_pipe() -> Result<(RawFd, RawFd)> {
    unistd::pipe()
        .map_err(|_| ErrorKind::SyscallFailure)
        .context("creating pipe")
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|_| ErrorKind::SyscallFailure)
        .context("fcntl(F_GETFL)")?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.insert(OFlag::O_NONBLOCK);
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|_| ErrorKind::SyscallFailure)
        .context("fcntl(F_SETFL)")?;
    Ok(())
}

/// Runs in the forked child: wires up stdio to the given pipe ends, optionally requests
/// tracing, then execs. Never returns.
fn run_child(
    exec: &str,
    args: &[String],
    stdin_read: RawFd,
    stdout_write: RawFd,
    stderr_write: RawFd,
    traced: bool,
) -> ! {
    let _ = unistd::dup2(stdin_read, libc::STDIN_FILENO);
    let _ = unistd::dup2(stdout_write, libc::STDOUT_FILENO);
    let _ = unistd::dup2(stderr_write, libc::STDERR_FILENO);
    let _ = unistd::close(stdin_read);
    let _ = unistd::close(stdout_write);
    let _ = unistd::close(stderr_write);

    if traced {
        let _ = ptrace::traceme();
    }

    let c_exec = std::ffi::CString::new(exec).expect("exec path contained a NUL byte");
    let mut c_args: Vec<std::ffi::CString> = vec![c_exec.clone()];
    c_args.extend(args.iter().map(|a| std::ffi::CString::new(a.as_str()).expect("argument contained a NUL byte")));

    let _ = unistd::execvp(&c_exec, &c_args);
    // execvp only returns on failure.
    std::process::exit(127);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_echo_stdout() {
        let mut proc = Subprocess::new("/bin/echo", &["-n".to_owned(), "Hello".to_owned(), "world!".to_owned()])
            .unwrap();
        let output = proc.read_stdout(Duration::from_millis(50)).unwrap();
        assert_eq!(output, b"Hello world!");
        proc.wait().unwrap();
    }

    #[test]
    fn interacts_with_cat() {
        let mut proc = Subprocess::new("/bin/cat", &[]).unwrap();
        proc.send_stdin("Goodbye dog...").unwrap();
        let output = proc.read_stdout(Duration::from_millis(10)).unwrap();
        assert_eq!(output, b"Goodbye dog...");
    }

    #[test]
    fn reads_stderr_separately_from_stdout() {
        let mut proc = Subprocess::new("/bin/sh", &["-c".to_owned(), "echo out; echo err >&2".to_owned()]).unwrap();
        proc.wait().unwrap();
        let out = proc.read_stdout(Duration::from_millis(50)).unwrap();
        let err = proc.read_stderr(Duration::from_millis(50)).unwrap();
        assert_eq!(out, b"out\n");
        assert_eq!(err, b"err\n");
    }
}
