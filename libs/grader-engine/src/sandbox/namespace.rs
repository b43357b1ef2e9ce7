//! Namespace confinement for the process backend (Linux only).
//!
//! The spawned child unshares user, PID, mount, network and IPC namespaces,
//! maps its own uid/gid, mounts an empty tmpfs over the temp root so sibling
//! workspaces disappear, and binds its own workspace back in place. It then
//! forks twice: the first fork is PID 1 of the new PID namespace and the
//! second becomes the candidate. When PID 1 exits the kernel kills whatever
//! is left in the namespace, so detached descendants die with the run.
//!
//! Everything in `enter` runs between fork and exec and only makes raw
//! syscalls on buffers prepared by `for_workspace`.
use anyhow::{Context, Result};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::ptr;

const NAMESPACE_FLAGS: libc::c_int = libc::CLONE_NEWUSER
    | libc::CLONE_NEWPID
    | libc::CLONE_NEWNS
    | libc::CLONE_NEWNET
    | libc::CLONE_NEWIPC;

/// Exit status of a supervisor that lost track of its child
const SUPERVISOR_FAILURE_EXIT: libc::c_int = 125;
const FD_SCAN_CEILING: libc::c_long = 65536;

/// Paths and id maps for one confined spawn, built before fork
pub(crate) struct NamespacePlan {
    uid_map: Vec<u8>,
    gid_map: Vec<u8>,
    workspace: CString,
    hidden_root: Option<CString>,
}

impl NamespacePlan {
    pub(crate) fn for_workspace(workspace: &Path) -> Result<Self> {
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };

        // Never hide `/` itself
        let hidden_root = match workspace.parent() {
            Some(parent) if parent.parent().is_some() => Some(c_path(parent)?),
            _ => None,
        };

        Ok(Self {
            uid_map: format!("{} {} 1", uid, uid).into_bytes(),
            gid_map: format!("{} {} 1", gid, gid).into_bytes(),
            workspace: c_path(workspace)?,
            hidden_root,
        })
    }

    /// Runs in the forked child with the workspace as working directory.
    /// Returns only in the process that goes on to exec the candidate.
    pub(crate) fn enter(&self) -> io::Result<()> {
        unsafe {
            check(libc::unshare(NAMESPACE_FLAGS))?;

            write_file(b"/proc/self/setgroups\0", b"deny")?;
            write_file(b"/proc/self/uid_map\0", &self.uid_map)?;
            write_file(b"/proc/self/gid_map\0", &self.gid_map)?;

            check(libc::mount(
                ptr::null(),
                b"/\0".as_ptr().cast(),
                ptr::null(),
                libc::MS_REC | libc::MS_PRIVATE,
                ptr::null(),
            ))?;

            if let Some(root) = &self.hidden_root {
                check(libc::mount(
                    b"tmpfs\0".as_ptr().cast(),
                    root.as_ptr(),
                    b"tmpfs\0".as_ptr().cast(),
                    libc::MS_NOSUID | libc::MS_NODEV,
                    b"mode=1777,size=16m\0".as_ptr().cast(),
                ))?;
                check(libc::mkdir(self.workspace.as_ptr(), 0o700))?;
                // The working directory still points at the shadowed workspace
                check(libc::mount(
                    b".\0".as_ptr().cast(),
                    self.workspace.as_ptr(),
                    ptr::null(),
                    libc::MS_BIND | libc::MS_REC,
                    ptr::null(),
                ))?;
                check(libc::chdir(self.workspace.as_ptr()))?;
            }

            match libc::fork() {
                -1 => return Err(io::Error::last_os_error()),
                0 => {}
                init => supervise(init),
            }

            // PID 1 of the new namespace
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong);
            // Fails when the host masks parts of /proc; the host view is kept then
            let _ = libc::mount(
                b"proc\0".as_ptr().cast(),
                b"/proc\0".as_ptr().cast(),
                b"proc\0".as_ptr().cast(),
                libc::MS_NOSUID | libc::MS_NODEV | libc::MS_NOEXEC,
                ptr::null(),
            );

            match libc::fork() {
                -1 => return Err(io::Error::last_os_error()),
                0 => {}
                candidate => supervise(candidate),
            }

            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong);
        }
        Ok(())
    }
}

/// Whether an unprivileged child can enter the namespaces on this host
pub(crate) fn supported() -> bool {
    let Ok(workspace) = tempfile::Builder::new().prefix("grader-check-").tempdir() else {
        return false;
    };
    let Ok(plan) = NamespacePlan::for_workspace(workspace.path()) else {
        return false;
    };

    let mut command = Command::new("sh");
    command
        .args(["-c", "exit 0"])
        .current_dir(workspace.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        command.pre_exec(move || plan.enter());
    }

    matches!(command.status(), Ok(status) if status.success())
}

/// Wait for `child`, reaping anything else that lands here, then exit with its status
unsafe fn supervise(child: libc::pid_t) -> ! {
    close_all_fds();

    let mut status: libc::c_int = 0;
    loop {
        let reaped = libc::waitpid(-1, &mut status, 0);
        if reaped == child {
            libc::_exit(mirrored_status(status));
        }
        if reaped == -1 && io::Error::last_os_error().raw_os_error() != Some(libc::EINTR) {
            libc::_exit(SUPERVISOR_FAILURE_EXIT);
        }
    }
}

/// Exit code that reproduces `status` for whoever waits on the supervisor
fn mirrored_status(status: libc::c_int) -> libc::c_int {
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        SUPERVISOR_FAILURE_EXIT
    }
}

/// Supervisors must not hold the output pipes or the spawn error pipe open
unsafe fn close_all_fds() {
    let closed = libc::syscall(
        libc::SYS_close_range,
        0 as libc::c_uint,
        libc::c_uint::MAX,
        0 as libc::c_uint,
    );
    if closed == 0 {
        return;
    }

    let max = libc::sysconf(libc::_SC_OPEN_MAX);
    let max = if max <= 0 { 1024 } else { max.min(FD_SCAN_CEILING) };
    for fd in 0..max as libc::c_int {
        libc::close(fd);
    }
}

unsafe fn write_file(path: &[u8], contents: &[u8]) -> io::Result<()> {
    let fd = libc::open(path.as_ptr().cast(), libc::O_WRONLY | libc::O_CLOEXEC);
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let written = libc::write(fd, contents.as_ptr().cast(), contents.len());
    let error = io::Error::last_os_error();
    libc::close(fd);

    if written < 0 || written as usize != contents.len() {
        return Err(error);
    }
    Ok(())
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("Path contains a NUL byte: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_hides_the_temp_root() {
        let plan = NamespacePlan::for_workspace(Path::new("/tmp/grader-abc")).unwrap();
        assert_eq!(plan.workspace.as_bytes(), b"/tmp/grader-abc");
        assert_eq!(plan.hidden_root.as_ref().unwrap().as_bytes(), b"/tmp");

        let uid = unsafe { libc::getuid() };
        assert_eq!(plan.uid_map, format!("{} {} 1", uid, uid).into_bytes());
    }

    #[test]
    fn test_plan_never_hides_the_filesystem_root() {
        let plan = NamespacePlan::for_workspace(Path::new("/grader-abc")).unwrap();
        assert!(plan.hidden_root.is_none());
    }

    #[test]
    fn test_mirrored_status() {
        // Raw wait statuses: exit code in the second byte, signal in the low bits
        assert_eq!(mirrored_status(3 << 8), 3);
        assert_eq!(mirrored_status(libc::SIGXCPU), 128 + libc::SIGXCPU);
        assert_eq!(mirrored_status(libc::SIGKILL), 137);
    }
}
