//! Daemonization.
//!
//! Detaches the process from its controlling terminal: fork (the parent
//! exits), start a new session, reset the umask, chdir to `/`, and point the
//! standard streams at `/dev/null`. Must be called only after the listening
//! socket is bound and listening, so startup failures still reach the
//! invoking terminal and the bound socket is inherited untouched by the
//! detached child.

use std::io;

/// Detach from the controlling terminal. On success the caller is the
/// daemonized child; the parent process has already exited.
pub fn daemonize() -> io::Result<()> {
    match unsafe { libc::fork() } {
        -1 => return Err(io::Error::last_os_error()),
        0 => {}
        _ => std::process::exit(0),
    }

    let _ = unsafe { libc::umask(0) };

    if unsafe { libc::setsid() } == -1 {
        return Err(io::Error::last_os_error());
    }

    if unsafe { libc::chdir(c"/".as_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }

    redirect_stdio_to_null()
}

fn redirect_stdio_to_null() -> io::Result<()> {
    let fd = unsafe { libc::open(c"/dev/null".as_ptr(), libc::O_RDWR) };
    if fd == -1 {
        return Err(io::Error::last_os_error());
    }

    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        if unsafe { libc::dup2(fd, target) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }

    if fd > libc::STDERR_FILENO {
        unsafe { libc::close(fd) };
    }
    Ok(())
}
