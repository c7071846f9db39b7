//! Pseudo-terminal plumbing: allocation, termios handling, window-size
//! propagation, signal flags, and spawning the child on the pty.

use nix::pty::{openpty, Winsize};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::termios::{
    self, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices, Termios,
};
use nix::unistd::{dup2, execvp, fork, pipe, setsid, ForkResult, Pid};
use snafu::{prelude::*, Whatever};
use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

type Result<T, E = Whatever> = std::result::Result<T, E>;

pub static SIGWINCH_SEEN: AtomicBool = AtomicBool::new(false);
pub static SIGCHLD_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn note_sigwinch(_: libc::c_int) {
    SIGWINCH_SEEN.store(true, Ordering::Relaxed);
}

extern "C" fn note_sigchld(_: libc::c_int) {
    SIGCHLD_SEEN.store(true, Ordering::Relaxed);
}

/// Installs the SIGWINCH/SIGCHLD flag handlers. No SA_RESTART: the
/// shuttle relies on EINTR to notice the flags promptly.
pub fn install_signal_handlers() -> Result<()> {
    let winch = SigAction::new(
        SigHandler::Handler(note_sigwinch),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let chld = SigAction::new(
        SigHandler::Handler(note_sigchld),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGWINCH, &winch)
            .whatever_context("couldn't install SIGWINCH handler")?;
        sigaction(Signal::SIGCHLD, &chld).whatever_context("couldn't install SIGCHLD handler")?;
    }
    Ok(())
}

nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, Winsize);
nix::ioctl_write_ptr_bad!(tiocswinsz, libc::TIOCSWINSZ, Winsize);
nix::ioctl_write_int_bad!(tiocsctty, libc::TIOCSCTTY);

/// Reads once from a descriptor, retrying on EINTR.
pub fn read_fd(fd: i32, buffer: &mut [u8]) -> std::io::Result<usize> {
    loop {
        let count = unsafe { libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len()) };
        if count >= 0 {
            return Ok(count as usize);
        }
        let error = std::io::Error::last_os_error();
        if error.kind() != std::io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Writes the whole buffer to a descriptor, retrying on EINTR and short
/// writes.
pub fn write_fd(fd: i32, mut buffer: &[u8]) -> std::io::Result<()> {
    while !buffer.is_empty() {
        let count = unsafe { libc::write(fd, buffer.as_ptr().cast(), buffer.len()) };
        if count >= 0 {
            buffer = &buffer[count as usize..];
            continue;
        }
        let error = std::io::Error::last_os_error();
        if error.kind() != std::io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
    Ok(())
}

/// Copies the terminal size from one descriptor to another.
pub fn copy_window_size(from: i32, to: i32) -> nix::Result<()> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    unsafe {
        tiocgwinsz(from, &mut size)?;
        tiocswinsz(to, &size)?;
    }
    Ok(())
}

/// Copies the terminal settings from one descriptor to another.
pub fn copy_termios(from: impl AsFd, to: impl AsFd) -> nix::Result<()> {
    let settings = termios::tcgetattr(from)?;
    termios::tcsetattr(to, SetArg::TCSAFLUSH, &settings)
}

/// Puts the user's terminal into raw mode and returns the saved settings.
pub fn raw_mode() -> Result<Termios> {
    let stdin = std::io::stdin();
    let saved = termios::tcgetattr(&stdin).whatever_context("couldn't read terminal settings")?;

    let mut raw = saved.clone();
    raw.local_flags -= LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::ISIG;
    raw.input_flags -=
        InputFlags::ICRNL | InputFlags::IXOFF | InputFlags::IXON | InputFlags::ISTRIP;
    raw.output_flags -= OutputFlags::ONLCR | OutputFlags::OCRNL | OutputFlags::ONOCR;
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    termios::tcsetattr(&stdin, SetArg::TCSAFLUSH, &raw)
        .whatever_context("couldn't set terminal to raw")?;
    Ok(saved)
}

pub fn restore_termios(saved: &Termios) {
    let _ = termios::tcsetattr(std::io::stdin(), SetArg::TCSAFLUSH, saved);
}

/// A running child attached to a pty.
pub struct Session {
    pub master: OwnedFd,
    pub child: Pid,
    /// `(from_child, to_child)` when the handshake option is on.
    pub handshake: Option<(OwnedFd, OwnedFd)>,
}

/// Allocates a pty, forks, and runs the command on the slave side. The
/// child becomes a session leader with the pty as controlling terminal
/// on its standard descriptors.
pub fn spawn(program: &str, args: &[String], handshake: bool) -> Result<Session> {
    let ends = openpty(None::<&Winsize>, None::<&Termios>)
        .whatever_context("couldn't allocate pty")?;
    let (master, slave) = (ends.master, ends.slave);

    let program_c =
        CString::new(program).whatever_context("program name contains a NUL byte")?;
    let args_c: Vec<CString> = args
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<std::result::Result<_, _>>()
        .whatever_context("argument contains a NUL byte")?;

    let pipes = if handshake {
        let p2c = pipe().whatever_context("couldn't create pipe")?;
        let c2p = pipe().whatever_context("couldn't create pipe")?;
        Some((p2c, c2p))
    } else {
        None
    };

    debug!("forking to run {program}");
    match unsafe { fork() }.whatever_context("couldn't fork")? {
        ForkResult::Child => {
            drop(master);
            let (p2c_read, c2p_write) = match pipes {
                Some(((p2c_read, p2c_write), (c2p_read, c2p_write))) => {
                    drop(p2c_write);
                    drop(c2p_read);
                    (Some(p2c_read), Some(c2p_write))
                }
                None => (None, None),
            };
            child(slave, &program_c, &args_c, p2c_read, c2p_write);
        }
        ForkResult::Parent { child } => {
            drop(slave);
            let handshake = pipes.map(|((p2c_read, p2c_write), (c2p_read, c2p_write))| {
                drop(p2c_read);
                drop(c2p_write);
                (c2p_read, p2c_write)
            });
            Ok(Session {
                master,
                child,
                handshake,
            })
        }
    }
}

fn child(
    slave: OwnedFd,
    program: &CString,
    args: &[CString],
    p2c_read: Option<OwnedFd>,
    c2p_write: Option<OwnedFd>,
) -> ! {
    fn fail(message: &str) -> ! {
        eprintln!("{message}");
        unsafe { libc::_exit(1) }
    }

    if setsid().is_err() {
        fail("couldn't create session");
    }
    if unsafe { tiocsctty(slave.as_raw_fd(), 0) }.is_err() {
        fail("couldn't set controlling terminal");
    }

    if let Some(fd) = c2p_write {
        let _ = write_fd(fd.as_raw_fd(), b"1");
    }

    // size the pty from the real terminal while descriptor 0 still is it
    let _ = copy_window_size(0, slave.as_raw_fd());

    let raw_slave = slave.as_raw_fd();
    for target in 0..=2 {
        if raw_slave != target && dup2(raw_slave, target).is_err() {
            fail("couldn't attach pty to standard descriptors");
        }
    }
    if raw_slave > 2 {
        drop(slave);
    } else {
        std::mem::forget(slave);
    }

    if let Some(fd) = p2c_read {
        let mut byte = [0u8; 1];
        let _ = read_fd(fd.as_raw_fd(), &mut byte);
    }

    let _ = execvp(program, args);
    fail("couldn't exec");
}
