//! The two-descriptor byte shuttle.
//!
//! One blocking wait on the user terminal and the pty master; readable
//! bytes run through the appropriate pump direction and are written out
//! before the next wait. Bytes in each direction stay strictly ordered.

use crate::pty::{self, read_fd, write_fd, Session};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::wait::{waitpid, WaitPidFlag};
use ptyconv_charset::Charsets;
use ptyconv_core::Iso2022;
use snafu::{prelude::*, Whatever};
use std::io::{Read, Write};
use std::os::fd::AsFd;
use std::os::fd::AsRawFd;
use std::sync::atomic::Ordering;
use tracing::debug;

type Result<T, E = Whatever> = std::result::Result<T, E>;

const BUFFER_SIZE: usize = 4096;

/// One-shot converter: stdin through the output pump to stdout.
pub fn convert(registry: &mut Charsets, output_pump: &mut Iso2022) -> Result<()> {
    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut translated = Vec::with_capacity(2 * BUFFER_SIZE);

    loop {
        let count = stdin.read(&mut buffer).whatever_context("read error")?;
        if count == 0 {
            break;
        }
        translated.clear();
        output_pump.decode(registry, &buffer[..count], &mut translated);
        stdout
            .write_all(&translated)
            .whatever_context("write error")?;
    }
    stdout.flush().whatever_context("write error")?;
    Ok(())
}

/// The interactive session loop.
pub fn run(
    registry: &mut Charsets,
    input_pump: &mut Iso2022,
    output_pump: &mut Iso2022,
    session: Session,
    exit_on_child: bool,
) -> Result<()> {
    // the child signals once its side of the pty is open
    if let Some((from_child, _)) = &session.handshake {
        let mut byte = [0u8; 1];
        let _ = read_fd(from_child.as_raw_fd(), &mut byte);
    }

    pty::install_signal_handlers()?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    pty::copy_termios(&stdin, &session.master)
        .whatever_context("couldn't copy terminal settings")?;
    let saved = pty::raw_mode()?;
    let _ = pty::copy_window_size(stdin.as_raw_fd(), session.master.as_raw_fd());

    if let Some((_, to_child)) = &session.handshake {
        let _ = write_fd(to_child.as_raw_fd(), b"1");
    }
    drop(session.handshake);

    let master = session.master;
    let mut buffer = [0u8; BUFFER_SIZE];
    let mut translated = Vec::with_capacity(2 * BUFFER_SIZE);

    loop {
        let mut fds = [
            PollFd::new(stdin.as_fd(), PollFlags::POLLIN),
            PollFd::new(master.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, PollTimeout::NONE) {
            Err(Errno::EINTR) => {}
            Err(error) => {
                debug!("poll failed: {error}");
                break;
            }
            Ok(_) => {}
        }
        let wanted = PollFlags::POLLIN | PollFlags::POLLERR | PollFlags::POLLHUP;
        let stdin_ready = fds[0].revents().is_some_and(|r| r.intersects(wanted));
        let master_ready = fds[1].revents().is_some_and(|r| r.intersects(wanted));

        if pty::SIGWINCH_SEEN.swap(false, Ordering::Relaxed) {
            let _ = pty::copy_window_size(stdin.as_raw_fd(), master.as_raw_fd());
        }
        if exit_on_child && pty::SIGCHLD_SEEN.load(Ordering::Relaxed) {
            break;
        }

        if master_ready {
            match read_fd(master.as_raw_fd(), &mut buffer) {
                Ok(count) if count > 0 => {
                    translated.clear();
                    output_pump.decode(registry, &buffer[..count], &mut translated);
                    if write_fd(stdout.as_raw_fd(), &translated).is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
        if stdin_ready {
            match read_fd(stdin.as_raw_fd(), &mut buffer) {
                Ok(count) if count > 0 => {
                    translated.clear();
                    input_pump.encode(&buffer[..count], &mut translated);
                    if write_fd(master.as_raw_fd(), &translated).is_err() {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    pty::restore_termios(&saved);
    let _ = waitpid(session.child, Some(WaitPidFlag::WNOHANG));
    Ok(())
}
