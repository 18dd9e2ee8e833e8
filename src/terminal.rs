//! The local controlling terminal, plus conversion of its termios settings into SSH pty modes.

use std::io::{self, Stdout, Write};
use std::os::fd::{AsFd, BorrowedFd};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size as term_size};
use russh::Pty;
use rustix::event::{PollFd, PollFlags, poll};
use rustix::io::Errno;
use rustix::termios::{self, ControlModes, InputModes, LocalModes, OutputModes, SpecialCodeIndex as Sc, Termios};
use tracing::warn;

use crate::relay::{Geometry, InputEvent, Terminal};

/// Size assumed when the terminal cannot report one.
pub const FALLBACK_GEOMETRY: Geometry = Geometry { cols: 80, rows: 24 };

/// Stdin/stdout of the current process.
pub struct HostTerminal {
    stdout: Stdout,
    raw: bool,
}

impl HostTerminal {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
            raw: false,
        }
    }
}

impl Default for HostTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for HostTerminal {
    fn enter_raw_mode(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        self.raw = true;
        Ok(())
    }

    fn restore_mode(&mut self) -> io::Result<()> {
        self.raw = false;
        disable_raw_mode()
    }

    fn geometry(&self) -> io::Result<Geometry> {
        let (cols, rows) = term_size()?;
        Ok(Geometry::new(cols, rows))
    }

    fn poll_input(&mut self) -> io::Result<InputEvent> {
        poll_byte(io::stdin().as_fd())
    }

    fn write_output(&mut self, data: &[u8]) -> io::Result<()> {
        let mut out = self.stdout.lock();
        out.write_all(data)?;
        out.flush()
    }
}

impl Drop for HostTerminal {
    fn drop(&mut self) {
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}

/// Zero-wait check of `fd`, reading one byte if it is ready.
///
/// An fd that poll reports invalid or in error counts as closed input, so it is reported
/// once rather than failing on every tick.
fn poll_byte(fd: BorrowedFd<'_>) -> io::Result<InputEvent> {
    let mut fds = [PollFd::new(&fd, PollFlags::IN)];
    if poll(&mut fds, 0)? == 0 {
        return Ok(InputEvent::Idle);
    }
    if fds[0].revents().intersects(PollFlags::NVAL | PollFlags::ERR) {
        return Ok(InputEvent::Eof);
    }
    let mut byte = [0u8; 1];
    match rustix::io::read(fd, &mut byte) {
        Ok(0) => Ok(InputEvent::Eof),
        Ok(_) => Ok(InputEvent::Byte(byte[0])),
        Err(Errno::INTR | Errno::AGAIN) => Ok(InputEvent::Idle),
        Err(err) => Err(err.into()),
    }
}

/// Current terminal size, or [`FALLBACK_GEOMETRY`].
pub fn initial_geometry() -> Geometry {
    term_size()
        .map(|(cols, rows)| Geometry::new(cols.max(1), rows.max(1)))
        .unwrap_or(FALLBACK_GEOMETRY)
}

/// Read the host terminal settings if possible and convert them into SSH pty modes.
pub fn current_pty_modes() -> Vec<(Pty, u32)> {
    let stdin = io::stdin();
    match termios::tcgetattr(stdin.as_fd()) {
        Ok(term) => modes_from_termios(&term),
        Err(err) => {
            warn!(?err, "failed to read local termios; falling back to defaults");
            default_pty_modes()
        }
    }
}

const DEFAULT_SPEED: u32 = 38400;

/// Cooked-mode defaults for when stdin is not a terminal.
pub fn default_pty_modes() -> Vec<(Pty, u32)> {
    let mut modes = vec![
        (Pty::VINTR, 0x03),
        (Pty::VQUIT, 0x1c),
        (Pty::VERASE, 0x7f),
        (Pty::VKILL, 0x15),
        (Pty::VEOF, 0x04),
        (Pty::VSTART, 0x11),
        (Pty::VSTOP, 0x13),
        (Pty::VSUSP, 0x1a),
    ];
    for pty in [
        Pty::ISIG,
        Pty::ICANON,
        Pty::ECHO,
        Pty::ECHOE,
        Pty::ECHOK,
        Pty::IEXTEN,
        Pty::IXON,
        Pty::ICRNL,
        Pty::OPOST,
        Pty::ONLCR,
        Pty::CS8,
    ] {
        modes.push((pty, 1));
    }
    modes.push((Pty::TTY_OP_OSPEED, DEFAULT_SPEED));
    modes.push((Pty::TTY_OP_ISPEED, DEFAULT_SPEED));
    modes
}

const SPECIAL_CODES: &[(Sc, Pty)] = &[
    (Sc::VINTR, Pty::VINTR),
    (Sc::VQUIT, Pty::VQUIT),
    (Sc::VERASE, Pty::VERASE),
    (Sc::VKILL, Pty::VKILL),
    (Sc::VEOF, Pty::VEOF),
    (Sc::VSTART, Pty::VSTART),
    (Sc::VSTOP, Pty::VSTOP),
    (Sc::VSUSP, Pty::VSUSP),
    (Sc::VEOL, Pty::VEOL),
    (Sc::VEOL2, Pty::VEOL2),
];

const LOCAL_FLAGS: &[(LocalModes, Pty)] = &[
    (LocalModes::ISIG, Pty::ISIG),
    (LocalModes::ICANON, Pty::ICANON),
    (LocalModes::ECHO, Pty::ECHO),
    (LocalModes::ECHOE, Pty::ECHOE),
    (LocalModes::ECHOK, Pty::ECHOK),
    (LocalModes::IEXTEN, Pty::IEXTEN),
];

const INPUT_FLAGS: &[(InputModes, Pty)] = &[
    (InputModes::IXON, Pty::IXON),
    (InputModes::IXOFF, Pty::IXOFF),
    (InputModes::IGNPAR, Pty::IGNPAR),
    (InputModes::INPCK, Pty::INPCK),
    (InputModes::ISTRIP, Pty::ISTRIP),
    (InputModes::ICRNL, Pty::ICRNL),
    (InputModes::IGNCR, Pty::IGNCR),
];

const OUTPUT_FLAGS: &[(OutputModes, Pty)] = &[
    (OutputModes::OPOST, Pty::OPOST),
    (OutputModes::ONLCR, Pty::ONLCR),
    (OutputModes::OCRNL, Pty::OCRNL),
    (OutputModes::ONOCR, Pty::ONOCR),
    (OutputModes::ONLRET, Pty::ONLRET),
];

fn modes_from_termios(term: &Termios) -> Vec<(Pty, u32)> {
    let codes = &term.special_codes;
    let mut modes: Vec<(Pty, u32)> = SPECIAL_CODES
        .iter()
        .map(|&(index, pty)| (pty, u32::from(codes[index])))
        .collect();

    modes.extend(LOCAL_FLAGS.iter().map(|&(flag, pty)| (pty, term.local_modes.contains(flag).into())));
    modes.extend(INPUT_FLAGS.iter().map(|&(flag, pty)| (pty, term.input_modes.contains(flag).into())));
    modes.extend(OUTPUT_FLAGS.iter().map(|&(flag, pty)| (pty, term.output_modes.contains(flag).into())));

    let control = term.control_modes;
    modes.push((Pty::PARENB, control.contains(ControlModes::PARENB).into()));
    modes.push((Pty::PARODD, control.contains(ControlModes::PARODD).into()));
    if control.contains(ControlModes::CS8) {
        modes.push((Pty::CS8, 1));
    } else if control.contains(ControlModes::CS7) {
        modes.push((Pty::CS7, 1));
    }

    modes.push((Pty::TTY_OP_OSPEED, term.output_speed()));
    modes.push((Pty::TTY_OP_ISPEED, term.input_speed()));
    modes
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write as _;
    use std::os::unix::net::UnixStream;

    #[test]
    fn input_bytes_arrive_one_at_a_time() {
        let (ours, mut peer) = UnixStream::pair().unwrap();
        assert_eq!(poll_byte(ours.as_fd()).unwrap(), InputEvent::Idle);

        peer.write_all(b"ok").unwrap();
        assert_eq!(poll_byte(ours.as_fd()).unwrap(), InputEvent::Byte(b'o'));
        assert_eq!(poll_byte(ours.as_fd()).unwrap(), InputEvent::Byte(b'k'));

        drop(peer);
        assert_eq!(poll_byte(ours.as_fd()).unwrap(), InputEvent::Eof);
    }

    #[test]
    fn invalid_fd_reads_as_closed_input() {
        // SAFETY: the number is far above any fd this process opens; it is only polled,
        // and poll flags it invalid without touching a file.
        let fd = unsafe { BorrowedFd::borrow_raw(999_983) };
        assert_eq!(poll_byte(fd).unwrap(), InputEvent::Eof);
    }

    #[test]
    fn default_modes_describe_a_cooked_terminal() {
        let modes = default_pty_modes();
        assert!(modes.contains(&(Pty::ICANON, 1)));
        assert!(modes.contains(&(Pty::VINTR, 0x03)));
        assert!(modes.contains(&(Pty::TTY_OP_ISPEED, DEFAULT_SPEED)));
    }
}
