// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Keyboard playback control.
//!
//! Reads single characters from the controlling terminal in raw,
//! non-blocking mode: space toggles pause, `s` steps one message (implies
//! pause). Ctrl+C stays with the signal handler (ISIG is left enabled).
//! Terminal modes are restored when the listener stops.

use crate::player::PlaybackControls;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Background thread polling stdin for control keys.
pub struct KeyboardListener {
    handle: Option<JoinHandle<()>>,
}

impl KeyboardListener {
    /// Spawn the listener. On a non-tty stdin this is a no-op thread.
    pub fn spawn(controls: Arc<PlaybackControls>) -> Self {
        let handle = std::thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || listen(controls))
            .expect("spawn keyboard thread");
        Self {
            handle: Some(handle),
        }
    }

    /// Wait for the listener thread to exit (it does when the controls'
    /// running flag clears).
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn listen(controls: Arc<PlaybackControls>) {
    let Some(_raw) = RawTerminal::enable() else {
        tracing::debug!("stdin is not a tty, keyboard control disabled");
        return;
    };
    tracing::info!("keyboard control: space = pause, s = step, Ctrl+C = stop");

    while controls.is_running() {
        match read_byte() {
            Some(b' ') => controls.toggle_pause(),
            Some(b's') | Some(b'S') => {
                controls.request_step();
                tracing::debug!("step requested");
            }
            _ => {}
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    // _raw drops here, restoring the terminal.
}

#[cfg(unix)]
struct RawTerminal {
    original: libc::termios,
    original_flags: libc::c_int,
}

#[cfg(unix)]
impl RawTerminal {
    /// Disable canonical mode and echo, make stdin non-blocking. Returns
    /// `None` when stdin is not a terminal.
    fn enable() -> Option<Self> {
        unsafe {
            if libc::isatty(libc::STDIN_FILENO) == 0 {
                return None;
            }

            let mut term: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &mut term) != 0 {
                return None;
            }
            let original = term;

            term.c_lflag &= !(libc::ICANON | libc::ECHO);
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &term) != 0 {
                return None;
            }

            let original_flags = libc::fcntl(libc::STDIN_FILENO, libc::F_GETFL, 0);
            libc::fcntl(
                libc::STDIN_FILENO,
                libc::F_SETFL,
                original_flags | libc::O_NONBLOCK,
            );

            Some(Self {
                original,
                original_flags,
            })
        }
    }
}

#[cfg(unix)]
impl Drop for RawTerminal {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.original);
            libc::fcntl(libc::STDIN_FILENO, libc::F_SETFL, self.original_flags);
        }
    }
}

#[cfg(not(unix))]
struct RawTerminal;

#[cfg(not(unix))]
impl RawTerminal {
    fn enable() -> Option<Self> {
        None
    }
}

#[cfg(unix)]
fn read_byte() -> Option<u8> {
    let mut buf = [0u8; 1];
    let n = unsafe {
        libc::read(
            libc::STDIN_FILENO,
            buf.as_mut_ptr() as *mut libc::c_void,
            1,
        )
    };
    if n > 0 {
        Some(buf[0])
    } else {
        None
    }
}

#[cfg(not(unix))]
fn read_byte() -> Option<u8> {
    None
}
