//! ICMP socket transport
//!
//! One socket per session. A raw ICMP socket is preferred; when raw sockets
//! are privilege-gated the kernel's unprivileged datagram ICMP socket is
//! tried instead. Retry policy lives in the session, not here.

use crate::{Error, Result};
use std::io;
use std::net::Ipv4Addr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// How the socket was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketMode {
    /// `SOCK_RAW`: received datagrams include the outer IP header
    Raw,
    /// `SOCK_DGRAM` ping socket: the kernel strips the IP header
    Datagram,
}

/// Snapshot of the socket-level TTL/TOS state
#[derive(Debug, Clone, Copy)]
enum OptionState {
    Default,
    Custom {
        saved_ttl: libc::c_int,
        saved_tos: libc::c_int,
    },
}

/// Blocking ICMP socket bound to the IPv4 family
pub struct IcmpTransport {
    fd: RawFd,
    mode: SocketMode,
    opts: OptionState,
}

impl IcmpTransport {
    /// Open an ICMP socket, falling back from raw to datagram mode
    pub fn open() -> Result<Self> {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_RAW, libc::IPPROTO_ICMP) };
        if fd >= 0 {
            return Ok(Self {
                fd,
                mode: SocketMode::Raw,
                opts: OptionState::Default,
            });
        }

        let err = io::Error::last_os_error();
        if !matches!(err.raw_os_error(), Some(libc::EPERM) | Some(libc::EACCES)) {
            return Err(Error::Io(err));
        }

        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, libc::IPPROTO_ICMP) };
        if fd < 0 {
            return Err(Error::PermissionDenied);
        }

        Ok(Self {
            fd,
            mode: SocketMode::Datagram,
            opts: OptionState::Default,
        })
    }

    pub fn mode(&self) -> SocketMode {
        self.mode
    }

    /// Bind the socket to a specific source address
    pub fn bind_source(&mut self, source: Ipv4Addr) -> Result<()> {
        let addr = sockaddr_in(source);
        let ret = unsafe {
            libc::bind(
                self.fd,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Apply per-call TTL/TOS overrides
    ///
    /// The kernel defaults are snapshotted before the first override so a
    /// later call with no overrides can restore them; the default-vs-custom
    /// state avoids re-querying defaults on repeated calls.
    pub fn apply_options(&mut self, ttl: Option<u8>, tos: Option<u8>) -> Result<()> {
        if ttl.is_none() && tos.is_none() {
            if let OptionState::Custom {
                saved_ttl,
                saved_tos,
            } = self.opts
            {
                self.set_opt(libc::IP_TTL, saved_ttl)?;
                self.set_opt(libc::IP_TOS, saved_tos)?;
                self.opts = OptionState::Default;
            }
            return Ok(());
        }

        if matches!(self.opts, OptionState::Default) {
            let saved_ttl = self.get_opt(libc::IP_TTL)?;
            let saved_tos = self.get_opt(libc::IP_TOS)?;
            self.opts = OptionState::Custom {
                saved_ttl,
                saved_tos,
            };
        }

        if let Some(ttl) = ttl {
            self.set_opt(libc::IP_TTL, ttl as libc::c_int)?;
        }
        if let Some(tos) = tos {
            self.set_opt(libc::IP_TOS, tos as libc::c_int)?;
        }
        Ok(())
    }

    /// Send one datagram; the returned timestamp is t0 for RTT measurement
    pub fn send(&mut self, dest: Ipv4Addr, packet: &[u8]) -> Result<Instant> {
        let addr = sockaddr_in(dest);
        let ret = unsafe {
            libc::sendto(
                self.fd,
                packet.as_ptr() as *const libc::c_void,
                packet.len(),
                0,
                &addr as *const _ as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        let sent_at = Instant::now();
        if ret < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EMSGSIZE) => Error::PacketTooBig,
                Some(libc::ENETUNREACH) => Error::NetUnreachable,
                Some(libc::EHOSTUNREACH) => Error::HostUnreachable,
                _ => Error::SendFailed(err.to_string()),
            });
        }
        Ok(sent_at)
    }

    /// Block until a datagram arrives or the remaining budget expires
    ///
    /// A zero budget still performs one non-blocking poll, so the session's
    /// final drain pass can pick up already-queued datagrams.
    pub fn poll_recv(
        &mut self,
        remaining: Duration,
        buf: &mut [u8],
    ) -> Result<Option<(usize, Ipv4Addr, Instant)>> {
        let deadline = Instant::now() + remaining;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let mut pfd = libc::pollfd {
                fd: self.fd,
                events: libc::POLLIN,
                revents: 0,
            };
            let ret = unsafe { libc::poll(&mut pfd, 1, poll_timeout_ms(left)) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Io(err));
            }
            if ret == 0 {
                return Ok(None);
            }

            let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let n = unsafe {
                libc::recvfrom(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    &mut addr as *mut _ as *mut libc::sockaddr,
                    &mut addr_len,
                )
            };
            let received_at = Instant::now();
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Error::Io(err));
            }

            let from = Ipv4Addr::from(addr.sin_addr.s_addr.to_ne_bytes());
            return Ok(Some((n as usize, from, received_at)));
        }
    }

    fn get_opt(&self, opt: libc::c_int) -> Result<libc::c_int> {
        let mut value: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd,
                libc::IPPROTO_IP,
                opt,
                &mut value as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(value)
    }

    fn set_opt(&self, opt: libc::c_int, value: libc::c_int) -> Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::IPPROTO_IP,
                opt,
                &value as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl AsRawFd for IcmpTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for IcmpTransport {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

fn sockaddr_in(addr: Ipv4Addr) -> libc::sockaddr_in {
    let mut out: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    out.sin_family = libc::AF_INET as libc::sa_family_t;
    out.sin_port = 0;
    out.sin_addr.s_addr = u32::from_ne_bytes(addr.octets());
    out
}

/// Convert the remaining budget to a poll(2) timeout
///
/// A nonzero budget never rounds down to a zero (non-blocking) timeout.
fn poll_timeout_ms(remaining: Duration) -> libc::c_int {
    if remaining.is_zero() {
        return 0;
    }
    let ms = remaining.as_millis().max(1);
    ms.min(libc::c_int::MAX as u128) as libc::c_int
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_rounding() {
        assert_eq!(poll_timeout_ms(Duration::ZERO), 0);
        // Sub-millisecond budgets round up, not down to non-blocking
        assert_eq!(poll_timeout_ms(Duration::from_micros(10)), 1);
        assert_eq!(poll_timeout_ms(Duration::from_millis(50)), 50);
        assert_eq!(poll_timeout_ms(Duration::from_secs(4)), 4000);
    }

    #[test]
    fn test_poll_timeout_clamped() {
        let huge = Duration::from_secs(u64::MAX / 2);
        assert_eq!(poll_timeout_ms(huge), libc::c_int::MAX);
    }

    #[test]
    fn test_sockaddr_roundtrip() {
        let addr = Ipv4Addr::new(192, 0, 2, 7);
        let raw = sockaddr_in(addr);
        assert_eq!(Ipv4Addr::from(raw.sin_addr.s_addr.to_ne_bytes()), addr);
        assert_eq!(raw.sin_port, 0);
    }

    // Opening a socket needs CAP_NET_RAW or an unprivileged ping socket;
    // either outcome is acceptable in a sandboxed test environment.
    #[test]
    fn test_open_reports_mode_or_denial() {
        match IcmpTransport::open() {
            Ok(transport) => {
                assert!(matches!(
                    transport.mode(),
                    SocketMode::Raw | SocketMode::Datagram
                ));
            }
            Err(Error::PermissionDenied) => {}
            Err(other) => panic!("unexpected open error: {}", other),
        }
    }
}
