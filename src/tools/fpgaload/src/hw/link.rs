/*
 * Copyright (C) 2023 Nils Asmussen, Barkhausen Institut
 *
 * This file is part of M3 (Microkernel-based SysteM for Heterogeneous Manycores).
 *
 * M3 is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License version 2 as
 * published by the Free Software Foundation.
 *
 * M3 is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License version 2 for more details.
 */

//! The UDP link to the FPGA
//!
//! Each datagram carries exactly one NoC packet, consisting of a 16-byte header and the payload:
//!
//! ```text
//! 0       2      3       4     6          8                    16
//! +-------+------+-------+-----+----------+--------------------+---------+
//! | tile  | mode | flags | ep  | reserved | address            | payload |
//! +-------+------+-------+-----+----------+--------------------+---------+
//! ```
//!
//! All fields are little endian. Memory accesses are acknowledged by the FPGA: writes with an
//! `Ack`, reads with a `ReadResp` carrying the data. Messages from the tiles (console output) can
//! arrive at any time and are queued until they are received.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use base::mem::GlobOff;
use base::tcu::{EpId, TileId};
use base::util;

use log::trace;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::device::DeviceError;

/// The UDP port of the FPGA
pub const FPGA_PORT: u16 = 1800;
/// The address of FPGA 0; FPGA n has the address `FPGA_BASE_IP + n`
pub const FPGA_BASE_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 42, 240);
/// The maximum payload per packet
pub const MAX_PAYLOAD: usize = 1024;
/// The size of the packet header
pub const HEADER_SIZE: usize = 16;

/// How long to wait for the response to a memory access
const RESP_TIMEOUT: Duration = Duration::from_secs(1);

/// The packet types
#[derive(Copy, Clone, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Mode {
    WriteReq = 0,
    ReadReq = 1,
    ReadResp = 2,
    Message = 3,
    Ack = 4,
}

/// The header of a packet
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    pub tile: TileId,
    pub mode: Mode,
    pub flags: u8,
    pub ep: EpId,
    pub addr: GlobOff,
}

impl Header {
    pub fn new(tile: TileId, mode: Mode, ep: EpId, addr: GlobOff) -> Self {
        Self {
            tile,
            mode,
            flags: 0,
            ep,
            addr,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut res = [0u8; HEADER_SIZE];
        res[0..2].copy_from_slice(&self.tile.raw().to_le_bytes());
        res[2] = self.mode.into();
        res[3] = self.flags;
        res[4..6].copy_from_slice(&self.ep.to_le_bytes());
        res[8..16].copy_from_slice(&self.addr.to_le_bytes());
        res
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DeviceError> {
        let short = || DeviceError::Protocol(format!("short packet with {} bytes", bytes.len()));
        let mode = *bytes.get(2).ok_or_else(short)?;
        Ok(Self {
            tile: TileId::new_from_raw(util::read_u16(bytes, 0).ok_or_else(short)?),
            mode: Mode::try_from(mode)
                .map_err(|_| DeviceError::Protocol(format!("invalid packet mode {}", mode)))?,
            flags: *bytes.get(3).ok_or_else(short)?,
            ep: util::read_u16(bytes, 4).ok_or_else(short)?,
            addr: util::read_u64(bytes, 8).ok_or_else(short)?,
        })
    }
}

/// The connection to one FPGA, shared by all devices of the platform
pub struct Link {
    sock: UdpSocket,
    peer: SocketAddr,
    messages: RefCell<VecDeque<Vec<u8>>>,
}

impl Link {
    /// Connects to FPGA number `fpga`
    pub fn connect(fpga: u8) -> io::Result<Self> {
        let ip = Ipv4Addr::from(u32::from(FPGA_BASE_IP) + fpga as u32);
        let peer = SocketAddr::V4(SocketAddrV4::new(ip, FPGA_PORT));
        let sock = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        sock.connect(peer)?;
        Ok(Self {
            sock,
            peer,
            messages: RefCell::new(VecDeque::new()),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn send(&self, hdr: &Header, payload: &[u8]) -> Result<(), DeviceError> {
        let mut pkt = Vec::with_capacity(HEADER_SIZE + payload.len());
        pkt.extend_from_slice(&hdr.to_bytes());
        pkt.extend_from_slice(payload);
        self.sock.send(&pkt)?;
        Ok(())
    }

    fn recv(&self, timeout: Duration) -> Result<(Header, Vec<u8>), DeviceError> {
        // a zero timeout would mean "block forever"
        self.sock.set_read_timeout(Some(timeout.max(Duration::from_micros(1))))?;
        let mut buf = vec![0u8; HEADER_SIZE + MAX_PAYLOAD];
        let len = match self.sock.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                return Err(DeviceError::Timeout)
            },
            Err(e) => return Err(e.into()),
        };
        let hdr = Header::from_bytes(&buf[..len])?;
        buf.truncate(len);
        buf.drain(..HEADER_SIZE);
        Ok((hdr, buf))
    }

    /// Waits for the response of the given mode from `tile` for `addr`, queueing messages that
    /// arrive in the meantime
    fn wait_for(&self, tile: TileId, mode: Mode, addr: GlobOff) -> Result<Vec<u8>, DeviceError> {
        let end = Instant::now() + RESP_TIMEOUT;
        loop {
            let now = Instant::now();
            if now >= end {
                return Err(DeviceError::Timeout);
            }

            let (hdr, payload) = self.recv(end - now)?;
            if hdr.mode == Mode::Message {
                self.messages.borrow_mut().push_back(payload);
            }
            else if hdr.mode == mode && hdr.tile == tile && hdr.addr == addr {
                return Ok(payload);
            }
            else {
                trace!("ignoring unexpected packet {:?}", hdr);
            }
        }
    }

    /// Writes `data` to `addr` in `tile`
    pub fn write(&self, tile: TileId, addr: GlobOff, data: &[u8]) -> Result<(), DeviceError> {
        for (i, chunk) in data.chunks(MAX_PAYLOAD).enumerate() {
            let off = addr + (i * MAX_PAYLOAD) as GlobOff;
            self.send(&Header::new(tile, Mode::WriteReq, 0, off), chunk)?;
            self.wait_for(tile, Mode::Ack, off)?;
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes from `addr` in `tile`
    pub fn read(&self, tile: TileId, addr: GlobOff, buf: &mut [u8]) -> Result<(), DeviceError> {
        for (i, chunk) in buf.chunks_mut(MAX_PAYLOAD).enumerate() {
            let off = addr + (i * MAX_PAYLOAD) as GlobOff;
            let len = chunk.len() as u32;
            self.send(&Header::new(tile, Mode::ReadReq, 0, off), &len.to_le_bytes())?;
            let data = self.wait_for(tile, Mode::ReadResp, off)?;
            if data.len() != chunk.len() {
                return Err(DeviceError::Protocol(format!(
                    "read of {} bytes at {:#x} returned {} bytes",
                    chunk.len(),
                    off,
                    data.len()
                )));
            }
            chunk.copy_from_slice(&data);
        }
        Ok(())
    }

    pub fn write_u64(&self, tile: TileId, addr: GlobOff, val: u64) -> Result<(), DeviceError> {
        self.write(tile, addr, &val.to_le_bytes())
    }

    pub fn read_u64(&self, tile: TileId, addr: GlobOff) -> Result<u64, DeviceError> {
        let mut buf = [0u8; 8];
        self.read(tile, addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Sends `data` as a message to endpoint `ep` of `tile`
    pub fn send_msg(&self, tile: TileId, ep: EpId, data: &[u8]) -> Result<(), DeviceError> {
        if data.len() > MAX_PAYLOAD {
            return Err(DeviceError::Protocol(format!("message with {} bytes is too large", data.len())));
        }
        self.send(&Header::new(tile, Mode::Message, ep, 0), data)
    }

    /// Receives the next message, waiting at most `timeout`
    pub fn recv_msg(&self, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        if let Some(msg) = self.messages.borrow_mut().pop_front() {
            return Ok(msg);
        }

        let end = Instant::now() + timeout;
        loop {
            let (hdr, payload) = self.recv(end.saturating_duration_since(Instant::now()))?;
            if hdr.mode == Mode::Message {
                return Ok(payload);
            }
            trace!("ignoring unexpected packet {:?}", hdr);
            if Instant::now() >= end {
                return Err(DeviceError::Timeout);
            }
        }
    }
}
