use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use super::protocol::{MAX_PACKET_SIZE, Packet, PacketHeader, PacketType};
use super::stats::{NetworkStats, PacketLossSimulation};

/// Non-blocking UDP socket speaking [`Packet`]s.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    remote_addr: Option<SocketAddr>,
    stats: NetworkStats,
    loss_sim: PacketLossSimulation,
    recv_buffer: [u8; MAX_PACKET_SIZE],
    send_sequence: u32,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            remote_addr: None,
            stats: NetworkStats::default(),
            loss_sim: PacketLossSimulation::disabled(),
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            send_sequence: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn set_remote(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub fn set_loss_simulation(&mut self, loss_sim: PacketLossSimulation) {
        self.loss_sim = loss_sim;
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Wraps `payload` with the next outgoing sequence number.
    pub fn create_packet(&mut self, payload: PacketType) -> Packet {
        let header = PacketHeader::new(self.send_sequence);
        self.send_sequence = self.send_sequence.wrapping_add(1);
        Packet::new(header, payload)
    }

    /// Returns the number of bytes written. A datagram discarded by loss simulation
    /// still reports success with zero bytes.
    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> io::Result<usize> {
        let data = packet.serialize().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("serialization error: {}", e),
            )
        })?;

        if self.loss_sim.should_drop() {
            self.stats.packets_dropped += 1;
            log::trace!("simulated loss of packet {} to {}", packet.header.sequence, addr);
            return Ok(0);
        }

        let bytes = self.socket.send_to(&data, addr)?;

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += bytes as u64;

        Ok(bytes)
    }

    pub fn send(&mut self, packet: &Packet) -> io::Result<usize> {
        let addr = self
            .remote_addr
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no remote address set"))?;
        self.send_to(packet, addr)
    }

    /// Drains every datagram currently queued on the socket. Malformed packets are
    /// logged and skipped.
    pub fn receive(&mut self) -> io::Result<Vec<(Packet, SocketAddr)>> {
        let mut packets = Vec::new();

        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, addr)) => match Packet::deserialize(&self.recv_buffer[..size]) {
                    Ok(packet) if packet.header.is_valid() => {
                        self.stats.packets_received += 1;
                        self.stats.bytes_received += size as u64;
                        packets.push((packet, addr));
                    }
                    Ok(packet) => {
                        self.stats.packets_rejected += 1;
                        log::warn!(
                            "rejected packet from {} with bad header (magic {:#x}, version {})",
                            addr,
                            packet.header.magic,
                            packet.header.version
                        );
                    }
                    Err(e) => {
                        self.stats.packets_rejected += 1;
                        log::warn!("failed to decode {} byte packet from {}: {}", size, addr, e);
                    }
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }

        Ok(packets)
    }
}
