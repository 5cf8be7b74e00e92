//! Sampler interface: the small, closed set of operations the analysis
//! core needs from an S7 controller. Expressed as a trait because the
//! core's own tests drive a deterministic fake; production wiring drives
//! the TCP implementation. No plugin mechanism is needed beyond that.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::core::image::{AB_OFFSET, AREA_SIZE, EB_OFFSET, IMAGE_SIZE, MB_OFFSET};
use crate::error::ObserverError;
use crate::s7::protocol::{self, Area, ReadItem};

#[async_trait]
pub trait S7Client: Send + Sync {
    async fn connect(&mut self, address: &str, rack: u16, slot: u16) -> Result<(), ObserverError>;

    /// Reads the full I/O image (MB‖EB‖AB). Uses a single batched read
    /// when the negotiated PDU supports it, else three separate reads.
    async fn read_image(&mut self) -> Result<[u8; IMAGE_SIZE], ObserverError>;

    async fn close(&mut self);
}

pub struct TcpS7Client {
    stream: Option<TcpStream>,
    pdu_size: u16,
    read_timeout: Duration,
}

impl TcpS7Client {
    pub fn new(read_timeout: Duration) -> Self {
        Self { stream: None, pdu_size: 240, read_timeout }
    }

    async fn send_receive(&mut self, frame: &[u8]) -> Result<Vec<u8>, ObserverError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ObserverError::Transport("not connected".into()))?;

        timeout(self.read_timeout, stream.write_all(frame))
            .await
            .map_err(|_| ObserverError::Transport("write timed out".into()))?
            .map_err(|e| ObserverError::Transport(e.to_string()))?;

        let mut header = [0u8; 4];
        timeout(self.read_timeout, stream.read_exact(&mut header))
            .await
            .map_err(|_| ObserverError::Transport("read timed out".into()))?
            .map_err(|e| ObserverError::Transport(e.to_string()))?;

        let total_len = u16::from_be_bytes([header[2], header[3]]) as usize;
        if total_len < 4 {
            return Err(ObserverError::Transport("TPKT length underflow".into()));
        }
        let mut rest = vec![0u8; total_len - 4];
        timeout(self.read_timeout, stream.read_exact(&mut rest))
            .await
            .map_err(|_| ObserverError::Transport("read timed out".into()))?
            .map_err(|e| ObserverError::Transport(e.to_string()))?;

        let mut full = header.to_vec();
        full.extend_from_slice(&rest);
        protocol::unwrap_tpkt_cotp(&full).map(|p| p.to_vec())
    }

    async fn read_area(&mut self, area: Area) -> Result<Vec<u8>, ObserverError> {
        let item = ReadItem { area, offset: 0, count: AREA_SIZE as u16 };
        let request = protocol::build_read_var_request(&[item]);
        let response = self.send_receive(&request).await?;
        let mut parts = protocol::parse_read_var_response(&response, 1)?;
        Ok(parts.remove(0))
    }
}

#[async_trait]
impl S7Client for TcpS7Client {
    async fn connect(&mut self, address: &str, rack: u16, slot: u16) -> Result<(), ObserverError> {
        let stream = timeout(self.read_timeout, TcpStream::connect((address, 102)))
            .await
            .map_err(|_| ObserverError::Transport("connect timed out".into()))?
            .map_err(|e| ObserverError::Transport(e.to_string()))?;
        self.stream = Some(stream);

        let cr = protocol::build_cotp_connection_request(rack, slot);
        self.send_receive(&cr).await?;

        let setup = protocol::build_setup_communication(self.pdu_size);
        let reply = self.send_receive(&setup).await?;
        if reply.len() >= 2 {
            self.pdu_size = u16::from_be_bytes([reply[reply.len() - 2], reply[reply.len() - 1]]).max(64);
        }
        Ok(())
    }

    async fn read_image(&mut self) -> Result<[u8; IMAGE_SIZE], ObserverError> {
        let mut image = [0u8; IMAGE_SIZE];

        if self.pdu_size as usize >= IMAGE_SIZE + 32 {
            let items = [
                ReadItem { area: Area::Merker, offset: 0, count: AREA_SIZE as u16 },
                ReadItem { area: Area::Input, offset: 0, count: AREA_SIZE as u16 },
                ReadItem { area: Area::Output, offset: 0, count: AREA_SIZE as u16 },
            ];
            let request = protocol::build_read_var_request(&items);
            let response = self.send_receive(&request).await?;
            let parts = protocol::parse_read_var_response(&response, items.len())?;
            for (area_bytes, offset) in parts.iter().zip([MB_OFFSET, EB_OFFSET, AB_OFFSET]) {
                let n = area_bytes.len().min(AREA_SIZE);
                image[offset..offset + n].copy_from_slice(&area_bytes[..n]);
            }
        } else {
            let mb = self.read_area(Area::Merker).await?;
            let eb = self.read_area(Area::Input).await?;
            let ab = self.read_area(Area::Output).await?;
            for (bytes, offset) in [(mb, MB_OFFSET), (eb, EB_OFFSET), (ab, AB_OFFSET)] {
                let n = bytes.len().min(AREA_SIZE);
                image[offset..offset + n].copy_from_slice(&bytes[..n]);
            }
        }

        Ok(image)
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

/// Deterministic in-memory fake used by the core's own tests and by
/// integration tests that drive a session without a real controller.
#[derive(Default)]
pub struct FakeS7Client {
    pub frames: std::collections::VecDeque<[u8; IMAGE_SIZE]>,
    pub connected: bool,
}

impl FakeS7Client {
    pub fn new(frames: Vec<[u8; IMAGE_SIZE]>) -> Self {
        Self { frames: frames.into(), connected: false }
    }
}

#[async_trait]
impl S7Client for FakeS7Client {
    async fn connect(&mut self, _address: &str, _rack: u16, _slot: u16) -> Result<(), ObserverError> {
        self.connected = true;
        Ok(())
    }

    async fn read_image(&mut self) -> Result<[u8; IMAGE_SIZE], ObserverError> {
        if !self.connected {
            return Err(ObserverError::Transport("not connected".into()));
        }
        self.frames.pop_front().ok_or(ObserverError::EmptyRead)
    }

    async fn close(&mut self) {
        self.connected = false;
    }
}
