use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::stream::StreamOpener;

/// Opens a serial port at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialOpener {
    port: String,
    baud_rate: u32,
}

impl SerialOpener {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

#[async_trait]
impl StreamOpener for SerialOpener {
    type Stream = SerialStream;

    fn endpoint(&self) -> String {
        format!("{}@{}", self.port, self.baud_rate)
    }

    async fn open(&self) -> std::io::Result<SerialStream> {
        let stream = tokio_serial::new(self.port.as_str(), self.baud_rate).open_native_async()?;
        Ok(stream)
    }
}

/// Opens a TCP connection; used for serial-to-network bridges
#[derive(Debug, Clone)]
pub struct TcpOpener {
    addr: String,
}

impl TcpOpener {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl StreamOpener for TcpOpener {
    type Stream = TcpStream;

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    async fn open(&self) -> std::io::Result<TcpStream> {
        TcpStream::connect(self.addr.as_str()).await
    }
}
