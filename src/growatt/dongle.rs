use crate::prelude::*;

use {
    futures::StreamExt,
    serde::{Serialize, Serializer},
    std::net::SocketAddr,
    std::sync::Arc,
    std::time::Duration,
    tokio::io::AsyncWriteExt,
    tokio::net::TcpStream,
    tokio_util::codec::FramedRead,
};

use crate::growatt::cipher::Cipher;
use crate::growatt::frame::FrameDecoder;
use crate::growatt::packet::{Codec, Decoded, ResponseCommon};

const TCP_KEEPALIVE_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub enum ChannelData {
    Connected(SocketAddr),
    Disconnect(SocketAddr),
    Shutdown,
}
pub type Sender = broadcast::Sender<ChannelData>;
pub type Receiver = broadcast::Receiver<ChannelData>;

// Serial {{{
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Serial([u8; 10]);

impl Serial {
    pub fn new(input: &[u8]) -> Result<Self> {
        Ok(Self(input.try_into()?))
    }

    pub fn data(&self) -> [u8; 10] {
        self.0
    }
}

impl Serialize for Serial {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl std::str::FromStr for Serial {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 10 {
            return Err(anyhow!("{} must be exactly 10 characters", s));
        }

        let mut r: [u8; 10] = Default::default();
        r.copy_from_slice(s.as_bytes());
        Ok(Self(r))
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
} // }}}

/// Accepts dongle connections and runs one processing loop per socket.
/// Frames are handled strictly in arrival order within a connection; the
/// reply for one frame is written before the next frame is parsed.
#[derive(Clone)]
pub struct Server {
    config: ConfigWrapper,
    channels: Channels,
    coordinator: Arc<Coordinator>,
}

impl Server {
    pub fn new(config: ConfigWrapper, channels: Channels, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            channels,
            coordinator,
        }
    }

    pub async fn start(&self) -> Result<()> {
        let host = self.config.listen_host();
        let port = self.config.listen_port();

        let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
        info!("listening for dongles on {}:{}", host, port);

        let mut receiver = self.channels.from_dongle.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            continue;
                        }
                    };

                    info!("dongle connected from {}", addr);
                    let server = self.clone();
                    tokio::spawn(async move {
                        let _ = server.channels.from_dongle.send(ChannelData::Connected(addr));

                        if let Err(e) = server.handle_connection(stream, addr).await {
                            warn!("dongle {}: {}", addr, e);
                        }

                        server.coordinator.record_disconnect(addr);
                        let _ = server.channels.from_dongle.send(ChannelData::Disconnect(addr));
                        info!("dongle {} disconnected", addr);
                    });
                }
                message = receiver.recv() => {
                    if let Ok(ChannelData::Shutdown) = message {
                        info!("dongle server received shutdown signal");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    pub fn stop(&self) {
        let _ = self.channels.from_dongle.send(ChannelData::Shutdown);
    }

    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        use net2::TcpStreamExt;

        let std_stream = stream.into_std()?;
        if let Err(e) = std_stream.set_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS))) {
            warn!("failed to set TCP keepalive: {}", e);
        }
        let stream = TcpStream::from_std(std_stream)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("failed to set TCP_NODELAY: {}", e);
        }

        let codec = Codec::new(Cipher::new(&self.config.key())?);
        let (reader, mut writer) = stream.into_split();
        let mut framed = FramedRead::new(reader, FrameDecoder::new());
        let mut receiver = self.channels.from_dongle.subscribe();

        loop {
            tokio::select! {
                next = framed.next() => {
                    let frame = match next {
                        None => break, // peer closed
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => bail!("read error: {}", e),
                    };

                    debug!(
                        "{}: RX function={:#04x}, {} payload bytes",
                        addr,
                        frame.function,
                        frame.payload.len()
                    );

                    match codec.decode(&frame) {
                        Ok(Decoded::Message(request)) => {
                            if let Some(response) = self.coordinator.handle_request(&request) {
                                let bytes = codec.encode(&response, &frame);
                                debug!(
                                    "{}: TX function={:#04x}, {} bytes",
                                    addr,
                                    u8::from(response.function()),
                                    bytes.len()
                                );
                                writer.write_all(&bytes).await?;
                                writer.flush().await?;
                            }
                        }
                        Ok(Decoded::Passthrough(frame)) => {
                            self.coordinator.record_passthrough();
                            debug!("{}: unhandled function {:#04x}, ignoring", addr, frame.function);
                        }
                        Err(e) => {
                            self.coordinator.record_decode_error();
                            warn!("{}: dropping frame: {}", addr, e);
                        }
                    }
                }
                message = receiver.recv() => {
                    if let Ok(ChannelData::Shutdown) = message {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}
