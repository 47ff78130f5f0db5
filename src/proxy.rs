use crate::prelude::*;
use crate::growatt::codec::FrameCodec;

use {
    bytes::{Bytes, BytesMut},
    net2::TcpStreamExt,
    std::net::SocketAddr,
    std::time::Duration,
    tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    tokio::net::{TcpListener, TcpStream},
    tokio_util::codec::Decoder,
};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const TCP_KEEPALIVE_SECS: u64 = 60;
const READ_CHUNK_SIZE: usize = 4096;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    /// datalogger -> cloud
    Request,
    /// cloud -> datalogger
    Response,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Request => write!(f, "request"),
            Direction::Response => write!(f, "response"),
        }
    }
}

/// A copy of one delimited frame seen on the wire. The original bytes have
/// already been forwarded untouched.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Intercepted {
    pub direction: Direction,
    pub peer: SocketAddr,
    pub bytes: Bytes,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChannelData {
    Frame(Intercepted),
    Shutdown,
}

/// Transparent TCP relay between dataloggers and the cloud endpoint.
#[derive(Clone)]
pub struct Proxy {
    config: ConfigWrapper,
    channels: Channels,
}

impl Proxy {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self { config, channels }
    }

    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub fn stop(&self) {
        let _ = self.channels.from_proxy.send(ChannelData::Shutdown);
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listen = self.config.proxy().listen();
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|e| anyhow!("failed to listen on {}: {}", listen, e))?;
        info!("proxy listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let mut shutdown_rx = self.channels.from_proxy.subscribe();

        loop {
            tokio::select! {
                msg = shutdown_rx.recv() => {
                    match msg {
                        Ok(ChannelData::Shutdown) | Err(broadcast::error::RecvError::Closed) => {
                            info!("proxy received shutdown signal");
                            break;
                        }
                        _ => continue,
                    }
                }

                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            warn!("accept failed: {}", e);
                            continue;
                        }
                    };
                    info!("{}: datalogger connected", peer);

                    let proxy = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = proxy.relay(socket, peer).await {
                            warn!("{}: {}", peer, e);
                        }
                        info!("{}: connection closed", peer);
                    });
                }
            }
        }

        info!("proxy accept loop exiting");
        Ok(())
    }

    async fn relay(&self, inbound: TcpStream, peer: SocketAddr) -> Result<()> {
        let proxy_config = self.config.proxy();
        let upstream = proxy_config.upstream().to_owned();

        let outbound = match tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            TcpStream::connect(upstream.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => bail!("failed to connect to {}: {}", upstream, e),
            Err(_) => bail!("connection to {} timed out after {}s", upstream, CONNECT_TIMEOUT_SECS),
        };
        debug!("{}: connected upstream to {}", peer, upstream);

        let outbound = Self::configure(outbound, proxy_config.use_tcp_nodelay())?;
        let inbound = Self::configure(inbound, proxy_config.use_tcp_nodelay())?;

        let (in_read, in_write) = inbound.into_split();
        let (out_read, out_write) = outbound.into_split();

        futures::try_join!(
            self.pump(Direction::Request, peer, in_read, out_write),
            self.pump(Direction::Response, peer, out_read, in_write),
        )?;

        Ok(())
    }

    fn configure(stream: TcpStream, nodelay: bool) -> Result<TcpStream> {
        let std_stream = stream.into_std()?;
        if let Err(e) = std_stream.set_keepalive(Some(Duration::new(TCP_KEEPALIVE_SECS, 0))) {
            warn!("Failed to set TCP keepalive: {}", e);
        }

        let stream = TcpStream::from_std(std_stream)?;
        if nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        Ok(stream)
    }

    // copy reader -> writer verbatim; frames found along the way go to the coordinator
    async fn pump<R, W>(
        &self,
        direction: Direction,
        peer: SocketAddr,
        mut reader: R,
        mut writer: W,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let read_timeout = self.config.proxy().read_timeout();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let mut codec = FrameCodec::new();

        loop {
            let len = if read_timeout > 0 {
                match tokio::time::timeout(Duration::from_secs(read_timeout), reader.read(&mut chunk)).await {
                    Ok(r) => r?,
                    Err(_) => bail!("{}: no data received for {} seconds", direction, read_timeout),
                }
            } else {
                reader.read(&mut chunk).await?
            };

            if len == 0 {
                while let Some(bytes) = codec.decode_eof(&mut buf)? {
                    self.intercepted(direction, peer, bytes);
                }
                let _ = writer.shutdown().await;
                debug!("{}: {} side closed", peer, direction);
                return Ok(());
            }

            writer.write_all(&chunk[..len]).await?;

            buf.extend_from_slice(&chunk[..len]);
            while let Some(bytes) = codec.decode(&mut buf)? {
                self.intercepted(direction, peer, bytes);
            }
        }
    }

    fn intercepted(&self, direction: Direction, peer: SocketAddr, bytes: Bytes) {
        trace!("{}: {} frame of {} bytes", peer, direction, bytes.len());
        // no receivers just means nobody is decoding right now
        let _ = self.channels.from_proxy.send(ChannelData::Frame(Intercepted {
            direction,
            peer,
            bytes,
        }));
    }
}
