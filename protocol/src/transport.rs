//! 传输层
//!
//! 大厅消息以带长度前缀的 JSON 帧传输：
//!
//! ```text
//! +---------+----------------+------------------+
//! | version | length (u32 BE)| JSON payload     |
//! +---------+----------------+------------------+
//! ```
//!
//! 服务端把每个连接拆成 `FrameReader`/`FrameWriter`，分别在读任务和写任务中使用。

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::{CONNECT_TIMEOUT, MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// 双向消息连接
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()>;

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M>;

    async fn close(&mut self) -> Result<()>;

    fn peer_addr(&self) -> Option<String>;
}

/// 客户端拨号
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 服务端监听
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    async fn bind(addr: &str) -> Result<Self>;

    async fn accept(&mut self) -> Result<Self::Conn>;

    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// 帧头
// ============================================================================

/// 帧头：协议版本 + 消息体长度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub length: usize,
}

impl FrameHeader {
    pub const SIZE: usize = 5;

    /// 当前版本的帧头
    pub fn for_payload(length: usize) -> Result<Self> {
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Self {
            version: PROTOCOL_VERSION,
            length,
        })
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.version;
        bytes[1..].copy_from_slice(&(self.length as u32).to_be_bytes());
        bytes
    }

    /// 解析并校验版本与长度
    pub fn decode(bytes: [u8; Self::SIZE]) -> Result<Self> {
        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        if length > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Self { version, length })
    }
}

fn closed_on_eof(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    }
}

// ============================================================================
// 帧读写
// ============================================================================

/// 帧读取器
pub struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }

    /// 整帧读入缓冲区；JSON 解码失败不会破坏帧边界
    async fn fill(&mut self) -> Result<&[u8]> {
        let mut bytes = [0u8; FrameHeader::SIZE];
        self.reader.read_exact(&mut bytes).await.map_err(closed_on_eof)?;
        let header = FrameHeader::decode(bytes).inspect_err(|e| warn!(error = %e, "帧头无效"))?;

        self.buffer.resize(header.length, 0);
        self.reader
            .read_exact(&mut self.buffer)
            .await
            .map_err(closed_on_eof)?;
        Ok(self.buffer.as_slice())
    }

    pub async fn read_frame<M: DeserializeOwned>(&mut self) -> Result<M> {
        let payload = self.fill().await?;
        Ok(serde_json::from_slice(payload)?)
    }

    /// 在时限内读一帧，超时返回 `ConnectionTimeout`；时限为 0 表示不限时
    pub async fn read_frame_within<M: DeserializeOwned>(&mut self, limit: Duration) -> Result<M> {
        if limit.is_zero() {
            return self.read_frame().await;
        }
        tokio::time::timeout(limit, self.read_frame())
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::new(),
        }
    }

    /// 帧头与消息体一次写出
    pub async fn write_frame<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        let header = FrameHeader::for_payload(payload.len())?;

        self.buffer.clear();
        self.buffer.extend_from_slice(&header.encode());
        self.buffer.extend_from_slice(&payload);
        self.writer.write_all(&self.buffer).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// TCP
// ============================================================================

pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<TcpConnection> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)??;
        TcpConnection::from_stream(stream)
    }
}

/// 一条 TCP 连接
pub struct TcpConnection {
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
    peer_addr: Option<String>,
}

impl TcpConnection {
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|addr| addr.to_string());
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FrameReader::new(read_half),
            writer: FrameWriter::new(write_half),
            peer_addr,
        })
    }

    /// 拆成读写两端，交给不同任务
    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()> {
        self.writer.write_frame(msg).await
    }

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.reader.read_frame().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }
}

pub struct TcpListener {
    inner: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let inner = tokio::net::TcpListener::bind(addr).await?;
        Ok(Self { inner })
    }

    async fn accept(&mut self) -> Result<TcpConnection> {
        let (stream, addr) = self.inner.accept().await?;
        debug!(%addr, "接受连接");
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.inner.local_addr().ok().map(|addr| addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClientMessage, ServerMessage};

    fn pipe() -> (
        FrameWriter<tokio::io::WriteHalf<tokio::io::DuplexStream>>,
        FrameReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
    ) {
        let (client, server) = tokio::io::duplex(4096);
        let (_, client_write) = tokio::io::split(client);
        let (server_read, _) = tokio::io::split(server);
        (FrameWriter::new(client_write), FrameReader::new(server_read))
    }

    #[test]
    fn test_frame_header() {
        let header = FrameHeader::for_payload(300).unwrap();
        let bytes = header.encode();
        assert_eq!(bytes, [PROTOCOL_VERSION, 0, 0, 1, 44]);
        assert_eq!(FrameHeader::decode(bytes).unwrap(), header);

        assert!(matches!(
            FrameHeader::for_payload(MAX_FRAME_SIZE + 1),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
        let mut oversized = bytes;
        oversized[1] = 0xff;
        assert!(matches!(
            FrameHeader::decode(oversized),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_tcp_lobby_exchange() {
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut conn = TcpConnector.connect(&addr).await.unwrap();
            conn.send(&ClientMessage::CreateLobby {
                name: "alice".to_string(),
            })
            .await
            .unwrap();

            let reply: ServerMessage = conn.recv().await.unwrap();
            assert_eq!(
                reply,
                ServerMessage::LobbyCreated {
                    lobby_id: "ABCD12".to_string(),
                    player_id: 1,
                    token: "t0k3n".to_string(),
                }
            );
        });

        let (mut reader, mut writer) = listener.accept().await.unwrap().split();
        let msg: ClientMessage = reader.read_frame().await.unwrap();
        assert_eq!(
            msg,
            ClientMessage::CreateLobby {
                name: "alice".to_string()
            }
        );
        writer
            .write_frame(&ServerMessage::LobbyCreated {
                lobby_id: "ABCD12".to_string(),
                player_id: 1,
                token: "t0k3n".to_string(),
            })
            .await
            .unwrap();

        client.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_json_keeps_stream_aligned() {
        let (mut writer, mut reader) = pipe();

        // 合法 JSON，但不是任何已知事件
        writer
            .write_frame(&serde_json::json!({"event": "teleport"}))
            .await
            .unwrap();
        writer.write_frame(&ClientMessage::Ping).await.unwrap();

        let first: Result<ClientMessage> = reader.read_frame().await;
        assert!(matches!(first, Err(ProtocolError::Json(_))));

        let second: ClientMessage = reader.read_frame().await.unwrap();
        assert_eq!(second, ClientMessage::Ping);
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let (client, server) = tokio::io::duplex(64);
        let (_, mut client_write) = tokio::io::split(client);
        let (server_read, _) = tokio::io::split(server);

        client_write.write_all(&[99, 0, 0, 0, 0]).await.unwrap();

        let mut reader = FrameReader::new(server_read);
        let result: Result<ClientMessage> = reader.read_frame().await;
        assert!(matches!(
            result,
            Err(ProtocolError::VersionMismatch { actual: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let (writer, mut reader) = pipe();
        drop(writer);
        let result: Result<ClientMessage> = reader.read_frame().await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_within_times_out() {
        let (mut writer, mut reader) = pipe();

        let result: Result<ClientMessage> = reader.read_frame_within(Duration::from_secs(30)).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionTimeout)));

        writer.write_frame(&ClientMessage::Ping).await.unwrap();
        let msg: ClientMessage = reader
            .read_frame_within(Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }
}
