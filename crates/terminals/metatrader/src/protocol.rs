use serde::{Deserialize, Serialize};
use termdesk_core::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body accepted from the bridge.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Requests sent to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Attach the bridge to the terminal executable at `path`.
    Initialize { path: String },
    Shutdown,
    Login {
        login: u64,
        password: String,
        server: String,
    },
    AccountInfo,
    SymbolInfo { symbol: String },
    SymbolTick { symbol: String },
    OrderSend { request: OrderRequest },
    OrdersGet,
    PositionsGet,
}

/// Replies received from the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Greeting sent once after the connection is accepted.
    Connected { version: String },
    Initialized { ok: bool },
    Ack,
    LoginResult { ok: bool },
    Account { account: Option<AccountInfo> },
    Symbol { info: Option<SymbolInfo> },
    Tick { tick: Option<Quote> },
    OrderResult { result: OrderResult },
    Orders { orders: Vec<OrderRecord> },
    Positions { positions: Vec<PositionRecord> },
    Error { message: String },
}

/// Frame a message with a 4-byte length prefix (big-endian).
pub fn frame_message(msg: &[u8]) -> Vec<u8> {
    let len = msg.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(msg);
    framed
}

/// Serialize and write one framed message.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), TerminalError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(msg)
        .map_err(|e| TerminalError::Other(format!("Serialization error: {}", e)))?;
    writer
        .write_all(&frame_message(&json))
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Write error: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Write error: {}", e)))
}

/// Read and deserialize one framed message.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T, TerminalError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Read error: {}", e)))?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TerminalError::Other(format!(
            "Frame of {} bytes exceeds limit",
            len
        )));
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| TerminalError::ConnectionFailed(format!("Read error: {}", e)))?;

    serde_json::from_slice(&body)
        .map_err(|e| TerminalError::Other(format!("Deserialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_prefix() {
        let framed = frame_message(b"{}");
        assert_eq!(framed, vec![0, 0, 0, 2, b'{', b'}']);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&OutboundMessage::Initialize {
            path: "C:/mt5/terminal64.exe".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"initialize","path":"C:/mt5/terminal64.exe"}"#);

        let json = serde_json::to_string(&OutboundMessage::PositionsGet).unwrap();
        assert_eq!(json, r#"{"type":"positions_get"}"#);

        let reply: InboundMessage =
            serde_json::from_str(r#"{"type":"login_result","ok":true}"#).unwrap();
        assert_eq!(reply, InboundMessage::LoginResult { ok: true });
    }

    #[tokio::test]
    async fn test_read_back_written_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &InboundMessage::Initialized { ok: true })
            .await
            .unwrap();

        let mut reader = buf.as_slice();
        let msg: InboundMessage = read_frame(&mut reader).await.unwrap();
        assert_eq!(msg, InboundMessage::Initialized { ok: true });
    }

    #[tokio::test]
    async fn test_oversized_and_truncated_frames() {
        let mut oversized = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes().to_vec();
        oversized.extend_from_slice(b"{}");
        let err = read_frame::<_, InboundMessage>(&mut oversized.as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, TerminalError::Other(_)));

        let truncated = [0u8, 0, 0, 10, b'{'];
        let err = read_frame::<_, InboundMessage>(&mut truncated.as_slice())
            .await
            .unwrap_err();
        assert!(matches!(err, TerminalError::ConnectionFailed(_)));
    }
}
