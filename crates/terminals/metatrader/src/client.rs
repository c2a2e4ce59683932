use async_trait::async_trait;
use std::time::Duration;
use termdesk_core::*;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::protocol::*;

/// A terminal session served by the MetaTrader bridge.
///
/// The TCP connection is opened by `initialize` and closed by `shutdown`;
/// requests outside that window fail with [`TerminalError::NotInitialized`].
pub struct MetaTraderBridge {
    config: BridgeConfig,
    stream: Option<TcpStream>,
}

impl MetaTraderBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<(), TerminalError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!("Connecting to MetaTrader bridge at {}", addr);

        let wait = Duration::from_secs(self.config.connect_timeout_secs);
        let mut stream = tokio::time::timeout(wait, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                TerminalError::ConnectionFailed(format!("TCP connect to {} timed out", addr))
            })?
            .map_err(|e| TerminalError::ConnectionFailed(format!("TCP connect failed: {}", e)))?;

        match read_frame(&mut stream).await? {
            InboundMessage::Connected { version } => {
                info!("Connected to MetaTrader bridge v{}", version);
            }
            InboundMessage::Error { message } => {
                return Err(TerminalError::ConnectionFailed(message))
            }
            other => {
                return Err(TerminalError::ConnectionFailed(format!(
                    "Unexpected initial message: {:?}",
                    other
                )))
            }
        }

        self.stream = Some(stream);
        Ok(())
    }

    /// Send one request and wait for its reply.
    async fn request(&mut self, msg: &OutboundMessage) -> Result<InboundMessage, TerminalError> {
        let stream = self.stream.as_mut().ok_or(TerminalError::NotInitialized)?;
        write_frame(stream, msg).await?;
        match read_frame(stream).await? {
            InboundMessage::Error { message } => Err(TerminalError::Other(message)),
            reply => Ok(reply),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}

fn unexpected(expected: &str, reply: InboundMessage) -> TerminalError {
    TerminalError::Other(format!("Expected {} reply, got {:?}", expected, reply))
}

#[async_trait]
impl TerminalClient for MetaTraderBridge {
    async fn initialize(&mut self, executable_path: &str) -> Result<bool, TerminalError> {
        if self.stream.is_none() {
            self.connect().await?;
        }
        let msg = OutboundMessage::Initialize {
            path: executable_path.to_string(),
        };
        match self.request(&msg).await? {
            InboundMessage::Initialized { ok } => {
                if !ok {
                    warn!(path = executable_path, "Bridge could not initialize terminal");
                    self.close().await;
                }
                Ok(ok)
            }
            other => Err(unexpected("initialized", other)),
        }
    }

    async fn shutdown(&mut self) -> Result<(), TerminalError> {
        if self.stream.is_none() {
            return Ok(());
        }
        let reply = self.request(&OutboundMessage::Shutdown).await;
        self.close().await;
        debug!("Disconnected from MetaTrader bridge");
        match reply? {
            InboundMessage::Ack => Ok(()),
            other => Err(unexpected("ack", other)),
        }
    }

    async fn login(
        &mut self,
        account_id: u64,
        password: &str,
        server: &str,
    ) -> Result<bool, TerminalError> {
        let msg = OutboundMessage::Login {
            login: account_id,
            password: password.to_string(),
            server: server.to_string(),
        };
        match self.request(&msg).await? {
            InboundMessage::LoginResult { ok } => Ok(ok),
            other => Err(unexpected("login_result", other)),
        }
    }

    async fn current_account(&mut self) -> Result<Option<AccountInfo>, TerminalError> {
        match self.request(&OutboundMessage::AccountInfo).await? {
            InboundMessage::Account { account } => Ok(account),
            other => Err(unexpected("account", other)),
        }
    }

    async fn symbol_info(&mut self, symbol: &str) -> Result<SymbolInfo, TerminalError> {
        let msg = OutboundMessage::SymbolInfo {
            symbol: symbol.to_string(),
        };
        match self.request(&msg).await? {
            InboundMessage::Symbol { info } => {
                info.ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
            }
            other => Err(unexpected("symbol", other)),
        }
    }

    async fn quote(&mut self, symbol: &str) -> Result<Quote, TerminalError> {
        let msg = OutboundMessage::SymbolTick {
            symbol: symbol.to_string(),
        };
        match self.request(&msg).await? {
            InboundMessage::Tick { tick } => {
                tick.ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
            }
            other => Err(unexpected("tick", other)),
        }
    }

    async fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderResult, TerminalError> {
        let msg = OutboundMessage::OrderSend {
            request: request.clone(),
        };
        match self.request(&msg).await? {
            InboundMessage::OrderResult { result } => {
                debug!(
                    symbol = %request.symbol,
                    return_code = result.return_code,
                    order_id = result.order_id,
                    "Order sent"
                );
                Ok(result)
            }
            other => Err(unexpected("order_result", other)),
        }
    }

    async fn pending_orders(&mut self) -> Result<Vec<OrderRecord>, TerminalError> {
        match self.request(&OutboundMessage::OrdersGet).await? {
            InboundMessage::Orders { orders } => Ok(orders),
            other => Err(unexpected("orders", other)),
        }
    }

    async fn open_positions(&mut self) -> Result<Vec<PositionRecord>, TerminalError> {
        match self.request(&OutboundMessage::PositionsGet).await? {
            InboundMessage::Positions { positions } => Ok(positions),
            other => Err(unexpected("positions", other)),
        }
    }
}

/// Builds one bridge session per registered terminal.
#[derive(Debug, Clone, Default)]
pub struct MetaTraderFactory {
    config: BridgeConfig,
}

impl MetaTraderFactory {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }
}

impl TerminalFactory for MetaTraderFactory {
    fn create(&self, _executable_path: &str) -> Box<dyn TerminalClient> {
        Box::new(MetaTraderBridge::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;

    /// Minimal bridge: greets, then answers requests until shutdown.
    async fn fake_bridge(
        accept_path: &'static str,
    ) -> (BridgeConfig, tokio::task::JoinHandle<Vec<OutboundMessage>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let hello = InboundMessage::Connected {
                version: "5.0".to_string(),
            };
            write_frame(&mut socket, &hello).await.unwrap();

            let mut seen = Vec::new();
            loop {
                let msg: OutboundMessage = match read_frame(&mut socket).await {
                    Ok(msg) => msg,
                    Err(_) => break,
                };
                let reply = match &msg {
                    OutboundMessage::Initialize { path } => InboundMessage::Initialized {
                        ok: path == accept_path,
                    },
                    OutboundMessage::Shutdown => InboundMessage::Ack,
                    OutboundMessage::Login { password, .. } => InboundMessage::LoginResult {
                        ok: password == "pw",
                    },
                    OutboundMessage::AccountInfo => InboundMessage::Account { account: None },
                    OutboundMessage::SymbolInfo { .. } => InboundMessage::Symbol { info: None },
                    OutboundMessage::SymbolTick { symbol } if symbol == "EURUSD" => {
                        InboundMessage::Tick {
                            tick: Some(Quote {
                                bid: dec!(1.085),
                                ask: dec!(1.0851),
                                time: Utc::now(),
                            }),
                        }
                    }
                    OutboundMessage::OrderSend { request } => InboundMessage::OrderResult {
                        result: OrderResult {
                            return_code: RETCODE_PLACED,
                            order_id: 77,
                            comment: request.comment.clone(),
                        },
                    },
                    _ => InboundMessage::Error {
                        message: "unsupported".to_string(),
                    },
                };
                let done = matches!(msg, OutboundMessage::Shutdown);
                seen.push(msg);
                write_frame(&mut socket, &reply).await.unwrap();
                if done {
                    break;
                }
            }
            seen
        });

        let config = BridgeConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_secs: 5,
        };
        (config, server)
    }

    #[tokio::test]
    async fn test_requests_before_initialize_fail() {
        let mut bridge = MetaTraderBridge::new(BridgeConfig::default());
        assert!(matches!(
            bridge.current_account().await,
            Err(TerminalError::NotInitialized)
        ));
        assert!(bridge.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (config, server) = fake_bridge("C:/mt5/terminal64.exe").await;
        let mut bridge = MetaTraderFactory::new(config).create("C:/mt5/terminal64.exe");

        assert!(bridge.initialize("C:/mt5/terminal64.exe").await.unwrap());
        assert!(bridge.login(1, "pw", "Acme-Live").await.unwrap());
        assert_eq!(bridge.current_account().await.unwrap(), None);
        assert!(matches!(
            bridge.symbol_info("NOPE").await,
            Err(TerminalError::SymbolNotFound(_))
        ));
        assert_eq!(bridge.quote("EURUSD").await.unwrap().bid, dec!(1.085));
        assert!(matches!(
            bridge.quote("GBPUSD").await,
            Err(TerminalError::Other(ref m)) if m == "unsupported"
        ));

        let mut request = OrderRequest::new(TradeAction::Pending, "EURUSD");
        request.comment = "termdesk".to_string();
        let result = bridge.submit_order(&request).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.comment, "termdesk");

        bridge.shutdown().await.unwrap();

        let seen = server.await.unwrap();
        assert_eq!(
            seen.first(),
            Some(&OutboundMessage::Initialize {
                path: "C:/mt5/terminal64.exe".to_string()
            })
        );
        assert_eq!(seen.last(), Some(&OutboundMessage::Shutdown));
    }

    #[tokio::test]
    async fn test_initialize_refused_closes_connection() {
        let (config, _server) = fake_bridge("C:/other.exe").await;
        let mut bridge = MetaTraderBridge::new(config);

        assert!(!bridge.initialize("C:/mt5/terminal64.exe").await.unwrap());
        assert!(!bridge.is_connected());
    }
}
