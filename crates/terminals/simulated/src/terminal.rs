use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use termdesk_core::*;
use tracing::debug;

/// Configuration for the simulated terminal.
#[derive(Debug, Clone)]
pub struct SimulatedTerminalConfig {
    /// Balance reported for every account.
    pub balance: Decimal,
    pub currency: String,
}

impl Default for SimulatedTerminalConfig {
    fn default() -> Self {
        Self {
            balance: Decimal::new(10_000, 0),
            currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    initialized_path: Option<String>,
    /// login -> (password, server). Empty means any login is accepted.
    accounts: HashMap<u64, (String, String)>,
    current: Option<(u64, String)>,
    symbols: HashMap<String, SymbolInfo>,
    quotes: HashMap<String, Quote>,
    orders: Vec<OrderRecord>,
    positions: Vec<PositionRecord>,
    next_ticket: u64,
    call_log: Vec<String>,
    login_count: usize,
    reject_orders: bool,
    fail_transport: bool,
    fail_initialize: bool,
}

/// A simulated terminal.
///
/// Clones share state, so a test can keep one clone for inspection while
/// the pool owns another.
#[derive(Debug, Clone)]
pub struct SimulatedTerminal {
    config: SimulatedTerminalConfig,
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedTerminal {
    fn default() -> Self {
        Self::new(SimulatedTerminalConfig::default())
    }
}

impl SimulatedTerminal {
    pub fn new(config: SimulatedTerminalConfig) -> Self {
        let state = SimState {
            next_ticket: 1000,
            ..Default::default()
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Terminal with a few FX symbols quoted, for dry runs.
    pub fn demo() -> Self {
        Self::default()
            .with_symbol("EURUSD", 5, dec!(1.08500), dec!(1.08510))
            .with_symbol("USDJPY", 3, dec!(142.500), dec!(142.510))
            .with_symbol("XAUUSD", 2, dec!(2345.10), dec!(2345.40))
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_account(self, login: u64, password: &str, server: &str) -> Self {
        self.state()
            .accounts
            .insert(login, (password.to_string(), server.to_string()));
        self
    }

    pub fn with_symbol(self, symbol: &str, digits: u32, bid: Decimal, ask: Decimal) -> Self {
        {
            let mut state = self.state();
            state.symbols.insert(
                symbol.to_string(),
                SymbolInfo {
                    symbol: symbol.to_string(),
                    digits,
                    point: Decimal::new(1, digits),
                    volume_min: dec!(0.01),
                    volume_step: dec!(0.01),
                },
            );
            state.quotes.insert(
                symbol.to_string(),
                Quote {
                    bid,
                    ask,
                    time: Utc::now(),
                },
            );
        }
        self
    }

    pub fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal) {
        self.state().quotes.insert(
            symbol.to_string(),
            Quote {
                bid,
                ask,
                time: Utc::now(),
            },
        );
    }

    pub fn add_order(&self, order: OrderRecord) {
        self.state().orders.push(order);
    }

    pub fn add_position(&self, position: PositionRecord) {
        self.state().positions.push(position);
    }

    /// Reject every trade request with a non-success return code.
    pub fn set_reject_orders(&self, reject: bool) {
        self.state().reject_orders = reject;
    }

    /// Fail every call after initialize with a transport error.
    pub fn set_fail_transport(&self, fail: bool) {
        self.state().fail_transport = fail;
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        self.state().fail_initialize = fail;
    }

    /// Convert a pending order into an open position at its open price.
    pub fn fill_order(&self, ticket: u64) -> bool {
        let mut state = self.state();
        let Some(idx) = state.orders.iter().position(|o| o.ticket == ticket) else {
            return false;
        };
        let order = state.orders.remove(idx);
        state.positions.push(PositionRecord {
            ticket: order.ticket,
            symbol: order.symbol,
            side: order.kind.side(),
            volume: order.volume,
            price_open: order.price_open,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            magic: order.magic,
        });
        true
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.state().orders.clone()
    }

    pub fn positions(&self) -> Vec<PositionRecord> {
        self.state().positions.clone()
    }

    /// Number of terminal calls made so far.
    pub fn calls(&self) -> usize {
        self.state().call_log.len()
    }

    /// Names of the terminal calls made so far, in order.
    pub fn call_log(&self) -> Vec<String> {
        self.state().call_log.clone()
    }

    pub fn login_count(&self) -> usize {
        self.state().login_count
    }

    pub fn current_login(&self) -> Option<u64> {
        self.state().current.as_ref().map(|(login, _)| *login)
    }

    pub fn is_initialized(&self) -> bool {
        self.state().initialized_path.is_some()
    }

    /// Record a call and check the session is usable.
    fn enter(&self, call: &str) -> Result<MutexGuard<'_, SimState>, TerminalError> {
        let mut state = self.state();
        state.call_log.push(call.to_string());
        if state.initialized_path.is_none() {
            return Err(TerminalError::NotInitialized);
        }
        if state.fail_transport {
            return Err(TerminalError::ConnectionFailed(format!(
                "simulated transport failure in {}",
                call
            )));
        }
        Ok(state)
    }

    fn rejected(comment: &str) -> OrderResult {
        OrderResult {
            return_code: RETCODE_REJECT,
            order_id: 0,
            comment: comment.to_string(),
        }
    }
}

impl SimState {
    fn ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn execute(&mut self, request: &OrderRequest) -> OrderResult {
        match request.action {
            TradeAction::Pending => {
                let (Some(kind), Some(price)) = (request.kind, request.price) else {
                    return SimulatedTerminal::rejected("pending order needs kind and price");
                };
                if !kind.is_pending() || !self.symbols.contains_key(&request.symbol) {
                    return SimulatedTerminal::rejected("invalid pending order");
                }
                let ticket = self.ticket();
                self.orders.push(OrderRecord {
                    ticket,
                    symbol: request.symbol.clone(),
                    kind,
                    volume: request.volume,
                    price_open: price,
                    stop_loss: request.stop_loss.unwrap_or_default(),
                    take_profit: request.take_profit.unwrap_or_default(),
                    magic: request.magic,
                });
                OrderResult {
                    return_code: RETCODE_PLACED,
                    order_id: ticket,
                    comment: "placed".to_string(),
                }
            }
            TradeAction::Deal => match request.position {
                Some(ticket) => match self.positions.iter().position(|p| p.ticket == ticket) {
                    Some(idx) => {
                        self.positions.remove(idx);
                        OrderResult {
                            return_code: RETCODE_DONE,
                            order_id: ticket,
                            comment: "closed".to_string(),
                        }
                    }
                    None => SimulatedTerminal::rejected("position not found"),
                },
                None => {
                    let (Some(kind), Some(quote)) =
                        (request.kind, self.quotes.get(&request.symbol).copied())
                    else {
                        return SimulatedTerminal::rejected("invalid deal");
                    };
                    let price = match kind.side() {
                        Side::Buy => quote.ask,
                        Side::Sell => quote.bid,
                    };
                    let ticket = self.ticket();
                    self.positions.push(PositionRecord {
                        ticket,
                        symbol: request.symbol.clone(),
                        side: kind.side(),
                        volume: request.volume,
                        price_open: price,
                        stop_loss: request.stop_loss.unwrap_or_default(),
                        take_profit: request.take_profit.unwrap_or_default(),
                        magic: request.magic,
                    });
                    OrderResult {
                        return_code: RETCODE_DONE,
                        order_id: ticket,
                        comment: "done".to_string(),
                    }
                }
            },
            TradeAction::Modify => {
                let ticket = request.order.unwrap_or_default();
                match self.orders.iter_mut().find(|o| o.ticket == ticket) {
                    Some(order) => {
                        if let Some(price) = request.price {
                            order.price_open = price;
                        }
                        order.stop_loss = request.stop_loss.unwrap_or_default();
                        order.take_profit = request.take_profit.unwrap_or_default();
                        OrderResult {
                            return_code: RETCODE_DONE,
                            order_id: ticket,
                            comment: "modified".to_string(),
                        }
                    }
                    None => SimulatedTerminal::rejected("order not found"),
                }
            }
            TradeAction::SlTp => {
                let ticket = request.position.unwrap_or_default();
                match self.positions.iter_mut().find(|p| p.ticket == ticket) {
                    Some(position) => {
                        position.stop_loss = request.stop_loss.unwrap_or_default();
                        position.take_profit = request.take_profit.unwrap_or_default();
                        OrderResult {
                            return_code: RETCODE_DONE,
                            order_id: ticket,
                            comment: "modified".to_string(),
                        }
                    }
                    None => SimulatedTerminal::rejected("position not found"),
                }
            }
            TradeAction::Remove => {
                let ticket = request.order.unwrap_or_default();
                match self.orders.iter().position(|o| o.ticket == ticket) {
                    Some(idx) => {
                        self.orders.remove(idx);
                        OrderResult {
                            return_code: RETCODE_DONE,
                            order_id: ticket,
                            comment: "removed".to_string(),
                        }
                    }
                    None => SimulatedTerminal::rejected("order not found"),
                }
            }
        }
    }
}

#[async_trait]
impl TerminalClient for SimulatedTerminal {
    async fn initialize(&mut self, executable_path: &str) -> Result<bool, TerminalError> {
        let mut state = self.state();
        state.call_log.push("initialize".to_string());
        if state.fail_initialize {
            return Ok(false);
        }
        state.initialized_path = Some(executable_path.to_string());
        Ok(true)
    }

    async fn shutdown(&mut self) -> Result<(), TerminalError> {
        let mut state = self.state();
        state.call_log.push("shutdown".to_string());
        state.initialized_path = None;
        Ok(())
    }

    async fn login(
        &mut self,
        account_id: u64,
        password: &str,
        server: &str,
    ) -> Result<bool, TerminalError> {
        let mut state = self.enter("login")?;
        state.login_count += 1;
        let accepted = state.accounts.is_empty()
            || state
                .accounts
                .get(&account_id)
                .is_some_and(|(pw, srv)| pw == password && srv == server);
        if accepted {
            state.current = Some((account_id, server.to_string()));
        }
        debug!(account_id, accepted, "Simulated login");
        Ok(accepted)
    }

    async fn current_account(&mut self) -> Result<Option<AccountInfo>, TerminalError> {
        let state = self.enter("current_account")?;
        Ok(state.current.as_ref().map(|(login, server)| AccountInfo {
            login: *login,
            server: server.clone(),
            balance: self.config.balance,
            equity: self.config.balance,
            margin_free: self.config.balance,
            currency: self.config.currency.clone(),
        }))
    }

    async fn symbol_info(&mut self, symbol: &str) -> Result<SymbolInfo, TerminalError> {
        let state = self.enter("symbol_info")?;
        state
            .symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
    }

    async fn quote(&mut self, symbol: &str) -> Result<Quote, TerminalError> {
        let state = self.enter("quote")?;
        state
            .quotes
            .get(symbol)
            .copied()
            .ok_or_else(|| TerminalError::SymbolNotFound(symbol.to_string()))
    }

    async fn submit_order(&mut self, request: &OrderRequest) -> Result<OrderResult, TerminalError> {
        let mut state = self.enter("submit_order")?;
        if state.reject_orders {
            return Ok(Self::rejected("rejected by simulation"));
        }
        Ok(state.execute(request))
    }

    async fn pending_orders(&mut self) -> Result<Vec<OrderRecord>, TerminalError> {
        let state = self.enter("pending_orders")?;
        Ok(state.orders.clone())
    }

    async fn open_positions(&mut self) -> Result<Vec<PositionRecord>, TerminalError> {
        let state = self.enter("open_positions")?;
        Ok(state.positions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(kind: OrderKind, price: Decimal) -> OrderRequest {
        let mut request = OrderRequest::new(TradeAction::Pending, "EURUSD");
        request.kind = Some(kind);
        request.price = Some(price);
        request.volume = dec!(0.1);
        request
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let mut terminal = SimulatedTerminal::demo();
        assert!(matches!(
            terminal.quote("EURUSD").await,
            Err(TerminalError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_login_checks_registered_accounts() {
        let mut terminal = SimulatedTerminal::demo().with_account(1, "pw", "Acme-Live");
        terminal.initialize("/t").await.unwrap();

        assert!(!terminal.login(1, "wrong", "Acme-Live").await.unwrap());
        assert!(terminal.current_account().await.unwrap().is_none());

        assert!(terminal.login(1, "pw", "Acme-Live").await.unwrap());
        let account = terminal.current_account().await.unwrap().unwrap();
        assert_eq!(account.login, 1);
        assert_eq!(terminal.login_count(), 2);
    }

    #[tokio::test]
    async fn test_pending_order_lifecycle() {
        let mut terminal = SimulatedTerminal::demo();
        terminal.initialize("/t").await.unwrap();

        let placed = terminal
            .submit_order(&pending(OrderKind::BuyLimit, dec!(1.08)))
            .await
            .unwrap();
        assert_eq!(placed.return_code, RETCODE_PLACED);
        assert_eq!(terminal.pending_orders().await.unwrap().len(), 1);

        assert!(terminal.fill_order(placed.order_id));
        let positions = terminal.open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, Side::Buy);

        let mut close = OrderRequest::new(TradeAction::Deal, "EURUSD");
        close.position = Some(placed.order_id);
        close.kind = Some(OrderKind::Sell);
        let closed = terminal.submit_order(&close).await.unwrap();
        assert!(closed.is_success());
        assert!(terminal.positions().is_empty());
    }

    #[tokio::test]
    async fn test_reject_and_transport_failure_modes() {
        let mut terminal = SimulatedTerminal::demo();
        terminal.initialize("/t").await.unwrap();

        terminal.set_reject_orders(true);
        let result = terminal
            .submit_order(&pending(OrderKind::BuyLimit, dec!(1.08)))
            .await
            .unwrap();
        assert!(!result.is_success());
        assert!(terminal.orders().is_empty());

        terminal.set_fail_transport(true);
        assert!(terminal.pending_orders().await.is_err());
    }
}
