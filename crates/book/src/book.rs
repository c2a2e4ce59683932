use crate::error::BookError;
use crate::transition::{self, BookState, Effect, Operation};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use termdesk_core::*;
use tracing::{info, warn};

/// A tradable instruction and where it is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Defaults to Plan when absent.
    #[serde(default)]
    pub state: BookState,
    pub symbol: String,
    pub volume: Decimal,
    #[serde(alias = "price_open")]
    pub open_price: Decimal,
    #[serde(default, alias = "sl")]
    pub stop_loss: Decimal,
    #[serde(default, alias = "tp")]
    pub take_profit: Decimal,
    #[serde(default)]
    pub magic_number: u64,
    /// Terminal ticket; only set in Order and Position.
    #[serde(default)]
    pub ticket_id: Option<u64>,
    /// Order sub-type chosen at send time or read from the terminal.
    #[serde(default)]
    pub kind: Option<OrderKind>,
}

/// Result of a legal operation. Terminal rejections land here, not in an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub operation: String,
    pub success: bool,
    /// Book state after the operation.
    pub state: BookState,
    pub return_code: Option<u32>,
    pub message: Option<String>,
}

impl OperationOutcome {
    fn local(operation: &Operation, state: BookState) -> Self {
        Self {
            operation: operation.name().to_string(),
            success: true,
            state,
            return_code: None,
            message: None,
        }
    }

    /// Turn a soft failure into an error for callers that want one.
    pub fn escalate(self) -> Result<Self, BookError> {
        if self.success {
            return Ok(self);
        }
        Err(BookError::OperationFailed {
            operation: self.operation,
            reason: self
                .message
                .unwrap_or_else(|| "rejected by terminal".to_string()),
        })
    }
}

/// Values a terminal call would commit to the book if it succeeds.
#[derive(Debug, Default)]
struct Staged {
    open_price: Option<Decimal>,
    stop_loss: Option<Decimal>,
    take_profit: Option<Decimal>,
    kind: Option<OrderKind>,
}

impl Book {
    /// A new, unsent instruction.
    pub fn new(
        symbol: &str,
        volume: Decimal,
        open_price: Decimal,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Self {
        Self {
            state: BookState::Plan,
            symbol: symbol.to_string(),
            volume,
            open_price,
            stop_loss,
            take_profit,
            magic_number: 0,
            ticket_id: None,
            kind: None,
        }
    }

    pub fn with_magic(mut self, magic_number: u64) -> Self {
        self.magic_number = magic_number;
        self
    }

    /// Book for a pending order found on the terminal.
    pub fn from_order(order: &OrderRecord) -> Self {
        Self {
            state: BookState::Order,
            symbol: order.symbol.clone(),
            volume: order.volume,
            open_price: order.price_open,
            stop_loss: order.stop_loss,
            take_profit: order.take_profit,
            magic_number: order.magic,
            ticket_id: Some(order.ticket),
            kind: Some(order.kind),
        }
    }

    /// Book for an open position found on the terminal.
    pub fn from_position(position: &PositionRecord) -> Self {
        Self {
            state: BookState::Position,
            symbol: position.symbol.clone(),
            volume: position.volume,
            open_price: position.price_open,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            magic_number: position.magic,
            ticket_id: Some(position.ticket),
            kind: Some(OrderKind::market(position.side)),
        }
    }

    pub async fn send(
        &mut self,
        client: &mut dyn TerminalClient,
    ) -> Result<OperationOutcome, BookError> {
        self.apply(client, Operation::Send).await
    }

    pub async fn close(
        &mut self,
        client: &mut dyn TerminalClient,
    ) -> Result<OperationOutcome, BookError> {
        self.apply(client, Operation::Close).await
    }

    pub async fn change_price(
        &mut self,
        client: &mut dyn TerminalClient,
        price: Decimal,
    ) -> Result<OperationOutcome, BookError> {
        self.apply(client, Operation::ChangePrice { price }).await
    }

    pub async fn change_stops(
        &mut self,
        client: &mut dyn TerminalClient,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Result<OperationOutcome, BookError> {
        self.apply(
            client,
            Operation::ChangeStops {
                take_profit,
                stop_loss,
            },
        )
        .await
    }

    /// Check that the ticket matches the state: Order and Position need one.
    pub fn validate(&self) -> Result<(), BookError> {
        self.ticket().map(|_| ())
    }

    fn ticket(&self) -> Result<Option<u64>, BookError> {
        match (self.state.has_ticket(), self.ticket_id) {
            (true, None) => Err(BookError::MissingTicket { state: self.state }),
            (true, ticket) => Ok(ticket),
            (false, _) => Ok(None),
        }
    }

    /// Run one operation.
    ///
    /// Illegal operations, and Order/Position books without a ticket, return
    /// `Err` before touching the terminal. Legal ones always return `Ok`; a
    /// failed terminal call leaves state and fields as they were.
    pub async fn apply(
        &mut self,
        client: &mut dyn TerminalClient,
        operation: Operation,
    ) -> Result<OperationOutcome, BookError> {
        let effect = transition::plan(self.state, &operation)?;
        let ticket = self.ticket()?;
        if ticket.is_none() {
            // A stale ticket on a Plan book means nothing.
            self.ticket_id = None;
        }
        let ticket = ticket.ok_or(BookError::MissingTicket { state: self.state });

        let attempt = match (effect, &operation) {
            (Effect::PlacePending, _) => self.place_pending(client).await,
            (Effect::CancelPending, _) => self.cancel_pending(client, ticket?).await,
            (Effect::ClosePosition, _) => self.close_position(client, ticket?).await,
            (
                Effect::ModifyPending | Effect::ModifyPosition,
                Operation::ChangeStops {
                    take_profit,
                    stop_loss,
                },
            ) => {
                self.modify_stops(client, effect, ticket?, *take_profit, *stop_loss)
                    .await
            }
            _ => return Ok(self.apply_local(&operation)),
        };
        let attempt = attempt.and_then(|(result, staged)| {
            if effect == Effect::PlacePending && result.is_success() && result.order_id == 0 {
                return Err(TerminalError::Other(format!(
                    "order accepted without a ticket (return code {})",
                    result.return_code
                )));
            }
            Ok((result, staged))
        });

        let previous = self.state;
        let outcome = match attempt {
            Ok((result, staged)) if result.is_success() => {
                self.commit(effect, &result, staged);
                info!(
                    symbol = %self.symbol,
                    ticket = ?self.ticket_id,
                    from = ?previous,
                    to = ?self.state,
                    "Book {}",
                    operation.name()
                );
                OperationOutcome {
                    operation: operation.name().to_string(),
                    success: true,
                    state: self.state,
                    return_code: Some(result.return_code),
                    message: Some(result.comment),
                }
            }
            Ok((result, _)) => {
                warn!(
                    symbol = %self.symbol,
                    return_code = result.return_code,
                    comment = %result.comment,
                    "Book {} rejected",
                    operation.name()
                );
                OperationOutcome {
                    operation: operation.name().to_string(),
                    success: false,
                    state: self.state,
                    return_code: Some(result.return_code),
                    message: Some(result.comment),
                }
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Book {} failed", operation.name());
                OperationOutcome {
                    operation: operation.name().to_string(),
                    success: false,
                    state: self.state,
                    return_code: None,
                    message: Some(e.to_string()),
                }
            }
        };
        Ok(outcome)
    }

    /// Plan-state edits that never reach the terminal.
    fn apply_local(&mut self, operation: &Operation) -> OperationOutcome {
        match operation {
            Operation::ChangePrice { price } => self.open_price = *price,
            Operation::ChangeStops {
                take_profit,
                stop_loss,
            } => {
                self.take_profit = *take_profit;
                self.stop_loss = *stop_loss;
            }
            Operation::Send | Operation::Close => {}
        }
        OperationOutcome::local(operation, self.state)
    }

    fn commit(&mut self, effect: Effect, result: &OrderResult, staged: Staged) {
        self.state = transition::settle(self.state, effect, true);
        if let Some(price) = staged.open_price {
            self.open_price = price;
        }
        if let Some(sl) = staged.stop_loss {
            self.stop_loss = sl;
        }
        if let Some(tp) = staged.take_profit {
            self.take_profit = tp;
        }
        if staged.kind.is_some() {
            self.kind = staged.kind;
        }
        match self.state {
            BookState::Order if effect == Effect::PlacePending => {
                self.ticket_id = Some(result.order_id)
            }
            BookState::Null => self.ticket_id = None,
            _ => {}
        }
    }

    /// Submit a pending order for a planned book.
    async fn place_pending(
        &self,
        client: &mut dyn TerminalClient,
    ) -> Result<(OrderResult, Staged), TerminalError> {
        let info = client.symbol_info(&self.symbol).await?;
        let quote = client.quote(&self.symbol).await?;

        let price = info.round_price(self.open_price);
        let stop_loss = info.round_price(self.stop_loss);
        let take_profit = info.round_price(self.take_profit);
        let kind = pending_kind(price, take_profit, stop_loss, &quote);

        let mut request = OrderRequest::new(TradeAction::Pending, &self.symbol);
        request.volume = self.volume;
        request.kind = Some(kind);
        request.price = Some(price);
        request.stop_loss = Some(stop_loss);
        request.take_profit = Some(take_profit);
        request.magic = self.magic_number;

        let result = client.submit_order(&request).await?;
        Ok((
            result,
            Staged {
                open_price: Some(price),
                stop_loss: Some(stop_loss),
                take_profit: Some(take_profit),
                kind: Some(kind),
            },
        ))
    }

    async fn cancel_pending(
        &self,
        client: &mut dyn TerminalClient,
        ticket: u64,
    ) -> Result<(OrderResult, Staged), TerminalError> {
        let mut request = OrderRequest::new(TradeAction::Remove, &self.symbol);
        request.order = Some(ticket);
        request.magic = self.magic_number;
        let result = client.submit_order(&request).await?;
        Ok((result, Staged::default()))
    }

    /// Close an open position with an opposite deal at market.
    async fn close_position(
        &self,
        client: &mut dyn TerminalClient,
        ticket: u64,
    ) -> Result<(OrderResult, Staged), TerminalError> {
        let (side, volume) = match self.kind {
            Some(kind) => (kind.side(), self.volume),
            None => {
                // Book came from outside without a kind; ask the terminal.
                let positions = client.open_positions().await?;
                let position = positions
                    .iter()
                    .find(|p| p.ticket == ticket)
                    .ok_or_else(|| TerminalError::Other(format!("position {} not found", ticket)))?;
                (position.side, position.volume)
            }
        };

        let quote = client.quote(&self.symbol).await?;
        let closing = side.opposite();
        let mut request = OrderRequest::new(TradeAction::Deal, &self.symbol);
        request.volume = volume;
        request.kind = Some(OrderKind::market(closing));
        request.price = Some(match closing {
            Side::Sell => quote.bid,
            Side::Buy => quote.ask,
        });
        request.position = Some(ticket);
        request.magic = self.magic_number;

        let result = client.submit_order(&request).await?;
        Ok((result, Staged::default()))
    }

    async fn modify_stops(
        &self,
        client: &mut dyn TerminalClient,
        effect: Effect,
        ticket: u64,
        take_profit: Decimal,
        stop_loss: Decimal,
    ) -> Result<(OrderResult, Staged), TerminalError> {
        let info = client.symbol_info(&self.symbol).await?;
        let take_profit = info.round_price(take_profit);
        let stop_loss = info.round_price(stop_loss);

        let mut request = if effect == Effect::ModifyPending {
            let mut request = OrderRequest::new(TradeAction::Modify, &self.symbol);
            request.order = Some(ticket);
            request.price = Some(info.round_price(self.open_price));
            request
        } else {
            let mut request = OrderRequest::new(TradeAction::SlTp, &self.symbol);
            request.position = Some(ticket);
            request
        };
        request.stop_loss = Some(stop_loss);
        request.take_profit = Some(take_profit);
        request.magic = self.magic_number;

        let result = client.submit_order(&request).await?;
        Ok((
            result,
            Staged {
                stop_loss: Some(stop_loss),
                take_profit: Some(take_profit),
                ..Default::default()
            },
        ))
    }
}

/// Pick the pending order type for an open price.
///
/// Direction comes from the take profit (above the open price means long);
/// without a take profit the stop loss decides (below means long). A buy
/// above the ask is a stop, otherwise a limit; a sell below the bid is a
/// stop, otherwise a limit.
pub fn pending_kind(
    price: Decimal,
    take_profit: Decimal,
    stop_loss: Decimal,
    quote: &Quote,
) -> OrderKind {
    let side = if !take_profit.is_zero() {
        if take_profit > price {
            Side::Buy
        } else {
            Side::Sell
        }
    } else if !stop_loss.is_zero() && stop_loss > price {
        Side::Sell
    } else {
        Side::Buy
    };

    match side {
        Side::Buy if price > quote.ask => OrderKind::BuyStop,
        Side::Buy => OrderKind::BuyLimit,
        Side::Sell if price < quote.bid => OrderKind::SellStop,
        Side::Sell => OrderKind::SellLimit,
    }
}
