use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Account & Symbol
// ---------------------------------------------------------------------------

/// Snapshot of the account currently logged in on a terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Login id of the authenticated account.
    pub login: u64,
    pub server: String,
    pub balance: Decimal,
    pub equity: Decimal,
    pub margin_free: Decimal,
    pub currency: String,
}

/// Static properties of a tradable symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    /// Number of decimal places prices are quoted with.
    pub digits: u32,
    /// Smallest price increment (10^-digits).
    pub point: Decimal,
    pub volume_min: Decimal,
    pub volume_step: Decimal,
}

impl SymbolInfo {
    /// Round a price to this symbol's declared precision.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp(self.digits)
    }
}

/// Current top of book for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub time: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Trade requests
// ---------------------------------------------------------------------------

/// Direction of exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// What a trade request asks the terminal to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// Immediate execution at market.
    Deal,
    /// Place a pending order.
    Pending,
    /// Modify price/stops of a pending order.
    Modify,
    /// Modify stops of an open position.
    SlTp,
    /// Delete a pending order.
    Remove,
}

/// Order sub-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl OrderKind {
    pub fn side(&self) -> Side {
        match self {
            OrderKind::Buy | OrderKind::BuyLimit | OrderKind::BuyStop => Side::Buy,
            OrderKind::Sell | OrderKind::SellLimit | OrderKind::SellStop => Side::Sell,
        }
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderKind::Buy | OrderKind::Sell)
    }

    /// Market order kind for a side.
    pub fn market(side: Side) -> Self {
        match side {
            Side::Buy => OrderKind::Buy,
            Side::Sell => OrderKind::Sell,
        }
    }
}

/// A request submitted to the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub action: TradeAction,
    pub symbol: String,
    pub volume: Decimal,
    pub kind: Option<OrderKind>,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Ticket of the pending order targeted by Modify/Remove.
    pub order: Option<u64>,
    /// Ticket of the position targeted by SlTp or a closing Deal.
    pub position: Option<u64>,
    pub magic: u64,
    /// Maximum acceptable slippage in points for market deals.
    pub deviation: u32,
    pub comment: String,
}

impl OrderRequest {
    pub fn new(action: TradeAction, symbol: &str) -> Self {
        Self {
            action,
            symbol: symbol.to_string(),
            volume: Decimal::ZERO,
            kind: None,
            price: None,
            stop_loss: None,
            take_profit: None,
            order: None,
            position: None,
            magic: 0,
            deviation: DEFAULT_DEVIATION,
            comment: String::new(),
        }
    }
}

/// Default slippage allowance for market deals, in points.
pub const DEFAULT_DEVIATION: u32 = 20;

/// Request completed.
pub const RETCODE_DONE: u32 = 10009;
/// Pending order placed.
pub const RETCODE_PLACED: u32 = 10008;
/// Request rejected.
pub const RETCODE_REJECT: u32 = 10006;
/// Invalid stops in the request.
pub const RETCODE_INVALID_STOPS: u32 = 10016;

/// Terminal reply to an [`OrderRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub return_code: u32,
    /// Ticket of the order created or affected, 0 if none.
    pub order_id: u64,
    pub comment: String,
}

impl OrderResult {
    pub fn is_success(&self) -> bool {
        matches!(self.return_code, RETCODE_DONE | RETCODE_PLACED)
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// A pending order as listed by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub ticket: u64,
    pub symbol: String,
    pub kind: OrderKind,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub magic: u64,
}

/// An open position as listed by the terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub price_open: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub magic: u64,
}
