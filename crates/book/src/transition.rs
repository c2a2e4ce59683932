use crate::error::BookError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookState {
    /// No instruction (closed or cancelled).
    Null,
    /// Proposed, not sent.
    #[default]
    Plan,
    /// Pending order on the terminal, unfilled.
    Order,
    /// Filled and open.
    Position,
}

impl BookState {
    pub const ALL: [BookState; 4] = [
        BookState::Null,
        BookState::Plan,
        BookState::Order,
        BookState::Position,
    ];

    /// Whether the book carries a terminal ticket in this state.
    pub fn has_ticket(&self) -> bool {
        matches!(self, BookState::Order | BookState::Position)
    }
}

/// A mutating operation on a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Send,
    Close,
    ChangePrice {
        price: Decimal,
    },
    ChangeStops {
        take_profit: Decimal,
        stop_loss: Decimal,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Send => "send",
            Operation::Close => "close",
            Operation::ChangePrice { .. } => "change_price",
            Operation::ChangeStops { .. } => "change_stops",
        }
    }
}

/// What carrying out a legal operation involves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Mutate fields locally; no terminal call, always succeeds.
    Local,
    PlacePending,
    CancelPending,
    ClosePosition,
    ModifyPending,
    ModifyPosition,
}

/// The transition table: which effect an operation has in a state.
pub fn plan(state: BookState, operation: &Operation) -> Result<Effect, BookError> {
    use BookState::*;

    let effect = match (state, operation) {
        (Plan, Operation::Send) => Effect::PlacePending,
        (Order, Operation::Close) => Effect::CancelPending,
        (Position, Operation::Close) => Effect::ClosePosition,
        (Plan, Operation::ChangePrice { .. }) => Effect::Local,
        (Plan, Operation::ChangeStops { .. }) => Effect::Local,
        (Order, Operation::ChangeStops { .. }) => Effect::ModifyPending,
        (Position, Operation::ChangeStops { .. }) => Effect::ModifyPosition,
        (Null | Order | Position, Operation::Send)
        | (Null | Plan, Operation::Close)
        | (Null | Order | Position, Operation::ChangePrice { .. })
        | (Null, Operation::ChangeStops { .. }) => {
            return Err(BookError::IllegalState {
                state,
                operation: operation.name(),
            })
        }
    };
    Ok(effect)
}

/// State after an effect completed with the given success flag.
pub fn settle(state: BookState, effect: Effect, success: bool) -> BookState {
    if !success {
        return state;
    }
    match effect {
        Effect::PlacePending => BookState::Order,
        Effect::CancelPending | Effect::ClosePosition => BookState::Null,
        Effect::Local | Effect::ModifyPending | Effect::ModifyPosition => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn operations() -> Vec<Operation> {
        vec![
            Operation::Send,
            Operation::Close,
            Operation::ChangePrice { price: dec!(1.1) },
            Operation::ChangeStops {
                take_profit: dec!(1.2),
                stop_loss: dec!(1.0),
            },
        ]
    }

    #[test]
    fn test_legal_pairs() {
        use BookState::*;
        let legal = [
            (Plan, "send", Effect::PlacePending),
            (Order, "close", Effect::CancelPending),
            (Position, "close", Effect::ClosePosition),
            (Plan, "change_price", Effect::Local),
            (Plan, "change_stops", Effect::Local),
            (Order, "change_stops", Effect::ModifyPending),
            (Position, "change_stops", Effect::ModifyPosition),
        ];

        for state in BookState::ALL {
            for op in operations() {
                let expected = legal
                    .iter()
                    .find(|(s, name, _)| *s == state && *name == op.name())
                    .map(|(_, _, effect)| *effect);
                match expected {
                    Some(effect) => assert_eq!(plan(state, &op), Ok(effect)),
                    None => assert_eq!(
                        plan(state, &op),
                        Err(BookError::IllegalState {
                            state,
                            operation: op.name()
                        }),
                        "{:?} in {:?} should be illegal",
                        op,
                        state
                    ),
                }
            }
        }
    }

    #[test]
    fn test_settle() {
        use BookState::*;
        assert_eq!(settle(Plan, Effect::PlacePending, true), Order);
        assert_eq!(settle(Plan, Effect::PlacePending, false), Plan);
        assert_eq!(settle(Order, Effect::CancelPending, true), Null);
        assert_eq!(settle(Order, Effect::CancelPending, false), Order);
        assert_eq!(settle(Position, Effect::ClosePosition, true), Null);
        assert_eq!(settle(Position, Effect::ClosePosition, false), Position);
        assert_eq!(settle(Order, Effect::ModifyPending, true), Order);
        assert_eq!(settle(Position, Effect::ModifyPosition, false), Position);
        assert_eq!(settle(Plan, Effect::Local, true), Plan);
    }

    #[test]
    fn test_operation_wire_format() {
        let op: Operation =
            serde_json::from_str(r#"{"op": "change_price", "price": "1.25"}"#).unwrap();
        assert_eq!(op, Operation::ChangePrice { price: dec!(1.25) });
    }
}
