use crate::book::Book;
use termdesk_core::{TerminalClient, TerminalError};
use tracing::debug;

/// Materialize the terminal's pending orders and open positions as books.
///
/// Orders come first, then positions. With `magic` set, only books carrying
/// that magic number are returned.
pub async fn load_books(
    client: &mut dyn TerminalClient,
    magic: Option<u64>,
) -> Result<Vec<Book>, TerminalError> {
    let orders = client.pending_orders().await?;
    let positions = client.open_positions().await?;
    debug!(orders = orders.len(), positions = positions.len(), "Loaded inventory");

    let books = orders
        .iter()
        .map(Book::from_order)
        .chain(positions.iter().map(Book::from_position))
        .filter(|book| magic.map_or(true, |m| book.magic_number == m))
        .collect();
    Ok(books)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::BookState;
    use rust_decimal_macros::dec;
    use termdesk_core::*;
    use termdesk_terminals_simulated::SimulatedTerminal;

    #[tokio::test]
    async fn test_inventory_is_order_or_position() {
        let mut terminal = SimulatedTerminal::demo();
        terminal.initialize("/t").await.unwrap();
        terminal.add_order(OrderRecord {
            ticket: 1,
            symbol: "EURUSD".to_string(),
            kind: OrderKind::SellStop,
            volume: dec!(0.1),
            price_open: dec!(1.07),
            stop_loss: dec!(1.08),
            take_profit: dec!(1.06),
            magic: 7,
        });
        terminal.add_position(PositionRecord {
            ticket: 2,
            symbol: "XAUUSD".to_string(),
            side: Side::Buy,
            volume: dec!(0.01),
            price_open: dec!(2300),
            stop_loss: dec!(2290),
            take_profit: dec!(2400),
            magic: 8,
        });

        let books = load_books(&mut terminal, None).await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].state, BookState::Order);
        assert_eq!(books[0].ticket_id, Some(1));
        assert_eq!(books[0].kind, Some(OrderKind::SellStop));
        assert_eq!(books[1].state, BookState::Position);
        assert_eq!(books[1].kind, Some(OrderKind::Buy));
        assert!(books.iter().all(|b| b.state != BookState::Plan));

        let filtered = load_books(&mut terminal, Some(8)).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].symbol, "XAUUSD");
    }
}
