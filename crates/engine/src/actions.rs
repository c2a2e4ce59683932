use crate::action::Action;
use crate::error::DeskError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use termdesk_book::{load_books, Book, Operation};
use termdesk_core::TerminalClient;
use tracing::info;

fn to_value(value: &impl Serialize) -> Result<Value, DeskError> {
    serde_json::to_value(value).map_err(|e| DeskError::Action(e.to_string()))
}

/// Reports the account the terminal is logged into.
#[derive(Debug, Default)]
pub struct AccountInfoAction;

#[async_trait]
impl Action for AccountInfoAction {
    fn name(&self) -> &str {
        "account_info"
    }

    async fn run(&mut self, terminal: &mut dyn TerminalClient) -> Result<Value, DeskError> {
        let account = terminal
            .current_account()
            .await?
            .ok_or_else(|| DeskError::Action("no account logged in".to_string()))?;
        to_value(&account)
    }
}

/// Lists the terminal's orders and positions as books.
#[derive(Debug, Default)]
pub struct ListBooksAction {
    pub magic: Option<u64>,
}

impl ListBooksAction {
    pub fn new(magic: Option<u64>) -> Self {
        Self { magic }
    }
}

#[async_trait]
impl Action for ListBooksAction {
    fn name(&self) -> &str {
        "list_books"
    }

    async fn run(&mut self, terminal: &mut dyn TerminalClient) -> Result<Value, DeskError> {
        let books = load_books(terminal, self.magic).await?;
        to_value(&books)
    }
}

/// Applies one operation to a book.
///
/// By default a terminal rejection is a successful action whose outcome says
/// `success: false`. With [`escalating`](Self::escalating) it becomes an
/// action error and goes through the retry policy.
#[derive(Debug)]
pub struct BookAction {
    book: Book,
    operation: Operation,
    escalate: bool,
}

impl BookAction {
    pub fn new(book: Book, operation: Operation) -> Self {
        Self {
            book,
            operation,
            escalate: false,
        }
    }

    pub fn escalating(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn book(&self) -> &Book {
        &self.book
    }
}

#[async_trait]
impl Action for BookAction {
    fn name(&self) -> &str {
        self.operation.name()
    }

    async fn run(&mut self, terminal: &mut dyn TerminalClient) -> Result<Value, DeskError> {
        let mut outcome = self.book.apply(terminal, self.operation.clone()).await?;
        if self.escalate {
            outcome = outcome.escalate()?;
        }
        Ok(json!({
            "book": to_value(&self.book)?,
            "outcome": to_value(&outcome)?,
        }))
    }

    async fn on_end(&mut self, _result: &Value) {
        info!(
            symbol = %self.book.symbol,
            state = ?self.book.state,
            ticket = ?self.book.ticket_id,
            "Book updated"
        );
    }
}
