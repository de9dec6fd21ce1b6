//! Multi-step business operations.
//!
//! Each service runs its reads and writes in one transaction, then
//! publishes to the [`NotificationHub`](crate::hub::NotificationHub) once
//! the transaction has committed.

pub mod cancellations;
pub mod orders;
pub mod payments;
pub mod reports;
pub mod stock;

pub use cancellations::{CancellationService, DecisionOutcome, LineDecision};
pub use orders::{OrderDetail, OrderService};
pub use payments::{CashReceipt, PaymentRequest, PaymentResolution, PaymentService};
pub use reports::ReportService;
pub use stock::{OutOfStockOutcome, ReceiveOutcome, RestockOutcome, StockService};
