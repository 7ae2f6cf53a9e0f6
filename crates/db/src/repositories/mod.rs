//! Repository layer.
//!
//! Each repository wraps a shared connection and maps `DbErr` into
//! [`AppError::Database`](khidmat_common::AppError::Database).

mod duty_chart;
mod miqaat;
mod notification;
mod payment;
mod user;

pub use duty_chart::{DutyChartFilter, DutyChartRepository};
pub use miqaat::MiqaatRepository;
pub use notification::NotificationRepository;
pub use payment::{PaymentFilter, PaymentRepository};
pub use user::{UserFilter, UserRepository};
