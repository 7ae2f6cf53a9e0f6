//! Business logic services.

#![allow(missing_docs)]

pub mod auth;
pub mod duty_chart;
pub mod finance;
pub mod mail;
pub mod miqaat;
pub mod notification;
pub mod user;

pub use auth::{AuthService, Claims};
pub use duty_chart::DutyChartService;
pub use finance::FinanceService;
pub use mail::{LogMailer, Mailer, MessageId, SendError, SmtpMailer};
pub use miqaat::MiqaatService;
pub use notification::NotificationService;
pub use user::{UserService, UserSummary};
