//! Database entities.

#![allow(missing_docs)]

pub mod duty_chart;
pub mod miqaat;
pub mod notification;
pub mod payment;
pub mod user;

pub use duty_chart::Entity as DutyChart;
pub use miqaat::Entity as Miqaat;
pub use notification::Entity as Notification;
pub use payment::Entity as Payment;
pub use user::Entity as User;
