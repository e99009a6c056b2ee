mod notification;
mod seller_dashboard;

pub use notification::{EmailBody, LogMailer, Mailer, NotificationService};
pub use seller_dashboard::{DashboardProjection, DashboardStore};
