//! User notifications: Tera-rendered HTML email delivered over SMTP by a
//! background worker.

pub mod error;
pub mod mailer;
#[cfg(any(test, feature = "test-util"))]
pub mod recording;
pub mod render;
pub mod transport;

pub use error::NotifyError;
pub use mailer::{Mailer, MailerOptions};
pub use render::{EmailKind, EmailRenderer, EmailRequest, InlineImage, RenderedEmail};
pub use transport::{MailSession, MailTransport, SmtpTransport};

pub use lettre::Message;
