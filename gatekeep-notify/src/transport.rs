//! Outbound mail delivery.
//!
//! A [`MailTransport`] opens [`MailSession`]s; a session stays connected
//! across sends until closed. Both are blocking and are driven from
//! `spawn_blocking` by the mailer.

use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::extension::ClientId;
use lettre::{Message, Transport};

use gatekeep_core::EmailConfig;

use crate::error::NotifyError;

pub trait MailTransport: Send + Sync + 'static {
    /// Connect and check the server answers.
    fn open(&self) -> Result<Box<dyn MailSession>, NotifyError>;
}

pub trait MailSession: Send {
    fn send(&mut self, message: &Message) -> Result<(), NotifyError>;
    fn close(self: Box<Self>) -> Result<(), NotifyError>;
}

/// Plain SMTP, optionally authenticated.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    hello_name: String,
}

impl SmtpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            credentials: None,
            hello_name: "localhost".to_string(),
        }
    }

    pub fn from_config(config: &EmailConfig) -> Self {
        let mut transport = Self::new(config.host.clone(), config.port);
        transport.hello_name = config.hello_name.clone();
        if let Some(username) = config.username.as_ref().filter(|u| !u.is_empty()) {
            let password = config.password.clone().unwrap_or_default();
            transport.credentials = Some((username.clone(), password));
        }
        transport
    }
}

impl MailTransport for SmtpTransport {
    fn open(&self) -> Result<Box<dyn MailSession>, NotifyError> {
        let mut builder = lettre::SmtpTransport::builder_dangerous(self.host.as_str())
            .port(self.port)
            .hello_name(ClientId::Domain(self.hello_name.clone()));
        if let Some((username, password)) = &self.credentials {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        let transport = builder.build();

        tracing::debug!(host = %self.host, port = self.port, "dialing smtp");
        if !transport.test_connection()? {
            return Err(NotifyError::Unreachable {
                host: self.host.clone(),
                port: self.port,
            });
        }
        Ok(Box::new(SmtpSession { transport }))
    }
}

struct SmtpSession {
    transport: lettre::SmtpTransport,
}

impl MailSession for SmtpSession {
    fn send(&mut self, message: &Message) -> Result<(), NotifyError> {
        self.transport.send(message)?;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), NotifyError> {
        // Dropping the transport sends QUIT on every pooled connection.
        drop(self.transport);
        Ok(())
    }
}
