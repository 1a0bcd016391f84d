//! Background email sender.
//!
//! [`Mailer::send`] renders a message and puts it on a bounded queue; a
//! single worker task delivers queued messages over one SMTP session, closes
//! that session after a quiet period, and reopens it on the next message.
//! Delivery failures are logged and the message dropped.

use std::sync::Arc;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Address, Message};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gatekeep_core::{EmailConfig, Sender};

use crate::error::NotifyError;
use crate::render::{EmailRenderer, EmailRequest, InlineImage, RenderedEmail};
use crate::transport::{MailSession, MailTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailerOptions {
    pub queue_capacity: usize,
    /// Close the SMTP session when nothing was queued for this long.
    pub idle_timeout: Duration,
}

impl Default for MailerOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 5,
            idle_timeout: Duration::from_secs(10),
        }
    }
}

impl MailerOptions {
    pub fn from_config(config: &EmailConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }
}

pub struct Mailer {
    queue: mpsc::Sender<Message>,
    worker: JoinHandle<()>,
    renderer: EmailRenderer,
    from: Mailbox,
}

impl Mailer {
    /// Check the server answers, then start the send worker.
    pub async fn start(
        transport: Arc<dyn MailTransport>,
        renderer: EmailRenderer,
        sender: &Sender,
        options: MailerOptions,
    ) -> Result<Self, NotifyError> {
        let from = mailbox(&sender.name, &sender.email)?;

        tracing::debug!("starting send worker");
        let probe = Arc::clone(&transport);
        tokio::task::spawn_blocking(move || probe.open()?.close())
            .await
            .map_err(|e| NotifyError::Worker(e.to_string()))??;

        let (queue, rx) = mpsc::channel(options.queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(transport, rx, options.idle_timeout));
        tracing::info!("send worker started");

        Ok(Self {
            queue,
            worker,
            renderer,
            from,
        })
    }

    /// Render `request` and queue it, waiting while the queue is full.
    pub async fn send(&self, request: &EmailRequest) -> Result<(), NotifyError> {
        let rendered = self.renderer.render(request)?;
        let message = build_message(&self.from, request, &rendered, self.renderer.images())?;
        tracing::debug!(to = %request.to, kind = request.kind.as_str(), "queueing email");
        self.queue
            .send(message)
            .await
            .map_err(|_| NotifyError::Closed)
    }

    /// Stop accepting messages and wait until every queued one is handled.
    pub async fn shutdown(self) -> Result<(), NotifyError> {
        let Mailer { queue, worker, .. } = self;
        drop(queue);
        worker.await.map_err(|e| NotifyError::Worker(e.to_string()))
    }
}

fn mailbox(name: &str, address: &str) -> Result<Mailbox, NotifyError> {
    let parsed: Address = address.parse().map_err(|source| NotifyError::Address {
        address: address.to_string(),
        source,
    })?;
    let name = (!name.is_empty()).then(|| name.to_string());
    Ok(Mailbox::new(name, parsed))
}

fn build_message(
    from: &Mailbox,
    request: &EmailRequest,
    rendered: &RenderedEmail,
    images: &[InlineImage],
) -> Result<Message, NotifyError> {
    let to = mailbox(&request.to_name, &request.to)?;

    let mut body = MultiPart::related().singlepart(SinglePart::html(rendered.html.clone()));
    if !images.is_empty() {
        let jpeg = ContentType::parse("image/jpeg")?;
        for image in images {
            body = body.singlepart(
                Attachment::new_inline(image.content_id.clone())
                    .body(image.bytes.clone(), jpeg.clone()),
            );
        }
    }

    Ok(Message::builder()
        .from(from.clone())
        .to(to)
        .subject(rendered.subject.clone())
        .multipart(body)?)
}

async fn run_worker(
    transport: Arc<dyn MailTransport>,
    mut queue: mpsc::Receiver<Message>,
    idle_timeout: Duration,
) {
    let mut session: Option<Box<dyn MailSession>> = None;
    loop {
        let next = if session.is_some() {
            match tokio::time::timeout(idle_timeout, queue.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::debug!("no email queued recently, closing smtp session");
                    close(session.take()).await;
                    continue;
                }
            }
        } else {
            queue.recv().await
        };
        let Some(message) = next else {
            break;
        };

        let transport = Arc::clone(&transport);
        let current = session.take();
        session = match tokio::task::spawn_blocking(move || {
            deliver(transport.as_ref(), current, &message)
        })
        .await
        {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "email delivery task failed");
                None
            }
        };
    }
    close(session.take()).await;
    tracing::info!("send worker stopped");
}

async fn close(session: Option<Box<dyn MailSession>>) {
    let Some(session) = session else {
        return;
    };
    match tokio::task::spawn_blocking(move || session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "error closing smtp session"),
        Err(err) => tracing::warn!(error = %err, "smtp close task failed"),
    }
}

fn deliver(
    transport: &dyn MailTransport,
    session: Option<Box<dyn MailSession>>,
    message: &Message,
) -> Option<Box<dyn MailSession>> {
    let to = recipients(message);
    let mut session = match session {
        Some(session) => session,
        None => match transport.open() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(to = %to, error = %err, "error dialing smtp, email dropped");
                return None;
            }
        },
    };
    tracing::info!(to = %to, "sending email");
    if let Err(err) = session.send(message) {
        tracing::warn!(to = %to, error = %err, "error sending email");
    }
    Some(session)
}

fn recipients(message: &Message) -> String {
    message
        .envelope()
        .to()
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
