//! RabbitMQ queue publisher.
//!
//! Lifecycle is `Disconnected → Connected → Disconnected`: [`QueuePublisher::connect`]
//! opens the connection and declares the queue, [`QueuePublisher::publish`]
//! sends one message, [`QueuePublisher::disconnect`] always releases the
//! connection. The broker client sits behind [`Connector`] / [`BrokerSession`]
//! so the lifecycle can be tested without a broker.

use std::future::Future;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};

use crate::error::PublishError;

/// AMQP persistent delivery mode.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Per-message AMQP properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: &'static str,
    pub persistent: bool,
}

/// Properties used for every weather message.
pub const JSON_PERSISTENT: MessageProperties = MessageProperties {
    content_type: "application/json",
    persistent: true,
};

/// An open broker connection with a channel bound to one queue.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Whether the underlying connection is still usable.
    fn is_open(&self) -> bool;

    /// Publish `body` to `queue` on the default exchange.
    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<(), PublishError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), PublishError>;
}

/// Opens broker sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: BrokerSession;

    /// Connect and declare `queue` as durable. Declaration is idempotent.
    async fn connect(&self, url: &str, queue: &str) -> Result<Self::Session, PublishError>;
}

/// [`Connector`] backed by `lapin`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LapinConnector;

/// Connection and confirm-mode channel opened by [`LapinConnector`].
pub struct LapinSession {
    connection: Connection,
    channel: Channel,
}

/// AMQP properties for one delivery.
fn amqp_properties(properties: MessageProperties) -> BasicProperties {
    let amqp = BasicProperties::default().with_content_type(properties.content_type.into());
    if properties.persistent {
        amqp.with_delivery_mode(DELIVERY_MODE_PERSISTENT)
    } else {
        amqp
    }
}

/// Queue survives a broker restart.
fn queue_declare_options() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

async fn open_channel(connection: &Connection, queue: &str) -> Result<Channel, PublishError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| PublishError::Connection(format!("amqp channel: {e}")))?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| PublishError::Connection(format!("amqp confirm mode: {e}")))?;
    channel
        .queue_declare(queue, queue_declare_options(), FieldTable::default())
        .await
        .map_err(|e| PublishError::Connection(format!("amqp declare: {e}")))?;
    Ok(channel)
}

async fn close_connection(connection: &Connection) -> Result<(), PublishError> {
    connection
        .close(200, "OK")
        .await
        .map_err(|e| PublishError::Connection(format!("amqp close: {e}")))
}

/// Run `close` when `result` is an error. The original error is returned
/// either way; a close failure is only logged.
async fn close_on_error<T, F, Fut>(
    result: Result<T, PublishError>,
    close: F,
) -> Result<T, PublishError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), PublishError>>,
{
    if result.is_err() {
        if let Err(e) = close().await {
            log::warn!("Failed to release connection after setup error: {}", e);
        }
    }
    result
}

#[async_trait]
impl Connector for LapinConnector {
    type Session = LapinSession;

    async fn connect(&self, url: &str, queue: &str) -> Result<LapinSession, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| PublishError::Connection(format!("amqp connect: {e}")))?;

        let setup = open_channel(&connection, queue).await;
        let channel = close_on_error(setup, || close_connection(&connection)).await?;
        Ok(LapinSession {
            connection,
            channel,
        })
    }
}

#[async_trait]
impl BrokerSession for LapinSession {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn publish(
        &self,
        queue: &str,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<(), PublishError> {
        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                amqp_properties(properties),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(PublishError::Rejected(queue.to_string()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        close_connection(&self.connection).await
    }
}

/// Publisher owning at most one broker session.
pub struct QueuePublisher<C: Connector = LapinConnector> {
    connector: C,
    url: String,
    queue: String,
    session: Option<C::Session>,
}

impl<C: Connector> QueuePublisher<C> {
    pub fn new(connector: C, url: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            connector,
            url: url.into(),
            queue: queue.into(),
            session: None,
        }
    }

    /// Whether a session is held and still open.
    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_open())
    }

    /// Connect to the broker and declare the queue.
    ///
    /// No-op when already connected. A stale session left by a dropped
    /// connection is released first.
    pub async fn connect(&mut self) -> Result<(), PublishError> {
        if self.is_connected() {
            return Ok(());
        }
        self.disconnect().await;

        log::info!("Connecting to RabbitMQ...");
        match self.connector.connect(&self.url, &self.queue).await {
            Ok(session) => {
                self.session = Some(session);
                log::info!("Connected to RabbitMQ, queue: {}", self.queue);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to connect to RabbitMQ: {}", e);
                Err(e)
            }
        }
    }

    /// Publish one JSON message as a persistent delivery.
    ///
    /// Fails with [`PublishError::NotConnected`] without touching the broker
    /// when no open session is held.
    pub async fn publish(&self, message: &str) -> Result<(), PublishError> {
        let session = match &self.session {
            Some(session) if session.is_open() => session,
            _ => return Err(PublishError::NotConnected),
        };

        session
            .publish(&self.queue, message.as_bytes(), JSON_PERSISTENT)
            .await
            .inspect_err(|e| log::error!("Failed to publish message: {}", e))?;
        log::info!("Published message to queue: {}", self.queue);
        Ok(())
    }

    /// Release the session. Safe to call in any state; close errors are
    /// logged, never returned.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if !session.is_open() {
            return;
        }
        match session.close().await {
            Ok(()) => log::info!("Disconnected from RabbitMQ"),
            Err(e) => log::warn!("Error during disconnect: {}", e),
        }
    }
}

/// Connect, publish a single message and disconnect.
///
/// The connection is released whether or not the publish succeeds.
pub async fn publish_once<C: Connector>(
    connector: C,
    url: &str,
    queue: &str,
    message: &str,
) -> Result<(), PublishError> {
    let mut publisher = QueuePublisher::new(connector, url, queue);
    publisher.connect().await?;
    let result = publisher.publish(message).await;
    publisher.disconnect().await;
    result
}
