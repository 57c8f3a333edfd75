use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::GraphConfig;
use crate::errors::GraphError;
use crate::graph::protocol::{GremlinRequest, GremlinResponse};
use crate::observability::messages::{graph::GraphConnected, StructuredLog};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One WebSocket session with the Gremlin Server.
struct Connection {
    stream: WsStream,
}

impl Connection {
    async fn open(endpoint: &str) -> Result<Self, GraphError> {
        let (stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| GraphError::Connection {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { stream })
    }

    /// Submit one request and collect result rows across partial frames.
    async fn submit(
        &mut self,
        request: &GremlinRequest,
        deadline: Duration,
        operation: &'static str,
    ) -> Result<Vec<serde_json::Value>, GraphError> {
        let frame = serde_json::to_string(request).map_err(|e| GraphError::Operation {
            operation,
            message: format!("failed to serialize request: {}", e),
        })?;

        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| GraphError::Operation {
                operation,
                message: format!("send failed: {}", e),
            })?;

        let mut rows = Vec::new();
        loop {
            let next = timeout(deadline, self.stream.next())
                .await
                .map_err(|_| GraphError::Operation {
                    operation,
                    message: format!("no response within {:?}", deadline),
                })?;

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    return Err(GraphError::Operation {
                        operation,
                        message: format!("receive failed: {}", e),
                    })
                }
                None => {
                    return Err(GraphError::Operation {
                        operation,
                        message: "connection closed mid-request".to_string(),
                    })
                }
            };

            let text = match message {
                Message::Text(text) => text.to_string(),
                Message::Binary(bytes) => String::from_utf8_lossy(&bytes).to_string(),
                Message::Ping(_) | Message::Pong(_) => continue,
                Message::Close(_) => {
                    return Err(GraphError::Operation {
                        operation,
                        message: "server closed the session".to_string(),
                    })
                }
                _ => continue,
            };

            let response: GremlinResponse =
                serde_json::from_str(&text).map_err(|e| GraphError::Operation {
                    operation,
                    message: format!("unreadable response frame: {}", e),
                })?;

            // Interleaved frames for other requests cannot happen on a
            // dedicated session, but drop them rather than misattribute
            if response.request_id != request.request_id {
                continue;
            }

            rows.extend(response.rows());

            if response.is_terminal() {
                if response.is_success() {
                    return Ok(rows);
                }
                return Err(GraphError::Operation {
                    operation,
                    message: format!(
                        "server status {}: {}",
                        response.status.code, response.status.message
                    ),
                });
            }
        }
    }
}

/// Pooled Gremlin Server client. Holds `connection_pool_size` sessions;
/// every submit borrows one for the duration of a single request.
pub struct GremlinClient {
    endpoint: String,
    request_timeout: Duration,
    idle: Mutex<VecDeque<Connection>>,
    permits: Semaphore,
}

impl GremlinClient {
    /// Establish the pool and verify it with a trivial query.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let mut idle = VecDeque::with_capacity(config.connection_pool_size);
        for _ in 0..config.connection_pool_size.max(1) {
            idle.push_back(Connection::open(&config.endpoint).await?);
        }

        let client = Self {
            endpoint: config.endpoint.clone(),
            request_timeout: config.request_timeout,
            permits: Semaphore::new(idle.len()),
            idle: Mutex::new(idle),
        };

        client
            .submit("g.V().limit(1).count()", serde_json::Map::new(), "connect")
            .await?;

        GraphConnected {
            endpoint: &client.endpoint,
            pool_size: client.permits.available_permits(),
        }
        .log();

        Ok(client)
    }

    /// Evaluate a script with bindings and return the flattened rows.
    pub async fn submit(
        &self,
        gremlin: &str,
        bindings: serde_json::Map<String, serde_json::Value>,
        operation: &'static str,
    ) -> Result<Vec<serde_json::Value>, GraphError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| GraphError::Operation {
                operation,
                message: "connection pool closed".to_string(),
            })?;

        // Take a session; replace a broken one instead of poisoning the pool
        let mut connection = match self.idle.lock().await.pop_front() {
            Some(connection) => connection,
            None => Connection::open(&self.endpoint).await?,
        };

        let request = GremlinRequest::eval(gremlin, bindings);
        match connection
            .submit(&request, self.request_timeout, operation)
            .await
        {
            Ok(rows) => {
                self.idle.lock().await.push_back(connection);
                Ok(rows)
            }
            Err(error) => {
                // The session may be mid-stream; discard it and open a
                // replacement so the pool keeps its size
                drop(connection);
                if let Ok(replacement) = Connection::open(&self.endpoint).await {
                    self.idle.lock().await.push_back(replacement);
                }
                Err(error)
            }
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
