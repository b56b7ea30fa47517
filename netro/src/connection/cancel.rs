//! Out of band statement cancellation.
use std::sync::Arc;

use crate::{
    Result,
    common::{debug, warning},
    net::NzStream,
    netezza::{backend::BackendKeyData, frontend::CancelRequest},
};

/// Handle to cancel the statement in progress on a connection.
///
/// The request is sent on a new socket, so it can be used while the
/// connection itself is blocked reading a result. Cheap to clone, and can be
/// sent to another task.
#[derive(Debug, Clone)]
pub struct Canceller {
    host: Arc<str>,
    port: u16,
    key: BackendKeyData,
}

impl Canceller {
    pub(crate) fn new(host: &str, port: u16, key: BackendKeyData) -> Self {
        Self { host: host.into(), port, key }
    }

    /// Request cancellation of the statement in progress.
    ///
    /// Returns once the request is written, without waiting for the
    /// statement to actually stop. Calling this while nothing runs, or more
    /// than once, is harmless.
    pub async fn cancel(&self) -> Result<()> {
        debug!("cancel request for backend {}", self.key.process_id);

        let mut stream = NzStream::connect(&self.host, self.port).await?;
        CancelRequest {
            process_id: self.key.process_id,
            secret_key: self.key.secret_key,
        }
        .write(stream.write_buf());
        stream.flush().await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Fire [`cancel`][Canceller::cancel] in the background.
    pub(crate) fn spawn(&self) {
        let me = self.clone();
        tokio::spawn(async move {
            if let Err(_err) = me.cancel().await {
                warning!("failed to send cancel request: {_err}");
            }
        });
    }

    /// Backend process id targeted by this handle.
    pub fn process_id(&self) -> u32 {
        self.key.process_id
    }
}
