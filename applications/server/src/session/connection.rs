//! Per-connection protocol engine
//!
//! UNDETERMINED → {CONTROL, AUDIO} → CLOSED. The first request decides the
//! kind: server-info opens a CONTROL connection with a new session, song data
//! with a live session id opens an AUDIO connection. Anything else closes the
//! connection.

use crate::audio::{self, Span};
use crate::error::{Result, ServerError};
use crate::protocol::request::{DaapRequest, RequestCodec, RequestKind, DEFAULT_CLIENT_VERSION};
use crate::protocol::{processor, Response};
use crate::services::AuthOutcome;
use crate::session::pool::{ConnectionId, ConnectionKind, Registration, Session};
use crate::state::AppState;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tuneshare_catalog::{DatabaseId, SongId};

/// What to do after a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

pub struct Connection<S> {
    id: ConnectionId,
    state: AppState,
    cancel: CancellationToken,
    reader: FramedRead<ReadHalf<S>, RequestCodec>,
    writer: BufWriter<WriteHalf<S>>,
    kind: ConnectionKind,
    session: Option<Arc<Session>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, state: AppState, registration: Registration) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            id: registration.id,
            state,
            cancel: registration.cancel,
            reader: FramedRead::new(read, RequestCodec),
            writer: BufWriter::new(write),
            kind: ConnectionKind::Undetermined,
            session: None,
        }
    }

    /// Serve requests until the connection closes, then leave the pool
    pub async fn run(mut self) {
        match self.serve().await {
            Ok(()) => tracing::debug!(connection = self.id, "Connection closed"),
            Err(e) if e.is_disconnect() => {
                tracing::debug!(connection = self.id, "Peer disconnected: {}", e)
            }
            Err(e) => tracing::debug!(connection = self.id, kind = ?self.kind, "Closing connection: {}", e),
        }

        self.state.pool.unregister(self.id);
        let _ = self.writer.shutdown().await;
    }

    async fn serve(&mut self) -> Result<()> {
        while let Some(request) = self.next_request().await? {
            let request = DaapRequest::from_http(&request);
            tracing::trace!(connection = self.id, target = %request.target, "Request");

            if self.handle(request).await? == Flow::Close {
                break;
            }
        }
        Ok(())
    }

    /// Wait for the next request head, applying the idle timeout
    async fn next_request(&mut self) -> Result<Option<http::Request<()>>> {
        let idle = self.state.idle_timeout;
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                next = tokio::time::timeout(idle, self.reader.next()) => next,
            };

            match next {
                Ok(Some(request)) => return request.map(Some),
                Ok(None) => return Ok(None),
                Err(_) => match &self.session {
                    Some(session) if self.kind == ConnectionKind::Control && !session.is_long_poll() => {
                        let drained = session.drain_pending();
                        tracing::trace!(connection = self.id, ?drained, "Idle old-style client, queue drained");
                    }
                    _ => {
                        tracing::debug!(connection = self.id, "Idle timeout");
                        return Ok(None);
                    }
                },
            }
        }
    }

    async fn handle(&mut self, request: DaapRequest) -> Result<Flow> {
        match self.kind {
            ConnectionKind::Undetermined => self.classify(request).await,
            ConnectionKind::Control => self.handle_control(request).await,
            ConnectionKind::Audio => self.handle_audio(request).await,
        }
    }

    async fn classify(&mut self, request: DaapRequest) -> Result<Flow> {
        match request.kind {
            RequestKind::ServerInfo => {
                let version = request.client_version.unwrap_or(DEFAULT_CLIENT_VERSION);
                let session = self.state.pool.promote_control(self.id, version)?;
                self.kind = ConnectionKind::Control;
                self.session = Some(session);
                tracing::info!(connection = self.id, %version, "Control connection opened");
                self.server_info().await
            }
            RequestKind::SongData { .. } => {
                let session = self
                    .state
                    .pool
                    .promote_audio(self.id, request.query.session_id)?;
                self.kind = ConnectionKind::Audio;
                self.session = Some(session);
                self.handle_audio(request).await
            }
            other => Err(ServerError::Protocol(format!(
                "first request must be server-info or song data, got {:?}",
                other
            ))),
        }
    }

    async fn handle_control(&mut self, request: DaapRequest) -> Result<Flow> {
        let session = self.current_session()?;

        if request.kind != RequestKind::ServerInfo && !self.authorized(&request).await? {
            return Ok(Flow::Continue);
        }

        if session.is_logged_in()
            && !request.kind.is_session_exempt()
            && request.kind != RequestKind::ServerInfo
            && request.query.session_id != Some(session.id())
        {
            return Err(ServerError::Session(format!(
                "request without the connection's session id ({:?})",
                request.query.session_id
            )));
        }

        let snapshot = self.state.library.snapshot();
        let query = &request.query;
        let chunk = match request.kind {
            RequestKind::ServerInfo => return self.server_info().await,
            RequestKind::ContentCodes => processor::content_codes()?,
            RequestKind::Login => {
                session.mark_logged_in();
                tracing::info!(connection = self.id, session = session.id(), "Client logged in");
                processor::login(session.id())?
            }
            RequestKind::Logout => {
                self.respond(Response::no_content().closing()).await?;
                tracing::info!(connection = self.id, session = session.id(), "Client logged out");
                return Ok(Flow::Close);
            }
            RequestKind::Update => return self.update(&session, query.revision.unwrap_or(0)).await,
            RequestKind::Databases => processor::databases(&snapshot, query)?,
            RequestKind::DatabaseItems { database } => {
                processor::database_items(&snapshot, database, query)?
            }
            RequestKind::DatabaseContainers { database } => {
                processor::containers(&snapshot, database, query)?
            }
            RequestKind::ContainerItems { database, playlist } => {
                processor::container_items(&snapshot, database, playlist, query)?
            }
            RequestKind::SongData { .. } => {
                return Err(ServerError::Protocol(
                    "song data requested on a control connection".to_string(),
                ));
            }
            RequestKind::Unknown => {
                return Err(ServerError::Protocol(format!(
                    "unknown request {}",
                    request.target
                )));
            }
        };

        self.respond(Response::dmap(&chunk)).await?;
        Ok(Flow::Continue)
    }

    async fn handle_audio(&mut self, request: DaapRequest) -> Result<Flow> {
        let session = self.current_session()?;
        let RequestKind::SongData { database, song, .. } = request.kind else {
            return Err(ServerError::Protocol(
                "audio connections only carry song data".to_string(),
            ));
        };
        if request.query.session_id != Some(session.id()) {
            return Err(ServerError::Session(
                "song data without the audio session's id".to_string(),
            ));
        }
        if !self.authorized(&request).await? {
            return Ok(Flow::Continue);
        }

        self.send_song(&session, database, song, &request).await?;
        Ok(Flow::Close)
    }

    async fn send_song(
        &mut self,
        session: &Session,
        database: DatabaseId,
        song: SongId,
        request: &DaapRequest,
    ) -> Result<()> {
        let song = {
            let snapshot = self.state.library.snapshot();
            let db = snapshot
                .database(database)
                .ok_or_else(|| ServerError::NotFound(format!("database {}", database)))?;
            db.song(song)
                .cloned()
                .ok_or_else(|| ServerError::NotFound(format!("song {} in database {}", song, database)))?
        };

        let start = request.range.map_or(0, |r| r.start);
        let stream = self.state.songs.open(&song, start).await?;
        let span = Span::new(request.range, stream.total);
        tracing::info!(
            connection = self.id,
            song = %song.id(),
            start = span.start,
            total = span.total,
            "Streaming song"
        );

        let cancel = self.cancel.clone();
        let server = self.state.server_header.clone();
        tokio::select! {
            _ = cancel.cancelled() => Ok(()),
            sent = audio::send_song(&mut self.writer, stream, span, session.version(), &server) => {
                sent.map(|_| ())
            }
        }
    }

    /// Answer an update request, parking long-poll clients until a newer
    /// revision is committed
    async fn update(&mut self, session: &Session, client_revision: u32) -> Result<Flow> {
        loop {
            let pending = session.drain_pending().unwrap_or(0);
            let latest = pending
                .max(self.state.library.revision())
                .max(session.told());

            if client_revision < latest {
                let revision = session.tell(latest);
                self.respond(Response::dmap(&processor::update(revision)?))
                    .await?;
                return Ok(Flow::Continue);
            }

            if !session.is_long_poll() {
                self.respond(Response::no_content()).await?;
                return Ok(Flow::Continue);
            }

            tracing::trace!(connection = self.id, client_revision, "Parking update request");
            tokio::select! {
                _ = session.notified() => {}
                _ = tokio::time::sleep(self.state.idle_timeout) => {
                    self.respond(Response::no_content()).await?;
                    return Ok(Flow::Continue);
                }
                _ = self.cancel.cancelled() => return Ok(Flow::Close),
            }
        }
    }

    async fn server_info(&mut self) -> Result<Flow> {
        let chunk = processor::server_info(&self.state.info, &self.state.library.snapshot())?;
        self.respond(Response::dmap(&chunk)).await?;
        Ok(Flow::Continue)
    }

    /// Check credentials; on failure a 401 has already been sent
    async fn authorized(&mut self, request: &DaapRequest) -> Result<bool> {
        match self
            .state
            .auth
            .check(request.authorization.as_deref(), &request.target)
        {
            AuthOutcome::Granted => Ok(true),
            AuthOutcome::Challenge(challenge) => {
                self.respond(Response::unauthorized(challenge)).await?;
                Ok(false)
            }
        }
    }

    fn current_session(&self) -> Result<Arc<Session>> {
        self.session
            .clone()
            .ok_or_else(|| ServerError::Session("connection has no session".to_string()))
    }

    async fn respond(&mut self, response: Response) -> Result<()> {
        response
            .write_to(&mut self.writer, &self.state.server_header)
            .await?;
        self.writer.flush().await?;
        Ok(())
    }
}
