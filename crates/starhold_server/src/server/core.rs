//! Server assembly and lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServerSettings;
use crate::connection::SessionRegistry;
use crate::control::ControlReceiver;
use crate::dispatch::{CommandDispatcher, CommandHandler, PROMPT};
use crate::error::ServerError;
use crate::listener::provision_listeners;
use crate::server::reactor::Reactor;

/// A fully bound server, ready to run.
///
/// Binding and serving are split so callers can learn the actual listen
/// addresses (port 0 binds get their port assigned by the kernel) before
/// the reactor starts.
pub struct GameServer {
    reactor: Reactor,
    local_addrs: Vec<SocketAddr>,
}

impl GameServer {
    /// Validate the settings, bind the listening sockets and wire the
    /// reactor together. Fails when the settings are unusable or no
    /// address could be bound.
    pub fn bind(
        settings: ServerSettings,
        registry: Arc<SessionRegistry>,
        handler: Arc<dyn CommandHandler>,
        control: ControlReceiver,
    ) -> Result<Self, ServerError> {
        settings.validate().map_err(ServerError::Internal)?;

        let listeners = provision_listeners(settings.listen_port, settings.listen_backlog)?;
        let local_addrs = listeners.iter().map(|bound| bound.local_addr).collect();

        let greeting = format!("{}\n{}", settings.motd, PROMPT).into_bytes();
        let dispatcher = CommandDispatcher::new(Arc::clone(&registry), handler);
        let reactor = Reactor::new(
            listeners,
            registry,
            dispatcher,
            control,
            greeting,
            settings.max_line_length,
        );

        Ok(Self {
            reactor,
            local_addrs,
        })
    }

    /// The addresses actually bound, one per address family.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Run the reactor until it terminates. Consumes the server; when
    /// this returns, every session is drained and the listening sockets
    /// are closed.
    pub async fn serve(self) -> Result<(), ServerError> {
        self.reactor.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SessionId;
    use crate::control::control_channel;
    use crate::dispatch::CommandReply;
    use tokio::time::{timeout, Duration};

    struct NullHandler;

    impl CommandHandler for NullHandler {
        fn execute(&self, _session: SessionId, _line: &str) -> CommandReply {
            CommandReply::empty()
        }
    }

    fn test_settings() -> ServerSettings {
        ServerSettings {
            listen_port: 0,
            ..ServerSettings::default()
        }
    }

    #[tokio::test]
    async fn test_bind_reports_local_addrs() {
        let (_handle, control) = control_channel();
        let registry = Arc::new(SessionRegistry::new());
        let server =
            GameServer::bind(test_settings(), registry, Arc::new(NullHandler), control).unwrap();

        assert!(!server.local_addrs().is_empty());
        for addr in server.local_addrs() {
            assert_ne!(addr.port(), 0);
        }
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_settings() {
        let (_handle, control) = control_channel();
        let registry = Arc::new(SessionRegistry::new());
        let settings = ServerSettings {
            listen_backlog: 0,
            ..test_settings()
        };

        let result = GameServer::bind(settings, registry, Arc::new(NullHandler), control);
        assert!(matches!(result, Err(ServerError::Internal(_))));
    }

    #[tokio::test]
    async fn test_serve_stops_on_terminate() {
        let (handle, control) = control_channel();
        let registry = Arc::new(SessionRegistry::new());
        let server =
            GameServer::bind(test_settings(), registry, Arc::new(NullHandler), control).unwrap();

        let task = tokio::spawn(server.serve());
        handle.terminate().await.unwrap();

        let result = timeout(Duration::from_secs(5), task)
            .await
            .expect("server never stopped")
            .unwrap();
        assert!(result.is_ok());
    }
}
