//! HTTP server.
//!
//! This module contains the HTTP server of csi2-httpd, which is a web server
//! implemented using [`axum`].

use crate::app::AppState;
use anyhow::Result;
use axum::{routing::get, Router};
use bytes::Bytes;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

mod api;
mod format;
mod links;
mod registers;
mod stream;
mod websocket;

/// HTTP server.
///
/// This HTTP server gives access to the control operations of the receiver
/// and streams the captured frames.
#[derive(Debug)]
pub struct Server {
    server: axum::serve::Serve<Router, Router>,
}

impl Server {
    /// Creates a new HTTP server.
    ///
    /// The `address` parameter gives the address in which the server will
    /// listen. The `state` gives the server shared access to the receiver. The
    /// `frame_sender` is used to obtain frame channel receivers for the
    /// websocket server.
    ///
    /// After calling this function, the server needs to be run by calling
    /// [`Server::run`].
    pub async fn new(
        address: &std::net::SocketAddr,
        state: AppState,
        frame_sender: broadcast::Sender<Bytes>,
    ) -> Result<Server> {
        let app = Router::new()
            .route("/api", get(api::get_api))
            .route(
                "/api/format/sink",
                get(format::get_sink_format).put(format::put_sink_format),
            )
            .route(
                "/api/format/source",
                get(format::get_source_format).put(format::put_source_format),
            )
            .route("/api/format/sink/codes", get(format::get_sink_codes))
            .route("/api/format/source/codes", get(format::get_source_codes))
            .route(
                "/api/stream",
                get(stream::get_stream).put(stream::put_stream),
            )
            .route(
                "/api/links",
                get(links::get_links)
                    .put(links::put_links)
                    .patch(links::patch_links),
            )
            .route("/api/registers", get(registers::get_registers))
            .with_state(state)
            .route(
                "/frames",
                get(websocket::handler).with_state(frame_sender),
            );
        tracing::info!(%address, "starting HTTP server");
        let listener = tokio::net::TcpListener::bind(address).await?;
        let server = axum::serve(listener, app.layer(TraceLayer::new_for_http()));
        Ok(Server { server })
    }

    /// Runs the HTTP server.
    ///
    /// This only returns if there is a fatal error.
    pub async fn run(self) -> Result<()> {
        Ok(self.server.await?)
    }
}

mod json_error {
    use crate::error::Error as CoreError;
    use anyhow::Error;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    #[derive(Serialize, Debug, Clone, Eq, PartialEq)]
    pub struct JsonError {
        http_status_code: u16,
        error_description: String,
    }

    impl JsonError {
        pub fn from_error(status_code: StatusCode, error: Error) -> JsonError {
            JsonError {
                http_status_code: status_code.as_u16(),
                error_description: format!("{error:#}"),
            }
        }

        pub fn server_error(error: Error) -> JsonError {
            JsonError::from_error(StatusCode::INTERNAL_SERVER_ERROR, error)
        }

        pub fn receiver_error(error: CoreError) -> JsonError {
            let status_code = match error {
                CoreError::Busy | CoreError::PhyInUse => StatusCode::CONFLICT,
                CoreError::UnsupportedFormat(_) | CoreError::InvalidTopology => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            JsonError::from_error(status_code, error.into())
        }

        #[cfg(test)]
        pub fn status_code(&self) -> u16 {
            self.http_status_code
        }
    }

    impl IntoResponse for JsonError {
        fn into_response(self) -> Response {
            let status_code = StatusCode::from_u16(self.http_status_code).unwrap();
            let json = serde_json::to_string(&self).unwrap();
            (status_code, json).into_response()
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn receiver_error_status() {
            assert_eq!(JsonError::receiver_error(CoreError::Busy).status_code(), 409);
            assert_eq!(
                JsonError::receiver_error(CoreError::PhyInUse).status_code(),
                409
            );
            assert_eq!(
                JsonError::receiver_error(CoreError::InvalidTopology).status_code(),
                400
            );
            assert_eq!(
                JsonError::receiver_error(CoreError::Timeout).status_code(),
                500
            );
            let error = JsonError::receiver_error(CoreError::DeviceUnavailable);
            assert_eq!(
                serde_json::to_string(&error).unwrap(),
                r#"{"http_status_code":500,"error_description":"CSI-2 receiver not available"}"#
            );
        }
    }
}
