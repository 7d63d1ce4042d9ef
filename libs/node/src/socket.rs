//! Client for the local node runtime service.
//!
//! The service speaks HTTP/1.1 with JSON bodies over a Unix domain socket:
//!
//! | Operation | Request                              |
//! |-----------|--------------------------------------|
//! | get       | `GET /v1/nodes/{id}` (404 = absent)  |
//! | create    | `POST /v1/nodes`                     |
//! | bootstrap | `POST /v1/nodes/{id}/bootstrap`      |
//! | stop      | `POST /v1/nodes/{id}/stop`           |
//! | delete    | `DELETE /v1/nodes/{id}?force=<bool>` |
//! | exec      | `POST /v1/nodes/{id}/exec`           |
//!
//! Exec responses are a [frame](crate::frame) stream ending with an exit frame.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hyper::body::{Buf, HttpBody};
use hyper::{Body, Client, Method, Request, Response, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::frame::{Frame, FrameDecoder};
use crate::runtime::{NodeRuntime, ProcessIo};
use crate::types::{NodeConfig, NodeSnapshot, ProcessSpec};
use crate::RuntimeError;

/// Node runtime reached over a Unix socket.
pub struct UnixSocketRuntime {
    socket_path: PathBuf,
    client: Client<UnixConnector>,
}

impl UnixSocketRuntime {
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            client: Client::unix(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Body,
    ) -> Result<Request<Body>, RuntimeError> {
        let uri = Uri::new(&self.socket_path, path);
        Ok(Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body)?)
    }

    fn json_request<T: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<Request<Body>, RuntimeError> {
        let bytes = serde_json::to_vec(body)?;
        self.request(method, path, Body::from(bytes))
    }

    async fn send(&self, request: Request<Body>) -> Result<Response<Body>, RuntimeError> {
        debug!(method = %request.method(), path = %request.uri().path(), "Node runtime request");

        self.client.request(request).await.map_err(|e| {
            if e.is_connect() {
                RuntimeError::Unavailable {
                    socket: self.socket_path.clone(),
                    message: e.to_string(),
                }
            } else {
                RuntimeError::Http(e)
            }
        })
    }

    /// Send and map a non-success status to [`RuntimeError::Api`].
    async fn send_ok(&self, request: Request<Body>) -> Result<Response<Body>, RuntimeError> {
        let response = self.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = hyper::body::aggregate(response.into_body()).await?;
        let message = String::from_utf8_lossy(body.chunk()).to_string();
        error!(status = %status, message = %message, "node runtime error");
        Err(RuntimeError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response<Body>) -> Result<T, RuntimeError> {
        let body = hyper::body::aggregate(response.into_body()).await?;
        Ok(serde_json::from_reader(body.reader())?)
    }
}

#[async_trait]
impl NodeRuntime for UnixSocketRuntime {
    async fn get(&self, id: &str) -> Result<Option<NodeSnapshot>, RuntimeError> {
        let request = self.request(Method::GET, &format!("/v1/nodes/{id}"), Body::empty())?;
        let response = self.send(request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = hyper::body::aggregate(response.into_body()).await?;
            return Err(RuntimeError::Api {
                status,
                message: String::from_utf8_lossy(body.chunk()).to_string(),
            });
        }

        Ok(Some(Self::read_json(response).await?))
    }

    async fn create(&self, config: &NodeConfig) -> Result<NodeSnapshot, RuntimeError> {
        let request = self.json_request(Method::POST, "/v1/nodes", config)?;
        let response = self.send_ok(request).await?;
        Self::read_json(response).await
    }

    async fn bootstrap(&self, id: &str) -> Result<(), RuntimeError> {
        #[derive(Serialize)]
        struct Bootstrap {
            terminal: bool,
            stdio: &'static str,
        }

        let body = Bootstrap {
            terminal: false,
            stdio: "detached",
        };
        let request =
            self.json_request(Method::POST, &format!("/v1/nodes/{id}/bootstrap"), &body)?;
        self.send_ok(request).await?;
        Ok(())
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        let request = self.request(Method::POST, &format!("/v1/nodes/{id}/stop"), Body::empty())?;
        self.send_ok(request).await?;
        Ok(())
    }

    async fn delete(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let path = format!("/v1/nodes/{id}?force={force}");
        let request = self.request(Method::DELETE, &path, Body::empty())?;
        self.send_ok(request).await?;
        Ok(())
    }

    async fn exec(
        &self,
        id: &str,
        process: &ProcessSpec,
        io: ProcessIo,
    ) -> Result<i32, RuntimeError> {
        let ProcessIo {
            mut stdout,
            mut stderr,
        } = io;

        let request = self.json_request(Method::POST, &format!("/v1/nodes/{id}/exec"), process)?;
        let mut body = self.send_ok(request).await?.into_body();

        let mut decoder = FrameDecoder::new();
        let mut exit_code = None;

        while let Some(chunk) = body.data().await {
            decoder.push(&chunk?);
            while let Some(frame) = decoder.next_frame()? {
                match frame {
                    Frame::Stdout(data) => stdout.write_all(&data).await?,
                    Frame::Stderr(data) => stderr.write_all(&data).await?,
                    Frame::Exit(exit) => exit_code = Some(exit.exit_code),
                }
            }
            if exit_code.is_some() {
                break;
            }
        }

        stdout.flush().await?;
        stderr.flush().await?;

        let exit_code = exit_code.ok_or_else(|| {
            RuntimeError::Protocol(format!(
                "exec stream ended without exit status ({} bytes undecoded)",
                decoder.pending()
            ))
        })?;

        debug!(node = %id, command = %process.command_line(), exit_code, "Exec finished");
        Ok(exit_code)
    }
}
