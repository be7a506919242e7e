//! Rust client library for the Fish Audio text-to-speech and speech-to-text APIs.
//!
//! Two entry points:
//!
//! - [`WebSocketSession`] streams text to the live TTS endpoint and yields
//!   audio chunks while the text is still being sent.
//! - [`Session`] covers the request/response endpoints (one-shot TTS, ASR,
//!   models, wallet).
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use rust_fishaudio::{text_stream, ClientConfig, TtsRequest, WebSocketSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rust_fishaudio::Error> {
//!     let config = ClientConfig::from_env()?;
//!     let session = WebSocketSession::new(config);
//!
//!     let request = TtsRequest::new("");
//!     let mut audio = session
//!         .tts(request, text_stream(["Hello, ", "world!"]))
//!         .await?;
//!
//!     while let Some(chunk) = audio.next().await {
//!         println!("Received audio chunk: {} bytes", chunk?.len());
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod frame;
mod http;
mod inbound;
mod registry;
mod schemas;
mod session;
mod tts;
mod ws;

pub use config::{
    ClientConfig, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_CLOSE_GRACE,
    DEFAULT_INBOUND_BUFFER, DEFAULT_OPEN_TIMEOUT, LIVE_TTS_PATH,
};
pub use error::Error;
pub use frame::{FinishReason, Frame};
pub use http::{ByteStream, FormPart, HttpTransport, MultipartForm, ReqwestTransport};
pub use inbound::Inbound;
pub use registry::{ConnectionRegistry, Registration};
pub use reqwest::Method;
pub use schemas::*;
pub use session::Session;
pub use tts::{text_stream, AudioStream, WebSocketSession};
pub use ws::{Connection, ConnectionState};
